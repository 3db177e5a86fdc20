//! 検出パイプラインの設定とクラスラベルを扱うモジュール

use std::path::Path;

use anyhow::{ensure, Context, Result};
use serde::Deserialize;

use crate::nms::NmsMode;

pub const DEFAULT_CONFIDENCE_THRESHOLD: f32 = 0.3;
pub const DEFAULT_NMS_SCORE_THRESHOLD: f32 = 0.4;
pub const DEFAULT_NMS_OVERLAP_THRESHOLD: f32 = 0.6;

const COLORS: [[u8; 3]; 10] = [
    [255, 0, 0],
    [255, 255, 0],
    [0, 0, 255],
    [14, 23, 50],
    [28, 105, 80],
    [190, 159, 53],
    [46, 194, 148],
    [242, 30, 131],
    [97, 101, 198],
    [115, 11, 87],
];

/// 閾値の設定
#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct DetectionConfig {
    /// デコード直後の候補を残すコンフィデンスの閾値 (これより大きいものを残す)
    pub confidence_threshold: f32,
    /// NMSで選ばれるためのコンフィデンスの閾値
    pub nms_score_threshold: f32,
    /// NMSで抑制するIoUの閾値
    pub nms_overlap_threshold: f32,
    /// NMSでクラスを区別するか
    pub nms_mode: NmsMode,
}

impl Default for DetectionConfig {
    fn default() -> Self {
        Self {
            confidence_threshold: DEFAULT_CONFIDENCE_THRESHOLD,
            nms_score_threshold: DEFAULT_NMS_SCORE_THRESHOLD,
            nms_overlap_threshold: DEFAULT_NMS_OVERLAP_THRESHOLD,
            nms_mode: NmsMode::default(),
        }
    }
}

impl DetectionConfig {
    /// TOML文字列から設定を読み込みます。書かれていない項目はデフォルト値になります。
    pub fn from_toml_str(s: &str) -> Result<Self> {
        let cfg: Self = toml::from_str(s).context("failed to parse detection config")?;
        cfg.validate()?;
        Ok(cfg)
    }

    /// TOMLファイルから設定を読み込みます。
    ///
    /// # Args
    /// * `path` - 設定ファイルのパス
    ///
    /// # Return
    /// * 検証済みの設定
    pub fn from_toml_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let s = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read config: {}", path.display()))?;
        Self::from_toml_str(&s).with_context(|| format!("invalid config: {}", path.display()))
    }

    /// 全ての閾値が [0, 1] に収まっているか検証します。
    pub fn validate(&self) -> Result<()> {
        for (name, v) in [
            ("confidence_threshold", self.confidence_threshold),
            ("nms_score_threshold", self.nms_score_threshold),
            ("nms_overlap_threshold", self.nms_overlap_threshold),
        ] {
            ensure!(
                v.is_finite() && (0.0..=1.0).contains(&v),
                "{} must be in [0, 1], got {}",
                name,
                v
            );
        }
        Ok(())
    }
}

/// クラス名の一覧。インデックスがクラスIDになる
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClassLabels {
    names: Vec<String>,
}

impl ClassLabels {
    /// クラス名の一覧から作成します。空や空白だけの名前はエラーになります。
    pub fn new<I, S>(names: I) -> Result<Self>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let names: Vec<String> = names.into_iter().map(Into::into).collect();
        ensure!(!names.is_empty(), "class label set is empty");
        for (idx, name) in names.iter().enumerate() {
            ensure!(!name.trim().is_empty(), "class label {} is blank", idx);
        }
        Ok(Self { names })
    }

    /// 1行に1つのクラス名が書かれたテキストから作成します。
    ///
    /// 各行の前後の空白は取り除きます。末尾の空行は無視しますが、途中の空行はエラーです。
    pub fn parse(text: &str) -> Result<Self> {
        let mut lines: Vec<&str> = text.lines().map(str::trim).collect();
        while lines.last().is_some_and(|l| l.is_empty()) {
            lines.pop();
        }
        Self::new(lines)
    }

    /// ラベルファイルから作成します。
    ///
    /// # Args
    /// * `path` - ラベルファイルのパス
    ///
    /// # Return
    /// * 新たなClassLabelsインスタンス
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read labels: {}", path.display()))?;
        Self::parse(&text).with_context(|| format!("invalid labels: {}", path.display()))
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }

    pub fn name(&self, class: usize) -> Option<&str> {
        self.names.get(class).map(String::as_str)
    }

    /// クラスごとの描画色。パレットを循環して使う
    pub fn color(&self, class: usize) -> [u8; 3] {
        COLORS[class % COLORS.len()]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_thresholds_are_valid() {
        let cfg = DetectionConfig::default();
        assert_eq!(cfg.confidence_threshold, 0.3);
        assert_eq!(cfg.nms_score_threshold, 0.4);
        assert_eq!(cfg.nms_overlap_threshold, 0.6);
        assert_eq!(cfg.nms_mode, NmsMode::ClassAgnostic);
        assert!(cfg.validate().is_ok());
    }

    #[test]
    fn toml_overrides_only_given_keys() {
        let cfg = DetectionConfig::from_toml_str(
            "confidence_threshold = 0.5\nnms_mode = \"per_class\"\n",
        )
        .unwrap();
        assert_eq!(cfg.confidence_threshold, 0.5);
        assert_eq!(cfg.nms_score_threshold, 0.4);
        assert_eq!(cfg.nms_mode, NmsMode::PerClass);
    }

    #[test]
    fn toml_rejects_unknown_keys_and_bad_values() {
        assert!(DetectionConfig::from_toml_str("iou = 0.5").is_err());
        assert!(DetectionConfig::from_toml_str("nms_overlap_threshold = 1.5").is_err());
        assert!(DetectionConfig::from_toml_str("confidence_threshold = -0.1").is_err());
    }

    #[test]
    fn labels_are_trimmed_and_index_stable() {
        let labels = ClassLabels::parse(" person\ncar \r\ndog\n\n").unwrap();
        assert_eq!(labels.len(), 3);
        assert_eq!(labels.name(0), Some("person"));
        assert_eq!(labels.name(1), Some("car"));
        assert_eq!(labels.name(2), Some("dog"));
        assert_eq!(labels.name(3), None);
    }

    #[test]
    fn malformed_labels_are_rejected() {
        assert!(ClassLabels::parse("").is_err());
        assert!(ClassLabels::parse("person\n\ncar\n").is_err());
        assert!(ClassLabels::new(Vec::<String>::new()).is_err());
    }

    #[test]
    fn colors_cycle_through_palette() {
        let labels = ClassLabels::new((0..12).map(|i| format!("c{}", i))).unwrap();
        assert_eq!(labels.color(0), labels.color(10));
        assert_ne!(labels.color(0), labels.color(1));
    }
}
