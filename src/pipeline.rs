//! フレームごとの検出パイプラインをコントロールするモジュール

use anyhow::{Context, Result};
use log::{debug, error, info, warn};

use crate::config::{ClassLabels, DetectionConfig};
use crate::detection_result::{DetectionData, RawDetection};
use crate::fps::FrameRateEstimator;
use crate::nms::nms_process;
use crate::postprocess::{filter_candidates, get_objs, split_rows};

/// 1フレーム分の処理結果
#[derive(Debug, Clone, PartialEq)]
pub struct FrameResult {
    /// NMS後の検出結果 (コンフィデンス降順)
    pub detections: Vec<DetectionData>,
    /// 起動からの累積平均FPS
    pub fps: f64,
}

/// デコード → フィルタ → NMS を1フレームずつ実行する構造体
///
/// フレームをまたいで持つ状態はFPSの計測だけです。同じインスタンスを
/// 複数スレッドから同時に使うことは想定していません。
pub struct DetectionPipeline {
    config: DetectionConfig,
    labels: ClassLabels,
    fps: FrameRateEstimator,
}

impl DetectionPipeline {
    /// 新しい `DetectionPipeline` インスタンスを作成し、FPSの計測を開始します。
    ///
    /// # Args
    /// * `config` - 閾値の設定
    /// * `labels` - クラス名の一覧
    ///
    /// # Return
    /// * 新たな `DetectionPipeline` インスタンス。設定が不正な場合はエラー
    pub fn new(config: DetectionConfig, labels: ClassLabels) -> Result<Self> {
        config.validate().context("invalid detection config")?;

        info!(
            "detection pipeline: {} classes, conf > {}, nms score > {}, overlap > {}, {:?}",
            labels.len(),
            config.confidence_threshold,
            config.nms_score_threshold,
            config.nms_overlap_threshold,
            config.nms_mode,
        );

        let mut fps = FrameRateEstimator::new();
        fps.start();
        Ok(Self { config, labels, fps })
    }

    pub fn config(&self) -> &DetectionConfig {
        &self.config
    }

    pub fn labels(&self) -> &ClassLabels {
        &self.labels
    }

    /// これまでに処理したフレーム数
    pub fn frame_count(&self) -> u64 {
        self.fps.frame_count()
    }

    /// 1フレーム分の生の検出結果を処理します。
    ///
    /// # Args
    /// * `raws` - ネットワークの出力 (1行1検出)
    /// * `width` - フレームの幅
    /// * `height` - フレームの高さ
    ///
    /// # Return
    /// * 検出結果と累積平均FPS。スコアの数がクラス数と合わない行があればフレームごとエラー
    pub fn process_frame(
        &mut self,
        raws: &[RawDetection],
        width: u32,
        height: u32,
    ) -> Result<FrameResult> {
        let candidates = match get_objs(raws, self.labels.len(), width, height) {
            Ok(c) => c,
            Err(e) => {
                error!("rejecting frame {}: {:#}", self.fps.frame_count() + 1, e);
                return Err(e.context("malformed network output"));
            }
        };

        let detections = if width == 0 || height == 0 {
            warn!("frame has zero area ({}x{}), no detections", width, height);
            vec![]
        } else {
            let filtered = filter_candidates(candidates, self.config.confidence_threshold);
            let n_filtered = filtered.len();
            let kept = nms_process(
                &filtered,
                self.config.nms_score_threshold,
                self.config.nms_overlap_threshold,
                self.config.nms_mode,
            );
            debug!(
                "raw: {}, candidates: {}, detections: {}",
                raws.len(),
                n_filtered,
                kept.len()
            );
            kept
        };

        self.fps.tick();
        let fps = self.fps.current_fps();
        debug!("frame {}: {:.2} FPS", self.fps.frame_count(), fps);

        Ok(FrameResult { detections, fps })
    }

    /// 平坦化された出力レイヤ群を1フレームとして処理します。
    ///
    /// # Args
    /// * `outs` - 出力レイヤごとの値。各レイヤは `rows * (5 + クラス数)` 個
    /// * `width` - フレームの幅
    /// * `height` - フレームの高さ
    pub fn process_outputs(
        &mut self,
        outs: &[&[f32]],
        width: u32,
        height: u32,
    ) -> Result<FrameResult> {
        let mut raws = vec![];
        for (idx, out) in outs.iter().enumerate() {
            let rows = split_rows(out, self.labels.len()).map_err(|e| {
                error!("rejecting frame {}: {:#}", self.fps.frame_count() + 1, e);
                e.context(format!("output layer {}", idx))
            })?;
            raws.extend(rows);
        }
        self.process_frame(&raws, width, height)
    }

    /// 描画用のラベル文字列 `"<クラス名> <コンフィデンス>"` を作ります。
    pub fn label_text(&self, d: &DetectionData) -> String {
        match self.labels.name(d.class) {
            Some(name) => format!("{} {:.2}", name, d.confidence),
            None => format!("{} {:.2}", d.class, d.confidence),
        }
    }
}
