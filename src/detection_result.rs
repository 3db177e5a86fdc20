//! 物体検出の結果を処理するモジュール

use anyhow::{ensure, Result};

/// YOLOの1行分の出力のうち、座標とオブジェクト確率が占める要素数
pub const YOLO_ROW_HEADER: usize = 5;

/// ネットワークから送られてきた生の検出結果 (1行分) を保持するための構造体
#[derive(Debug, Clone, PartialEq)]
pub struct RawDetection {
    /// 中心のx (画像幅に対する比率)
    pub cx: f32,
    /// 中心のy (画像高さに対する比率)
    pub cy: f32,
    /// 幅 (画像幅に対する比率)
    pub w: f32,
    /// 高さ (画像高さに対する比率)
    pub h: f32,
    /// オブジェクト確率。コンフィデンスの計算には使わない
    pub objectness: f32,
    /// クラスごとのスコア
    pub scores: Vec<f32>,
}

impl RawDetection {
    /// 新しいRawDetectionを作成します。オブジェクト確率は1.0になります。
    pub fn new(cx: f32, cy: f32, w: f32, h: f32, scores: Vec<f32>) -> Self {
        Self {
            cx,
            cy,
            w,
            h,
            objectness: 1.0,
            scores,
        }
    }

    /// YOLOの出力1行 `[cx, cy, w, h, obj, score_0, ..]` からRawDetectionを作成します。
    ///
    /// # Args
    /// * `row` - YOLOの出力1行
    ///
    /// # Return
    /// * 新たなRawDetectionインスタンス
    pub fn from_yolo_row(row: &[f32]) -> Result<Self> {
        ensure!(
            row.len() > YOLO_ROW_HEADER,
            "yolo row too short: {} values, need more than {}",
            row.len(),
            YOLO_ROW_HEADER
        );
        Ok(Self {
            cx: row[0],
            cy: row[1],
            w: row[2],
            h: row[3],
            objectness: row[4],
            scores: row[YOLO_ROW_HEADER..].to_vec(),
        })
    }
}

/// デコード済みの検出結果 (ピクセル座標)
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DetectionData {
    /// クラス
    pub class: usize,
    /// バウンディングボックス左上のx
    pub x: f32,
    /// バウンディングボックス左上のy
    pub y: f32,
    /// バウンディングボックスの幅
    pub w: f32,
    /// バウンディングボックスの高さ
    pub h: f32,
    /// コンフィデンス
    pub confidence: f32,
}

impl DetectionData {
    /// 生の検出結果をフレームのピクセル座標に変換します。
    ///
    /// 座標はクランプしないため、左上が負になったりフレーム外にはみ出すことがあります。
    /// クラスはスコアが最大のもの (同値なら先頭) になります。
    ///
    /// # Args
    /// * `raw` - 生の検出結果
    /// * `width` - フレームの幅
    /// * `height` - フレームの高さ
    ///
    /// # Return
    /// * 新たなDetectionDataインスタンス。スコアが空の場合はエラー
    pub fn decode(raw: &RawDetection, width: u32, height: u32) -> Result<Self> {
        ensure!(!raw.scores.is_empty(), "raw detection has no class scores");

        let (class, confidence) = argmax(&raw.scores);

        let center_x = raw.cx * width as f32;
        let center_y = raw.cy * height as f32;
        let w = raw.w * width as f32;
        let h = raw.h * height as f32;

        Ok(Self {
            class,
            x: center_x - w / 2.,
            y: center_y - h / 2.,
            w,
            h,
            confidence,
        })
    }

    /// バウンディングボックス右下のx
    pub fn x2(&self) -> f32 {
        self.x + self.w
    }

    /// バウンディングボックス右下のy
    pub fn y2(&self) -> f32 {
        self.y + self.h
    }

    pub fn area(&self) -> f32 {
        self.w.max(0.) * self.h.max(0.)
    }
}

/// 最大値のインデックスと値を返します。同値の場合は先頭のものを選びます。
fn argmax(scores: &[f32]) -> (usize, f32) {
    let mut best = (0, scores[0]);
    for (idx, &s) in scores.iter().enumerate().skip(1) {
        if s > best.1 {
            best = (idx, s);
        }
    }
    best
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decode_centers_box_on_frame() {
        let raw = RawDetection::new(0.5, 0.5, 0.2, 0.2, vec![0.1, 0.9]);
        let d = DetectionData::decode(&raw, 320, 240).unwrap();

        assert_eq!(d.class, 1);
        assert_eq!(d.confidence, 0.9);
        assert!((d.x - 128.).abs() < 1e-3);
        assert!((d.y - 96.).abs() < 1e-3);
        assert!((d.w - 64.).abs() < 1e-3);
        assert!((d.h - 48.).abs() < 1e-3);
        assert!((d.x2() - 192.).abs() < 1e-3);
        assert!((d.y2() - 144.).abs() < 1e-3);
    }

    #[test]
    fn argmax_prefers_first_of_equal_scores() {
        let raw = RawDetection::new(0.5, 0.5, 0.1, 0.1, vec![0.5, 0.5, 0.2]);
        let d = DetectionData::decode(&raw, 100, 100).unwrap();
        assert_eq!(d.class, 0);
        assert_eq!(d.confidence, 0.5);
    }

    #[test]
    fn decode_does_not_clamp() {
        let raw = RawDetection::new(0.0, 1.0, 0.5, 0.5, vec![1.0]);
        let d = DetectionData::decode(&raw, 200, 100).unwrap();
        assert!(d.x < 0.);
        assert!(d.y2() > 100.);
    }

    #[test]
    fn decode_is_deterministic() {
        let raw = RawDetection::new(0.31, 0.77, 0.13, 0.29, vec![0.2, 0.7, 0.1]);
        let a = DetectionData::decode(&raw, 640, 480).unwrap();
        let b = DetectionData::decode(&raw, 640, 480).unwrap();
        assert_eq!(a.x.to_bits(), b.x.to_bits());
        assert_eq!(a.y.to_bits(), b.y.to_bits());
        assert_eq!(a.w.to_bits(), b.w.to_bits());
        assert_eq!(a.h.to_bits(), b.h.to_bits());
        assert_eq!(a, b);
    }

    #[test]
    fn empty_scores_is_rejected() {
        let raw = RawDetection::new(0.5, 0.5, 0.1, 0.1, vec![]);
        assert!(DetectionData::decode(&raw, 100, 100).is_err());
    }

    #[test]
    fn yolo_row_splits_header_and_scores() {
        let raw = RawDetection::from_yolo_row(&[0.1, 0.2, 0.3, 0.4, 0.8, 0.05, 0.6]).unwrap();
        assert_eq!(raw.cx, 0.1);
        assert_eq!(raw.h, 0.4);
        assert_eq!(raw.objectness, 0.8);
        assert_eq!(raw.scores, vec![0.05, 0.6]);

        assert!(RawDetection::from_yolo_row(&[0.1, 0.2, 0.3, 0.4, 0.8]).is_err());
    }
}
