//! YOLO (You Only Look Once) 物体検出アルゴリズムの出力を後処理するためのモジュール

use anyhow::{ensure, Context, Result};

use crate::detection_result::{DetectionData, RawDetection, YOLO_ROW_HEADER};

/// 平坦化されたYOLOの出力レイヤを1行ずつのRawDetectionに分割します。
///
/// # Args
/// * `layer` - `rows * (5 + cls_num)` 個の値が行優先で並んだ出力
/// * `cls_num` - クラスの数
///
/// # Return
/// * 行ごとのRawDetectionのベクトル
pub fn split_rows(layer: &[f32], cls_num: usize) -> Result<Vec<RawDetection>> {
    ensure!(cls_num > 0, "class count must be positive");
    let row_len = YOLO_ROW_HEADER + cls_num;
    ensure!(
        layer.len() % row_len == 0,
        "output layer of {} values is not a multiple of row length {}",
        layer.len(),
        row_len
    );
    layer
        .chunks_exact(row_len)
        .map(RawDetection::from_yolo_row)
        .collect()
}

/// 生の検出結果を全てピクセル座標に変換します。
///
/// # Args
/// * `raws` - 生の検出結果
/// * `cls_num` - クラスの数。スコアの数が一致しない行があればエラー
/// * `width` - フレームの幅
/// * `height` - フレームの高さ
///
/// # Return
/// * 入力と同じ順序のDetectionDataのベクトル
pub fn get_objs(
    raws: &[RawDetection],
    cls_num: usize,
    width: u32,
    height: u32,
) -> Result<Vec<DetectionData>> {
    raws.iter()
        .enumerate()
        .map(|(idx, raw)| {
            ensure!(
                raw.scores.len() == cls_num,
                "row {} has {} class scores, expected {}",
                idx,
                raw.scores.len(),
                cls_num
            );
            DetectionData::decode(raw, width, height).with_context(|| format!("row {}", idx))
        })
        .collect()
}

/// コンフィデンスが閾値より大きい候補だけを順序を保って残します。
pub fn filter_candidates(
    candidates: Vec<DetectionData>,
    confidence_threshold: f32,
) -> Vec<DetectionData> {
    candidates
        .into_iter()
        .filter(|d| d.confidence > confidence_threshold)
        .collect()
}
