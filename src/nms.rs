//! Non-Maximum Suppression (NMS) を行うモジュール

use serde::Deserialize;

use crate::detection_result::DetectionData;

/// NMSでどのボックス同士を比較するか
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NmsMode {
    /// クラスを区別せず、重なっていれば別クラスのボックスも抑制する
    #[default]
    ClassAgnostic,
    /// クラス別に分割してからNMSを適用する
    PerClass,
}

/// 2つのボックスの Intersection over Union を計算します。
///
/// 重なりがない場合や面積が0のボックスでは0を返します。
pub fn iou(a: &DetectionData, b: &DetectionData) -> f32 {
    let ix1 = f32::max(a.x, b.x);
    let iy1 = f32::max(a.y, b.y);
    let ix2 = f32::min(a.x2(), b.x2());
    let iy2 = f32::min(a.y2(), b.y2());

    if ix1 >= ix2 || iy1 >= iy2 {
        return 0.0;
    }
    let inter = (ix2 - ix1) * (iy2 - iy1);
    let union = a.area() + b.area() - inter;
    if union <= 0.0 {
        return 0.0;
    }
    inter / union
}

/// 後ろのボックスが前のボックスに抑制されるか判定します。
///
/// 面積0のボックス同士はIoUが0になるため、矩形が完全に一致する場合だけ重なっているとみなします。
fn overlaps(kept: &DetectionData, other: &DetectionData, overlap_threshold: f32) -> bool {
    if kept.area() == 0.0 && other.area() == 0.0 {
        return kept.x == other.x && kept.y == other.y && kept.w == other.w && kept.h == other.h;
    }
    iou(kept, other) > overlap_threshold
}

/// コンフィデンス降順に並んだボックスに貪欲法のNMSを適用します。
///
/// `PerClass` の場合は同じクラスのボックスだけを抑制するので、結果の並びは入力と同じまま
/// (コンフィデンス降順、同値なら入力順) になります。
fn nms(sorted_bb: &[DetectionData], overlap_threshold: f32, mode: NmsMode) -> Vec<DetectionData> {
    let mut suppressed = vec![false; sorted_bb.len()];
    let mut kept = vec![];

    for ib in 0..sorted_bb.len() {
        if suppressed[ib] {
            continue;
        }
        let best = &sorted_bb[ib];
        kept.push(*best);
        for it in (ib + 1)..sorted_bb.len() {
            let other = &sorted_bb[it];
            if suppressed[it] || (mode == NmsMode::PerClass && other.class != best.class) {
                continue;
            }
            if overlaps(best, other, overlap_threshold) {
                suppressed[it] = true;
            }
        }
    }
    kept
}

/// スコアの閾値を超えたボックスにNMSを適用し、残ったボックスをコンフィデンス降順で返します。
///
/// # Args
/// * `bb` - フィルタ済みの検出結果
/// * `score_threshold` - これ以下のコンフィデンスのボックスは選ばれない
/// * `overlap_threshold` - IoUがこれを超えたボックスは抑制される
/// * `mode` - クラスを区別するか
///
/// # Return
/// * 重なりを除いた検出結果。同じコンフィデンスなら入力順
pub fn nms_process(
    bb: &[DetectionData],
    score_threshold: f32,
    overlap_threshold: f32,
    mode: NmsMode,
) -> Vec<DetectionData> {
    let mut eligible: Vec<DetectionData> = bb
        .iter()
        .copied()
        .filter(|d| d.confidence > score_threshold)
        .collect();
    // 安定ソートなので同値は入力順
    eligible.sort_by(|a, b| b.confidence.total_cmp(&a.confidence));

    nms(&eligible, overlap_threshold, mode)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn det(class: usize, x: f32, y: f32, w: f32, h: f32, confidence: f32) -> DetectionData {
        DetectionData {
            class,
            x,
            y,
            w,
            h,
            confidence,
        }
    }

    #[test]
    fn iou_of_identical_boxes_is_one() {
        let a = det(0, 10., 10., 20., 20., 0.9);
        assert!((iou(&a, &a) - 1.0).abs() < 1e-6);
    }

    #[test]
    fn iou_of_half_overlap() {
        let a = det(0, 0., 0., 10., 10., 0.9);
        let b = det(0, 5., 0., 10., 10., 0.9);
        // 50 / 150
        assert!((iou(&a, &b) - 1. / 3.).abs() < 1e-6);
        assert!((iou(&b, &a) - 1. / 3.).abs() < 1e-6);
    }

    #[test]
    fn iou_of_disjoint_or_touching_boxes_is_zero() {
        let a = det(0, 0., 0., 10., 10., 0.9);
        let b = det(0, 10., 0., 10., 10., 0.9);
        let c = det(0, 50., 50., 10., 10., 0.9);
        assert_eq!(iou(&a, &b), 0.0);
        assert_eq!(iou(&a, &c), 0.0);
    }

    #[test]
    fn iou_with_zero_area_box_is_zero() {
        let a = det(0, 0., 0., 10., 10., 0.9);
        let z = det(0, 5., 5., 0., 0., 0.9);
        assert_eq!(iou(&a, &z), 0.0);
        assert_eq!(iou(&z, &z), 0.0);
    }

    #[test]
    fn overlapping_lower_score_is_suppressed() {
        let bb = [det(0, 0., 0., 10., 10., 0.9), det(0, 0., 0., 10., 10., 0.95)];
        let kept = nms_process(&bb, 0.4, 0.5, NmsMode::ClassAgnostic);
        assert_eq!(kept.len(), 1);
        assert_eq!(kept[0].confidence, 0.95);
    }

    #[test]
    fn disjoint_boxes_are_all_kept_highest_first() {
        let bb = [det(0, 0., 0., 10., 10., 0.5), det(1, 100., 100., 10., 10., 0.8)];
        let kept = nms_process(&bb, 0.4, 0.6, NmsMode::ClassAgnostic);
        assert_eq!(kept.len(), 2);
        assert_eq!(kept[0].confidence, 0.8);
        assert_eq!(kept[1].confidence, 0.5);

        let reversed = [bb[1], bb[0]];
        assert_eq!(nms_process(&reversed, 0.4, 0.6, NmsMode::ClassAgnostic), kept);
    }

    #[test]
    fn score_threshold_is_exclusive() {
        let bb = [det(0, 0., 0., 10., 10., 0.4), det(0, 50., 50., 10., 10., 0.41)];
        let kept = nms_process(&bb, 0.4, 0.6, NmsMode::ClassAgnostic);
        assert_eq!(kept.len(), 1);
        assert_eq!(kept[0].confidence, 0.41);
    }

    #[test]
    fn empty_input_gives_empty_output() {
        assert!(nms_process(&[], 0.4, 0.6, NmsMode::ClassAgnostic).is_empty());
        let below = [det(0, 0., 0., 10., 10., 0.1)];
        assert!(nms_process(&below, 0.4, 0.6, NmsMode::PerClass).is_empty());
    }

    #[test]
    fn single_candidate_is_returned_unchanged() {
        let d = det(3, 1.5, 2.5, 7., 9., 0.77);
        assert_eq!(nms_process(&[d], 0.4, 0.6, NmsMode::ClassAgnostic), vec![d]);
    }

    #[test]
    fn equal_confidence_keeps_input_order() {
        let first = det(0, 0., 0., 10., 10., 0.7);
        let second = det(1, 1., 0., 10., 10., 0.7);
        let kept = nms_process(&[first, second], 0.4, 0.5, NmsMode::ClassAgnostic);
        assert_eq!(kept, vec![first]);
    }

    #[test]
    fn suppression_crosses_classes_unless_per_class() {
        let cat = det(0, 0., 0., 10., 10., 0.9);
        let dog = det(1, 0., 0., 10., 10., 0.8);

        let agnostic = nms_process(&[cat, dog], 0.4, 0.6, NmsMode::ClassAgnostic);
        assert_eq!(agnostic, vec![cat]);

        let per_class = nms_process(&[dog, cat], 0.4, 0.6, NmsMode::PerClass);
        assert_eq!(per_class, vec![cat, dog]);
    }

    #[test]
    fn suppressed_box_does_not_suppress_others() {
        // a が b を抑制し、c は b とだけ重なるので残る
        let a = det(0, 0., 0., 10., 10., 0.9);
        let b = det(0, 4., 0., 10., 10., 0.8);
        let c = det(0, 8., 0., 10., 10., 0.7);
        let kept = nms_process(&[a, b, c], 0.4, 0.3, NmsMode::ClassAgnostic);
        assert_eq!(kept, vec![a, c]);
    }

    #[test]
    fn identical_zero_area_duplicate_is_suppressed() {
        let z = det(0, 5., 0., 0., 0., 0.9);
        let dup = det(0, 5., 0., 0., 0., 0.8);
        let elsewhere = det(0, 6., 0., 0., 0., 0.7);
        let line = det(0, 5., 0., 10., 0., 0.6);

        let kept = nms_process(&[dup, z, elsewhere, line], 0.4, 0.6, NmsMode::ClassAgnostic);
        assert_eq!(kept, vec![z, elsewhere, line]);
    }

    #[test]
    fn zero_area_box_is_kept_inside_a_larger_box() {
        let big = det(0, 0., 0., 10., 10., 0.9);
        let z = det(0, 5., 5., 0., 0., 0.8);
        let kept = nms_process(&[big, z], 0.4, 0.6, NmsMode::ClassAgnostic);
        assert_eq!(kept, vec![big, z]);
    }

    #[test]
    fn per_class_ties_keep_input_order() {
        let second_class = det(1, 0., 0., 10., 10., 0.7);
        let first_class = det(0, 50., 50., 10., 10., 0.7);
        let kept = nms_process(&[second_class, first_class], 0.4, 0.6, NmsMode::PerClass);
        assert_eq!(kept, vec![second_class, first_class]);
    }
}
