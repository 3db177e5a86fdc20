//! # YOLOv3-Tiny カメラ検出 後処理ライブラリ
//!
//! このクレートは、YOLOv3-Tinyなどの検出ネットワークが1フレームごとに出力する生の検出結果を、
//! フレームに重ねて描画できるラベル付きバウンディングボックスに変換するRustライブラリです。
//!
//! ## 主な機能
//!
//! 1. **デコード**: 正規化された中心座標・サイズとクラススコアを、ピクセル座標の矩形とクラスに変換します。
//! 2. **フィルタ**: コンフィデンスが閾値以下の候補を取り除きます。
//! 3. **NMS**: 重なったボックスのうちコンフィデンスが最大のものを残します。
//! 4. **FPS計測**: 起動からの累積平均FPSを計算します。
//!
//! ネットワーク本体、カメラ入力、ウィンドウ表示はこのクレートの外側で扱います。
//!
//! ## Example
//! ```
//! use yolo_v3_tiny_cam::config::{ClassLabels, DetectionConfig};
//! use yolo_v3_tiny_cam::detection_result::RawDetection;
//! use yolo_v3_tiny_cam::pipeline::DetectionPipeline;
//!
//! let labels = ClassLabels::new(["cat", "dog"])?;
//! let mut pipeline = DetectionPipeline::new(DetectionConfig::default(), labels)?;
//!
//! let raws = [RawDetection::new(0.5, 0.5, 0.2, 0.2, vec![0.1, 0.9])];
//! let result = pipeline.process_frame(&raws, 320, 240)?;
//! assert_eq!(result.detections.len(), 1);
//! # Ok::<(), anyhow::Error>(())
//! ```

pub mod config;
pub mod detection_result;
pub mod fps;
pub mod img_proc;
pub mod nms;
pub mod pipeline;
pub mod postprocess;
