//! detect - ダンプしたネットワーク出力をフレームごとに後処理するツール

use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use clap::Parser;
use log::info;

use yolo_v3_tiny_cam::config::{ClassLabels, DetectionConfig};
use yolo_v3_tiny_cam::detection_result::RawDetection;
use yolo_v3_tiny_cam::img_proc::{draw_bbox, draw_fps, load_font};
use yolo_v3_tiny_cam::pipeline::DetectionPipeline;

#[derive(Parser, Debug)]
#[command(author, version, about)]
struct Args {
    /// Class label file, one name per line.
    #[arg(long, default_value = "models/labels.txt")]
    labels: PathBuf,
    /// Optional TOML file with detection thresholds.
    #[arg(long)]
    config: Option<PathBuf>,
    /// Frame image. Its size is used as the frame size.
    #[arg(long)]
    image: Option<PathBuf>,
    /// Frame width when no image is given.
    #[arg(long)]
    width: Option<u32>,
    /// Frame height when no image is given.
    #[arg(long)]
    height: Option<u32>,
    /// Directory for overlay PNGs (needs --image and --font).
    #[arg(long)]
    out_dir: Option<PathBuf>,
    /// TTF font used for labels.
    #[arg(long)]
    font: Option<PathBuf>,
    /// Network output dumps, one file per frame.
    #[arg(required = true)]
    frames: Vec<PathBuf>,
}

/// 1行に1検出、空白区切りの `cx cy w h obj score..` を読み込みます。`#` で始まる行は無視します。
fn read_rows(path: &Path) -> Result<Vec<RawDetection>> {
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read frame: {}", path.display()))?;

    let mut raws = vec![];
    for (lineno, line) in text.lines().enumerate() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        let row = line
            .split_whitespace()
            .map(str::parse::<f32>)
            .collect::<Result<Vec<_>, _>>()
            .with_context(|| format!("{}:{}", path.display(), lineno + 1))?;
        let raw = RawDetection::from_yolo_row(&row)
            .with_context(|| format!("{}:{}", path.display(), lineno + 1))?;
        raws.push(raw);
    }
    Ok(raws)
}

fn main() -> Result<()> {
    env_logger::init();
    let args = Args::parse();

    let labels = ClassLabels::from_file(&args.labels)?;
    let config = match &args.config {
        Some(path) => DetectionConfig::from_toml_file(path)?,
        None => DetectionConfig::default(),
    };
    let mut pipeline = DetectionPipeline::new(config, labels)?;

    let image = match &args.image {
        Some(path) => Some(
            image::open(path).with_context(|| format!("failed to open: {}", path.display()))?,
        ),
        None => None,
    };
    let (width, height) = match (&image, args.width, args.height) {
        (Some(img), _, _) => (img.width(), img.height()),
        (None, Some(w), Some(h)) => (w, h),
        _ => bail!("frame size unknown: pass --image or both --width and --height"),
    };

    let overlay = match (&args.out_dir, &args.font, &image) {
        (Some(dir), Some(font), Some(img)) => {
            std::fs::create_dir_all(dir)?;
            Some((dir, load_font(font)?, img))
        }
        (Some(_), _, _) => bail!("--out-dir needs both --image and --font"),
        _ => None,
    };

    for (idx, frame) in args.frames.iter().enumerate() {
        let raws = read_rows(frame)?;
        let result = pipeline
            .process_frame(&raws, width, height)
            .with_context(|| format!("frame {}", frame.display()))?;

        info!(
            "{}: {} detections, {:.2} FPS",
            frame.display(),
            result.detections.len(),
            result.fps
        );
        for d in result.detections.iter() {
            println!(
                "{}\t{}\t{:.1}\t{:.1}\t{:.1}\t{:.1}",
                idx,
                pipeline.label_text(d),
                d.x,
                d.y,
                d.w,
                d.h
            );
        }

        if let Some((dir, font, img)) = &overlay {
            let mut rgb_img = img.to_rgb8();
            draw_bbox(&mut rgb_img, &result.detections, &pipeline, font, 20., 2);
            draw_fps(&mut rgb_img, result.fps, font, 24.);
            rgb_img.save(dir.join(format!("frame_{:04}.png", idx)))?;
        }
    }
    Ok(())
}
