//! YOLOに関する画像処理モジュール
//!
//! ネットワークへの入力データの生成と、検出結果の描画を行います。

use std::path::Path;

use anyhow::{ensure, Context, Result};
use image::imageops::FilterType;
use image::{DynamicImage, Rgb, RgbImage};
use imageproc::drawing::{draw_filled_rect_mut, draw_hollow_rect_mut, draw_text_mut, text_size};
use imageproc::rect::Rect;
use rusttype::{Font, Scale};

use crate::detection_result::DetectionData;
use crate::pipeline::DetectionPipeline;

/// 画像をネットワークの入力テンソル (NCHW, RGB, 0..1) に変換します。
///
/// アスペクト比は保たずに `size x size` へリサイズし、切り抜きも行いません。
///
/// # Args
/// * `img` - 入力画像
/// * `size` - リサイズ後の画像のサイズ
///
/// # Return
/// * `3 * size * size` 個の値
pub fn blob_from_image(img: &DynamicImage, size: u32) -> Result<Vec<f32>> {
    ensure!(size > 0, "blob size must be positive");
    let resized = img.resize_exact(size, size, FilterType::Triangle).to_rgb8();

    let side = size as usize;
    let plane = plane_len(size);
    let mut blob = vec![0.; 3 * plane];
    for (x, y, pixel) in resized.enumerate_pixels() {
        let idx = y as usize * side + x as usize;
        for c in 0..3 {
            blob[c * plane + idx] = f32::from(pixel[c]) / 255.;
        }
    }
    Ok(blob)
}

/// 1チャネル分の要素数。`u32` のままだと大きなサイズで桁あふれする
fn plane_len(size: u32) -> usize {
    size as usize * size as usize
}

/// TTFファイルからフォントを読み込みます。
pub fn load_font<P: AsRef<Path>>(path: P) -> Result<Font<'static>> {
    let path = path.as_ref();
    let bytes =
        std::fs::read(path).with_context(|| format!("failed to read font: {}", path.display()))?;
    Font::try_from_vec(bytes).with_context(|| format!("invalid font: {}", path.display()))
}

/// 枠線を内側に向かって `thickness` ピクセル分重ねて描画します。
///
/// 幅か高さが0の矩形は1ピクセルとして描きます。
fn draw_box_outline(img: &mut RgbImage, d: &DetectionData, thickness: u32, color: Rgb<u8>) {
    let left = d.x.round() as i32;
    let top = d.y.round() as i32;
    let w = d.w.round().max(1.) as u32;
    let h = d.h.round().max(1.) as u32;

    for t in 0..thickness.max(1) {
        if 2 * t >= w || 2 * t >= h {
            break;
        }
        let rect = Rect::at(left + t as i32, top + t as i32).of_size(w - 2 * t, h - 2 * t);
        draw_hollow_rect_mut(img, rect, color);
    }
}

/// 背景色に対して読みやすい文字色を選びます。
fn text_color_for(bg_color: Rgb<u8>) -> Rgb<u8> {
    let luma = 299 * bg_color[0] as u32 + 587 * bg_color[1] as u32 + 114 * bg_color[2] as u32;
    if luma < 128_000 {
        Rgb([255u8, 255, 255])
    } else {
        Rgb([0u8, 0, 0])
    }
}

/// ボックスの左上にラベルを描画します。上にはみ出す場合はボックスの内側に置きます。
fn draw_label(
    img: &mut RgbImage,
    d: &DetectionData,
    text: &str,
    bg_color: Rgb<u8>,
    font: &Font,
    font_size: f32,
) {
    const PAD: i32 = 4;
    let scale = Scale::uniform(font_size.max(1.));
    let (text_w, text_h) = text_size(scale, font, text);
    let label_w = (text_w.max(0) + 2 * PAD) as u32;
    let label_h = (text_h.max(0) + 2 * PAD).max(1) as u32;

    let left = d.x.round() as i32;
    let top = d.y.round() as i32;
    let label_top = if top - (label_h as i32) < 0 {
        top
    } else {
        top - label_h as i32
    };

    draw_filled_rect_mut(img, Rect::at(left, label_top).of_size(label_w, label_h), bg_color);
    draw_text_mut(
        img,
        text_color_for(bg_color),
        left + PAD,
        label_top + PAD,
        scale,
        font,
        text,
    );
}

/// 画像上にバウンディングボックスとラベルを描画します。
///
/// コンフィデンスの低いものから描くので、重なった場合は高いものが上に来ます。
///
/// # Args
///
/// * `img` - バウンディングボックスとラベルを描画する画像 (in-place)
/// * `d_result` - 検出結果の配列
/// * `pipeline` - クラス名と描画色の取得に使うパイプライン
/// * `font` - ラベルのフォント
/// * `font_size` - ラベルのフォントサイズ
/// * `line_thickness` - バウンディングボックスの線の太さ
pub fn draw_bbox(
    img: &mut RgbImage,
    d_result: &[DetectionData],
    pipeline: &DetectionPipeline,
    font: &Font,
    font_size: f32,
    line_thickness: u32,
) {
    let mut sorted = d_result.to_vec();
    sorted.sort_by(|a, b| a.confidence.total_cmp(&b.confidence));

    for d in sorted.iter() {
        let color = Rgb(pipeline.labels().color(d.class));
        draw_box_outline(img, d, line_thickness, color);
        draw_label(img, d, &pipeline.label_text(d), color, font, font_size);
    }
}

/// 画像の左上にFPSを描画します。
pub fn draw_fps(img: &mut RgbImage, fps: f64, font: &Font, font_size: f32) {
    let text = format!("FPS:{:.2}", fps);
    draw_text_mut(
        img,
        Rgb([0u8, 0, 0]),
        10,
        10,
        Scale::uniform(font_size.max(1.)),
        font,
        &text,
    );
}
