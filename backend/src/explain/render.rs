//! Rendering of the heatmap as a colorized overlay on the input image.

use std::io::Cursor;

use base64::Engine as _;
use base64::engine::general_purpose::STANDARD;
use image::imageops::{self, FilterType};
use image::{DynamicImage, ImageBuffer, ImageFormat, Luma, Rgb, RgbImage};
use shared::HeatmapStyle;

use super::Heatmap;
use crate::error::AnalyzeError;

/// Upsample the heatmap to the base image's resolution, colorize it, blend it
/// over the base image at `alpha`, and encode the result as a PNG data URI.
pub fn render_overlay(
    heatmap: &Heatmap,
    base: &RgbImage,
    style: HeatmapStyle,
    alpha: f32,
) -> Result<String, AnalyzeError> {
    let (width, height) = base.dimensions();
    let upsampled = upsample(heatmap, width, height);
    let mut overlay = RgbImage::new(width, height);
    for (x, y, pixel) in overlay.enumerate_pixels_mut() {
        let t = upsampled.get_pixel(x, y)[0].clamp(0.0, 1.0);
        let color = colorize(style, t);
        let under = base.get_pixel(x, y);
        for c in 0..3 {
            let blended = (1.0 - alpha) * under[c] as f32 + alpha * color[c] as f32;
            pixel[c] = blended.round().clamp(0.0, 255.0) as u8;
        }
    }
    encode_data_uri(overlay)
}

fn upsample(heatmap: &Heatmap, width: u32, height: u32) -> ImageBuffer<Luma<f32>, Vec<f32>> {
    let grid = heatmap.values();
    let small: ImageBuffer<Luma<f32>, Vec<f32>> =
        ImageBuffer::from_fn(heatmap.width() as u32, heatmap.height() as u32, |x, y| {
            Luma([grid[(y as usize, x as usize)]])
        });
    imageops::resize(&small, width, height, FilterType::Triangle)
}

fn encode_data_uri(overlay: RgbImage) -> Result<String, AnalyzeError> {
    let mut png = Vec::new();
    DynamicImage::ImageRgb8(overlay)
        .write_to(&mut Cursor::new(&mut png), ImageFormat::Png)
        .map_err(|e| AnalyzeError::Render(e.to_string()))?;
    Ok(format!("data:image/png;base64,{}", STANDARD.encode(&png)))
}

fn colorize(style: HeatmapStyle, t: f32) -> Rgb<u8> {
    let (r, g, b) = match style {
        HeatmapStyle::Jet => (
            ramp(1.5 - (4.0 * t - 3.0).abs()),
            ramp(1.5 - (4.0 * t - 2.0).abs()),
            ramp(1.5 - (4.0 * t - 1.0).abs()),
        ),
        HeatmapStyle::Hot => (ramp(3.0 * t), ramp(3.0 * t - 1.0), ramp(3.0 * t - 2.0)),
        HeatmapStyle::Grayscale => (t, t, t),
    };
    Rgb([to_channel(r), to_channel(g), to_channel(b)])
}

fn ramp(v: f32) -> f32 {
    v.clamp(0.0, 1.0)
}

fn to_channel(v: f32) -> u8 {
    (v * 255.0).round() as u8
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::Array2;

    #[test]
    fn jet_runs_blue_to_red() {
        let cold = colorize(HeatmapStyle::Jet, 0.0);
        assert_eq!(cold, Rgb([0, 0, 128]));
        let mid = colorize(HeatmapStyle::Jet, 0.5);
        assert_eq!(mid[1], 255);
        let warm = colorize(HeatmapStyle::Jet, 1.0);
        assert_eq!(warm, Rgb([128, 0, 0]));
    }

    #[test]
    fn hot_runs_black_to_white() {
        assert_eq!(colorize(HeatmapStyle::Hot, 0.0), Rgb([0, 0, 0]));
        assert_eq!(colorize(HeatmapStyle::Hot, 1.0), Rgb([255, 255, 255]));
    }

    #[test]
    fn grayscale_is_neutral() {
        let px = colorize(HeatmapStyle::Grayscale, 0.25);
        assert_eq!(px[0], px[1]);
        assert_eq!(px[1], px[2]);
    }

    #[test]
    fn overlay_is_a_png_data_uri() {
        let heatmap = Heatmap::from_raw(Array2::zeros((2, 2)));
        let base = RgbImage::from_pixel(4, 4, Rgb([10, 20, 30]));
        let uri = render_overlay(&heatmap, &base, HeatmapStyle::Jet, 0.5).unwrap();
        assert!(uri.starts_with("data:image/png;base64,"));

        let encoded = uri.trim_start_matches("data:image/png;base64,");
        let png = STANDARD.decode(encoded).unwrap();
        let decoded = image::load_from_memory(&png).unwrap();
        assert_eq!(decoded.width(), 4);
        assert_eq!(decoded.height(), 4);
    }

    #[test]
    fn zero_alpha_preserves_the_base_image() {
        let heatmap = Heatmap::from_raw(Array2::from_elem((2, 2), 1.0));
        let base = RgbImage::from_pixel(4, 4, Rgb([10, 20, 30]));
        let uri = render_overlay(&heatmap, &base, HeatmapStyle::Jet, 0.0).unwrap();

        let encoded = uri.trim_start_matches("data:image/png;base64,");
        let png = STANDARD.decode(encoded).unwrap();
        let decoded = image::load_from_memory(&png).unwrap().to_rgb8();
        assert!(decoded.pixels().all(|px| *px == Rgb([10, 20, 30])));
    }
}
