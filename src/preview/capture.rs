use chrono::Utc;
use eframe::egui::{self, ColorImage};
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::BufWriter;
use std::path::{Path, PathBuf};

/// Fixed JPEG quality for captures, in percent.
pub const JPEG_QUALITY: u8 = 95;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CaptureFormat {
    Png,
    Jpeg,
}

impl CaptureFormat {
    pub fn extension(&self) -> &'static str {
        match self {
            Self::Png => "png",
            Self::Jpeg => "jpeg",
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            Self::Png => "PNG",
            Self::Jpeg => "JPEG",
        }
    }
}

/// Cut the preview container region out of a full-window screenshot.
/// `rect` is in ui points; the screenshot is in physical pixels.
pub fn crop(image: &ColorImage, rect: egui::Rect, pixels_per_point: f32) -> Option<ColorImage> {
    let [width, height] = image.size;
    let x0 = ((rect.min.x * pixels_per_point).round().max(0.0) as usize).min(width);
    let y0 = ((rect.min.y * pixels_per_point).round().max(0.0) as usize).min(height);
    let x1 = ((rect.max.x * pixels_per_point).round().max(0.0) as usize).min(width);
    let y1 = ((rect.max.y * pixels_per_point).round().max(0.0) as usize).min(height);
    if x1 <= x0 || y1 <= y0 {
        return None;
    }

    let mut pixels = Vec::with_capacity((x1 - x0) * (y1 - y0));
    for row in y0..y1 {
        let start = row * width + x0;
        pixels.extend_from_slice(&image.pixels[start..start + (x1 - x0)]);
    }
    Some(ColorImage {
        size: [x1 - x0, y1 - y0],
        pixels,
    })
}

/// Encode a captured region to disk. JPEG flattens the alpha channel.
pub fn encode_to(image: &ColorImage, format: CaptureFormat, path: &Path) -> Result<(), String> {
    let width = image.size[0] as u32;
    let height = image.size[1] as u32;
    let mut rgba = Vec::with_capacity(image.pixels.len() * 4);
    for pixel in &image.pixels {
        rgba.extend_from_slice(&pixel.to_array());
    }
    let buffer = image::RgbaImage::from_raw(width, height, rgba)
        .ok_or_else(|| "pixel buffer size mismatch".to_string())?;

    match format {
        CaptureFormat::Png => buffer
            .save_with_format(path, image::ImageFormat::Png)
            .map_err(|err| err.to_string()),
        CaptureFormat::Jpeg => {
            let rgb = image::DynamicImage::ImageRgba8(buffer).to_rgb8();
            let file = File::create(path).map_err(|err| err.to_string())?;
            let mut writer = BufWriter::new(file);
            image::codecs::jpeg::JpegEncoder::new_with_quality(&mut writer, JPEG_QUALITY)
                .encode_image(&rgb)
                .map_err(|err| err.to_string())
        }
    }
}

fn download_path(format: CaptureFormat) -> PathBuf {
    let dir = dirs::download_dir().unwrap_or_else(std::env::temp_dir);
    let stamp = Utc::now().format("%Y%m%d-%H%M%S");
    dir.join(format!("maquette-export-{stamp}.{}", format.extension()))
}

/// Crop and write a capture into the user's download directory,
/// returning the written path.
pub fn save_to_downloads(
    image: &ColorImage,
    rect: egui::Rect,
    pixels_per_point: f32,
    format: CaptureFormat,
) -> Result<PathBuf, String> {
    let region = crop(image, rect, pixels_per_point).ok_or_else(|| "empty capture region".to_string())?;
    let path = download_path(format);
    encode_to(&region, format, &path)?;
    Ok(path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use eframe::egui::{pos2, Color32, Rect};

    fn checker(width: usize, height: usize) -> ColorImage {
        let pixels = (0..width * height)
            .map(|i| {
                if i % 2 == 0 {
                    Color32::WHITE
                } else {
                    Color32::BLACK
                }
            })
            .collect();
        ColorImage {
            size: [width, height],
            pixels,
        }
    }

    #[test]
    fn crop_extracts_the_requested_region() {
        let image = checker(10, 8);
        let rect = Rect::from_min_max(pos2(2.0, 1.0), pos2(6.0, 5.0));
        let region = crop(&image, rect, 1.0).expect("region should be non-empty");
        assert_eq!(region.size, [4, 4]);
    }

    #[test]
    fn crop_clamps_to_image_bounds() {
        let image = checker(10, 8);
        let rect = Rect::from_min_max(pos2(-5.0, -5.0), pos2(100.0, 100.0));
        let region = crop(&image, rect, 1.0).expect("region should clamp");
        assert_eq!(region.size, [10, 8]);
    }

    #[test]
    fn crop_scales_by_pixels_per_point() {
        let image = checker(20, 16);
        let rect = Rect::from_min_max(pos2(0.0, 0.0), pos2(5.0, 4.0));
        let region = crop(&image, rect, 2.0).expect("region should scale");
        assert_eq!(region.size, [10, 8]);
    }

    #[test]
    fn crop_rejects_degenerate_regions() {
        let image = checker(10, 8);
        let rect = Rect::from_min_max(pos2(50.0, 50.0), pos2(60.0, 60.0));
        assert!(crop(&image, rect, 1.0).is_none());
    }

    #[test]
    fn encode_writes_both_formats() {
        let dir = tempfile::tempdir().expect("temp dir should create");
        let image = checker(8, 6);

        let png = dir.path().join("capture.png");
        encode_to(&image, CaptureFormat::Png, &png).expect("png should encode");
        assert!(png.metadata().unwrap().len() > 0);

        let jpeg = dir.path().join("capture.jpeg");
        encode_to(&image, CaptureFormat::Jpeg, &jpeg).expect("jpeg should encode");
        assert!(jpeg.metadata().unwrap().len() > 0);
    }
}
