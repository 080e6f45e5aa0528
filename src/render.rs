//! 帧标注绘制 (Annotated frame rendering)
//!
//! 框坐标为 `[y_min, x_min, y_max, x_max]`, 绘制时换算为图像 x/y。
//! 未加载字体时只画框, 不画文字。

use std::path::Path;

use ab_glyph::{FontArc, PxScale};
use anyhow::{Context, Result};
use image::{Rgb, RgbImage};
use imageproc::drawing::{draw_hollow_rect_mut, draw_text_mut};
use imageproc::rect::Rect;

use crate::geometry::BoxCoords;
use crate::pipeline::{Annotation, FrameAnnotations};

/// 徘徊目标颜色
pub const LOITERING_COLOR: Rgb<u8> = Rgb([255, 0, 0]);

const TEXT_COLOR: Rgb<u8> = Rgb([255, 255, 255]);
const BORDER_COLOR: Rgb<u8> = Rgb([0, 0, 0]);
const BOX_THICKNESS: i32 = 2;

/// 根据类别ID生成不同颜色
pub fn id_to_color(id: usize) -> Rgb<u8> {
    let hue = (id as f32 * 137.508) % 360.0; // 黄金角度采样
    let (r, g, b) = hsv_to_rgb(hue, 0.8, 0.9);
    Rgb([r, g, b])
}

/// HSV转RGB
fn hsv_to_rgb(h: f32, s: f32, v: f32) -> (u8, u8, u8) {
    let c = v * s;
    let x = c * (1.0 - ((h / 60.0) % 2.0 - 1.0).abs());
    let m = v - c;

    let (r, g, b) = match h {
        h if h < 60.0 => (c, x, 0.0),
        h if h < 120.0 => (x, c, 0.0),
        h if h < 180.0 => (0.0, c, x),
        h if h < 240.0 => (0.0, x, c),
        h if h < 300.0 => (x, 0.0, c),
        _ => (c, 0.0, x),
    };

    (
        ((r + m) * 255.0) as u8,
        ((g + m) * 255.0) as u8,
        ((b + m) * 255.0) as u8,
    )
}

pub struct Annotator {
    font: Option<FontArc>,
    scale: PxScale,
}

impl Default for Annotator {
    fn default() -> Self {
        Self {
            font: None,
            scale: PxScale::from(16.0),
        }
    }
}

impl Annotator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_font(font: FontArc) -> Self {
        Self {
            font: Some(font),
            ..Self::default()
        }
    }

    /// 从 TTF/OTF 文件加载字体
    pub fn load_font(path: impl AsRef<Path>) -> Result<FontArc> {
        let path = path.as_ref();
        let bytes = std::fs::read(path)
            .with_context(|| format!("读取字体文件失败: {}", path.display()))?;
        FontArc::try_from_vec(bytes)
            .with_context(|| format!("字体文件无效: {}", path.display()))
    }

    pub fn has_font(&self) -> bool {
        self.font.is_some()
    }

    pub fn draw(&self, image: &mut RgbImage, annotations: &FrameAnnotations) {
        for item in &annotations.items {
            self.draw_one(image, item);
        }
    }

    fn draw_one(&self, image: &mut RgbImage, item: &Annotation) {
        let color = if item.loitering {
            LOITERING_COLOR
        } else {
            id_to_color(item.class_id)
        };
        let (xmin, ymin, xmax, ymax) = pixel_corners(&item.bbox);

        for t in 0..BOX_THICKNESS {
            let w = (xmax - xmin - 2 * t).max(1) as u32;
            let h = (ymax - ymin - 2 * t).max(1) as u32;
            draw_hollow_rect_mut(image, Rect::at(xmin + t, ymin + t).of_size(w, h), color);
        }

        let Some(font) = &self.font else {
            return;
        };

        self.outlined_text(image, font, xmin + 4, ymin + 4, &item.top_text());
        if let Some(bottom) = item.bottom_text() {
            let y = ymax - 6 - self.scale.y as i32;
            self.outlined_text(image, font, xmax - 50, y, &bottom);
        }
    }

    /// 先画黑色描边再画白字
    fn outlined_text(&self, image: &mut RgbImage, font: &FontArc, x: i32, y: i32, text: &str) {
        for (dx, dy) in [(-1, 0), (1, 0), (0, -1), (0, 1)] {
            draw_text_mut(image, BORDER_COLOR, x + dx, y + dy, self.scale, font, text);
        }
        draw_text_mut(image, TEXT_COLOR, x, y, self.scale, font, text);
    }
}

/// `[y_min, x_min, y_max, x_max]` → (xmin, ymin, xmax, ymax) 整数像素
fn pixel_corners(bbox: &BoxCoords) -> (i32, i32, i32, i32) {
    (
        bbox[1] as i32,
        bbox[0] as i32,
        bbox[3] as i32,
        bbox[2] as i32,
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    fn annotation(bbox: BoxCoords, loitering: bool) -> Annotation {
        Annotation {
            bbox,
            class_id: 0,
            label: "person".to_string(),
            score: 0.9,
            track_id: Some(1),
            loitering,
            speed_kmh: None,
        }
    }

    #[test]
    fn test_id_to_color_is_deterministic() {
        assert_eq!(id_to_color(3), id_to_color(3));
        assert_ne!(id_to_color(0), id_to_color(1));
    }

    #[test]
    fn test_draws_box_edges_in_xy_order() {
        let mut img = RgbImage::new(100, 60);
        let frame = FrameAnnotations {
            frame_index: 0,
            items: vec![annotation([10.0, 20.0, 40.0, 80.0], true)],
            ..Default::default()
        };
        Annotator::new().draw(&mut img, &frame);

        // 左上角 x=20, y=10
        assert_eq!(*img.get_pixel(20, 10), LOITERING_COLOR);
        assert_eq!(*img.get_pixel(50, 10), LOITERING_COLOR);
        // 框内部不被填充
        assert_eq!(*img.get_pixel(50, 25), Rgb([0, 0, 0]));
    }

    #[test]
    fn test_out_of_bounds_box_does_not_panic() {
        let mut img = RgbImage::new(32, 32);
        let frame = FrameAnnotations {
            frame_index: 0,
            items: vec![
                annotation([-10.0, -10.0, 100.0, 100.0], false),
                annotation([5.0, 5.0, 5.0, 5.0], false),
            ],
            ..Default::default()
        };
        Annotator::new().draw(&mut img, &frame);
    }

    #[test]
    fn test_missing_font_file_fails() {
        assert!(Annotator::load_font("/nonexistent/font.ttf").is_err());
    }
}
