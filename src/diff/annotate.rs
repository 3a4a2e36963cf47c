use font8x8::{BASIC_FONTS, UnicodeFonts};
use image::{DynamicImage, ImageFormat, Rgba, RgbaImage};
use imageproc::drawing::draw_hollow_rect_mut;
use imageproc::rect::Rect;
use std::path::Path;
use tracing::{debug, info};

use crate::config::HighlightConfig;
use crate::diff::{BoundingBox, DiffError};

const GLYPH_SIZE: u32 = 8;
const LABEL_SCALE: u32 = 2;
/// 标签底边与矩形顶边之间的间距
const LABEL_GAP: u32 = 4;

/// 在变化区域上绘制矩形和文字标签
#[derive(Debug, Clone)]
pub struct Annotator {
    stroke_width: u32,
    color: Rgba<u8>,
    label: String,
}

impl Annotator {
    pub fn new(config: &HighlightConfig) -> Self {
        let [r, g, b] = config.color;
        Self {
            stroke_width: config.stroke_width.max(1),
            color: Rgba([r, g, b, 255]),
            label: config.label.clone(),
        }
    }

    /// 返回带标注的 `base` 副本,矩形为空时返回 `None`
    pub fn highlight(&self, base: &DynamicImage, bbox: &BoundingBox) -> Option<RgbaImage> {
        if bbox.is_empty() {
            return None;
        }

        let mut canvas = base.to_rgba8();
        self.draw_outline(&mut canvas, bbox);
        self.draw_label(&mut canvas, bbox);
        Some(canvas)
    }

    /// 标注并以 PNG 写入 `path`(覆盖已有文件)
    ///
    /// 返回是否写入了文件。
    pub fn write(
        &self,
        base: &DynamicImage,
        bbox: &BoundingBox,
        path: &Path,
    ) -> Result<bool, DiffError> {
        let Some(annotated) = self.highlight(base, bbox) else {
            debug!("Empty bounding box, nothing to annotate");
            return Ok(false);
        };

        annotated
            .save_with_format(path, ImageFormat::Png)
            .map_err(|source| DiffError::Image {
                path: path.display().to_string(),
                source,
            })?;
        info!("Saved highlighted diff image: {}", path.display());
        Ok(true)
    }

    fn draw_outline(&self, canvas: &mut RgbaImage, bbox: &BoundingBox) {
        // 线宽向矩形内部收缩
        for inset in 0..self.stroke_width {
            let width = bbox.width().saturating_sub(2 * inset);
            let height = bbox.height().saturating_sub(2 * inset);
            if width == 0 || height == 0 {
                break;
            }
            let rect = Rect::at((bbox.left + inset) as i32, (bbox.top + inset) as i32)
                .of_size(width, height);
            draw_hollow_rect_mut(canvas, rect, self.color);
        }
    }

    fn draw_label(&self, canvas: &mut RgbaImage, bbox: &BoundingBox) {
        let glyph = GLYPH_SIZE * LABEL_SCALE;
        let label_width = self.label.chars().count() as u32 * glyph;

        let y = bbox.top.saturating_sub(glyph + LABEL_GAP);
        let x = bbox
            .left
            .min(canvas.width().saturating_sub(label_width));

        for (i, ch) in self.label.chars().enumerate() {
            let Some(rows) = BASIC_FONTS.get(ch) else {
                continue;
            };
            let origin_x = x + i as u32 * glyph;
            for (row, bits) in rows.iter().enumerate() {
                for col in 0..GLYPH_SIZE {
                    if bits & (1 << col) == 0 {
                        continue;
                    }
                    self.fill_block(
                        canvas,
                        origin_x + col * LABEL_SCALE,
                        y + row as u32 * LABEL_SCALE,
                    );
                }
            }
        }
    }

    fn fill_block(&self, canvas: &mut RgbaImage, x: u32, y: u32) {
        for dy in 0..LABEL_SCALE {
            for dx in 0..LABEL_SCALE {
                if let Some(pixel) = canvas.get_pixel_mut_checked(x + dx, y + dy) {
                    *pixel = self.color;
                }
            }
        }
    }
}

impl Default for Annotator {
    fn default() -> Self {
        Self::new(&HighlightConfig::default())
    }
}
