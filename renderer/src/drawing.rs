//! Frame drawing primitives on top of tiny-skia.
//!
//! The canvas is a flat sea-colored background with a 10x10 tactical grid;
//! ships are team-colored markers with a heading tick, trails fade with
//! age. Text goes through ab_glyph when a font is configured.

use crate::{HEADER_HEIGHT, MINIMAP_SIZE};
use ab_glyph::{Font, FontVec, PxScale, ScaleFont};
use tiny_skia::{
    Color, FillRule, Paint, PathBuilder, Pixmap, Rect, Shader, Stroke, Transform,
};

pub const SEA: (u8, u8, u8) = (18, 38, 58);
pub const GRID: (u8, u8, u8) = (34, 58, 82);
pub const HEADER_BG: (u8, u8, u8) = (12, 24, 36);
pub const GREEN_TEAM: (u8, u8, u8) = (94, 206, 110);
pub const RED_TEAM: (u8, u8, u8) = (226, 88, 88);
pub const TEXT: (u8, u8, u8) = (222, 230, 238);

pub struct FrameCanvas {
    pixmap: Pixmap,
    rgb: Vec<u8>,
}

impl FrameCanvas {
    pub fn new(width: u32, height: u32) -> Option<Self> {
        let pixmap = Pixmap::new(width, height)?;
        let rgb = vec![0u8; (width * height * 3) as usize];
        Some(FrameCanvas { pixmap, rgb })
    }

    pub fn width(&self) -> u32 {
        self.pixmap.width()
    }

    pub fn height(&self) -> u32 {
        self.pixmap.height()
    }

    /// Reset to the empty battlefield: header strip, sea, grid.
    pub fn begin_frame(&mut self) {
        self.pixmap.fill(color(SEA, 255));
        self.fill_rect(
            0.0,
            0.0,
            self.width() as f32,
            HEADER_HEIGHT as f32,
            HEADER_BG,
            255,
        );

        let cell = MINIMAP_SIZE as f32 / 10.0;
        for i in 0..=10 {
            let offset = i as f32 * cell;
            self.line(
                offset,
                HEADER_HEIGHT as f32,
                offset,
                (HEADER_HEIGHT + MINIMAP_SIZE) as f32,
                GRID,
                1.0,
            );
            self.line(
                0.0,
                HEADER_HEIGHT as f32 + offset,
                MINIMAP_SIZE as f32,
                HEADER_HEIGHT as f32 + offset,
                GRID,
                1.0,
            );
        }
    }

    pub fn fill_rect(&mut self, x: f32, y: f32, w: f32, h: f32, rgb: (u8, u8, u8), alpha: u8) {
        let Some(rect) = Rect::from_xywh(x, y, w, h) else {
            return;
        };
        let paint = solid(rgb, alpha);
        self.pixmap
            .fill_rect(rect, &paint, Transform::identity(), None);
    }

    pub fn line(&mut self, x0: f32, y0: f32, x1: f32, y1: f32, rgb: (u8, u8, u8), width: f32) {
        let mut pb = PathBuilder::new();
        pb.move_to(x0, y0);
        pb.line_to(x1, y1);
        let Some(path) = pb.finish() else {
            return;
        };
        let paint = solid(rgb, 255);
        let stroke = Stroke {
            width,
            ..Stroke::default()
        };
        self.pixmap
            .stroke_path(&path, &paint, &stroke, Transform::identity(), None);
    }

    pub fn circle(&mut self, cx: f32, cy: f32, radius: f32, rgb: (u8, u8, u8), alpha: u8) {
        let mut pb = PathBuilder::new();
        pb.push_circle(cx, cy, radius);
        let Some(path) = pb.finish() else {
            return;
        };
        let paint = solid(rgb, alpha);
        self.pixmap
            .fill_path(&path, &paint, FillRule::Winding, Transform::identity(), None);
    }

    /// Ship marker: filled dot plus a heading tick.
    pub fn ship_marker(&mut self, cx: f32, cy: f32, heading: f32, rgb: (u8, u8, u8)) {
        self.circle(cx, cy, 5.0, rgb, 255);
        let tick = 9.0;
        self.line(
            cx,
            cy,
            cx + heading.sin() * tick,
            cy - heading.cos() * tick,
            rgb,
            2.0,
        );
    }

    /// Single-line text; silently a no-op without a font.
    pub fn text(
        &mut self,
        font: Option<&FontVec>,
        x: f32,
        y: f32,
        size: f32,
        rgb: (u8, u8, u8),
        content: &str,
    ) {
        let Some(font) = font else {
            return;
        };
        let scaled = font.as_scaled(PxScale::from(size));
        let mut pen_x = x;
        for ch in content.chars() {
            let glyph_id = scaled.glyph_id(ch);
            let advance = scaled.h_advance(glyph_id);
            let glyph = glyph_id.with_scale_and_position(PxScale::from(size), ab_glyph::point(pen_x, y));
            if let Some(outlined) = font.outline_glyph(glyph) {
                let bounds = outlined.px_bounds();
                let width = self.width() as i32;
                let height = self.height() as i32;
                let data = self.pixmap.data_mut();
                outlined.draw(|gx, gy, coverage| {
                    let px = bounds.min.x as i32 + gx as i32;
                    let py = bounds.min.y as i32 + gy as i32;
                    if px < 0 || py < 0 || px >= width || py >= height {
                        return;
                    }
                    let idx = ((py * width + px) * 4) as usize;
                    let a = (coverage * 255.0) as u16;
                    data[idx] = blend(data[idx], rgb.0, a);
                    data[idx + 1] = blend(data[idx + 1], rgb.1, a);
                    data[idx + 2] = blend(data[idx + 2], rgb.2, a);
                });
            }
            pen_x += advance;
        }
    }

    /// Dump the current frame as a PNG. Debugging aid for tuning draw
    /// output without running the encoder.
    pub fn save_png(&mut self, path: &std::path::Path) -> Result<(), crate::VideoError> {
        let (width, height) = (self.width(), self.height());
        let rgb = self.rgb_frame().to_vec();
        let img = image::RgbImage::from_raw(width, height, rgb)
            .ok_or_else(|| crate::VideoError::DrawFailed("frame buffer size mismatch".into()))?;
        img.save(path)
            .map_err(|e| crate::VideoError::DrawFailed(format!("png save: {e}")))
    }

    /// The frame as tightly packed RGB, the encoder's input format.
    pub fn rgb_frame(&mut self) -> &[u8] {
        for (dst, src) in self.rgb.chunks_exact_mut(3).zip(self.pixmap.data().chunks_exact(4)) {
            dst[0] = src[0];
            dst[1] = src[1];
            dst[2] = src[2];
        }
        &self.rgb
    }
}

fn blend(dst: u8, src: u8, alpha: u16) -> u8 {
    ((u16::from(src) * alpha + u16::from(dst) * (255 - alpha)) / 255) as u8
}

fn color(rgb: (u8, u8, u8), alpha: u8) -> Color {
    Color::from_rgba8(rgb.0, rgb.1, rgb.2, alpha)
}

fn solid<'a>(rgb: (u8, u8, u8), alpha: u8) -> Paint<'a> {
    Paint {
        shader: Shader::SolidColor(color(rgb, alpha)),
        anti_alias: true,
        ..Paint::default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::CANVAS_HEIGHT;

    #[test]
    fn canvas_produces_rgb_frames() {
        let mut canvas = FrameCanvas::new(MINIMAP_SIZE, CANVAS_HEIGHT).unwrap();
        canvas.begin_frame();
        canvas.ship_marker(100.0, 200.0, 0.5, GREEN_TEAM);
        let frame = canvas.rgb_frame();
        assert_eq!(frame.len(), (MINIMAP_SIZE * CANVAS_HEIGHT * 3) as usize);
        // Sea background must be present somewhere.
        assert!(frame.chunks_exact(3).any(|px| px == [SEA.0, SEA.1, SEA.2]));
    }

    #[test]
    fn text_without_font_is_noop() {
        let mut canvas = FrameCanvas::new(64, 64).unwrap();
        canvas.begin_frame();
        canvas.text(None, 5.0, 5.0, 12.0, TEXT, "hello");
    }
}
