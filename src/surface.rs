//! Minimal drawing-surface abstraction and its CPU raster implementation.
//!
//! The compositors never touch pixels directly: everything goes through
//! [`DrawSurface`] (`clear` / `fill_rect` / `draw_image` / `fill_text` /
//! `measure_text`), so the same motion/overlay logic can target any 2D raster
//! backend. There is no ambient transform or alpha state; every call carries
//! its own opacity.

use std::path::Path;
use std::sync::Arc;

use anyhow::Context as _;
use kurbo::{Point, Rect};

use crate::{
    assets::PreparedImage,
    error::{ReelsmithError, ReelsmithResult},
};

/// Straight (non-premultiplied) RGBA color.
pub type Rgba8 = [u8; 4];

pub const BLACK: Rgba8 = [0, 0, 0, 255];
pub const WHITE: Rgba8 = [255, 255, 255, 255];

/// One rendered frame: row-major premultiplied RGBA8.
#[derive(Clone, Debug)]
pub struct FrameRGBA {
    pub width: u32,
    pub height: u32,
    pub data: Vec<u8>,
    pub premultiplied: bool,
}

impl FrameRGBA {
    pub fn opaque(width: u32, height: u32, fill: Rgba8) -> Self {
        let mut data = vec![0u8; (width as usize) * (height as usize) * 4];
        for px in data.chunks_exact_mut(4) {
            px.copy_from_slice(&premultiply(fill));
        }
        Self {
            width,
            height,
            data,
            premultiplied: true,
        }
    }

    pub fn pixel(&self, x: u32, y: u32) -> Option<Rgba8> {
        if x >= self.width || y >= self.height {
            return None;
        }
        let off = ((y as usize * self.width as usize) + x as usize) * 4;
        Some([
            self.data[off],
            self.data[off + 1],
            self.data[off + 2],
            self.data[off + 3],
        ])
    }
}

/// Text width/metrics seam, separable from pixel output so layout can be
/// tested with a fixed-advance measurer.
pub trait TextMeasure {
    fn text_width(&self, text: &str, font_px: f32) -> f64;

    /// (ascent, descent), both positive, in pixels at `font_px`.
    fn line_metrics(&self, font_px: f32) -> (f64, f64) {
        (0.78 * f64::from(font_px), 0.22 * f64::from(font_px))
    }
}

pub trait DrawSurface: TextMeasure {
    fn width(&self) -> u32;
    fn height(&self) -> u32;

    fn clear(&mut self, color: Rgba8);
    fn fill_rect(&mut self, rect: Rect, color: Rgba8, alpha: f32);
    fn draw_image(&mut self, image: &PreparedImage, dest: Rect, alpha: f32);
    /// Draw `text` with its left edge at `origin.x` and baseline at `origin.y`.
    fn fill_text(
        &mut self,
        text: &str,
        origin: Point,
        font_px: f32,
        color: Rgba8,
    ) -> ReelsmithResult<()>;

    /// Whether `fill_text`/`measure_text` are backed by a real font.
    fn can_render_text(&self) -> bool {
        true
    }
}

/// A draw surface whose composed pixels can be handed to a frame sink.
pub trait RenderTarget: DrawSurface {
    fn frame(&self) -> &FrameRGBA;
}

/// Caption font wrapper around a parsed TTF/OTF face.
pub struct CaptionFont {
    font: fontdue::Font,
}

impl CaptionFont {
    pub fn from_bytes(bytes: &[u8]) -> ReelsmithResult<Self> {
        let font = fontdue::Font::from_bytes(bytes, fontdue::FontSettings::default())
            .map_err(|e| ReelsmithError::media(format!("parse caption font: {e}")))?;
        Ok(Self { font })
    }

    pub fn from_path(path: &Path) -> ReelsmithResult<Self> {
        let bytes = std::fs::read(path)
            .with_context(|| format!("read caption font '{}'", path.display()))?;
        Self::from_bytes(&bytes)
    }

    pub fn text_width(&self, text: &str, font_px: f32) -> f64 {
        text.chars()
            .map(|ch| f64::from(self.font.metrics(ch, font_px).advance_width))
            .sum()
    }

    /// (ascent, descent), both positive.
    pub fn line_metrics(&self, font_px: f32) -> (f64, f64) {
        match self.font.horizontal_line_metrics(font_px) {
            Some(m) => (f64::from(m.ascent), f64::from(-m.descent)),
            None => (0.78 * f64::from(font_px), 0.22 * f64::from(font_px)),
        }
    }
}

/// CPU raster surface: premultiplied RGBA8 canvas with bilinear image
/// sampling and fontdue glyph fill.
pub struct RasterSurface {
    frame: FrameRGBA,
    font: Option<Arc<CaptionFont>>,
}

impl RasterSurface {
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            frame: FrameRGBA::opaque(width, height, BLACK),
            font: None,
        }
    }

    pub fn with_font(mut self, font: Arc<CaptionFont>) -> Self {
        self.font = Some(font);
        self
    }

    fn blend_px(&mut self, x: i64, y: i64, src_premul: Rgba8, opacity: f32) {
        if x < 0 || y < 0 || x >= i64::from(self.frame.width) || y >= i64::from(self.frame.height) {
            return;
        }
        let off = ((y as usize * self.frame.width as usize) + x as usize) * 4;
        let dst = [
            self.frame.data[off],
            self.frame.data[off + 1],
            self.frame.data[off + 2],
            self.frame.data[off + 3],
        ];
        let out = over(dst, src_premul, opacity);
        self.frame.data[off..off + 4].copy_from_slice(&out);
    }
}

impl TextMeasure for RasterSurface {
    fn text_width(&self, text: &str, font_px: f32) -> f64 {
        // Callers gate caption layout on `can_render_text`; a fontless
        // surface measures everything as zero-width.
        self.font
            .as_ref()
            .map(|f| f.text_width(text, font_px))
            .unwrap_or(0.0)
    }

    fn line_metrics(&self, font_px: f32) -> (f64, f64) {
        match self.font.as_ref() {
            Some(f) => f.line_metrics(font_px),
            None => (0.78 * f64::from(font_px), 0.22 * f64::from(font_px)),
        }
    }
}

impl DrawSurface for RasterSurface {
    fn width(&self) -> u32 {
        self.frame.width
    }

    fn height(&self) -> u32 {
        self.frame.height
    }

    fn clear(&mut self, color: Rgba8) {
        let premul = premultiply(color);
        for px in self.frame.data.chunks_exact_mut(4) {
            px.copy_from_slice(&premul);
        }
    }

    fn fill_rect(&mut self, rect: Rect, color: Rgba8, alpha: f32) {
        if alpha <= 0.0 {
            return;
        }
        let premul = premultiply(color);
        let x0 = rect.x0.round().max(0.0) as i64;
        let y0 = rect.y0.round().max(0.0) as i64;
        let x1 = rect.x1.round().min(f64::from(self.frame.width)) as i64;
        let y1 = rect.y1.round().min(f64::from(self.frame.height)) as i64;
        for y in y0..y1 {
            for x in x0..x1 {
                self.blend_px(x, y, premul, alpha);
            }
        }
    }

    fn draw_image(&mut self, image: &PreparedImage, dest: Rect, alpha: f32) {
        if alpha <= 0.0 || dest.width() <= 0.0 || dest.height() <= 0.0 {
            return;
        }
        let x0 = dest.x0.round().max(0.0) as i64;
        let y0 = dest.y0.round().max(0.0) as i64;
        let x1 = dest.x1.round().min(f64::from(self.frame.width)) as i64;
        let y1 = dest.y1.round().min(f64::from(self.frame.height)) as i64;

        let sx = f64::from(image.width) / dest.width();
        let sy = f64::from(image.height) / dest.height();

        for y in y0..y1 {
            let v = ((y as f64 + 0.5) - dest.y0) * sy - 0.5;
            for x in x0..x1 {
                let u = ((x as f64 + 0.5) - dest.x0) * sx - 0.5;
                let src = sample_bilinear(image, u, v);
                self.blend_px(x, y, src, alpha);
            }
        }
    }

    fn fill_text(
        &mut self,
        text: &str,
        origin: Point,
        font_px: f32,
        color: Rgba8,
    ) -> ReelsmithResult<()> {
        let font = self
            .font
            .clone()
            .ok_or_else(|| ReelsmithError::media("surface has no caption font loaded"))?;

        let mut cursor_x = origin.x;
        for ch in text.chars() {
            let (metrics, bitmap) = font.font.rasterize(ch, font_px);
            let glyph_left = cursor_x + f64::from(metrics.xmin);
            let glyph_top =
                origin.y - (metrics.height as f64 + f64::from(metrics.ymin));

            for gy in 0..metrics.height {
                for gx in 0..metrics.width {
                    let coverage = bitmap[gy * metrics.width + gx];
                    if coverage == 0 {
                        continue;
                    }
                    let src = premultiply([color[0], color[1], color[2], coverage]);
                    self.blend_px(
                        (glyph_left + gx as f64).round() as i64,
                        (glyph_top + gy as f64).round() as i64,
                        src,
                        f32::from(color[3]) / 255.0,
                    );
                }
            }
            cursor_x += f64::from(metrics.advance_width);
        }
        Ok(())
    }

    fn can_render_text(&self) -> bool {
        self.font.is_some()
    }
}

impl RenderTarget for RasterSurface {
    fn frame(&self) -> &FrameRGBA {
        &self.frame
    }
}

/// Source-over in premultiplied RGBA8 with an extra scalar opacity.
pub fn over(dst: Rgba8, src_premul: Rgba8, opacity: f32) -> Rgba8 {
    let opacity = opacity.clamp(0.0, 1.0);
    if opacity <= 0.0 || src_premul[3] == 0 {
        return dst;
    }

    let op = ((opacity * 255.0).round() as i32).clamp(0, 255) as u16;
    let sa = mul_div255(u16::from(src_premul[3]), op);
    if sa == 0 {
        return dst;
    }

    let inv = 255u16 - u16::from(sa);
    let mut out = [0u8; 4];
    out[3] = sa.saturating_add(mul_div255(u16::from(dst[3]), inv));
    for i in 0..3 {
        let sc = mul_div255(u16::from(src_premul[i]), op);
        let dc = mul_div255(u16::from(dst[i]), inv);
        out[i] = sc.saturating_add(dc);
    }
    out
}

pub fn premultiply(color: Rgba8) -> Rgba8 {
    let a = u16::from(color[3]);
    if a == 255 {
        return color;
    }
    if a == 0 {
        return [0, 0, 0, 0];
    }
    [
        mul_div255(u16::from(color[0]), a),
        mul_div255(u16::from(color[1]), a),
        mul_div255(u16::from(color[2]), a),
        color[3],
    ]
}

fn mul_div255(x: u16, y: u16) -> u8 {
    (((u32::from(x) * u32::from(y)) + 127) / 255) as u8
}

fn sample_bilinear(image: &PreparedImage, u: f64, v: f64) -> Rgba8 {
    let max_x = image.width.saturating_sub(1) as i64;
    let max_y = image.height.saturating_sub(1) as i64;

    let xf = u.floor();
    let yf = v.floor();
    let tx = u - xf;
    let ty = v - yf;

    let x0 = (xf as i64).clamp(0, max_x);
    let y0 = (yf as i64).clamp(0, max_y);
    let x1 = (x0 + 1).min(max_x);
    let y1 = (y0 + 1).min(max_y);

    let p00 = image.pixel(x0 as u32, y0 as u32);
    let p10 = image.pixel(x1 as u32, y0 as u32);
    let p01 = image.pixel(x0 as u32, y1 as u32);
    let p11 = image.pixel(x1 as u32, y1 as u32);

    let mut out = [0u8; 4];
    for i in 0..4 {
        let top = f64::from(p00[i]) * (1.0 - tx) + f64::from(p10[i]) * tx;
        let bottom = f64::from(p01[i]) * (1.0 - tx) + f64::from(p11[i]) * tx;
        out[i] = (top * (1.0 - ty) + bottom * ty).round().clamp(0.0, 255.0) as u8;
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn solid_image(width: u32, height: u32, color: Rgba8) -> PreparedImage {
        let mut data = Vec::with_capacity((width * height * 4) as usize);
        for _ in 0..(width * height) {
            data.extend_from_slice(&color);
        }
        PreparedImage::from_rgba8(width, height, data).unwrap()
    }

    #[test]
    fn over_opacity_0_is_noop() {
        let dst = [1, 2, 3, 4];
        assert_eq!(over(dst, [200, 200, 200, 200], 0.0), dst);
    }

    #[test]
    fn over_src_opaque_replaces_dst() {
        let dst = [0, 0, 0, 255];
        let src = [255, 0, 0, 255];
        assert_eq!(over(dst, src, 1.0), src);
    }

    #[test]
    fn over_half_opacity_mixes() {
        let out = over([0, 0, 0, 255], [255, 255, 255, 255], 0.5);
        assert!(out[0] >= 126 && out[0] <= 129);
        assert_eq!(out[3], 255);
    }

    #[test]
    fn clear_fills_opaque() {
        let mut surface = RasterSurface::new(4, 4);
        surface.clear([10, 20, 30, 255]);
        assert_eq!(surface.frame().pixel(3, 3), Some([10, 20, 30, 255]));
    }

    #[test]
    fn fill_rect_clips_to_canvas() {
        let mut surface = RasterSurface::new(4, 4);
        surface.clear(BLACK);
        surface.fill_rect(Rect::new(-10.0, -10.0, 2.0, 20.0), WHITE, 1.0);
        assert_eq!(surface.frame().pixel(0, 0), Some(WHITE));
        assert_eq!(surface.frame().pixel(1, 3), Some(WHITE));
        assert_eq!(surface.frame().pixel(2, 0), Some(BLACK));
    }

    #[test]
    fn draw_image_scales_to_dest() {
        let img = solid_image(2, 2, [0, 255, 0, 255]);
        let mut surface = RasterSurface::new(8, 8);
        surface.clear(BLACK);
        surface.draw_image(&img, Rect::new(0.0, 0.0, 8.0, 8.0), 1.0);
        assert_eq!(surface.frame().pixel(4, 4), Some([0, 255, 0, 255]));
        assert_eq!(surface.frame().pixel(0, 7), Some([0, 255, 0, 255]));
    }

    #[test]
    fn draw_image_offcanvas_dest_is_clipped() {
        let img = solid_image(2, 2, [0, 0, 255, 255]);
        let mut surface = RasterSurface::new(4, 4);
        surface.clear(BLACK);
        // Larger-than-canvas dest: every canvas pixel still comes from the
        // image interior (cover-fit overdraw), nothing panics.
        surface.draw_image(&img, Rect::new(-4.0, -4.0, 8.0, 8.0), 1.0);
        assert_eq!(surface.frame().pixel(0, 0), Some([0, 0, 255, 255]));
        assert_eq!(surface.frame().pixel(3, 3), Some([0, 0, 255, 255]));
    }

    #[test]
    fn fill_text_without_font_errors() {
        let mut surface = RasterSurface::new(4, 4);
        assert!(!surface.can_render_text());
        let err = surface
            .fill_text("x", Point::new(0.0, 3.0), 12.0, WHITE)
            .unwrap_err();
        assert!(err.to_string().contains("caption font"));
    }

    #[test]
    fn premultiply_halves_at_half_alpha() {
        let p = premultiply([255, 0, 0, 128]);
        assert_eq!(p[3], 128);
        assert!(p[0] >= 127 && p[0] <= 129);
    }
}
