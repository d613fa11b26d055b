//! Overlay layer: lead-in bar, typewriter caption blocks and the watermark,
//! drawn in that z-order strictly on top of the motion layer. Every call
//! carries explicit opacity, so nothing here can be contaminated by (or leak
//! into) motion-layer draw state.

use kurbo::Rect;

use crate::{
    assets::PreparedImage,
    config::{
        CaptionStyle, LEAD_IN_MS, WATERMARK_MARGIN, WATERMARK_OPACITY, WATERMARK_TARGET_WIDTH,
    },
    ease::Ease,
    error::ReelsmithResult,
    surface::DrawSurface,
    typewriter::Typewriter,
};

pub struct OverlayCompositor {
    canvas_w: f64,
    canvas_h: f64,
    style: CaptionStyle,
}

impl OverlayCompositor {
    pub fn new(canvas_w: u32, canvas_h: u32, style: CaptionStyle) -> Self {
        Self {
            canvas_w: f64::from(canvas_w),
            canvas_h: f64::from(canvas_h),
            style,
        }
    }

    /// Draw the overlay for one frame.
    pub fn render(
        &self,
        surface: &mut dyn DrawSurface,
        typewriter: Option<&mut Typewriter>,
        watermark: Option<&PreparedImage>,
        elapsed_ms: f64,
    ) -> ReelsmithResult<()> {
        if let Some(tw) = typewriter
            && tw.total_chars() > 0
        {
            let top_y = self.caption_top_y(tw.total_height());
            self.draw_lead_in_bar(surface, top_y, elapsed_ms);
            tw.render(surface, self.style.safe_margin, top_y)?;
        }

        if let Some(wm) = watermark {
            self.draw_watermark(surface, wm);
        }

        Ok(())
    }

    /// Top of the caption stack: a fixed offset up from the canvas bottom,
    /// clamped so many-line captions never climb into the top safe zone.
    pub fn caption_top_y(&self, total_text_height: f64) -> f64 {
        let y = self.canvas_h - self.style.bottom_offset - total_text_height;
        y.max(self.style.min_top_inset)
    }

    fn draw_lead_in_bar(&self, surface: &mut dyn DrawSurface, caption_top_y: f64, elapsed_ms: f64) {
        let progress = (elapsed_ms / LEAD_IN_MS as f64).clamp(0.0, 1.0);
        let width = self.style.bar_width * Ease::OutCubic.apply(progress);
        if width < 0.5 {
            return;
        }
        // The bar sits above the first caption block, slightly further left
        // than the text.
        let bar_y = caption_top_y - 0.5 * f64::from(self.style.font_px) - 20.0;
        surface.fill_rect(
            Rect::new(
                self.style.bar_left,
                bar_y,
                self.style.bar_left + width,
                bar_y + self.style.bar_height,
            ),
            self.style.bar_color,
            1.0,
        );
    }

    fn draw_watermark(&self, surface: &mut dyn DrawSurface, watermark: &PreparedImage) {
        let w = WATERMARK_TARGET_WIDTH;
        let h = w / watermark.aspect();
        let x = self.canvas_w - w - WATERMARK_MARGIN;
        let y = WATERMARK_MARGIN;
        surface.draw_image(watermark, Rect::new(x, y, x + w, y + h), WATERMARK_OPACITY);
    }
}
