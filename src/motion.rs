//! Per-frame slide motion: punch-zoom scale, cover-fit placement, post-punch
//! drift, cross-fade from the previous slide and the entry flash.

use kurbo::Rect;

use crate::{
    assets::{PreparedImage, PreparedMedia, PreparedVideoStream},
    config::{CROSS_FADE_FRAMES, FLASH_FRAMES},
    drift::{DriftParams, drift_window_ms},
    effect::EffectSpec,
    error::ReelsmithResult,
    model::{AlignH, AlignV, GlobalFlags},
    surface::{DrawSurface, WHITE},
};

pub struct MotionCompositor {
    canvas_w: f64,
    canvas_h: f64,
    flags: GlobalFlags,
}

impl MotionCompositor {
    pub fn new(canvas_w: u32, canvas_h: u32, flags: GlobalFlags) -> Self {
        Self {
            canvas_w: f64::from(canvas_w),
            canvas_h: f64::from(canvas_h),
            flags,
        }
    }

    /// Compose one slide frame onto `surface`.
    #[allow(clippy::too_many_arguments)]
    pub fn render_slide_frame(
        &self,
        surface: &mut dyn DrawSurface,
        media: &mut PreparedMedia,
        prev_still: Option<&PreparedImage>,
        spec: &EffectSpec,
        drift: &DriftParams,
        align_h: AlignH,
        align_v: AlignV,
        frame_index: u64,
        elapsed_ms: f64,
    ) -> ReelsmithResult<()> {
        let (media_w, media_h) = media.dimensions();
        let dest = self.slide_dest(
            f64::from(media_w),
            f64::from(media_h),
            spec,
            drift,
            align_h,
            align_v,
            elapsed_ms,
        );

        let image = media.frame_at(elapsed_ms / 1000.0)?;
        surface.draw_image(image, dest, 1.0);

        if self.flags.cross_fade
            && frame_index < CROSS_FADE_FRAMES
            && let Some(prev) = prev_still
        {
            // Linear ramp from full contribution at frame 0 to zero at the
            // end of the fade window. The outgoing slide is drawn unscaled,
            // centered cover-fit.
            let alpha = (CROSS_FADE_FRAMES - frame_index) as f32 / CROSS_FADE_FRAMES as f32;
            let prev_dest = self.centered_cover_dest(f64::from(prev.width), f64::from(prev.height));
            surface.draw_image(prev, prev_dest, alpha);
        }

        if self.flags.flash_on_cut && frame_index < FLASH_FRAMES {
            let alpha = 0.7 - 0.14 * frame_index as f32;
            surface.fill_rect(
                Rect::new(0.0, 0.0, self.canvas_w, self.canvas_h),
                WHITE,
                alpha,
            );
        }

        Ok(())
    }

    /// Compose one vignette frame: cover-fit, centered, no punch or drift.
    pub fn render_vignette_frame(
        &self,
        surface: &mut dyn DrawSurface,
        vignette: &mut PreparedVideoStream,
        elapsed_ms: f64,
    ) -> ReelsmithResult<()> {
        let dest = self.centered_cover_dest(
            f64::from(vignette.info.width),
            f64::from(vignette.info.height),
        );
        let image = vignette.frame_at(elapsed_ms / 1000.0)?;
        surface.draw_image(image, dest, 1.0);
        Ok(())
    }

    /// Destination rectangle for the current slide frame. Guaranteed to fully
    /// cover the canvas for any effect scale and any drift sample.
    #[allow(clippy::too_many_arguments)]
    pub fn slide_dest(
        &self,
        media_w: f64,
        media_h: f64,
        spec: &EffectSpec,
        drift: &DriftParams,
        align_h: AlignH,
        align_v: AlignV,
        elapsed_ms: f64,
    ) -> Rect {
        let punch = spec.scale_at(elapsed_ms);

        let (drift_scale, pan) = match drift_window_ms(elapsed_ms, spec.last_step_at_ms()) {
            Some(t) => (drift.scale_factor(t), drift.pan_offset(t)),
            None => (1.0, (0.0, 0.0)),
        };

        // The cover-fit size already fills the canvas at scale 1.0; clamping
        // the combined scale at 1.0 is what rules out letterboxing even for
        // sub-unit punch steps.
        let scale = (punch * drift_scale).max(1.0);

        let (cover_w, cover_h) = cover_size(media_w, media_h, self.canvas_w, self.canvas_h);
        let draw_w = cover_w * scale;
        let draw_h = cover_h * scale;

        let base_x = match align_h {
            AlignH::Left => 0.0,
            AlignH::Center => (self.canvas_w - draw_w) / 2.0,
            AlignH::Right => self.canvas_w - draw_w,
        };
        let base_y = match align_v {
            AlignV::Top => 0.0,
            AlignV::Center => (self.canvas_h - draw_h) / 2.0,
            AlignV::Bottom => self.canvas_h - draw_h,
        };

        // Pan is bounded by the overdraw slack so no canvas edge is exposed.
        let x = (base_x + pan.0).clamp(self.canvas_w - draw_w, 0.0);
        let y = (base_y + pan.1).clamp(self.canvas_h - draw_h, 0.0);

        Rect::new(x, y, x + draw_w, y + draw_h)
    }

    fn centered_cover_dest(&self, media_w: f64, media_h: f64) -> Rect {
        let (w, h) = cover_size(media_w, media_h, self.canvas_w, self.canvas_h);
        let x = (self.canvas_w - w) / 2.0;
        let y = (self.canvas_h - h) / 2.0;
        Rect::new(x, y, x + w, y + h)
    }
}

/// Smallest size at the media's aspect ratio that fully covers the canvas.
pub fn cover_size(media_w: f64, media_h: f64, canvas_w: f64, canvas_h: f64) -> (f64, f64) {
    let media_aspect = media_w / media_h;
    let canvas_aspect = canvas_w / canvas_h;
    if media_aspect > canvas_aspect {
        // Wider than the canvas: match heights, crop the sides.
        (canvas_h * media_aspect, canvas_h)
    } else {
        (canvas_w, canvas_w / media_aspect)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::effect::{EffectKind, EffectStep, EffectTable};

    fn compositor(flags: GlobalFlags) -> MotionCompositor {
        MotionCompositor::new(1080, 1920, flags)
    }

    fn covers_canvas(dest: &Rect) -> bool {
        dest.x0 <= 1e-6
            && dest.y0 <= 1e-6
            && dest.x1 >= 1080.0 - 1e-6
            && dest.y1 >= 1920.0 - 1e-6
    }

    #[test]
    fn cover_size_matches_axis() {
        // Wide media in a tall canvas: heights match.
        let (w, h) = cover_size(1920.0, 1080.0, 1080.0, 1920.0);
        assert_eq!(h, 1920.0);
        assert!(w > 1080.0);

        // Tall media: widths match.
        let (w, h) = cover_size(1080.0, 2400.0, 1080.0, 1920.0);
        assert_eq!(w, 1080.0);
        assert!(h > 1920.0);
    }

    #[test]
    fn dest_covers_canvas_during_punch_and_drift() {
        let comp = compositor(GlobalFlags::default());
        let drift = DriftParams::derive(7, 0);
        let table = EffectTable::builtin();

        for kind in table.kinds() {
            let spec = table.get(kind);
            for (media_w, media_h) in [(4000.0, 3000.0), (600.0, 1400.0), (1080.0, 1920.0)] {
                for (align_h, align_v) in [
                    (AlignH::Left, AlignV::Top),
                    (AlignH::Center, AlignV::Center),
                    (AlignH::Right, AlignV::Bottom),
                ] {
                    // Sample well past the last punch so drift is active.
                    for step in 0..60u32 {
                        let elapsed = f64::from(step) * 125.0;
                        let dest = comp.slide_dest(
                            media_w, media_h, spec, &drift, align_h, align_v, elapsed,
                        );
                        assert!(
                            covers_canvas(&dest),
                            "{kind:?} {media_w}x{media_h} at {elapsed}ms: {dest:?}"
                        );
                    }
                }
            }
        }
    }

    #[test]
    fn sub_unit_punch_scale_still_covers() {
        // CLASH dips to 0.9; the safe-scale clamp keeps full coverage.
        let comp = compositor(GlobalFlags::default());
        let drift = DriftParams::derive(0, 0);
        let spec = EffectTable::builtin().get(EffectKind::Clash);
        let dest = comp.slide_dest(
            3000.0,
            2000.0,
            spec,
            &drift,
            AlignH::Center,
            AlignV::Center,
            300.0, // inside the 0.9 step
        );
        assert_eq!(spec.scale_at(300.0), 0.9);
        assert!(covers_canvas(&dest));
    }

    #[test]
    fn alignment_pins_the_matching_edge() {
        let comp = compositor(GlobalFlags::default());
        let drift = DriftParams::derive(0, 0);
        let spec = EffectSpec::new(vec![EffectStep { at_ms: 0, scale: 1.3 }]);

        let left = comp.slide_dest(
            3000.0, 2000.0, &spec, &drift, AlignH::Left, AlignV::Top, 0.0,
        );
        assert_eq!(left.x0, 0.0);
        assert_eq!(left.y0, 0.0);

        let right = comp.slide_dest(
            3000.0, 2000.0, &spec, &drift, AlignH::Right, AlignV::Bottom, 0.0,
        );
        assert!((right.x1 - 1080.0).abs() < 1e-6);
        assert!((right.y1 - 1920.0).abs() < 1e-6);
    }

    #[test]
    fn pan_clamp_holds_at_extreme_offsets() {
        // Force drift pan to its amplitude bound and verify the clamp.
        let comp = compositor(GlobalFlags::default());
        let drift = DriftParams::derive(11, 2);
        let spec = EffectSpec::new(vec![EffectStep { at_ms: 0, scale: 1.01 }]);

        for step in 0..400u32 {
            let elapsed = f64::from(step) * 33.0;
            let dest = comp.slide_dest(
                1080.0, 1920.0, &spec, &drift, AlignH::Center, AlignV::Center, elapsed,
            );
            assert!(covers_canvas(&dest), "at {elapsed}ms: {dest:?}");
        }
    }
}
