//! Frame scheduler: drives the motion and overlay compositors across all
//! slides and the closing vignette at a fixed 30 fps grid, pushing each
//! composed frame to the sink in strict order.
//!
//! Per export the machine runs `Idle → RenderingSlide(i)… → RenderingVignette
//! → Finalizing → Done`, or `Failed` from any state. The loop suspends only
//! at the per-frame pacing wait; when behind schedule the wait is skipped,
//! the render never is.

use crate::{
    assets::{ExportAssets, PreparedImage, PreparedMedia},
    clock::RenderClock,
    config::{ExportConfig, FRAME_INTERVAL_MS, LEAD_IN_MS},
    drift::DriftParams,
    effect::{EffectKind, EffectSpec, EffectTable},
    error::{ReelsmithError, ReelsmithResult},
    layout::{wrap_caption, wrapped_char_count},
    model::{AlignH, AlignV, Project},
    motion::MotionCompositor,
    overlay::OverlayCompositor,
    sink::{AudioInputConfig, FrameSink, SinkConfig},
    surface::{BLACK, RenderTarget, TextMeasure},
    typewriter::{Typewriter, effective_duration_ms},
};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ExportPhase {
    Idle,
    RenderingSlide(usize),
    RenderingVignette,
    Finalizing,
    Done,
    Failed,
}

/// Everything derived once per slide before its render loop starts.
#[derive(Clone, Debug)]
pub struct SlidePlan {
    pub caption: String,
    pub wrapped_chars: usize,
    pub duration_ms: f64,
    pub total_frames: u64,
    pub effect: EffectKind,
    pub spec: EffectSpec,
    pub drift: DriftParams,
    pub align_h: AlignH,
    pub align_v: AlignV,
}

#[derive(Clone, Copy, Debug, Default)]
pub struct ExportStats {
    pub frames_rendered: u64,
    pub timeline_ms: f64,
}

/// Derive per-slide plans: wrapped caption, effective duration, resolved
/// effect and drift parameters. Wrapping runs exactly once per slide.
pub fn plan_slides(
    project: &Project,
    measure: &dyn TextMeasure,
    cfg: &ExportConfig,
) -> Vec<SlidePlan> {
    let table = EffectTable::builtin();
    let style = &cfg.caption_style;
    let max_width = style.max_line_width(cfg.width);

    project
        .slides
        .iter()
        .enumerate()
        .map(|(index, slide)| {
            let caption = project.caption_for(index).to_string();
            let lines = wrap_caption(&caption, measure, style.font_px, max_width);
            let wrapped_chars = wrapped_char_count(&lines);
            let duration_ms = effective_duration_ms(slide.requested_duration_sec, wrapped_chars);
            let effect = slide.effect.resolve(project.seed, index);

            SlidePlan {
                caption,
                wrapped_chars,
                duration_ms,
                total_frames: frame_count_for_ms(duration_ms),
                effect,
                spec: table.get(effect).clone(),
                drift: DriftParams::derive(project.seed, index),
                align_h: slide.align_h,
                align_v: slide.align_v,
            }
        })
        .collect()
}

pub fn slides_total_ms(plans: &[SlidePlan]) -> f64 {
    plans.iter().map(|p| p.duration_ms).sum()
}

pub fn frame_count_for_ms(ms: f64) -> u64 {
    ((ms / FRAME_INTERVAL_MS).ceil() as u64).max(1)
}

/// Run the full export loop. Owns the sink lifecycle: `begin` before the
/// first frame, `end` during finalization, `abort` on any failure so partial
/// output is discarded and resources released no matter which stage failed.
#[allow(clippy::too_many_arguments)]
pub fn run(
    project: &Project,
    cfg: &ExportConfig,
    plans: &[SlidePlan],
    assets: &mut ExportAssets,
    surface: &mut dyn RenderTarget,
    clock: &mut dyn RenderClock,
    sink: &mut dyn FrameSink,
    audio: Option<AudioInputConfig>,
) -> ReelsmithResult<ExportStats> {
    let mut phase = ExportPhase::Idle;
    match run_inner(
        project, cfg, plans, assets, surface, clock, sink, audio, &mut phase,
    ) {
        Ok(stats) => Ok(stats),
        Err(err) => {
            transition(&mut phase, ExportPhase::Failed);
            sink.abort();
            tracing::error!(error = %err, "export failed; partial output discarded");
            Err(err)
        }
    }
}

#[allow(clippy::too_many_arguments)]
fn run_inner(
    project: &Project,
    cfg: &ExportConfig,
    plans: &[SlidePlan],
    assets: &mut ExportAssets,
    surface: &mut dyn RenderTarget,
    clock: &mut dyn RenderClock,
    sink: &mut dyn FrameSink,
    audio: Option<AudioInputConfig>,
    phase: &mut ExportPhase,
) -> ReelsmithResult<ExportStats> {
    if plans.len() != project.slides.len() || assets.slides.len() != project.slides.len() {
        return Err(ReelsmithError::validation(
            "slide plans/assets do not match the project snapshot",
        ));
    }

    sink.begin(SinkConfig {
        width: cfg.width,
        height: cfg.height,
        fps: cfg.fps,
        audio,
    })?;

    let motion = MotionCompositor::new(cfg.width, cfg.height, project.flags);
    let overlay = OverlayCompositor::new(cfg.width, cfg.height, cfg.caption_style.clone());
    let max_width = cfg.caption_style.max_line_width(cfg.width);

    let mut global_frame: u64 = 0;
    let mut prev_still: Option<PreparedImage> = None;

    for (index, plan) in plans.iter().enumerate() {
        transition(phase, ExportPhase::RenderingSlide(index));
        tracing::debug!(
            slide = index,
            effect = plan.effect.name(),
            duration_ms = plan.duration_ms,
            frames = plan.total_frames,
            "rendering slide"
        );

        let mut typewriter = (plan.wrapped_chars > 0).then(|| {
            let measure: &dyn TextMeasure = &*surface;
            Typewriter::setup(&plan.caption, measure, &cfg.caption_style, max_width)
        });

        let fade_source = if project.flags.cross_fade && index > 0 {
            prev_still.take()
        } else {
            None
        };

        clock.restart();
        for frame in 0..plan.total_frames {
            clock.pace_until(frame as f64 * FRAME_INTERVAL_MS);
            let elapsed_ms = clock.elapsed_ms();

            surface.clear(BLACK);
            motion.render_slide_frame(
                &mut *surface,
                &mut assets.slides[index],
                fade_source.as_ref(),
                &plan.spec,
                &plan.drift,
                plan.align_h,
                plan.align_v,
                frame,
                elapsed_ms,
            )?;

            if let Some(tw) = typewriter.as_mut()
                && elapsed_ms >= LEAD_IN_MS as f64
            {
                tw.advance();
            }
            overlay.render(
                &mut *surface,
                typewriter.as_mut(),
                assets.watermark.as_ref(),
                elapsed_ms,
            )?;

            sink.push_frame(global_frame, surface.frame())?;
            global_frame += 1;
        }

        if project.flags.cross_fade {
            prev_still = Some(slide_still(&mut assets.slides[index], plan.duration_ms)?);
        }
    }

    transition(phase, ExportPhase::RenderingVignette);
    let vignette_ms = assets.vignette.duration_ms();
    let vignette_frames = frame_count_for_ms(vignette_ms);
    tracing::debug!(duration_ms = vignette_ms, frames = vignette_frames, "rendering vignette");

    clock.restart();
    for frame in 0..vignette_frames {
        clock.pace_until(frame as f64 * FRAME_INTERVAL_MS);
        let elapsed_ms = clock.elapsed_ms();

        surface.clear(BLACK);
        motion.render_vignette_frame(&mut *surface, &mut assets.vignette, elapsed_ms)?;
        overlay.render(&mut *surface, None, assets.watermark.as_ref(), elapsed_ms)?;

        sink.push_frame(global_frame, surface.frame())?;
        global_frame += 1;
    }

    transition(phase, ExportPhase::Finalizing);
    sink.end()?;
    transition(phase, ExportPhase::Done);

    Ok(ExportStats {
        frames_rendered: global_frame,
        timeline_ms: slides_total_ms(plans) + vignette_ms,
    })
}

/// Still used as the cross-fade source for the next slide: the image itself,
/// or the video frame at the slide's final timestamp.
fn slide_still(media: &mut PreparedMedia, duration_ms: f64) -> ReelsmithResult<PreparedImage> {
    match media {
        PreparedMedia::Image(img) => Ok(img.clone()),
        PreparedMedia::Video(v) => Ok(v.frame_at(duration_ms / 1000.0)?.clone()),
    }
}

fn transition(phase: &mut ExportPhase, next: ExportPhase) {
    tracing::info!(from = ?*phase, to = ?next, "export phase");
    *phase = next;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{CHAR_REVEAL_MS, HOLD_MS};
    use crate::model::{MediaKind, Slide, SlideMedia};
    use std::path::PathBuf;

    struct MonoMeasure;

    impl TextMeasure for MonoMeasure {
        fn text_width(&self, text: &str, _font_px: f32) -> f64 {
            text.chars().count() as f64 * 10.0
        }
    }

    fn project_with_caption(caption: &str, requested_sec: f64) -> Project {
        let mut project = Project::new("t");
        let mut slide = Slide::new("s0");
        slide.media = Some(SlideMedia {
            kind: MediaKind::Image,
            source: PathBuf::from("a.jpg"),
        });
        slide.caption = caption.to_string();
        slide.requested_duration_sec = requested_sec;
        project.slides.push(slide);
        project.vignette = Some(PathBuf::from("v.mp4"));
        project
    }

    #[test]
    fn plan_uses_requested_floor_for_short_captions() {
        let project = project_with_caption("Breaking: storm hits city", 3.0);
        let cfg = ExportConfig::new("out.mp4");
        let plans = plan_slides(&project, &MonoMeasure, &cfg);
        assert_eq!(plans[0].duration_ms, 3000.0);
        assert_eq!(plans[0].total_frames, 90);
    }

    #[test]
    fn plan_extends_for_long_captions() {
        let caption = "a".repeat(200);
        let project = project_with_caption(&caption, 3.0);
        let cfg = ExportConfig::new("out.mp4");
        let plans = plan_slides(&project, &MonoMeasure, &cfg);
        let expected =
            (LEAD_IN_MS + 200 * CHAR_REVEAL_MS + HOLD_MS) as f64;
        assert_eq!(plans[0].duration_ms, expected);
        assert!(plans[0].duration_ms > 3000.0);
    }

    #[test]
    fn plan_resolves_random_effects() {
        let mut project = project_with_caption("", 2.0);
        project.seed = 99;
        let cfg = ExportConfig::new("out.mp4");
        let plans = plan_slides(&project, &MonoMeasure, &cfg);
        assert_ne!(plans[0].effect, EffectKind::Random);

        // Same seed, same resolution.
        let again = plan_slides(&project, &MonoMeasure, &cfg);
        assert_eq!(plans[0].effect, again[0].effect);
    }

    #[test]
    fn frame_count_rounds_up_and_is_at_least_one() {
        assert_eq!(frame_count_for_ms(3000.0), 90);
        assert_eq!(frame_count_for_ms(3001.0), 91);
        assert_eq!(frame_count_for_ms(0.0), 1);
    }
}
