//! One-call export orchestration: precondition gate, asset preparation,
//! audio assembly, codec negotiation and the scheduler run.

use std::path::PathBuf;
use std::sync::Arc;

use crate::{
    assets::ExportAssets,
    audio::{TempAudioGuard, assemble_timeline, temp_pcm_path, write_f32le_file},
    clock::{PacingMode, RealtimeClock, RenderClock, StepClock},
    config::ExportConfig,
    encode_ffmpeg::{FfmpegSink, FfmpegSinkOpts, VideoCodec, negotiate_codec, path_for_container},
    error::{PreconditionError, ReelsmithResult},
    model::Project,
    scheduler::{self, ExportStats, plan_slides, slides_total_ms},
    sink::{AudioInputConfig, FrameSink},
    surface::{CaptionFont, RasterSurface, RenderTarget, TextMeasure},
};

#[derive(Clone, Debug)]
pub struct ExportSummary {
    pub out_path: PathBuf,
    pub codec: VideoCodec,
    pub frames_rendered: u64,
    pub timeline_ms: f64,
}

/// Run an export against caller-provided surface, clock and sink.
///
/// The compositor is a pure function of the project snapshot, the config and
/// the injected clock: no ambient globals, no hidden IO beyond the prepared
/// assets handed in.
#[tracing::instrument(skip_all, fields(title = %project.title, slides = project.slides.len()))]
pub fn export_project(
    project: &Project,
    cfg: &ExportConfig,
    assets: &mut ExportAssets,
    surface: &mut dyn RenderTarget,
    clock: &mut dyn RenderClock,
    sink: &mut dyn FrameSink,
) -> ReelsmithResult<ExportStats> {
    project.validate_for_export()?;
    if project.has_any_caption() && !surface.can_render_text() {
        return Err(PreconditionError::MissingCaptionFont.into());
    }

    let measure: &dyn TextMeasure = &*surface;
    let plans = plan_slides(project, measure, cfg);
    let slides_ms = slides_total_ms(&plans);
    let vignette_ms = assets.vignette.duration_ms();

    // The assembled PCM timeline lives in a temp file for the encoder; the
    // guard removes it on success and failure alike.
    let mut audio_guard = TempAudioGuard(None);
    let audio = match assemble_timeline(
        assets.soundtrack.as_ref(),
        assets.vignette_audio.as_ref(),
        slides_ms,
        vignette_ms,
    ) {
        Some(mix) => {
            let path = temp_pcm_path();
            write_f32le_file(&mix.interleaved_f32, &path)?;
            audio_guard.0 = Some(path.clone());
            Some(AudioInputConfig {
                path,
                sample_rate: mix.sample_rate,
                channels: mix.channels,
            })
        }
        None => None,
    };

    scheduler::run(project, cfg, &plans, assets, surface, clock, sink, audio)
}

/// Full pipeline: prepare media, negotiate a codec, encode to a file via the
/// system ffmpeg, and return where the output landed.
pub fn export_to_file(project: &Project, cfg: &ExportConfig) -> ReelsmithResult<ExportSummary> {
    project.validate_for_export()?;

    let mut surface = RasterSurface::new(cfg.width, cfg.height);
    if project.has_any_caption() {
        let font_path = cfg
            .caption_font
            .as_ref()
            .ok_or(PreconditionError::MissingCaptionFont)?;
        surface = surface.with_font(Arc::new(CaptionFont::from_path(font_path)?));
    }

    let codec = negotiate_codec(&cfg.codecs)?;
    let out_path = path_for_container(&cfg.out_path, codec);

    let mut assets = ExportAssets::prepare(project)?;

    let mut clock: Box<dyn RenderClock> = match cfg.pacing {
        PacingMode::Realtime => Box::new(RealtimeClock::new()),
        PacingMode::Batch => Box::new(StepClock::new()),
    };

    let mut sink = FfmpegSink::new(FfmpegSinkOpts {
        out_path: out_path.clone(),
        overwrite: cfg.overwrite,
        bg_rgba: [0, 0, 0, 255],
        codec,
    });

    let stats = export_project(
        project,
        cfg,
        &mut assets,
        &mut surface,
        clock.as_mut(),
        &mut sink,
    )?;

    tracing::info!(
        out = %out_path.display(),
        frames = stats.frames_rendered,
        timeline_ms = stats.timeline_ms,
        "export finished"
    );

    Ok(ExportSummary {
        out_path,
        codec,
        frames_rendered: stats.frames_rendered,
        timeline_ms: stats.timeline_ms,
    })
}
