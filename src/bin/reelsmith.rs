use std::{
    fs::File,
    io::BufReader,
    path::{Path, PathBuf},
};

use anyhow::Context as _;
use clap::{Parser, Subcommand};

use reelsmith::{
    EffectTable, ExportConfig, PacingMode, Project, SegmentRequest, Segmenter, StudioSettings,
    VideoLibrary, VideoRecord,
    segment::ChatCompletionBackend,
};

#[derive(Parser, Debug)]
#[command(name = "reelsmith", version)]
struct Cli {
    #[command(subcommand)]
    cmd: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Export a project JSON to a video file (requires `ffmpeg` on PATH).
    Export(ExportArgs),
    /// Segment an article URL or raw text into caption-ready pieces.
    Segment(SegmentArgs),
    /// List the built-in zoom effects and their punch steps.
    Effects,
}

#[derive(Parser, Debug)]
struct ExportArgs {
    /// Input project JSON.
    #[arg(long = "in")]
    in_path: PathBuf,

    /// Output video path (extension follows the negotiated container).
    #[arg(long)]
    out: PathBuf,

    /// Caption font (TTF/OTF). Required when any slide has a caption.
    #[arg(long)]
    font: Option<PathBuf>,

    /// Studio settings JSON supplying a persistent watermark/vignette/
    /// soundtrack when the project leaves them unset.
    #[arg(long)]
    settings: Option<PathBuf>,

    /// Video library JSON to record the export into.
    #[arg(long)]
    library: Option<PathBuf>,

    /// Pace frames against the wall clock instead of rendering flat out.
    #[arg(long)]
    realtime: bool,
}

#[derive(Parser, Debug)]
struct SegmentArgs {
    #[arg(long)]
    url: Option<String>,

    #[arg(long)]
    text: Option<String>,

    /// Total playback-time budget for the produced segments.
    #[arg(long, default_value_t = 90.0)]
    max_seconds: f64,
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    match cli.cmd {
        Command::Export(args) => cmd_export(args),
        Command::Segment(args) => cmd_segment(args),
        Command::Effects => cmd_effects(),
    }
}

fn read_project_json(path: &Path) -> anyhow::Result<Project> {
    let f = File::open(path).with_context(|| format!("open project '{}'", path.display()))?;
    let r = BufReader::new(f);
    let project: Project = serde_json::from_reader(r).with_context(|| "parse project JSON")?;
    Ok(project)
}

fn cmd_export(args: ExportArgs) -> anyhow::Result<()> {
    let mut project = read_project_json(&args.in_path)?;

    // Studio settings fill whatever the project snapshot leaves unset.
    if let Some(settings_path) = &args.settings {
        let settings = StudioSettings::load(settings_path)?;
        if project.watermark.is_none()
            && let Some(source) = settings.watermark
        {
            project.watermark = Some(reelsmith::Watermark { source });
        }
        if project.vignette.is_none() {
            project.vignette = settings.vignette;
        }
        if project.audio_track.is_none() {
            project.audio_track = settings.audio_track;
        }
    }

    let mut cfg = ExportConfig::new(&args.out);
    cfg.caption_font = args.font;
    cfg.pacing = if args.realtime {
        PacingMode::Realtime
    } else {
        PacingMode::Batch
    };

    let summary = reelsmith::export_to_file(&project, &cfg)?;

    if let Some(library_path) = &args.library {
        let mut library = VideoLibrary::load(library_path)?;
        library.add(VideoRecord::new(
            project.title.clone(),
            project.slides.len(),
            summary.out_path.clone(),
            summary.codec.container_ext(),
        ));
        library.save(library_path)?;
    }

    eprintln!(
        "wrote {} ({} frames, {:.1}s)",
        summary.out_path.display(),
        summary.frames_rendered,
        summary.timeline_ms / 1000.0
    );
    Ok(())
}

fn cmd_segment(args: SegmentArgs) -> anyhow::Result<()> {
    let segmenter = match (
        std::env::var("REELSMITH_SEGMENT_ENDPOINT"),
        std::env::var("REELSMITH_SEGMENT_API_KEY"),
    ) {
        (Ok(endpoint), Ok(api_key)) => {
            let model = std::env::var("REELSMITH_SEGMENT_MODEL")
                .unwrap_or_else(|_| "llama-3.3-70b-versatile".to_string());
            Segmenter::with_backend(Box::new(ChatCompletionBackend::new(
                endpoint, api_key, model,
            )?))
        }
        _ => Segmenter::heuristic(),
    };

    let response = segmenter.run(&SegmentRequest {
        url: args.url,
        text: args.text,
        max_seconds: Some(args.max_seconds),
    })?;

    println!("{}", serde_json::to_string_pretty(&response)?);
    Ok(())
}

fn cmd_effects() -> anyhow::Result<()> {
    let table = EffectTable::builtin();
    for kind in table.kinds() {
        let spec = table.get(kind);
        let steps: Vec<String> = spec
            .steps
            .iter()
            .map(|s| format!("{}ms x{}", s.at_ms, s.scale))
            .collect();
        println!("{:<16} {}", kind.name(), steps.join(" -> "));
    }
    Ok(())
}
