//! reelsmith: a deterministic vertical-video (9:16) slideshow compositor.
//!
//! A project of slides (images or short clips, typewriter captions,
//! punch-zoom effects) plus a soundtrack and a mandatory closing vignette is
//! rendered frame-by-frame at a fixed 30 fps and streamed into an encoder.
//! The compositor is a pure function of the project snapshot, the export
//! config and an injected clock: the same project and seed always produce
//! the same frames.
//!
//! Pipeline, per frame: motion layer (cover-fit, punch scale, drift, pan,
//! cross-fade, flash) then overlay layer (lead-in bar, typewriter caption,
//! watermark), pushed in strict order to a [`FrameSink`] — the ffmpeg sink
//! for real exports, an in-memory sink for tests and previews.

#![forbid(unsafe_code)]

pub mod assets;
pub mod audio;
pub mod clock;
pub mod config;
pub mod drift;
pub mod ease;
pub mod effect;
pub mod encode_ffmpeg;
pub mod error;
pub mod export;
pub mod layout;
pub mod library;
pub mod model;
pub mod motion;
pub mod overlay;
pub mod scheduler;
pub mod segment;
pub mod sink;
pub mod surface;
pub mod typewriter;

pub use clock::{PacingMode, RealtimeClock, RenderClock, StepClock};
pub use config::{CaptionStyle, ExportConfig, StudioSettings};
pub use ease::Ease;
pub use effect::{EffectKind, EffectSpec, EffectStep, EffectTable};
pub use error::{PreconditionError, ReelsmithError, ReelsmithResult};
pub use export::{ExportSummary, export_project, export_to_file};
pub use library::{VideoLibrary, VideoRecord};
pub use model::{AlignH, AlignV, GlobalFlags, MediaKind, Project, Slide, SlideMedia, Watermark};
pub use scheduler::{ExportPhase, ExportStats, SlidePlan};
pub use segment::{SegmentRequest, SegmentResponse, Segmenter};
pub use sink::{AudioInputConfig, FrameSink, InMemorySink, SinkConfig};
pub use surface::{CaptionFont, DrawSurface, FrameRGBA, RasterSurface, RenderTarget, TextMeasure};
pub use typewriter::Typewriter;
