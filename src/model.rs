use std::path::PathBuf;

use crate::{
    config::{MAX_CAPTION_CHARS, MAX_SLIDE_DURATION_SEC, MIN_SLIDE_DURATION_SEC},
    effect::EffectKind,
    error::{PreconditionError, ReelsmithResult},
};

/// A frozen project snapshot. The editor mutates this; the compositor only
/// reads it at export time.
#[derive(Clone, Debug, serde::Serialize, serde::Deserialize)]
pub struct Project {
    pub title: String,
    /// Playback order is the vector order.
    pub slides: Vec<Slide>,
    pub watermark: Option<Watermark>,
    /// Mandatory closing video clip, checked at export.
    pub vignette: Option<PathBuf>,
    pub audio_track: Option<PathBuf>,
    #[serde(default)]
    pub flags: GlobalFlags,
    /// Global determinism seed: resolves RANDOM effects and drift phases.
    #[serde(default)]
    pub seed: u64,
}

#[derive(Clone, Debug, serde::Serialize, serde::Deserialize)]
pub struct Watermark {
    pub source: PathBuf,
}

#[derive(Clone, Copy, Debug, Default, serde::Serialize, serde::Deserialize)]
pub struct GlobalFlags {
    #[serde(default)]
    pub flash_on_cut: bool,
    #[serde(default)]
    pub cross_fade: bool,
    /// Render the first slide's caption on every slide.
    #[serde(default)]
    pub continuous_caption: bool,
}

#[derive(Clone, Debug, serde::Serialize, serde::Deserialize)]
pub struct Slide {
    pub id: String,
    pub media: Option<SlideMedia>,
    #[serde(default)]
    pub caption: String,
    #[serde(default)]
    pub effect: EffectKind,
    pub requested_duration_sec: f64,
    #[serde(default)]
    pub align_h: AlignH,
    #[serde(default)]
    pub align_v: AlignV,
}

#[derive(Clone, Debug, serde::Serialize, serde::Deserialize)]
pub struct SlideMedia {
    pub kind: MediaKind,
    pub source: PathBuf,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MediaKind {
    Image,
    Video,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AlignH {
    Left,
    #[default]
    Center,
    Right,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AlignV {
    Top,
    #[default]
    Center,
    Bottom,
}

impl Slide {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            media: None,
            caption: String::new(),
            effect: EffectKind::default(),
            requested_duration_sec: 5.0,
            align_h: AlignH::Center,
            align_v: AlignV::Center,
        }
    }
}

impl Project {
    pub fn new(title: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            slides: Vec::new(),
            watermark: None,
            vignette: None,
            audio_track: None,
            flags: GlobalFlags::default(),
            seed: 0,
        }
    }

    /// The caption a slide actually renders, honoring `continuous_caption`.
    pub fn caption_for(&self, slide_index: usize) -> &str {
        if self.flags.continuous_caption {
            self.slides.first().map(|s| s.caption.as_str()).unwrap_or("")
        } else {
            self.slides
                .get(slide_index)
                .map(|s| s.caption.as_str())
                .unwrap_or("")
        }
    }

    pub fn has_any_caption(&self) -> bool {
        (0..self.slides.len()).any(|i| !self.caption_for(i).trim().is_empty())
    }

    /// Export precondition gate. Runs before any media is touched and before
    /// any frame is rendered; each failure mode is a distinct error.
    pub fn validate_for_export(&self) -> ReelsmithResult<()> {
        if self.title.trim().is_empty() {
            return Err(PreconditionError::EmptyTitle.into());
        }
        if self.slides.is_empty() {
            return Err(PreconditionError::NoSlides.into());
        }
        for (index, slide) in self.slides.iter().enumerate() {
            if slide.media.is_none() {
                return Err(PreconditionError::SlideMissingMedia {
                    index,
                    id: slide.id.clone(),
                }
                .into());
            }
            if slide.caption.chars().count() > MAX_CAPTION_CHARS {
                return Err(PreconditionError::CaptionTooLong {
                    index,
                    max: MAX_CAPTION_CHARS,
                }
                .into());
            }
            if slide.requested_duration_sec < MIN_SLIDE_DURATION_SEC
                || slide.requested_duration_sec > MAX_SLIDE_DURATION_SEC
            {
                return Err(PreconditionError::DurationOutOfRange {
                    index,
                    min: MIN_SLIDE_DURATION_SEC as u32,
                    max: MAX_SLIDE_DURATION_SEC as u32,
                }
                .into());
            }
        }
        if self.vignette.is_none() {
            return Err(PreconditionError::MissingVignette.into());
        }
        Ok(())
    }
}
