use std::path::{Path, PathBuf};

use anyhow::Context as _;

use crate::{
    clock::PacingMode,
    encode_ffmpeg::VideoCodec,
    error::ReelsmithResult,
};

/// Output canvas is fixed vertical 9:16.
pub const CANVAS_WIDTH: u32 = 1080;
pub const CANVAS_HEIGHT: u32 = 1920;

pub const FRAME_RATE: u32 = 30;
pub const FRAME_INTERVAL_MS: f64 = 1000.0 / FRAME_RATE as f64;

/// Caption animation constants. The segmenter's playback estimates are derived
/// from these same values; keep them in sync or segment budgets drift away
/// from real reveal timing.
pub const LEAD_IN_MS: u64 = 900;
pub const CHAR_REVEAL_MS: u64 = 35;
pub const HOLD_MS: u64 = 600;
pub const MIN_REVEAL_MS: u64 = 800;

pub const MAX_CAPTION_CHARS: usize = 140;
pub const MIN_SLIDE_DURATION_SEC: f64 = 1.0;
pub const MAX_SLIDE_DURATION_SEC: f64 = 60.0;

pub const WATERMARK_OPACITY: f32 = 0.3;
pub const WATERMARK_TARGET_WIDTH: f64 = 220.0;
pub const WATERMARK_MARGIN: f64 = 28.0;

/// Number of leading frames over which the previous slide cross-fades out.
pub const CROSS_FADE_FRAMES: u64 = 15;
/// Number of leading frames over which the entry flash decays.
pub const FLASH_FRAMES: u64 = 5;

/// Everything the caption overlay needs to lay itself out. One instance per
/// export; the defaults reproduce the house style.
#[derive(Clone, Debug, serde::Serialize, serde::Deserialize)]
pub struct CaptionStyle {
    pub font_px: f32,
    /// Horizontal safe margin on each side of the canvas.
    pub safe_margin: f64,
    /// Horizontal padding inside each caption block.
    pub pad_x: f64,
    /// Vertical padding inside each caption block.
    pub pad_y: f64,
    pub line_height: f64,
    /// Distance from the canvas bottom to the bottom of the caption stack.
    pub bottom_offset: f64,
    /// Caption stack never starts above this inset, however many lines.
    pub min_top_inset: f64,
    pub text_color: [u8; 4],
    pub block_color: [u8; 4],
    pub bar_left: f64,
    pub bar_width: f64,
    pub bar_height: f64,
    pub bar_color: [u8; 4],
}

impl Default for CaptionStyle {
    fn default() -> Self {
        Self {
            font_px: 48.0,
            safe_margin: 40.0,
            pad_x: 20.0,
            pad_y: 12.0,
            line_height: 60.0,
            bottom_offset: 470.0,
            min_top_inset: 120.0,
            text_color: [255, 255, 255, 255],
            block_color: [0xcb, 0x40, 0x3a, 255],
            bar_left: 20.0,
            bar_width: 100.0,
            bar_height: 15.0,
            bar_color: [0xee, 0xbe, 0x32, 255],
        }
    }
}

impl CaptionStyle {
    /// Maximum rendered line width: canvas minus safe margins minus the block
    /// padding on both sides.
    pub fn max_line_width(&self, canvas_width: u32) -> f64 {
        f64::from(canvas_width) - 2.0 * self.safe_margin - 2.0 * self.pad_x
    }

    pub fn block_height(&self) -> f64 {
        f64::from(self.font_px) + 2.0 * self.pad_y
    }
}

/// Explicit export configuration. The compositor reads only this and the
/// project snapshot; there is no ambient global state.
#[derive(Clone, Debug)]
pub struct ExportConfig {
    pub width: u32,
    pub height: u32,
    pub fps: u32,
    pub out_path: PathBuf,
    pub overwrite: bool,
    /// Codec candidates tried in order against the local ffmpeg build.
    pub codecs: Vec<VideoCodec>,
    pub pacing: PacingMode,
    /// TTF/OTF font used for caption measurement and fill. Required whenever
    /// any slide carries a non-empty caption.
    pub caption_font: Option<PathBuf>,
    pub caption_style: CaptionStyle,
}

impl ExportConfig {
    pub fn new(out_path: impl Into<PathBuf>) -> Self {
        Self {
            width: CANVAS_WIDTH,
            height: CANVAS_HEIGHT,
            fps: FRAME_RATE,
            out_path: out_path.into(),
            overwrite: true,
            codecs: VideoCodec::default_candidates(),
            pacing: PacingMode::Batch,
            caption_font: None,
            caption_style: CaptionStyle::default(),
        }
    }
}

/// Operator-persistent studio settings (watermark, vignette, soundtrack).
///
/// Loaded and saved by the caller and folded into a [`Project`] snapshot
/// before export; the compositor never touches this file itself.
///
/// [`Project`]: crate::model::Project
#[derive(Clone, Debug, Default, serde::Serialize, serde::Deserialize)]
pub struct StudioSettings {
    pub watermark: Option<PathBuf>,
    pub vignette: Option<PathBuf>,
    pub audio_track: Option<PathBuf>,
}

impl StudioSettings {
    pub fn load(path: &Path) -> ReelsmithResult<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let bytes = std::fs::read(path)
            .with_context(|| format!("read studio settings '{}'", path.display()))?;
        let settings = serde_json::from_slice(&bytes)
            .with_context(|| format!("parse studio settings '{}'", path.display()))?;
        Ok(settings)
    }

    pub fn save(&self, path: &Path) -> ReelsmithResult<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("create settings dir '{}'", parent.display()))?;
        }
        let json = serde_json::to_vec_pretty(self).context("serialize studio settings")?;
        std::fs::write(path, json)
            .with_context(|| format!("write studio settings '{}'", path.display()))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn max_line_width_subtracts_margins_and_padding() {
        let style = CaptionStyle::default();
        assert_eq!(style.max_line_width(CANVAS_WIDTH), 1080.0 - 80.0 - 40.0);
    }

    #[test]
    fn settings_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.json");

        let settings = StudioSettings {
            watermark: Some(PathBuf::from("logo.png")),
            vignette: Some(PathBuf::from("closer.mp4")),
            audio_track: None,
        };
        settings.save(&path).unwrap();

        let loaded = StudioSettings::load(&path).unwrap();
        assert_eq!(loaded.watermark.as_deref(), Some(Path::new("logo.png")));
        assert_eq!(loaded.vignette.as_deref(), Some(Path::new("closer.mp4")));
        assert!(loaded.audio_track.is_none());
    }

    #[test]
    fn missing_settings_file_loads_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let loaded = StudioSettings::load(&dir.path().join("nope.json")).unwrap();
        assert!(loaded.watermark.is_none());
        assert!(loaded.vignette.is_none());
    }
}
