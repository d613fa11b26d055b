//! Media preparation: every image, video, audio track and the vignette is
//! loaded, probed and decoded *before* the render loop starts. The scheduler
//! never begins a slide whose media is not ready, and a broken source fails
//! the export here rather than producing blank frames later.

pub mod decode;
pub mod media;

use std::sync::Arc;

use crate::{
    error::{ReelsmithError, ReelsmithResult},
    model::{MediaKind, Project},
    surface::Rgba8,
};

/// Prepared raster image in premultiplied RGBA8 form.
#[derive(Clone, Debug)]
pub struct PreparedImage {
    pub width: u32,
    pub height: u32,
    /// Premultiplied RGBA8, row-major, tightly packed.
    pub rgba8_premul: Arc<Vec<u8>>,
}

impl PreparedImage {
    /// Build from straight-alpha RGBA8 bytes (premultiplies internally).
    pub fn from_rgba8(width: u32, height: u32, mut rgba: Vec<u8>) -> ReelsmithResult<Self> {
        if rgba.len() != (width as usize) * (height as usize) * 4 {
            return Err(ReelsmithError::media(
                "image byte length does not match width*height*4",
            ));
        }
        decode::premultiply_rgba8_in_place(&mut rgba);
        Ok(Self {
            width,
            height,
            rgba8_premul: Arc::new(rgba),
        })
    }

    pub fn pixel(&self, x: u32, y: u32) -> Rgba8 {
        let x = x.min(self.width.saturating_sub(1));
        let y = y.min(self.height.saturating_sub(1));
        let off = ((y as usize * self.width as usize) + x as usize) * 4;
        [
            self.rgba8_premul[off],
            self.rgba8_premul[off + 1],
            self.rgba8_premul[off + 2],
            self.rgba8_premul[off + 3],
        ]
    }

    pub fn aspect(&self) -> f64 {
        f64::from(self.width) / f64::from(self.height.max(1))
    }
}

/// A slide's prepared media: a still image, or a seekable video stream.
pub enum PreparedMedia {
    Image(PreparedImage),
    Video(PreparedVideoStream),
}

impl PreparedMedia {
    pub fn dimensions(&self) -> (u32, u32) {
        match self {
            Self::Image(img) => (img.width, img.height),
            Self::Video(v) => (v.info.width, v.info.height),
        }
    }

    /// Frame for the given slide-local time. Images are time-invariant;
    /// videos are decoded at an explicitly seeked position so playback stays
    /// frame-exact with the render clock.
    pub fn frame_at(&mut self, source_sec: f64) -> ReelsmithResult<&PreparedImage> {
        match self {
            Self::Image(img) => Ok(img),
            Self::Video(v) => v.frame_at(source_sec),
        }
    }
}

/// Video source with a small decoded read-ahead window. Every lookup seeks by
/// timestamp; the window only avoids re-spawning the decoder for consecutive
/// frames that land in the same batch.
pub struct PreparedVideoStream {
    pub info: media::VideoSourceInfo,
    batch_start_sec: f64,
    batch: Vec<PreparedImage>,
    /// Preloaded streams (tests, previews) never hit the decoder again.
    sealed: bool,
}

const READ_AHEAD_FRAMES: u32 = 8;

impl PreparedVideoStream {
    pub fn open(info: media::VideoSourceInfo) -> Self {
        Self {
            info,
            batch_start_sec: 0.0,
            batch: Vec::new(),
            sealed: false,
        }
    }

    /// Build a stream from frames already decoded elsewhere. Lookups clamp to
    /// the provided frames; the decoder is never invoked.
    pub fn preloaded(info: media::VideoSourceInfo, frames: Vec<PreparedImage>) -> Self {
        Self {
            info,
            batch_start_sec: 0.0,
            batch: frames,
            sealed: true,
        }
    }

    pub fn duration_ms(&self) -> f64 {
        self.info.duration_sec * 1000.0
    }

    pub fn frame_at(&mut self, source_sec: f64) -> ReelsmithResult<&PreparedImage> {
        let fps = self.info.source_fps();
        if fps <= 0.0 {
            return Err(ReelsmithError::media(format!(
                "video '{}' has an invalid frame rate",
                self.info.source_path.display()
            )));
        }

        let max_sec = (self.info.duration_sec - 1.0 / fps).max(0.0);
        let sec = source_sec.clamp(0.0, max_sec);

        if let Some(idx) = self.batch_index(sec, fps) {
            return Ok(&self.batch[idx]);
        }

        if self.sealed {
            // Clamp to the final preloaded frame rather than decoding.
            return self
                .batch
                .last()
                .ok_or_else(|| ReelsmithError::media("preloaded video stream has no frames"));
        }

        let raw = media::decode_video_frames_rgba8(&self.info, sec, READ_AHEAD_FRAMES)?;
        if raw.is_empty() {
            return Err(ReelsmithError::media(format!(
                "video '{}' produced no frames at {sec:.3}s",
                self.info.source_path.display()
            )));
        }

        self.batch = raw
            .into_iter()
            .map(|data| {
                // Decoded video frames are opaque; premultiplied == straight.
                PreparedImage {
                    width: self.info.width,
                    height: self.info.height,
                    rgba8_premul: Arc::new(data),
                }
            })
            .collect();
        self.batch_start_sec = sec;

        Ok(&self.batch[0])
    }

    fn batch_index(&self, sec: f64, fps: f64) -> Option<usize> {
        if self.batch.is_empty() {
            return None;
        }
        let rel = sec - self.batch_start_sec;
        if rel < 0.0 {
            return None;
        }
        // Nudge past float error so exact frame times quantize to the frame
        // they name instead of the one before it.
        let idx = (rel * fps + 1e-6).floor() as usize;
        if self.sealed {
            // Preloaded streams serve their final frame past the end.
            Some(idx.min(self.batch.len() - 1))
        } else {
            (idx < self.batch.len()).then_some(idx)
        }
    }
}

/// Everything an export needs, fully loaded. Construction is the only
/// suspension point for media IO.
pub struct ExportAssets {
    pub slides: Vec<PreparedMedia>,
    pub watermark: Option<PreparedImage>,
    pub vignette: PreparedVideoStream,
    pub soundtrack: Option<media::AudioPcm>,
    pub vignette_audio: Option<media::AudioPcm>,
}

impl ExportAssets {
    /// Load and decode every asset the project references. Requires `ffmpeg`
    /// and `ffprobe` on PATH when the project uses video or audio.
    pub fn prepare(project: &Project) -> ReelsmithResult<Self> {
        let mut slides = Vec::with_capacity(project.slides.len());
        for (index, slide) in project.slides.iter().enumerate() {
            let media_ref = slide.media.as_ref().ok_or_else(|| {
                ReelsmithError::media(format!("slide {index} has no media source"))
            })?;
            let prepared = match media_ref.kind {
                MediaKind::Image => PreparedMedia::Image(decode::load_image(&media_ref.source)?),
                MediaKind::Video => {
                    let info = media::probe_video(&media_ref.source)?;
                    PreparedMedia::Video(PreparedVideoStream::open(info))
                }
            };
            slides.push(prepared);
        }

        let watermark = match &project.watermark {
            Some(wm) => Some(decode::load_image(&wm.source)?),
            None => None,
        };

        let vignette_path = project
            .vignette
            .as_ref()
            .ok_or_else(|| ReelsmithError::media("project has no vignette set"))?;
        let vignette_info = media::probe_video(vignette_path)?;
        if vignette_info.duration_sec <= 0.0 {
            return Err(ReelsmithError::media(format!(
                "vignette '{}' reports zero duration",
                vignette_path.display()
            )));
        }
        let vignette_audio = if vignette_info.has_audio {
            let pcm = media::decode_audio_f32_stereo(vignette_path, media::MIX_SAMPLE_RATE)?;
            (!pcm.interleaved_f32.is_empty()).then_some(pcm)
        } else {
            None
        };
        let vignette = PreparedVideoStream::open(vignette_info);

        let soundtrack = match &project.audio_track {
            Some(path) => {
                let pcm = media::decode_audio_f32_stereo(path, media::MIX_SAMPLE_RATE)?;
                if pcm.interleaved_f32.is_empty() {
                    return Err(ReelsmithError::media(format!(
                        "audio track '{}' contains no audio samples",
                        path.display()
                    )));
                }
                Some(pcm)
            }
            None => None,
        };

        Ok(Self {
            slides,
            watermark,
            vignette,
            soundtrack,
            vignette_audio,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    fn solid(width: u32, height: u32, color: Rgba8) -> PreparedImage {
        let mut data = Vec::with_capacity((width * height * 4) as usize);
        for _ in 0..(width * height) {
            data.extend_from_slice(&color);
        }
        PreparedImage::from_rgba8(width, height, data).unwrap()
    }

    fn stream_info(frames: u32, fps: u32) -> media::VideoSourceInfo {
        media::VideoSourceInfo {
            source_path: PathBuf::from("memory.mp4"),
            width: 2,
            height: 2,
            fps_num: fps,
            fps_den: 1,
            duration_sec: f64::from(frames) / f64::from(fps),
            has_audio: false,
        }
    }

    #[test]
    fn from_rgba8_rejects_bad_length() {
        assert!(PreparedImage::from_rgba8(2, 2, vec![0u8; 3]).is_err());
    }

    #[test]
    fn preloaded_stream_indexes_by_source_fps() {
        let frames = vec![
            solid(2, 2, [255, 0, 0, 255]),
            solid(2, 2, [0, 255, 0, 255]),
            solid(2, 2, [0, 0, 255, 255]),
        ];
        let mut stream = PreparedVideoStream::preloaded(stream_info(3, 30), frames);

        assert_eq!(stream.frame_at(0.0).unwrap().pixel(0, 0), [255, 0, 0, 255]);
        assert_eq!(
            stream.frame_at(1.5 / 30.0).unwrap().pixel(0, 0),
            [0, 255, 0, 255]
        );
        // Past the end: clamped to the last frame, never decoded.
        assert_eq!(
            stream.frame_at(10.0).unwrap().pixel(0, 0),
            [0, 0, 255, 255]
        );
    }

    #[test]
    fn preloaded_stream_without_frames_errors() {
        let mut stream = PreparedVideoStream::preloaded(stream_info(1, 30), Vec::new());
        assert!(stream.frame_at(0.0).is_err());
    }

    #[test]
    fn frame_at_rejects_invalid_fps() {
        let mut info = stream_info(3, 30);
        info.fps_num = 0;
        let mut stream = PreparedVideoStream::preloaded(info, vec![solid(2, 2, [1, 2, 3, 255])]);
        assert!(stream.frame_at(0.0).is_err());
    }

    #[test]
    fn pixel_lookup_clamps_at_edges() {
        let img = solid(2, 2, [9, 9, 9, 255]);
        assert_eq!(img.pixel(99, 99), [9, 9, 9, 255]);
    }
}
