//! Audio timeline assembly.
//!
//! The export carries at most one audio source at a time: the soundtrack
//! plays under the slides, then hands off to the vignette's own audio with an
//! abrupt cut at vignette start. Both are decoded to 48 kHz stereo f32 up
//! front and written into a single PCM timeline, so the two sources can never
//! be mixed simultaneously.

use std::path::{Path, PathBuf};

use anyhow::Context as _;

use crate::{assets::media::AudioPcm, error::ReelsmithResult};

/// Soundtrack gain under the slides, so it never overpowers the vignette.
pub const SOUNDTRACK_GAIN: f32 = 0.7;

#[derive(Clone, Debug)]
pub struct AssembledAudio {
    pub sample_rate: u32,
    pub channels: u16,
    pub interleaved_f32: Vec<f32>,
}

/// Build the export's PCM timeline. Returns `None` when there is no audio at
/// all (the sink then encodes video-only).
pub fn assemble_timeline(
    soundtrack: Option<&AudioPcm>,
    vignette_audio: Option<&AudioPcm>,
    slides_ms: f64,
    vignette_ms: f64,
) -> Option<AssembledAudio> {
    if soundtrack.is_none() && vignette_audio.is_none() {
        return None;
    }

    let sample_rate = soundtrack
        .or(vignette_audio)
        .map(|pcm| pcm.sample_rate)
        .unwrap_or(crate::assets::media::MIX_SAMPLE_RATE);
    let channels: u16 = 2;

    let slide_frames = ms_to_frames(slides_ms, sample_rate);
    let vignette_frames = ms_to_frames(vignette_ms, sample_rate);
    let total_frames = slide_frames + vignette_frames;

    let mut out = vec![0.0f32; total_frames * usize::from(channels)];

    if let Some(track) = soundtrack {
        // The soundtrack fills the slide span only; a shorter track leaves
        // trailing silence (it is never looped).
        let copy_frames = slide_frames.min(track.frame_count());
        copy_frames_scaled(&mut out, 0, track, copy_frames, SOUNDTRACK_GAIN);
    }

    if let Some(tail) = vignette_audio {
        let copy_frames = vignette_frames.min(tail.frame_count());
        copy_frames_scaled(&mut out, slide_frames, tail, copy_frames, 1.0);
    }

    Some(AssembledAudio {
        sample_rate,
        channels,
        interleaved_f32: out,
    })
}

fn copy_frames_scaled(
    out: &mut [f32],
    dst_frame_offset: usize,
    src: &AudioPcm,
    frames: usize,
    gain: f32,
) {
    let ch = usize::from(src.channels.max(1));
    for frame in 0..frames {
        for c in 0..2usize {
            // Mono sources duplicate their single channel.
            let src_idx = frame * ch + c.min(ch - 1);
            let dst_idx = (dst_frame_offset + frame) * 2 + c;
            out[dst_idx] = src.interleaved_f32[src_idx] * gain;
        }
    }
}

fn ms_to_frames(ms: f64, sample_rate: u32) -> usize {
    ((ms / 1000.0) * f64::from(sample_rate)).round().max(0.0) as usize
}

pub fn write_f32le_file(samples: &[f32], path: &Path) -> ReelsmithResult<()> {
    let mut bytes = Vec::with_capacity(samples.len() * 4);
    for s in samples {
        bytes.extend_from_slice(&s.to_le_bytes());
    }
    std::fs::write(path, bytes)
        .with_context(|| format!("write pcm timeline '{}'", path.display()))?;
    Ok(())
}

/// Unique temp path for the assembled PCM timeline.
pub fn temp_pcm_path() -> PathBuf {
    std::env::temp_dir().join(format!(
        "reelsmith_audio_{}_{}.f32le",
        std::process::id(),
        std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .map(|d| d.as_nanos())
            .unwrap_or(0)
    ))
}

/// Removes the temp PCM file on drop, on success and failure alike.
pub struct TempAudioGuard(pub Option<PathBuf>);

impl Drop for TempAudioGuard {
    fn drop(&mut self) {
        if let Some(path) = self.0.take() {
            let _ = std::fs::remove_file(path);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pcm(frames: usize, value: f32) -> AudioPcm {
        AudioPcm {
            sample_rate: 48_000,
            channels: 2,
            interleaved_f32: vec![value; frames * 2],
        }
    }

    #[test]
    fn no_sources_means_no_timeline() {
        assert!(assemble_timeline(None, None, 1000.0, 500.0).is_none());
    }

    #[test]
    fn soundtrack_fills_slide_span_at_gain() {
        let track = pcm(96_000, 1.0); // 2s of full-scale audio
        let out = assemble_timeline(Some(&track), None, 1000.0, 0.0).unwrap();
        assert_eq!(out.interleaved_f32.len(), 48_000 * 2);
        assert!((out.interleaved_f32[0] - SOUNDTRACK_GAIN).abs() < 1e-6);
        assert!((out.interleaved_f32[out.interleaved_f32.len() - 1] - SOUNDTRACK_GAIN).abs() < 1e-6);
    }

    #[test]
    fn short_soundtrack_leaves_silence_not_loop() {
        let track = pcm(4_800, 1.0); // 100ms
        let out = assemble_timeline(Some(&track), None, 1000.0, 0.0).unwrap();
        // First 100ms carries audio, the rest is silence.
        assert!(out.interleaved_f32[0] != 0.0);
        assert_eq!(out.interleaved_f32[4_800 * 2], 0.0);
        assert_eq!(out.interleaved_f32[out.interleaved_f32.len() - 1], 0.0);
    }

    #[test]
    fn vignette_audio_starts_exactly_at_handoff() {
        let track = pcm(480_000, 0.5);
        let tail = pcm(48_000, -0.25);
        let out = assemble_timeline(Some(&track), Some(&tail), 1000.0, 500.0).unwrap();

        let handoff_frame = 48_000usize; // 1000ms at 48kHz
        // Just before the cut: soundtrack at gain.
        let before = out.interleaved_f32[(handoff_frame - 1) * 2];
        assert!((before - 0.5 * SOUNDTRACK_GAIN).abs() < 1e-6);
        // At the cut: vignette audio at unity gain; no blending.
        let after = out.interleaved_f32[handoff_frame * 2];
        assert!((after - (-0.25)).abs() < 1e-6);
    }

    #[test]
    fn vignette_only_audio_is_silent_under_slides() {
        let tail = pcm(24_000, 0.8);
        let out = assemble_timeline(None, Some(&tail), 2000.0, 500.0).unwrap();
        assert_eq!(out.interleaved_f32[0], 0.0);
        let handoff = ms_to_frames(2000.0, 48_000) * 2;
        assert!((out.interleaved_f32[handoff] - 0.8).abs() < 1e-6);
    }

    #[test]
    fn f32le_roundtrip_bytes() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("mix.f32le");
        write_f32le_file(&[0.5f32, -1.0], &path).unwrap();
        let bytes = std::fs::read(&path).unwrap();
        assert_eq!(bytes.len(), 8);
        assert_eq!(f32::from_le_bytes(bytes[0..4].try_into().unwrap()), 0.5);
    }

    #[test]
    fn temp_guard_removes_file() {
        let path = temp_pcm_path();
        std::fs::write(&path, b"x").unwrap();
        drop(TempAudioGuard(Some(path.clone())));
        assert!(!path.exists());
    }
}
