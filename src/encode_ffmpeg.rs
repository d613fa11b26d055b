//! Streaming encoder sink backed by the system `ffmpeg` binary.
//!
//! Raw premultiplied RGBA frames are flattened and piped to ffmpeg's stdin;
//! audio (when present) arrives as a second f32le input. The codec is
//! negotiated up front against the encoders the local ffmpeg build actually
//! ships, walking an ordered candidate list.

use std::io::Read;
use std::path::{Path, PathBuf};
use std::process::{Child, ChildStdin, Command, Stdio};

use anyhow::Context as _;

use crate::{
    error::{ReelsmithError, ReelsmithResult},
    sink::{FrameSink, SinkConfig},
    surface::FrameRGBA,
};

/// Candidate codecs in preference order: broadest compatibility first.
#[derive(Clone, Copy, Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VideoCodec {
    H264,
    Vp9,
    Vp8,
}

impl VideoCodec {
    pub fn default_candidates() -> Vec<VideoCodec> {
        vec![VideoCodec::H264, VideoCodec::Vp9, VideoCodec::Vp8]
    }

    pub fn encoder_name(self) -> &'static str {
        match self {
            Self::H264 => "libx264",
            Self::Vp9 => "libvpx-vp9",
            Self::Vp8 => "libvpx",
        }
    }

    /// Container extension for the output file.
    pub fn container_ext(self) -> &'static str {
        match self {
            Self::H264 => "mp4",
            Self::Vp9 | Self::Vp8 => "webm",
        }
    }

    fn audio_encoder_name(self) -> &'static str {
        match self {
            Self::H264 => "aac",
            Self::Vp9 | Self::Vp8 => "libopus",
        }
    }
}

impl std::fmt::Display for VideoCodec {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.encoder_name())
    }
}

pub fn is_ffmpeg_on_path() -> bool {
    Command::new("ffmpeg")
        .arg("-version")
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .status()
        .map(|s| s.success())
        .unwrap_or(false)
}

/// First candidate the local ffmpeg build can encode; fatal when none is
/// supported.
pub fn negotiate_codec(candidates: &[VideoCodec]) -> ReelsmithResult<VideoCodec> {
    if candidates.is_empty() {
        return Err(ReelsmithError::encode("no codec candidates configured"));
    }

    let out = Command::new("ffmpeg")
        .args(["-hide_banner", "-encoders"])
        .output()
        .map_err(|e| {
            ReelsmithError::encode(format!(
                "failed to run ffmpeg (is it installed and on PATH?): {e}"
            ))
        })?;
    let listing = String::from_utf8_lossy(&out.stdout);

    match pick_codec(candidates, &listing) {
        Some(codec) => {
            tracing::debug!(codec = %codec, "negotiated video codec");
            Ok(codec)
        }
        None => Err(ReelsmithError::encode(format!(
            "none of the candidate encoders are available: {}",
            candidates
                .iter()
                .map(|c| c.encoder_name())
                .collect::<Vec<_>>()
                .join(", ")
        ))),
    }
}

fn pick_codec(candidates: &[VideoCodec], encoder_listing: &str) -> Option<VideoCodec> {
    candidates
        .iter()
        .copied()
        .find(|c| {
            encoder_listing
                .lines()
                .any(|line| line.split_whitespace().nth(1) == Some(c.encoder_name()))
        })
}

/// Swap the output extension to match the negotiated container.
pub fn path_for_container(path: &Path, codec: VideoCodec) -> PathBuf {
    let mut out = path.to_path_buf();
    out.set_extension(codec.container_ext());
    out
}

pub fn ensure_parent_dir(path: &Path) -> ReelsmithResult<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("failed to create output directory '{}'", parent.display()))?;
    }
    Ok(())
}

#[derive(Clone, Debug)]
pub struct FfmpegSinkOpts {
    pub out_path: PathBuf,
    pub overwrite: bool,
    /// Background color used when flattening alpha (straight RGBA8).
    pub bg_rgba: [u8; 4],
    pub codec: VideoCodec,
}

impl FfmpegSinkOpts {
    pub fn new(out_path: impl Into<PathBuf>, codec: VideoCodec) -> Self {
        Self {
            out_path: out_path.into(),
            overwrite: true,
            bg_rgba: [0, 0, 0, 255],
            codec,
        }
    }
}

/// Sink that spawns `ffmpeg` and streams raw frames to its stdin.
pub struct FfmpegSink {
    opts: FfmpegSinkOpts,

    child: Option<Child>,
    stdin: Option<ChildStdin>,
    stderr_drain: Option<std::thread::JoinHandle<std::io::Result<Vec<u8>>>>,

    scratch: Vec<u8>,
    cfg: Option<SinkConfig>,
    last_index: Option<u64>,
}

impl FfmpegSink {
    pub fn new(opts: FfmpegSinkOpts) -> Self {
        Self {
            opts,
            child: None,
            stdin: None,
            stderr_drain: None,
            scratch: Vec::new(),
            cfg: None,
            last_index: None,
        }
    }
}

impl FrameSink for FfmpegSink {
    fn begin(&mut self, cfg: SinkConfig) -> ReelsmithResult<()> {
        if cfg.fps == 0 {
            return Err(ReelsmithError::validation("sink fps must be non-zero"));
        }
        if cfg.width == 0 || cfg.height == 0 {
            return Err(ReelsmithError::validation(
                "sink width/height must be non-zero",
            ));
        }
        if !cfg.width.is_multiple_of(2) || !cfg.height.is_multiple_of(2) {
            return Err(ReelsmithError::validation(
                "sink width/height must be even (required for yuv420p output)",
            ));
        }

        ensure_parent_dir(&self.opts.out_path)?;
        if !self.opts.overwrite && self.opts.out_path.exists() {
            return Err(ReelsmithError::validation(format!(
                "output file '{}' already exists",
                self.opts.out_path.display()
            )));
        }

        if !is_ffmpeg_on_path() {
            return Err(ReelsmithError::encode(
                "ffmpeg is required for encoding, but was not found on PATH",
            ));
        }

        let mut cmd = Command::new("ffmpeg");
        cmd.stdin(Stdio::piped())
            .stdout(Stdio::null())
            .stderr(Stdio::piped());

        if self.opts.overwrite {
            cmd.arg("-y");
        } else {
            cmd.arg("-n");
        }

        // Input 0: raw RGBA frames on stdin (alpha flattened in push_frame).
        cmd.args([
            "-loglevel",
            "error",
            "-f",
            "rawvideo",
            "-pix_fmt",
            "rgba",
            "-s",
            &format!("{}x{}", cfg.width, cfg.height),
            "-r",
            &cfg.fps.to_string(),
            "-i",
            "pipe:0",
        ]);

        // Input 1: the assembled audio timeline, when the export has one.
        if let Some(audio) = cfg.audio.as_ref() {
            if audio.sample_rate == 0 || audio.channels == 0 {
                return Err(ReelsmithError::validation(
                    "audio sample_rate/channels must be non-zero when audio is enabled",
                ));
            }
            cmd.args([
                "-f",
                "f32le",
                "-ar",
                &audio.sample_rate.to_string(),
                "-ac",
                &audio.channels.to_string(),
                "-i",
            ])
            .arg(&audio.path);
        }

        cmd.args(["-c:v", self.opts.codec.encoder_name(), "-pix_fmt", "yuv420p"]);
        match self.opts.codec {
            VideoCodec::H264 => {
                cmd.args(["-movflags", "+faststart"]);
            }
            VideoCodec::Vp9 | VideoCodec::Vp8 => {
                // libvpx defaults to a very low bitrate; pin a sane one.
                cmd.args(["-b:v", "10M"]);
            }
        }
        if cfg.audio.is_some() {
            cmd.args(["-c:a", self.opts.codec.audio_encoder_name(), "-shortest"]);
        } else {
            cmd.arg("-an");
        }
        cmd.arg(&self.opts.out_path);

        let mut child = cmd.spawn().map_err(|e| {
            ReelsmithError::encode(format!(
                "failed to spawn ffmpeg (is it installed and on PATH?): {e}"
            ))
        })?;

        let stdin = child
            .stdin
            .take()
            .ok_or_else(|| ReelsmithError::encode("failed to open ffmpeg stdin (unexpected)"))?;
        let mut stderr = child
            .stderr
            .take()
            .ok_or_else(|| ReelsmithError::encode("failed to open ffmpeg stderr (unexpected)"))?;
        let stderr_drain = std::thread::spawn(move || {
            let mut bytes = Vec::new();
            stderr.read_to_end(&mut bytes)?;
            Ok(bytes)
        });

        self.scratch = vec![0u8; (cfg.width * cfg.height * 4) as usize];
        self.child = Some(child);
        self.stdin = Some(stdin);
        self.stderr_drain = Some(stderr_drain);
        self.cfg = Some(cfg);
        self.last_index = None;
        Ok(())
    }

    fn push_frame(&mut self, index: u64, frame: &FrameRGBA) -> ReelsmithResult<()> {
        let cfg = self
            .cfg
            .as_ref()
            .ok_or_else(|| ReelsmithError::encode("ffmpeg sink not started"))?;
        if let Some(last) = self.last_index
            && index <= last
        {
            return Err(ReelsmithError::encode(
                "ffmpeg sink received out-of-order frame index",
            ));
        }
        self.last_index = Some(index);

        if frame.width != cfg.width || frame.height != cfg.height {
            return Err(ReelsmithError::validation(format!(
                "frame size mismatch: got {}x{}, expected {}x{}",
                frame.width, frame.height, cfg.width, cfg.height
            )));
        }
        if frame.data.len() != self.scratch.len() {
            return Err(ReelsmithError::validation(
                "frame.data size mismatch with width*height*4",
            ));
        }

        flatten_premul_over_bg(&mut self.scratch, &frame.data, self.opts.bg_rgba)?;

        let Some(stdin) = self.stdin.as_mut() else {
            return Err(ReelsmithError::encode("ffmpeg sink is already finalized"));
        };

        use std::io::Write as _;
        stdin.write_all(&self.scratch).map_err(|e| {
            ReelsmithError::encode(format!("failed to write frame to ffmpeg stdin: {e}"))
        })?;
        Ok(())
    }

    fn end(&mut self) -> ReelsmithResult<()> {
        drop(self.stdin.take());
        let mut child = self
            .child
            .take()
            .ok_or_else(|| ReelsmithError::encode("ffmpeg sink not started"))?;

        let status = child.wait().map_err(|e| {
            ReelsmithError::encode(format!("failed to wait for ffmpeg to finish: {e}"))
        })?;
        let stderr_bytes = match self.stderr_drain.take() {
            Some(handle) => handle
                .join()
                .map_err(|_| ReelsmithError::encode("ffmpeg stderr drain thread panicked"))?
                .map_err(|e| ReelsmithError::encode(format!("ffmpeg stderr read failed: {e}")))?,
            None => Vec::new(),
        };

        if !status.success() {
            let stderr = String::from_utf8_lossy(&stderr_bytes);
            return Err(ReelsmithError::encode(format!(
                "ffmpeg exited with status {}: {}",
                status,
                stderr.trim()
            )));
        }

        self.cfg = None;
        Ok(())
    }

    fn abort(&mut self) {
        drop(self.stdin.take());
        if let Some(mut child) = self.child.take() {
            let _ = child.kill();
            let _ = child.wait();
        }
        if let Some(handle) = self.stderr_drain.take() {
            let _ = handle.join();
        }
        // Partial output is never left behind.
        let _ = std::fs::remove_file(&self.opts.out_path);
        self.cfg = None;
    }
}

fn flatten_premul_over_bg(
    dst: &mut [u8],
    src_premul: &[u8],
    bg_rgba: [u8; 4],
) -> ReelsmithResult<()> {
    if dst.len() != src_premul.len() || !dst.len().is_multiple_of(4) {
        return Err(ReelsmithError::validation(
            "flatten_premul_over_bg expects equal-length rgba8 buffers",
        ));
    }

    let bg_r = bg_rgba[0] as u16;
    let bg_g = bg_rgba[1] as u16;
    let bg_b = bg_rgba[2] as u16;

    for (d, s) in dst.chunks_exact_mut(4).zip(src_premul.chunks_exact(4)) {
        let a = s[3] as u16;
        if a == 255 {
            d.copy_from_slice(s);
            d[3] = 255;
            continue;
        }

        let inv = 255u16 - a;
        let r = s[0] as u16 + mul_div255(bg_r, inv);
        let g = s[1] as u16 + mul_div255(bg_g, inv);
        let b = s[2] as u16 + mul_div255(bg_b, inv);

        d[0] = r.min(255) as u8;
        d[1] = g.min(255) as u8;
        d[2] = b.min(255) as u8;
        d[3] = 255;
    }

    Ok(())
}

fn mul_div255(x: u16, y: u16) -> u16 {
    (((u32::from(x) * u32::from(y)) + 127) / 255) as u16
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn flatten_premul_alpha_0_returns_bg() {
        let src = vec![0u8, 0, 0, 0];
        let mut dst = vec![0u8; 4];
        flatten_premul_over_bg(&mut dst, &src, [10, 20, 30, 255]).unwrap();
        assert_eq!(dst, vec![10, 20, 30, 255]);
    }

    #[test]
    fn flatten_premul_alpha_255_is_identity() {
        let src = vec![1u8, 2, 3, 255];
        let mut dst = vec![0u8; 4];
        flatten_premul_over_bg(&mut dst, &src, [10, 20, 30, 255]).unwrap();
        assert_eq!(dst, src);
    }

    #[test]
    fn codec_candidates_prefer_h264() {
        let listing = "\
 V....D libx264              H.264 / AVC\n\
 V....D libvpx               VP8\n";
        assert_eq!(
            pick_codec(&VideoCodec::default_candidates(), listing),
            Some(VideoCodec::H264)
        );
    }

    #[test]
    fn codec_negotiation_walks_the_list() {
        let listing = " V....D libvpx               VP8\n";
        assert_eq!(
            pick_codec(&VideoCodec::default_candidates(), listing),
            Some(VideoCodec::Vp8)
        );
        assert_eq!(pick_codec(&VideoCodec::default_candidates(), ""), None);
    }

    #[test]
    fn container_follows_codec() {
        assert_eq!(
            path_for_container(Path::new("out/final.mp4"), VideoCodec::Vp9),
            PathBuf::from("out/final.webm")
        );
        assert_eq!(VideoCodec::H264.container_ext(), "mp4");
    }
}
