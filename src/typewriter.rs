//! Typewriter caption controller.
//!
//! A per-slide reveal counter advances one character per rendered frame once
//! the lead-in delay has elapsed. Rendering consumes the counter cumulatively
//! across wrapped lines; each line's revealed substring is drawn on a solid
//! background block. Measured substring widths are memoized in a bounded
//! cache keyed by the full content tuple, scoped to the slide.

use std::collections::HashMap;

use kurbo::{Point, Rect};

use crate::{
    config::{CHAR_REVEAL_MS, CaptionStyle, HOLD_MS, LEAD_IN_MS},
    error::ReelsmithResult,
    layout::{wrap_caption, wrapped_char_count},
    surface::{DrawSurface, TextMeasure},
};

const WIDTH_CACHE_CAPACITY: usize = 256;

pub struct Typewriter {
    lines: Vec<String>,
    total_chars: usize,
    revealed: usize,
    style: CaptionStyle,
    max_width: f64,
    cache: WidthCache,
}

impl Typewriter {
    /// Wrap `text` once and reset the reveal counter to zero.
    pub fn setup(
        text: &str,
        measure: &dyn TextMeasure,
        style: &CaptionStyle,
        max_width: f64,
    ) -> Self {
        let lines = wrap_caption(text, measure, style.font_px, max_width);
        let total_chars = wrapped_char_count(&lines);
        Self {
            lines,
            total_chars,
            revealed: 0,
            style: style.clone(),
            max_width,
            cache: WidthCache::new(WIDTH_CACHE_CAPACITY),
        }
    }

    /// Advance the reveal counter by exactly one character. Called once per
    /// rendered frame, only after the lead-in has elapsed.
    pub fn advance(&mut self) {
        self.revealed = (self.revealed + 1).min(self.total_chars);
    }

    pub fn revealed(&self) -> usize {
        self.revealed
    }

    pub fn total_chars(&self) -> usize {
        self.total_chars
    }

    pub fn is_complete(&self) -> bool {
        self.revealed >= self.total_chars
    }

    pub fn line_count(&self) -> usize {
        self.lines.len()
    }

    pub fn total_height(&self) -> f64 {
        self.lines.len() as f64 * self.style.line_height
    }

    /// Draw the revealed caption with its first block's top-left at
    /// (`left_x`, `top_y`). The counter spends itself across lines in order:
    /// once a line is fully consumed it continues into the next.
    pub fn render(
        &mut self,
        surface: &mut dyn DrawSurface,
        left_x: f64,
        top_y: f64,
    ) -> ReelsmithResult<()> {
        let block_height = self.style.block_height();
        let (ascent, descent) = surface.line_metrics(self.style.font_px);

        let mut remaining = self.revealed;
        let mut y = top_y;

        for line in &self.lines {
            if remaining == 0 {
                break;
            }
            let line_chars = line.chars().count();
            let take = remaining.min(line_chars);
            remaining -= take;

            let shown: String = line.chars().take(take).collect();
            if shown.trim().is_empty() {
                y += self.style.line_height;
                continue;
            }

            let width = self.cache.get_or_measure(
                &shown,
                self.style.font_px,
                self.style.text_color,
                self.max_width,
                self.style.pad_x,
                || surface.text_width(&shown, self.style.font_px),
            );

            let block = Rect::new(
                left_x,
                y,
                left_x + width + 2.0 * self.style.pad_x,
                y + block_height,
            );
            surface.fill_rect(block, self.style.block_color, 1.0);

            // Center the revealed substring vertically inside its block.
            let baseline = y + (block_height + ascent - descent) / 2.0;
            surface.fill_text(
                &shown,
                Point::new(left_x + self.style.pad_x, baseline),
                self.style.font_px,
                self.style.text_color,
            )?;

            y += self.style.line_height;
        }
        Ok(())
    }
}

/// Effective rendered duration of a slide. The user-requested duration is a
/// floor, never a cap: long captions extend the slide so the lead-in, the
/// full reveal and the hold always fit.
pub fn effective_duration_ms(requested_sec: f64, wrapped_chars: usize) -> f64 {
    let requested_ms = requested_sec * 1000.0;
    if wrapped_chars == 0 {
        return requested_ms;
    }
    let caption_ms = (LEAD_IN_MS + wrapped_chars as u64 * CHAR_REVEAL_MS + HOLD_MS) as f64;
    requested_ms.max(caption_ms)
}

#[derive(Clone, PartialEq, Eq, Hash)]
struct WidthKey {
    text: String,
    font_px_bits: u32,
    color: [u8; 4],
    max_width_bits: u64,
    pad_bits: u64,
}

/// Bounded LRU memo of measured substring widths. Capacity is small and the
/// cache dies with the slide, so eviction is a linear scan for the oldest
/// stamp.
struct WidthCache {
    entries: HashMap<WidthKey, (u64, f64)>,
    stamp: u64,
    capacity: usize,
}

impl WidthCache {
    fn new(capacity: usize) -> Self {
        Self {
            entries: HashMap::new(),
            stamp: 0,
            capacity,
        }
    }

    #[allow(clippy::too_many_arguments)]
    fn get_or_measure(
        &mut self,
        text: &str,
        font_px: f32,
        color: [u8; 4],
        max_width: f64,
        pad: f64,
        measure: impl FnOnce() -> f64,
    ) -> f64 {
        let key = WidthKey {
            text: text.to_string(),
            font_px_bits: font_px.to_bits(),
            color,
            max_width_bits: max_width.to_bits(),
            pad_bits: pad.to_bits(),
        };

        self.stamp += 1;
        let stamp = self.stamp;

        if let Some(entry) = self.entries.get_mut(&key) {
            entry.0 = stamp;
            return entry.1;
        }

        if self.entries.len() >= self.capacity
            && let Some(oldest) = self
                .entries
                .iter()
                .min_by_key(|(_, (s, _))| *s)
                .map(|(k, _)| k.clone())
        {
            self.entries.remove(&oldest);
        }

        let width = measure();
        self.entries.insert(key, (stamp, width));
        width
    }

    fn len(&self) -> usize {
        self.entries.len()
    }
}
