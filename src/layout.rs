//! Caption line wrapping.
//!
//! Words are placed greedily and kept intact; a single word wider than the
//! line is broken at character level so no produced line ever exceeds the
//! maximum width. Wrapping runs once per slide, before animation starts.

use crate::surface::TextMeasure;

pub fn wrap_caption(
    text: &str,
    measure: &dyn TextMeasure,
    font_px: f32,
    max_width: f64,
) -> Vec<String> {
    let mut lines = Vec::new();
    let mut current = String::new();

    for word in text.split_whitespace() {
        if measure.text_width(word, font_px) > max_width {
            // Word alone is too wide: flush the current line, then break the
            // word at character level.
            if !current.is_empty() {
                lines.push(std::mem::take(&mut current));
            }
            break_word(word, measure, font_px, max_width, &mut lines, &mut current);
            continue;
        }

        let candidate = if current.is_empty() {
            word.to_string()
        } else {
            format!("{current} {word}")
        };

        if measure.text_width(&candidate, font_px) > max_width && !current.is_empty() {
            lines.push(std::mem::take(&mut current));
            current = word.to_string();
        } else {
            current = candidate;
        }
    }

    if !current.is_empty() {
        lines.push(current);
    }
    lines
}

/// Total character count across wrapped lines; the typewriter's denominator.
/// Wrapping boundaries do not count as characters.
pub fn wrapped_char_count(lines: &[String]) -> usize {
    lines.iter().map(|line| line.chars().count()).sum()
}

fn break_word(
    word: &str,
    measure: &dyn TextMeasure,
    font_px: f32,
    max_width: f64,
    lines: &mut Vec<String>,
    current: &mut String,
) {
    let mut piece = String::new();
    for ch in word.chars() {
        piece.push(ch);
        if measure.text_width(&piece, font_px) > max_width && piece.chars().count() > 1 {
            let overflow = piece.pop().expect("piece has at least two chars");
            lines.push(std::mem::take(&mut piece));
            piece.push(overflow);
        }
    }
    // The tail continues the line so a following short word can join it.
    *current = piece;
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Fixed-advance measurer: every char is `advance` px wide.
    struct MonoMeasure {
        advance: f64,
    }

    impl TextMeasure for MonoMeasure {
        fn text_width(&self, text: &str, _font_px: f32) -> f64 {
            text.chars().count() as f64 * self.advance
        }
    }

    #[test]
    fn no_line_exceeds_max_width() {
        let measure = MonoMeasure { advance: 10.0 };
        let lines = wrap_caption(
            "storm warnings issued across the entire coastal region tonight",
            &measure,
            48.0,
            200.0,
        );
        assert!(!lines.is_empty());
        for line in &lines {
            assert!(measure.text_width(line, 48.0) <= 200.0, "line too wide: {line}");
        }
    }

    #[test]
    fn words_are_kept_intact_when_they_fit() {
        let measure = MonoMeasure { advance: 10.0 };
        let lines = wrap_caption("alpha beta gamma", &measure, 48.0, 110.0);
        assert_eq!(lines, vec!["alpha beta".to_string(), "gamma".to_string()]);
    }

    #[test]
    fn overlong_word_breaks_at_char_level() {
        let measure = MonoMeasure { advance: 10.0 };
        let lines = wrap_caption("abcdefghij", &measure, 48.0, 40.0);
        assert_eq!(
            lines,
            vec!["abcd".to_string(), "efgh".to_string(), "ij".to_string()]
        );
        for line in &lines {
            assert!(measure.text_width(line, 48.0) <= 40.0);
        }
    }

    #[test]
    fn rewrap_of_produced_lines_is_idempotent() {
        let measure = MonoMeasure { advance: 10.0 };
        let text = "city crews clear storm debris from the northern avenues";
        let lines = wrap_caption(text, &measure, 48.0, 180.0);
        let rejoined = lines.join(" ");
        let rewrapped = wrap_caption(&rejoined, &measure, 48.0, 180.0);
        assert_eq!(lines, rewrapped);
    }

    #[test]
    fn empty_and_whitespace_produce_no_lines() {
        let measure = MonoMeasure { advance: 10.0 };
        assert!(wrap_caption("", &measure, 48.0, 100.0).is_empty());
        assert!(wrap_caption("   \t ", &measure, 48.0, 100.0).is_empty());
    }

    #[test]
    fn char_count_sums_line_lengths() {
        let lines = vec!["alpha beta".to_string(), "gamma".to_string()];
        assert_eq!(wrapped_char_count(&lines), 15);
    }
}
