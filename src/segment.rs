//! Caption segmenter: turns free text or a fetched article into an ordered
//! list of short caption segments bounded by a total playback-time budget.
//!
//! The time estimate per segment uses the compositor's own caption timing
//! constants, so segmenter output always fits comfortably within the real
//! reveal animation. A remote text-generation backend is optional; any
//! backend or fetch failure degrades to the local heuristic. The only hard
//! error is having no text at all.

use crate::{
    config::{CHAR_REVEAL_MS, HOLD_MS, LEAD_IN_MS, MIN_REVEAL_MS},
    error::{ReelsmithError, ReelsmithResult},
};

pub const MAX_CHARS_PER_SEGMENT: usize = 120;
pub const DEFAULT_MAX_SECONDS: f64 = 90.0;

/// Sentences are grouped into segments of roughly this many words.
const SEGMENT_GROUP_WORDS: usize = 14;
const FETCH_TIMEOUT_SECS: u64 = 15;

#[derive(Clone, Debug, Default, serde::Serialize, serde::Deserialize)]
pub struct SegmentRequest {
    pub url: Option<String>,
    pub text: Option<String>,
    #[serde(rename = "maxSeconds")]
    pub max_seconds: Option<f64>,
}

#[derive(Clone, Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct CaptionSegment {
    pub text: String,
}

#[derive(Clone, Debug, Default, serde::Serialize, serde::Deserialize)]
pub struct SegmentResponse {
    pub title: String,
    pub summary: String,
    pub segments: Vec<CaptionSegment>,
    #[serde(rename = "suggestedImages")]
    pub suggested_images: usize,
}

/// Estimated playback time of one caption segment, mirroring the typewriter:
/// lead-in + hold + per-character reveal (with a floor for very short text).
pub fn estimate_segment_ms(text: &str) -> f64 {
    let reveal = (text.chars().count() as u64 * CHAR_REVEAL_MS).max(MIN_REVEAL_MS);
    (LEAD_IN_MS + HOLD_MS + reveal) as f64
}

/// Keep leading segments while the cumulative estimate fits the budget.
/// Trailing segments are dropped whole; a segment's text is never truncated.
pub fn enforce_time_budget(
    segments: Vec<CaptionSegment>,
    max_seconds: f64,
) -> Vec<CaptionSegment> {
    let budget_ms = max_seconds * 1000.0;
    let mut kept = Vec::new();
    let mut acc = 0.0;
    for segment in segments {
        let add = estimate_segment_ms(&segment.text);
        if acc + add > budget_ms {
            break;
        }
        acc += add;
        kept.push(segment);
    }
    kept
}

/// Split text into word-aligned pieces of at most `max_chars` characters.
/// A single word longer than the limit becomes its own piece.
pub fn split_by_char_limit(text: &str, max_chars: usize) -> Vec<String> {
    let mut parts = Vec::new();
    let mut buf = String::new();
    for word in text.split_whitespace() {
        if buf.is_empty() {
            buf = word.to_string();
            continue;
        }
        if buf.chars().count() + 1 + word.chars().count() <= max_chars {
            buf.push(' ');
            buf.push_str(word);
        } else {
            parts.push(std::mem::take(&mut buf));
            buf = word.to_string();
        }
    }
    if !buf.is_empty() {
        parts.push(buf);
    }
    parts
}

/// Local fallback segmenter: group sentences into ~14-word blocks, split by
/// the per-segment character cap, then trim to the time budget.
pub fn heuristic_segment(text: &str, max_seconds: f64) -> SegmentResponse {
    let cleaned = text.split_whitespace().collect::<Vec<_>>().join(" ");

    let mut blocks: Vec<String> = Vec::new();
    let mut buf: Vec<String> = Vec::new();
    let mut word_count = 0usize;
    for sentence in split_sentences(&cleaned) {
        word_count += sentence.split_whitespace().count();
        buf.push(sentence);
        if word_count >= SEGMENT_GROUP_WORDS {
            blocks.push(buf.join(" "));
            buf.clear();
            word_count = 0;
        }
    }
    if !buf.is_empty() {
        blocks.push(buf.join(" "));
    }

    let segments: Vec<CaptionSegment> = blocks
        .iter()
        .flat_map(|b| split_by_char_limit(b, MAX_CHARS_PER_SEGMENT))
        .map(|text| CaptionSegment { text })
        .collect();
    let trimmed = enforce_time_budget(segments, max_seconds);

    let summary = trimmed
        .iter()
        .take(2)
        .map(|s| s.text.as_str())
        .collect::<Vec<_>>()
        .join(" ");

    SegmentResponse {
        title: String::new(),
        summary,
        suggested_images: suggested_image_count(trimmed.len()),
        segments: trimmed,
    }
}

fn suggested_image_count(segment_count: usize) -> usize {
    ((segment_count as f64 / 2.0).round() as usize).max(1)
}

fn split_sentences(text: &str) -> Vec<String> {
    let mut sentences = Vec::new();
    let mut current = String::new();
    let mut chars = text.chars().peekable();
    while let Some(ch) = chars.next() {
        current.push(ch);
        if matches!(ch, '.' | '!' | '?')
            && chars.peek().is_none_or(|next| next.is_whitespace())
        {
            let s = current.trim().to_string();
            if !s.is_empty() {
                sentences.push(s);
            }
            current.clear();
        }
    }
    let tail = current.trim().to_string();
    if !tail.is_empty() {
        sentences.push(tail);
    }
    sentences
}

/// Upstream segmentation service (e.g. an LLM behind a chat-completions
/// endpoint). Failures are absorbed by the heuristic fallback.
pub trait SegmentBackend {
    fn segment(&self, text: &str, max_seconds: f64) -> ReelsmithResult<SegmentResponse>;
}

/// OpenAI-compatible chat-completions backend.
pub struct ChatCompletionBackend {
    endpoint: String,
    api_key: String,
    model: String,
    client: reqwest::blocking::Client,
}

impl ChatCompletionBackend {
    pub fn new(
        endpoint: impl Into<String>,
        api_key: impl Into<String>,
        model: impl Into<String>,
    ) -> ReelsmithResult<Self> {
        let client = reqwest::blocking::Client::builder()
            .timeout(std::time::Duration::from_secs(FETCH_TIMEOUT_SECS))
            .build()
            .map_err(|e| ReelsmithError::segment(format!("build http client: {e}")))?;
        Ok(Self {
            endpoint: endpoint.into(),
            api_key: api_key.into(),
            model: model.into(),
            client,
        })
    }
}

impl SegmentBackend for ChatCompletionBackend {
    fn segment(&self, text: &str, max_seconds: f64) -> ReelsmithResult<SegmentResponse> {
        let prompt = format!(
            "You are a news video editor. Produce short bullet-style topics \
             (direct sentences, 10-18 words) ready for on-screen captions. \
             Each topic must be at most {MAX_CHARS_PER_SEGMENT} characters. \
             Keep logical order and context. Limit the total estimated \
             duration to at most {max_seconds} seconds (lead-in bar + \
             typewriter). Respond only with JSON: {{\"title\": \"...\", \
             \"summary\": \"...\", \"segments\": [{{\"text\": \"...\"}}], \
             \"suggestedImages\": 3}}"
        );
        let body = serde_json::json!({
            "model": self.model,
            "temperature": 0.3,
            "messages": [
                { "role": "system", "content": "Respond only with valid JSON." },
                { "role": "user", "content": format!("{prompt}\n\nTEXT:\n\n{text}") }
            ]
        });

        let response = self
            .client
            .post(&self.endpoint)
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .map_err(|e| ReelsmithError::segment(format!("backend request failed: {e}")))?
            .error_for_status()
            .map_err(|e| ReelsmithError::segment(format!("backend returned error: {e}")))?;

        let value: serde_json::Value = response
            .json()
            .map_err(|e| ReelsmithError::segment(format!("backend response not json: {e}")))?;
        let content = value["choices"][0]["message"]["content"]
            .as_str()
            .ok_or_else(|| ReelsmithError::segment("backend response missing content"))?;

        #[derive(serde::Deserialize)]
        struct WireResponse {
            #[serde(default)]
            title: String,
            #[serde(default)]
            summary: String,
            #[serde(default)]
            segments: Vec<CaptionSegment>,
            #[serde(default, rename = "suggestedImages")]
            suggested_images: usize,
        }

        let wire: WireResponse = serde_json::from_str(content)
            .map_err(|e| ReelsmithError::segment(format!("backend content not json: {e}")))?;
        Ok(SegmentResponse {
            title: wire.title,
            summary: wire.summary,
            segments: wire.segments,
            suggested_images: wire.suggested_images,
        })
    }
}

pub struct Segmenter {
    backend: Option<Box<dyn SegmentBackend>>,
}

impl Segmenter {
    /// Heuristic-only segmenter.
    pub fn heuristic() -> Self {
        Self { backend: None }
    }

    pub fn with_backend(backend: Box<dyn SegmentBackend>) -> Self {
        Self {
            backend: Some(backend),
        }
    }

    pub fn run(&self, request: &SegmentRequest) -> ReelsmithResult<SegmentResponse> {
        let max_seconds = request.max_seconds.unwrap_or(DEFAULT_MAX_SECONDS);

        let mut title = String::new();
        let mut text = request.text.clone().unwrap_or_default();
        if let Some(url) = &request.url {
            match fetch_article(url) {
                Ok((fetched_title, body)) => {
                    title = fetched_title.unwrap_or_default();
                    text = body;
                }
                Err(err) => {
                    tracing::warn!(error = %err, url, "article fetch failed; using provided text");
                }
            }
        }

        if text.trim().is_empty() {
            return Err(ReelsmithError::segment("no text could be extracted"));
        }

        let mut response = match &self.backend {
            Some(backend) => match backend.segment(&text, max_seconds) {
                Ok(remote) => normalize_remote(remote, max_seconds),
                Err(err) => {
                    tracing::warn!(error = %err, "segment backend failed; using heuristic");
                    heuristic_segment(&text, max_seconds)
                }
            },
            None => heuristic_segment(&text, max_seconds),
        };

        if response.title.is_empty() {
            response.title = title;
        }
        Ok(response)
    }
}

/// Remote output is re-split and re-budgeted locally: the backend is asked to
/// respect the limits, but only our own trimming guarantees them.
fn normalize_remote(remote: SegmentResponse, max_seconds: f64) -> SegmentResponse {
    let split: Vec<CaptionSegment> = remote
        .segments
        .iter()
        .flat_map(|s| split_by_char_limit(&s.text, MAX_CHARS_PER_SEGMENT))
        .map(|text| CaptionSegment { text })
        .collect();
    let trimmed = enforce_time_budget(split, max_seconds);
    SegmentResponse {
        title: remote.title,
        summary: remote.summary,
        suggested_images: suggested_image_count(trimmed.len()),
        segments: trimmed,
    }
}

fn fetch_article(url: &str) -> ReelsmithResult<(Option<String>, String)> {
    let client = reqwest::blocking::Client::builder()
        .timeout(std::time::Duration::from_secs(FETCH_TIMEOUT_SECS))
        .user_agent("reelsmith/0.1")
        .build()
        .map_err(|e| ReelsmithError::segment(format!("build http client: {e}")))?;
    let html = client
        .get(url)
        .send()
        .map_err(|e| ReelsmithError::segment(format!("fetch '{url}': {e}")))?
        .error_for_status()
        .map_err(|e| ReelsmithError::segment(format!("fetch '{url}': {e}")))?
        .text()
        .map_err(|e| ReelsmithError::segment(format!("read body of '{url}': {e}")))?;

    let (title, text) = html_to_text(&html);
    Ok((title, text))
}

/// Strip an HTML document down to its visible text: drops script/style
/// content, turns block-level closers into line breaks, captures `<title>`.
pub fn html_to_text(html: &str) -> (Option<String>, String) {
    let mut title = String::new();
    let mut body = String::new();

    let mut chars = html.chars().peekable();
    let mut skip_until_close: Option<&'static str> = None;
    let mut in_title = false;

    while let Some(ch) = chars.next() {
        if ch == '<' {
            let mut tag = String::new();
            for t in chars.by_ref() {
                if t == '>' {
                    break;
                }
                tag.push(t);
            }
            let tag_lower = tag.trim().to_ascii_lowercase();
            let closing = tag_lower.starts_with('/');
            let name: String = tag_lower
                .trim_start_matches('/')
                .chars()
                .take_while(|c| c.is_ascii_alphanumeric())
                .collect();

            if let Some(waiting_for) = skip_until_close {
                if closing && name == waiting_for {
                    skip_until_close = None;
                }
                continue;
            }

            match name.as_str() {
                "script" if !closing => skip_until_close = Some("script"),
                "style" if !closing => skip_until_close = Some("style"),
                "title" => in_title = !closing,
                "br" | "p" | "div" | "li" | "tr" | "h1" | "h2" | "h3" | "h4" | "h5" | "h6"
                    if closing || name == "br" =>
                {
                    body.push('\n');
                }
                _ => {}
            }
            continue;
        }

        if skip_until_close.is_some() {
            continue;
        }
        if in_title {
            title.push(ch);
        } else {
            body.push(ch);
        }
    }

    let title = {
        let t = decode_entities(&title);
        let t = t.split_whitespace().collect::<Vec<_>>().join(" ");
        (!t.is_empty()).then_some(t)
    };

    let body = decode_entities(&body);
    let body = body
        .lines()
        .map(|line| line.split_whitespace().collect::<Vec<_>>().join(" "))
        .filter(|line| !line.is_empty())
        .collect::<Vec<_>>()
        .join("\n");

    (title, body)
}

fn decode_entities(text: &str) -> String {
    text.replace("&nbsp;", " ")
        .replace("&amp;", "&")
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&#39;", "'")
        .replace("&apos;", "'")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn estimate_uses_caption_timing_constants() {
        let text = "x".repeat(40);
        let expected = (LEAD_IN_MS + HOLD_MS + 40 * CHAR_REVEAL_MS) as f64;
        assert_eq!(estimate_segment_ms(&text), expected);

        // Very short text hits the reveal floor.
        assert_eq!(
            estimate_segment_ms("hi"),
            (LEAD_IN_MS + HOLD_MS + MIN_REVEAL_MS) as f64
        );
    }

    #[test]
    fn budget_drops_whole_trailing_segments() {
        let seg = |t: &str| CaptionSegment { text: t.to_string() };
        // Each of these costs 900+600+800 = 2300ms.
        let segments = vec![seg("a"), seg("b"), seg("c"), seg("d")];
        let kept = enforce_time_budget(segments, 7.0); // 7000ms: fits 3
        assert_eq!(kept.len(), 3);
        assert_eq!(kept[2].text, "c");
    }

    #[test]
    fn split_by_char_limit_keeps_words() {
        let parts = split_by_char_limit("alpha beta gamma delta", 11);
        assert_eq!(parts, vec!["alpha beta", "gamma delta"]);
        for p in &parts {
            assert!(p.chars().count() <= 11);
        }
    }

    #[test]
    fn heuristic_groups_sentences_and_respects_budget() {
        let article = "Storm hits the coast tonight. Thousands lose power across the region. \
                       Crews work through the night to restore lines. Officials urge residents \
                       to stay indoors until morning. Schools remain closed tomorrow."
            .repeat(10);
        let response = heuristic_segment(&article, 30.0);

        assert!(!response.segments.is_empty());
        for s in &response.segments {
            assert!(s.text.chars().count() <= MAX_CHARS_PER_SEGMENT);
        }
        let total: f64 = response
            .segments
            .iter()
            .map(|s| estimate_segment_ms(&s.text))
            .sum();
        assert!(total <= 30_000.0);
        assert!(response.suggested_images >= 1);
        assert!(!response.summary.is_empty());
    }

    #[test]
    fn segmenter_errors_only_without_any_text() {
        let segmenter = Segmenter::heuristic();
        let err = segmenter
            .run(&SegmentRequest::default())
            .unwrap_err();
        assert!(err.to_string().contains("no text could be extracted"));
    }

    #[test]
    fn failing_backend_falls_back_to_heuristic() {
        struct Failing;
        impl SegmentBackend for Failing {
            fn segment(&self, _text: &str, _max: f64) -> ReelsmithResult<SegmentResponse> {
                Err(ReelsmithError::segment("upstream down"))
            }
        }

        let segmenter = Segmenter::with_backend(Box::new(Failing));
        let response = segmenter
            .run(&SegmentRequest {
                url: None,
                text: Some("Power is back. Crews head home after a long night.".to_string()),
                max_seconds: Some(30.0),
            })
            .unwrap();
        assert!(!response.segments.is_empty());
    }

    #[test]
    fn remote_output_is_resplit_and_rebudgeted() {
        let remote = SegmentResponse {
            title: "t".into(),
            summary: "s".into(),
            segments: vec![CaptionSegment {
                text: "word ".repeat(60).trim().to_string(), // 299 chars
            }],
            suggested_images: 99,
        };
        let normalized = normalize_remote(remote, 90.0);
        assert!(normalized.segments.len() > 1);
        for s in &normalized.segments {
            assert!(s.text.chars().count() <= MAX_CHARS_PER_SEGMENT);
        }
        assert_eq!(
            normalized.suggested_images,
            suggested_image_count(normalized.segments.len())
        );
    }

    #[test]
    fn html_to_text_strips_scripts_and_captures_title() {
        let html = "<html><head><title>Storm &amp; Tide</title>\
                    <script>var x = 1;</script><style>p{}</style></head>\
                    <body><p>First paragraph.</p><p>Second&nbsp;one.</p></body></html>";
        let (title, text) = html_to_text(html);
        assert_eq!(title.as_deref(), Some("Storm & Tide"));
        assert!(text.contains("First paragraph."));
        assert!(text.contains("Second one."));
        assert!(!text.contains("var x"));
    }

    #[test]
    fn sentences_split_on_terminators() {
        let s = split_sentences("One. Two! Three? Four");
        assert_eq!(s, vec!["One.", "Two!", "Three?", "Four"]);
    }
}
