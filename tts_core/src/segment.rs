//! Incremental sentence segmentation of the streamed model reply.
//!
//! Deltas arrive with no boundary guarantees; the segmenter buffers
//! them, captures the leading style tag once, and emits speakable
//! units as soon as enough text has arrived to close one.

use crate::{SentenceUnit, StyleTag};

/// Marks that end a sentence unit outright.
const TERMINAL: &[char] = &['。', '．', '.', '！', '!', '？', '?', '\n'];

/// Comma-class separators, used as a fallback boundary so comma-heavy
/// text cannot buffer without bound.
const COMMA: &[char] = &['、', '，', ','];

/// Characters to accumulate before a comma-class mark may close a unit.
const COMMA_MIN_CHARS: usize = 10;

/// Bracket characters considered decorative: a candidate made of
/// nothing else is unspeakable and dropped without an index.
const DECORATIVE: &str = "「［（【『〈《〔｛«‹〘〚〛〙›»〕》〉』】）］」(){}[]";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum TagState {
    /// Still waiting to see whether the response starts with a tag.
    Pending,
    /// Tag captured or ruled out; later brackets are ordinary text.
    Resolved,
}

/// Splits an unbounded delta stream into ordered sentence units.
///
/// One instance per response; `finish` must be called when the stream
/// completes so trailing text without terminal punctuation is not lost.
#[derive(Debug)]
pub struct ResponseSegmenter {
    pending: String,
    tag: StyleTag,
    tag_state: TagState,
    next_index: u64,
}

impl Default for ResponseSegmenter {
    fn default() -> Self {
        Self::new()
    }
}

impl ResponseSegmenter {
    pub fn new() -> Self {
        Self {
            pending: String::new(),
            tag: StyleTag::Neutral,
            tag_state: TagState::Pending,
            next_index: 0,
        }
    }

    /// Style tag captured so far (default until the prefix resolves).
    pub fn tag(&self) -> StyleTag {
        self.tag
    }

    /// Number of units emitted so far; also the next index to assign.
    pub fn emitted(&self) -> u64 {
        self.next_index
    }

    /// Consume one text delta, returning every unit it completes.
    pub fn push(&mut self, delta: &str) -> Vec<SentenceUnit> {
        self.pending.push_str(delta);
        self.drain_ready(false)
    }

    /// Flush the remainder at stream completion as one final unit.
    pub fn finish(&mut self) -> Vec<SentenceUnit> {
        let mut units = self.drain_ready(true);
        let rest = std::mem::take(&mut self.pending);
        if let Some(unit) = self.make_unit(&rest) {
            units.push(unit);
        }
        units
    }

    fn drain_ready(&mut self, at_end: bool) -> Vec<SentenceUnit> {
        if !self.resolve_tag(at_end) {
            // A tag opened but its closing bracket has not arrived;
            // extracting now would consume the tag as text.
            return Vec::new();
        }
        let mut units = Vec::new();
        while let Some(candidate) = self.extract_sentence() {
            if let Some(unit) = self.make_unit(&candidate) {
                units.push(unit);
            }
        }
        units
    }

    /// Try to settle the leading style tag. Returns false while more
    /// input is required before any extraction may happen.
    fn resolve_tag(&mut self, at_end: bool) -> bool {
        if self.tag_state == TagState::Resolved {
            return true;
        }
        if !self.pending.starts_with('[') {
            if !self.pending.is_empty() {
                self.tag_state = TagState::Resolved;
            }
            return true;
        }
        match self.pending.find(']') {
            Some(close) => {
                self.tag = StyleTag::from_label(&self.pending[1..close]);
                self.pending.drain(..=close);
                self.tag_state = TagState::Resolved;
                true
            }
            None if at_end => {
                // Stream ended inside the bracket: no tag, plain text.
                self.tag_state = TagState::Resolved;
                true
            }
            None => false,
        }
    }

    /// Cut one candidate off the front of `pending`: everything up to
    /// the first terminal mark preceded by at least one character, or
    /// up to the first comma-class mark once at least
    /// `COMMA_MIN_CHARS` characters precede it.
    fn extract_sentence(&mut self) -> Option<String> {
        let mut comma_cut = None;
        let mut cut = None;
        for (chars_seen, (pos, ch)) in self.pending.char_indices().enumerate() {
            if chars_seen >= 1 && TERMINAL.contains(&ch) {
                cut = Some(pos + ch.len_utf8());
                break;
            }
            if comma_cut.is_none() && chars_seen >= COMMA_MIN_CHARS && COMMA.contains(&ch) {
                comma_cut = Some(pos + ch.len_utf8());
            }
        }
        let end = cut.or(comma_cut)?;
        let candidate = self.pending[..end].to_string();
        self.pending.drain(..end);
        Some(candidate)
    }

    /// Trim and filter a candidate; assign an index only when it is
    /// actually speakable.
    fn make_unit(&mut self, candidate: &str) -> Option<SentenceUnit> {
        let text = candidate.trim_start();
        if Self::is_decorative(text) {
            return None;
        }
        let unit = SentenceUnit {
            index: self.next_index,
            style: self.tag,
            text: text.to_string(),
        };
        self.next_index += 1;
        Some(unit)
    }

    fn is_decorative(text: &str) -> bool {
        text.chars().all(|c| c.is_whitespace() || DECORATIVE.contains(c))
    }
}
