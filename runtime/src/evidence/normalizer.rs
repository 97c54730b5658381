/// How aggressively [`normalize`] canonicalizes text.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NormalizeMode {
    /// Collapse whitespace runs, lowercase, trim.
    Strict,
    /// Strict, after dropping everything outside ASCII letters, digits and
    /// whitespace. Absorbs quote and dash drift.
    Loose,
}

/// Canonical text plus the way back to the raw string.
///
/// `char_map[i]` is the byte offset in the raw string of the character that
/// produced the `i`-th char of `text`. The map is aligned with the trimmed
/// text; `offset` is the number of leading normalized chars that trimming
/// removed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NormalizedText {
    pub text: String,
    pub char_map: Vec<usize>,
    pub offset: usize,
}

impl NormalizedText {
    pub fn is_empty(&self) -> bool {
        self.text.is_empty()
    }

    /// Length in chars, which is also `char_map.len()`.
    pub fn char_len(&self) -> usize {
        self.char_map.len()
    }

    /// First occurrence of `needle`, as a char index into `text`.
    pub fn find(&self, needle: &str) -> Option<usize> {
        if needle.is_empty() {
            return None;
        }
        let byte_idx = self.text.find(needle)?;
        Some(self.text[..byte_idx].chars().count())
    }
}

pub fn normalize(raw: &str, mode: NormalizeMode) -> NormalizedText {
    let mut text = String::with_capacity(raw.len());
    let mut char_map = Vec::with_capacity(raw.len());
    let mut last_was_space = false;

    for (idx, ch) in raw.char_indices() {
        let is_space = ch.is_whitespace();
        if mode == NormalizeMode::Loose && !is_space && !ch.is_ascii_alphanumeric() {
            continue;
        }

        if is_space {
            if !last_was_space {
                text.push(' ');
                char_map.push(idx);
            }
            last_was_space = true;
        } else {
            text.push(lowercase_char(ch));
            char_map.push(idx);
            last_was_space = false;
        }
    }

    let mut offset = 0;
    if text.starts_with(' ') {
        text.remove(0);
        char_map.remove(0);
        offset = 1;
    }
    if text.ends_with(' ') {
        text.pop();
        char_map.pop();
    }

    NormalizedText {
        text,
        char_map,
        offset,
    }
}

/// Single-char lowercase; chars whose lowercase form expands are kept as is
/// so every normalized char has exactly one source char.
fn lowercase_char(ch: char) -> char {
    let mut lower = ch.to_lowercase();
    match (lower.next(), lower.next()) {
        (Some(single), None) => single,
        _ => ch,
    }
}
