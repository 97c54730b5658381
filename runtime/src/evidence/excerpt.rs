use std::{collections::HashSet, fmt};

/// Collapses whitespace runs to single spaces and trims.
pub fn normalize_excerpt(raw: &str) -> String {
    raw.split_whitespace().collect::<Vec<_>>().join(" ")
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExcerptRejection {
    TooShort { chars: usize, min: usize },
    TooLong { chars: usize, max: usize },
    Duplicate,
}

impl fmt::Display for ExcerptRejection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::TooShort { chars, min } => {
                write!(f, "excerpt has {chars} chars, minimum is {min}")
            }
            Self::TooLong { chars, max } => {
                write!(f, "excerpt has {chars} chars, maximum is {max}")
            }
            Self::Duplicate => f.write_str("excerpt duplicates an earlier one"),
        }
    }
}

/// Length bounds, in chars, applied after normalization.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExcerptRule {
    pub min_chars: usize,
    pub max_chars: usize,
}

impl Default for ExcerptRule {
    fn default() -> Self {
        Self {
            min_chars: 40,
            max_chars: 500,
        }
    }
}

impl ExcerptRule {
    /// Normalized excerpt if its length is within bounds.
    pub fn check(&self, raw: &str) -> Result<String, ExcerptRejection> {
        let normalized = normalize_excerpt(raw);
        let chars = normalized.chars().count();
        if chars < self.min_chars {
            return Err(ExcerptRejection::TooShort {
                chars,
                min: self.min_chars,
            });
        }
        if chars > self.max_chars {
            return Err(ExcerptRejection::TooLong {
                chars,
                max: self.max_chars,
            });
        }
        Ok(normalized)
    }

    pub fn dedup(&self) -> ExcerptSet {
        ExcerptSet {
            rule: *self,
            seen: HashSet::new(),
        }
    }
}

/// Accepts excerpts for one owner, rejecting case-insensitive repeats.
#[derive(Debug)]
pub struct ExcerptSet {
    rule: ExcerptRule,
    seen: HashSet<String>,
}

impl ExcerptSet {
    pub fn accept(&mut self, raw: &str) -> Result<String, ExcerptRejection> {
        let normalized = self.rule.check(raw)?;
        if !self.seen.insert(normalized.to_lowercase()) {
            return Err(ExcerptRejection::Duplicate);
        }
        Ok(normalized)
    }
}
