use std::collections::{HashMap, HashSet};

use anyhow::Context;
use serde::{Deserialize, Serialize};
use ts_rs::TS;

use super::normalizer::{NormalizeMode, NormalizedText, normalize};

/// A positioned fragment of a page's text layer.
///
/// `transform` is the PDF text matrix `[a, b, c, d, e, f]`; `e`/`f` are the
/// baseline origin in bottom-left page space and `d` the vertical scale.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TextRun {
    pub text: String,
    pub width: f64,
    pub height: f64,
    pub transform: [f64; 6],
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PageText {
    /// 1-based.
    pub page_number: u32,
    pub viewport_height: f64,
    pub runs: Vec<TextRun>,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct BoundingBox {
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
}

/// Where an excerpt sits in its PDF; persisted as JSON on the evidence ref.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct Locator {
    pub page: u32,
    pub text: String,
    pub boxes: Vec<BoundingBox>,
}

impl Locator {
    pub fn to_json(&self) -> anyhow::Result<String> {
        serde_json::to_string(self).context("failed to serialize locator")
    }

    pub fn from_json(raw: &str) -> anyhow::Result<Self> {
        serde_json::from_str(raw).context("malformed locator")
    }
}

impl TextRun {
    /// Top-left origin box at scale 1.
    fn bounds(&self, viewport_height: f64) -> BoundingBox {
        let [_, _, _, d, e, f] = self.transform;
        let height = [d.abs(), self.height]
            .into_iter()
            .find(|v| *v != 0.0 && !v.is_nan())
            .unwrap_or(0.0);
        let width = if self.width.is_nan() { 0.0 } else { self.width };

        BoundingBox {
            x: e,
            y: viewport_height - f - height,
            width,
            height,
        }
    }
}

/// Finds `excerpt` on one page and boxes the runs it covers.
///
/// Runs are joined with single spaces and matched in strict mode first,
/// then loose. Returns `None` when neither matches or no covered run has a
/// positive-area box.
pub fn locate(
    page_number: u32,
    excerpt: &str,
    runs: &[TextRun],
    viewport_height: f64,
) -> Option<Locator> {
    if runs.is_empty() {
        return None;
    }

    let page_text = runs
        .iter()
        .map(|run| run.text.as_str())
        .collect::<Vec<_>>()
        .join(" ");
    let (haystack, start, len) = find_match(excerpt, &page_text)?;

    let original_start = haystack.char_map[start];
    let original_end = haystack.char_map[start + len - 1];
    let start_char_end = original_start + char_width_at(&page_text, original_start);
    let end_char_end = original_end + char_width_at(&page_text, original_end);

    // Run indices are recovered by counting whitespace-delimited tokens.
    let prefix_items = page_text[..start_char_end].split_whitespace().count();
    let range_items = page_text[original_start..end_char_end]
        .split_whitespace()
        .count();
    let start_index = prefix_items.saturating_sub(1);
    if start_index >= runs.len() {
        return None;
    }
    let end_index = (start_index + range_items.saturating_sub(1)).min(runs.len() - 1);

    let boxes: Vec<BoundingBox> = runs[start_index..=end_index]
        .iter()
        .map(|run| run.bounds(viewport_height))
        .filter(|b| b.width > 0.0 && b.height > 0.0)
        .collect();
    if boxes.is_empty() {
        return None;
    }

    Some(Locator {
        page: page_number,
        text: excerpt.to_string(),
        boxes,
    })
}

/// Locates each distinct excerpt on the first page, in order, that
/// contains it. Scanning stops once every excerpt is found.
pub fn locate_in_pages<S: AsRef<str>>(
    pages: &[PageText],
    excerpts: &[S],
) -> HashMap<String, Locator> {
    let wanted: HashSet<&str> = excerpts.iter().map(AsRef::as_ref).collect();
    let mut found: HashMap<String, Locator> = HashMap::new();

    for page in pages {
        for excerpt in excerpts.iter().map(AsRef::as_ref) {
            if found.contains_key(excerpt) {
                continue;
            }
            if let Some(locator) =
                locate(page.page_number, excerpt, &page.runs, page.viewport_height)
            {
                found.insert(excerpt.to_string(), locator);
            }
        }
        if found.len() == wanted.len() {
            break;
        }
    }
    found
}

/// Normalized page text, match start (chars) and match length (chars).
fn find_match(excerpt: &str, page_text: &str) -> Option<(NormalizedText, usize, usize)> {
    for mode in [NormalizeMode::Strict, NormalizeMode::Loose] {
        let needle = normalize(excerpt, mode).text;
        if needle.is_empty() {
            continue;
        }
        let haystack = normalize(page_text, mode);
        if let Some(start) = haystack.find(&needle) {
            let len = needle.chars().count();
            return Some((haystack, start, len));
        }
    }
    None
}

fn char_width_at(text: &str, byte_idx: usize) -> usize {
    text[byte_idx..].chars().next().map_or(0, char::len_utf8)
}

#[cfg(test)]
mod tests {
    use super::*;

    const VIEWPORT: f64 = 792.0;

    /// One run per word on a single line at baseline `y`.
    fn line(words: &[&str], y: f64) -> Vec<TextRun> {
        let mut x = 72.0;
        words
            .iter()
            .map(|word| {
                let width = 6.0 * word.chars().count() as f64;
                let run = TextRun {
                    text: word.to_string(),
                    width,
                    height: 12.0,
                    transform: [12.0, 0.0, 0.0, 12.0, x, y],
                };
                x += width + 4.0;
                run
            })
            .collect()
    }

    fn page(page_number: u32, text: &str) -> PageText {
        let words: Vec<&str> = text.split(' ').collect();
        PageText {
            page_number,
            viewport_height: VIEWPORT,
            runs: line(&words, 700.0),
        }
    }

    #[test]
    fn boxes_cover_the_matched_runs() {
        let runs = line(
            &["The", "model", "uses", "self-attention", "to", "relate", "positions."],
            700.0,
        );
        let locator = locate(1, "uses   Self-Attention to\nrelate", &runs, VIEWPORT).unwrap();

        assert_eq!(locator.page, 1);
        assert_eq!(locator.boxes.len(), 4);
        assert_eq!(locator.boxes[0].x, runs[2].transform[4]);
        assert_eq!(locator.boxes[3].x, runs[5].transform[4]);
        for b in &locator.boxes {
            assert_eq!(b.y, VIEWPORT - 700.0 - 12.0);
            assert_eq!(b.height, 12.0);
        }
    }

    #[test]
    fn verbatim_excerpt_on_third_page() {
        let pages = vec![
            page(1, "Attention Is All You Need"),
            page(2, "Recurrent models process tokens sequentially."),
            page(3, "In contrast Self-attention enables parallel processing. It is fast."),
        ];
        let excerpt = "Self-attention enables parallel processing.";
        let found = locate_in_pages(&pages, &[excerpt]);

        let locator = &found[excerpt];
        assert_eq!(locator.page, 3);
        assert_eq!(locator.text, excerpt);
        assert_eq!(locator.boxes.len(), 4);
        assert!(locator.boxes.iter().all(|b| b.width > 0.0 && b.height > 0.0));
    }

    #[test]
    fn first_matching_page_wins() {
        let pages = vec![
            page(1, "nothing relevant here"),
            page(2, "the shared sentence appears here"),
            page(3, "the shared sentence appears here too"),
        ];
        let found = locate_in_pages(&pages, &["shared sentence appears", "here too"]);
        assert_eq!(found["shared sentence appears"].page, 2);
        assert_eq!(found["here too"].page, 3);
    }

    #[test]
    fn dash_drift_falls_back_to_loose() {
        let runs = line(&["In", "contrast", "self–attention", "enables", "parallel", "processing."], 700.0);
        let excerpt = "Self-attention enables parallel processing.";

        assert!(find_match(excerpt, "in contrast self–attention enables parallel processing.")
            .is_some_and(|(haystack, _, _)| !haystack.text.contains('–')));
        let locator = locate(5, excerpt, &runs, VIEWPORT).unwrap();
        assert_eq!(locator.boxes.len(), 4);
        assert_eq!(locator.boxes[0].x, runs[2].transform[4]);
    }

    #[test]
    fn quote_drift_falls_back_to_loose() {
        let runs = line(&["They", "called", "it", "“attention”", "and", "moved", "on."], 700.0);
        let locator = locate(1, "called it \"attention\" and moved", &runs, VIEWPORT).unwrap();
        assert_eq!(locator.boxes.len(), 5);
        assert_eq!(locator.boxes[0].x, runs[1].transform[4]);
    }

    #[test]
    fn missing_excerpt_is_not_found() {
        let runs = line(&["Nothing", "to", "see"], 700.0);
        assert!(locate(1, "something else entirely", &runs, VIEWPORT).is_none());
        assert!(locate(1, "   ", &runs, VIEWPORT).is_none());
        assert!(locate(1, "nothing", &[], VIEWPORT).is_none());
    }

    #[test]
    fn degenerate_boxes_are_dropped() {
        let mut runs = line(&["zero", "width", "words"], 700.0);
        for run in &mut runs {
            run.width = 0.0;
        }
        assert!(locate(1, "zero width", &runs, VIEWPORT).is_none());

        runs[1].width = 30.0;
        let locator = locate(1, "zero width", &runs, VIEWPORT).unwrap();
        assert_eq!(locator.boxes.len(), 1);
    }

    #[test]
    fn height_falls_back_to_run_metrics() {
        let run = TextRun {
            text: "x".into(),
            width: 5.0,
            height: 9.0,
            transform: [1.0, 0.0, 0.0, 0.0, 10.0, 100.0],
        };
        let b = run.bounds(200.0);
        assert_eq!(b.height, 9.0);
        assert_eq!(b.y, 91.0);
    }

    #[test]
    fn locator_json_uses_wire_names() {
        let locator = Locator {
            page: 2,
            text: "x".into(),
            boxes: vec![BoundingBox {
                x: 1.0,
                y: 2.0,
                width: 3.0,
                height: 4.0,
            }],
        };
        let value: serde_json::Value = serde_json::from_str(&locator.to_json().unwrap()).unwrap();
        assert_eq!(value["page"], 2);
        assert_eq!(value["boxes"][0]["width"], 3.0);
        assert_eq!(Locator::from_json(&locator.to_json().unwrap()).unwrap(), locator);
    }
}
