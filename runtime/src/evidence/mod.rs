pub mod backfill;
pub mod excerpt;
pub mod locator;
pub mod normalizer;
pub mod text_layer;

pub use backfill::{BackfillReport, LocatorBackfill};
pub use excerpt::{ExcerptRejection, ExcerptRule, ExcerptSet, normalize_excerpt};
pub use locator::{BoundingBox, Locator, PageText, TextRun, locate, locate_in_pages};
pub use normalizer::{NormalizeMode, NormalizedText, normalize};
pub use text_layer::{DisabledTextLayer, PageSource, TextLayer, default_text_layer};
