use std::sync::Arc;

use anyhow::{Context, Result};

use super::locator::PageText;
use crate::pipeline::{source_files::SourceFiles, types::Document};

/// Decodes a PDF buffer into positioned text runs, one entry per page in
/// page order.
pub trait TextLayer: Send + Sync {
    fn decode(&self, bytes: &[u8]) -> Result<Vec<PageText>>;
}

#[cfg(feature = "pdf")]
pub use pdf::PdfExtractTextLayer;

#[cfg(feature = "pdf")]
mod pdf {
    use anyhow::{Context, Result, anyhow};
    use pdf_extract::{MediaBox, OutputDev, OutputError, Transform};

    use super::TextLayer;
    use crate::evidence::locator::{PageText, TextRun};

    /// Text layer backed by `pdf-extract`'s output device callbacks.
    ///
    /// Glyphs are grouped into one run per whitespace-delimited word so the
    /// locator's token counting lines up with run indices.
    #[derive(Debug, Default, Clone, Copy)]
    pub struct PdfExtractTextLayer;

    impl TextLayer for PdfExtractTextLayer {
        fn decode(&self, bytes: &[u8]) -> Result<Vec<PageText>> {
            let doc = lopdf::Document::load_mem(bytes).context("failed to parse PDF")?;
            let mut collector = RunCollector::default();
            pdf_extract::output_doc(&doc, &mut collector)
                .map_err(|err| anyhow!("failed to read PDF text layer: {err:?}"))?;
            collector.flush_page();
            Ok(collector.pages)
        }
    }

    #[derive(Default)]
    struct PendingRun {
        text: String,
        start_x: f64,
        end_x: f64,
        baseline: f64,
        height: f64,
    }

    #[derive(Default)]
    struct RunCollector {
        pages: Vec<PageText>,
        page: Option<PageText>,
        origin: (f64, f64),
        current: Option<PendingRun>,
    }

    impl RunCollector {
        fn flush_run(&mut self) {
            let (Some(run), Some(page)) = (self.current.take(), self.page.as_mut()) else {
                return;
            };
            if run.text.is_empty() {
                return;
            }
            page.runs.push(TextRun {
                width: (run.end_x - run.start_x).max(0.0),
                height: run.height,
                transform: [run.height, 0.0, 0.0, run.height, run.start_x, run.baseline],
                text: run.text,
            });
        }

        fn flush_page(&mut self) {
            self.flush_run();
            if let Some(page) = self.page.take() {
                self.pages.push(page);
            }
        }
    }

    impl OutputDev for RunCollector {
        fn begin_page(
            &mut self,
            page_num: u32,
            media_box: &MediaBox,
            _art_box: Option<(f64, f64, f64, f64)>,
        ) -> Result<(), OutputError> {
            self.flush_page();
            self.origin = (media_box.llx, media_box.lly);
            self.page = Some(PageText {
                page_number: page_num,
                viewport_height: media_box.ury - media_box.lly,
                runs: Vec::new(),
            });
            Ok(())
        }

        fn end_page(&mut self) -> Result<(), OutputError> {
            self.flush_page();
            Ok(())
        }

        fn output_character(
            &mut self,
            trm: &Transform,
            width: f64,
            _spacing: f64,
            font_size: f64,
            ch: &str,
        ) -> Result<(), OutputError> {
            if ch.chars().all(char::is_whitespace) {
                self.flush_run();
                return Ok(());
            }

            let scale_x = font_size * (trm.m11 * trm.m11 + trm.m12 * trm.m12).sqrt();
            let scale_y = font_size * (trm.m21 * trm.m21 + trm.m22 * trm.m22).sqrt();
            let x = trm.m31 - self.origin.0;
            let y = trm.m32 - self.origin.1;
            let advance = width * scale_x;

            // A jump in baseline or a visible gap starts a new word.
            let breaks = self.current.as_ref().is_some_and(|run| {
                (run.baseline - y).abs() > run.height * 0.5 || x - run.end_x > scale_x * 0.25
            });
            if breaks {
                self.flush_run();
            }

            let run = self.current.get_or_insert_with(|| PendingRun {
                start_x: x,
                end_x: x,
                baseline: y,
                height: scale_y,
                ..PendingRun::default()
            });
            run.text.push_str(ch);
            run.end_x = x + advance;
            run.height = run.height.max(scale_y);
            Ok(())
        }

        fn begin_word(&mut self) -> Result<(), OutputError> {
            Ok(())
        }

        fn end_word(&mut self) -> Result<(), OutputError> {
            Ok(())
        }

        fn end_line(&mut self) -> Result<(), OutputError> {
            self.flush_run();
            Ok(())
        }
    }

}

/// Stand-in used when the crate is built without the `pdf` feature.
#[derive(Debug, Default, Clone, Copy)]
pub struct DisabledTextLayer;

impl TextLayer for DisabledTextLayer {
    fn decode(&self, _bytes: &[u8]) -> Result<Vec<PageText>> {
        anyhow::bail!("PDF text layer unavailable: built without the `pdf` feature")
    }
}

/// The best text layer compiled into this build.
pub fn default_text_layer() -> Arc<dyn TextLayer> {
    #[cfg(feature = "pdf")]
    {
        Arc::new(PdfExtractTextLayer)
    }
    #[cfg(not(feature = "pdf"))]
    {
        Arc::new(DisabledTextLayer)
    }
}

/// Fetches a document's source file and decodes its text layer off the
/// async runtime.
#[derive(Clone)]
pub struct PageSource {
    files: Arc<dyn SourceFiles>,
    text_layer: Arc<dyn TextLayer>,
}

impl PageSource {
    pub fn new(files: Arc<dyn SourceFiles>, text_layer: Arc<dyn TextLayer>) -> Self {
        Self { files, text_layer }
    }

    pub fn cache_key(&self, document: &Document) -> String {
        self.files.cache_key(document)
    }

    pub async fn load(&self, document: &Document) -> Result<Vec<PageText>> {
        let bytes = self.files.fetch(document).await?;
        let text_layer = Arc::clone(&self.text_layer);
        let filename = document.filename.clone();
        tokio::task::spawn_blocking(move || text_layer.decode(&bytes))
            .await
            .context("text layer task aborted")?
            .with_context(|| format!("failed to decode {filename}"))
    }
}
