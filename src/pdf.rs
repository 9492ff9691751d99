use thiserror::Error;
use tokio::task::JoinSet;
use tracing::{debug, warn};

/// Inserted between consecutive pages of extracted text.
pub const PAGE_SEPARATOR: &str = "\n";

/// How far into the file the `%PDF-` marker may appear.
const HEADER_WINDOW: usize = 1024;

#[derive(Debug, Error)]
pub enum ExtractError {
    #[error("Not a valid PDF file. Please upload a valid PDF.")]
    NotPdf,

    #[error("The PDF is password protected. Remove the password and try again.")]
    PasswordProtected,

    #[error("PDF extraction is unavailable: {0}")]
    Unavailable(String),

    #[error("No text could be extracted from the PDF. Try a different file.")]
    NoText,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Progress {
    pub completed: usize,
    pub total: usize,
}

impl Progress {
    pub fn fraction(&self) -> f64 {
        if self.total == 0 {
            1.0
        } else {
            self.completed as f64 / self.total as f64
        }
    }
}

/// Extracts the text of every page, in page order.
pub async fn extract_text<F>(bytes: Vec<u8>, on_progress: F) -> Result<String, ExtractError>
where
    F: FnMut(Progress),
{
    if !has_pdf_header(&bytes) {
        return Err(ExtractError::NotPdf);
    }
    if is_encrypted(&bytes) {
        return Err(ExtractError::PasswordProtected);
    }

    // pdf-extract can panic on malformed input; a panicked task surfaces as a JoinError.
    let pages = tokio::task::spawn_blocking(move || pdf_extract::extract_text_from_mem_by_pages(&bytes))
        .await
        .map_err(|e| ExtractError::Unavailable(e.to_string()))?
        .map_err(classify_error)?;

    debug!("Extracted {} page(s)", pages.len());
    let text = assemble_pages(pages, on_progress).await?;
    if text.trim().is_empty() {
        return Err(ExtractError::NoText);
    }
    Ok(text)
}

/// Normalizes pages as independent tasks and joins them back in original order.
pub async fn assemble_pages<F>(pages: Vec<String>, on_progress: F) -> Result<String, ExtractError>
where
    F: FnMut(Progress),
{
    let tasks: Vec<_> = pages
        .into_iter()
        .map(|page| async move { normalize_page(&page) })
        .collect();
    let pages = join_in_order(tasks, on_progress).await?;
    Ok(pages.join(PAGE_SEPARATOR))
}

/// Runs every task, then returns their outputs by index, whatever order they
/// finish in. Progress is reported as each one completes.
async fn join_in_order<Fut, F>(tasks: Vec<Fut>, mut on_progress: F) -> Result<Vec<String>, ExtractError>
where
    Fut: Future<Output = String> + Send + 'static,
    F: FnMut(Progress),
{
    let total = tasks.len();
    let mut set = JoinSet::new();
    for (index, task) in tasks.into_iter().enumerate() {
        set.spawn(async move { (index, task.await) });
    }

    let mut slots: Vec<Option<String>> = vec![None; total];
    let mut completed = 0;
    while let Some(joined) = set.join_next().await {
        let (index, text) = joined.map_err(|e| ExtractError::Unavailable(e.to_string()))?;
        slots[index] = Some(text);
        completed += 1;
        on_progress(Progress { completed, total });
    }

    Ok(slots.into_iter().map(Option::unwrap_or_default).collect())
}

/// Collapses runs of spaces inside lines and drops blank lines.
fn normalize_page(page: &str) -> String {
    page.lines()
        .map(|line| line.split_whitespace().collect::<Vec<_>>().join(" "))
        .filter(|line| !line.is_empty())
        .collect::<Vec<_>>()
        .join("\n")
}

fn has_pdf_header(bytes: &[u8]) -> bool {
    let window = &bytes[..bytes.len().min(HEADER_WINDOW)];
    window.windows(5).any(|w| w == b"%PDF-")
}

fn is_encrypted(bytes: &[u8]) -> bool {
    bytes.windows(8).any(|w| w == b"/Encrypt")
}

fn classify_error(err: pdf_extract::OutputError) -> ExtractError {
    let message = err.to_string();
    let lower = message.to_lowercase();
    warn!("PDF extraction failed: {}", message);
    if lower.contains("encrypt") || lower.contains("password") || lower.contains("decrypt") {
        ExtractError::PasswordProtected
    } else {
        ExtractError::NotPdf
    }
}
