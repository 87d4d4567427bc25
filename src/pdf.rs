// src/pdf.rs

use lopdf::{Dictionary, Document};
use std::borrow::Cow;
use thiserror::Error;
use tracing::{info, warn};

#[derive(Debug, Error)]
pub enum TrimError {
    #[error("failed to parse PDF: {0}")]
    Parse(String),
    #[error("PDF has no pages")]
    NoPages,
    #[error("failed to write trimmed PDF: {0}")]
    Write(String),
}

/// What happened to the document before it went out for extraction.
#[derive(Debug)]
pub enum TrimReport {
    /// Already within the page limit; sent as is.
    Unchanged { pages: usize },
    /// Only the first `kept` of `total` pages were kept.
    Trimmed { kept: usize, total: usize },
    /// Could not be paged; the original bytes were sent instead.
    Failed(TrimError),
}

/// A document ready to hand to the extraction collaborator. Owns its bytes
/// for the length of one invocation.
#[derive(Debug)]
pub struct PreparedPdf {
    pub file_name: String,
    pub bytes: Vec<u8>,
    pub report: TrimReport,
}

/// Keep only the first `max_pages` pages of `pdf_bytes`.
///
/// Returns the rewritten document and `(kept, total)`. A document that is
/// already short enough comes back borrowed, untouched.
pub fn trim_pdf(
    pdf_bytes: &[u8],
    max_pages: usize,
) -> Result<(Cow<'_, [u8]>, usize, usize), TrimError> {
    let mut doc = Document::load_mem(pdf_bytes).map_err(|e| TrimError::Parse(e.to_string()))?;

    let pages = doc.get_pages();
    let total = pages.len();
    if total == 0 {
        return Err(TrimError::NoPages);
    }
    if total <= max_pages {
        return Ok((Cow::Borrowed(pdf_bytes), total, total));
    }

    let surplus: Vec<u32> = pages
        .keys()
        .copied()
        .filter(|&n| n as usize > max_pages)
        .collect();
    doc.delete_pages(&surplus);
    doc.prune_objects();
    doc.renumber_objects();

    let mut out = Vec::with_capacity(pdf_bytes.len());
    doc.save_to(&mut out)
        .map_err(|e| TrimError::Write(e.to_string()))?;

    let kept = total.min(max_pages);
    info!(kept, total, bytes = out.len(), "Trimmed PDF");
    Ok((Cow::Owned(out), kept, total))
}

/// Trim for extraction, falling back to the untouched document when it
/// cannot be paged.
pub fn prepare_for_extraction(file_name: &str, pdf_bytes: Vec<u8>, max_pages: usize) -> PreparedPdf {
    let trimmed = trim_pdf(&pdf_bytes, max_pages).map(|(out, kept, total)| match out {
        Cow::Owned(bytes) => (Some(bytes), kept, total),
        Cow::Borrowed(_) => (None, kept, total),
    });
    let (bytes, report) = match trimmed {
        Ok((None, _, total)) => (pdf_bytes, TrimReport::Unchanged { pages: total }),
        Ok((Some(bytes), kept, total)) => (bytes, TrimReport::Trimmed { kept, total }),
        Err(e) => {
            warn!(error = %e, file = %file_name, "Could not trim PDF, sending original");
            (pdf_bytes, TrimReport::Failed(e))
        }
    };
    PreparedPdf {
        file_name: file_name.to_string(),
        bytes,
        report,
    }
}

/// Result of pulling plain text out of a PDF for text-only backends.
#[derive(Debug)]
pub enum PdfText {
    Text(String),
    /// Image-only pages; a vision-capable backend is needed.
    Scanned,
    Error(String),
}

/// Below this many non-whitespace characters the PDF is treated as scanned.
const MIN_TEXT_CHARS: usize = 30;

pub fn extract_text(pdf_bytes: &[u8]) -> PdfText {
    let doc = match Document::load_mem(pdf_bytes) {
        Ok(d) => d,
        Err(e) => return PdfText::Error(format!("Failed to parse PDF: {e}")),
    };

    if looks_scanned(&doc) {
        info!("PDF structural check: likely scanned");
        return PdfText::Scanned;
    }

    match pdf_extract::extract_text_from_mem(pdf_bytes) {
        Ok(text) => {
            let meaningful = text.chars().filter(|c| !c.is_whitespace()).count();
            if meaningful < MIN_TEXT_CHARS {
                info!(chars = meaningful, "Extracted text too short, treating as scanned");
                PdfText::Scanned
            } else {
                PdfText::Text(text)
            }
        }
        Err(e) => {
            warn!(error = %e, "pdf-extract failed");
            PdfText::Error(e.to_string())
        }
    }
}

/// A page with XObject images but no fonts is almost certainly a scan.
/// The document counts as scanned when at least 80% of pages are.
fn looks_scanned(doc: &Document) -> bool {
    let pages = doc.get_pages();
    if pages.is_empty() {
        return false;
    }

    let image_only = pages
        .values()
        .filter_map(|id| doc.get_object(*id).ok())
        .filter_map(|obj| obj.as_dict().ok())
        .filter(|page| {
            has_resource(doc, page, b"XObject".as_slice()) && !has_resource(doc, page, b"Font".as_slice())
        })
        .count();

    let ratio = image_only as f64 / pages.len() as f64;
    info!(
        total_pages = pages.len(),
        image_only,
        ratio = format!("{ratio:.2}"),
        "Scanned-page analysis"
    );
    ratio >= 0.8
}

/// Whether the page's `Resources` carries a non-empty `key` dictionary.
fn has_resource(doc: &Document, page: &Dictionary, key: &[u8]) -> bool {
    page.get(b"Resources")
        .ok()
        .and_then(|r| doc.dereference(r).ok())
        .and_then(|(_, resolved)| resolved.as_dict().ok())
        .and_then(|res| res.get(key).ok())
        .and_then(|x| doc.dereference(x).ok())
        .and_then(|(_, resolved)| resolved.as_dict().ok())
        .is_some_and(|d| !d.is_empty())
}
