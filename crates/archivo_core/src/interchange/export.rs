//! Paged CSV export.

use crate::interchange::CSV_HEADER;
use crate::model::document::Document;
use crate::repo::document_repo::{DocumentFilter, DocumentRepository};
use crate::repo::{Page, RepoError};
use log::info;
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::io::Write;

#[derive(Debug)]
pub enum ExportError {
    Repo(RepoError),
    Csv(csv::Error),
    Io(std::io::Error),
}

impl Display for ExportError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Repo(err) => write!(f, "{err}"),
            Self::Csv(err) => write!(f, "csv write failed: {err}"),
            Self::Io(err) => write!(f, "export io failed: {err}"),
        }
    }
}

impl Error for ExportError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Repo(err) => Some(err),
            Self::Csv(err) => Some(err),
            Self::Io(err) => Some(err),
        }
    }
}

impl From<RepoError> for ExportError {
    fn from(value: RepoError) -> Self {
        Self::Repo(value)
    }
}

impl From<csv::Error> for ExportError {
    fn from(value: csv::Error) -> Self {
        Self::Csv(value)
    }
}

impl From<std::io::Error> for ExportError {
    fn from(value: std::io::Error) -> Self {
        Self::Io(value)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExportSummary {
    pub rows: u64,
    /// Listing pages read from the store, including the final short page.
    pub batches: u32,
}

/// Streams every document matching `filter` to `writer` as CSV.
///
/// Pages of `batch_size` rows are read until a short page; the repository
/// may clamp the page size to its own maximum.
pub fn export_documents<R, W>(
    repo: &R,
    filter: &DocumentFilter,
    writer: W,
    batch_size: u32,
) -> Result<ExportSummary, ExportError>
where
    R: DocumentRepository + ?Sized,
    W: Write,
{
    let mut csv_writer = csv::Writer::from_writer(writer);
    csv_writer.write_record(CSV_HEADER)?;

    let mut summary = ExportSummary { rows: 0, batches: 0 };
    let mut offset = 0_u32;
    loop {
        let page = repo.list_documents(filter, Page::new(batch_size.max(1), offset))?;
        summary.batches += 1;
        for document in &page.rows {
            csv_writer.write_record(document_record(document))?;
        }
        let fetched = page.rows.len() as u32;
        summary.rows += u64::from(fetched);
        if fetched < page.applied_limit {
            break;
        }
        offset += fetched;
    }
    csv_writer.flush()?;

    info!(
        "event=inventory_export module=interchange status=ok rows={} batches={}",
        summary.rows, summary.batches
    );
    Ok(summary)
}

fn document_record(document: &Document) -> [String; 14] {
    [
        document.code.clone(),
        document.title.clone(),
        text(&document.series),
        text(&document.unit),
        number(document.box_number),
        number(document.volume_number),
        number(document.folio_start),
        number(document.folio_end),
        text(&document.record_date),
        text(&document.shelf),
        text(&document.body),
        text(&document.tray),
        document.conservation.as_str().to_string(),
        if document.missing_volume { "si" } else { "no" }.to_string(),
    ]
}

fn text(value: &Option<String>) -> String {
    value.clone().unwrap_or_default()
}

fn number(value: Option<i64>) -> String {
    value.map(|number| number.to_string()).unwrap_or_default()
}
