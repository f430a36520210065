//! Spreadsheet interchange for the inventory.
//!
//! # Responsibility
//! - Export filtered inventory rows as CSV, reading the store in pages.
//! - Parse and validate CSV rows into document drafts for bulk import.
//!
//! # Invariants
//! - Export always writes [`CSV_HEADER`] first.
//! - Import errors carry the 1-based data row number (header excluded).

pub mod export;
pub mod import;

pub use export::{export_documents, ExportError, ExportSummary};
pub use import::{import_documents, ImportError};

/// Column order of exported files.
pub const CSV_HEADER: [&str; 14] = [
    "code",
    "title",
    "series",
    "unit",
    "box_number",
    "volume_number",
    "folio_start",
    "folio_end",
    "record_date",
    "shelf",
    "body",
    "tray",
    "conservation",
    "missing_volume",
];
