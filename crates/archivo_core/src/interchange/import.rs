//! CSV import parsing.
//!
//! Columns are located by header name, so files edited in a spreadsheet
//! may reorder or drop optional columns. `code` and `title` are required.

use crate::interchange::CSV_HEADER;
use crate::model::document::{Conservation, DocumentDraft, DocumentValidationError};
use csv::StringRecord;
use std::collections::HashMap;
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::io::Read;

#[derive(Debug)]
pub enum ImportError {
    /// Malformed CSV; `row` is `None` for header-level failures.
    Csv { row: Option<usize>, source: csv::Error },
    MissingColumn(&'static str),
    InvalidValue {
        row: usize,
        column: &'static str,
        value: String,
    },
    InvalidDocument {
        row: usize,
        source: DocumentValidationError,
    },
    DuplicateCode {
        row: usize,
        code: String,
        first_row: usize,
    },
    Empty,
}

impl ImportError {
    /// 1-based data row the error refers to, if any.
    pub fn row(&self) -> Option<usize> {
        match self {
            Self::Csv { row, .. } => *row,
            Self::InvalidValue { row, .. }
            | Self::InvalidDocument { row, .. }
            | Self::DuplicateCode { row, .. } => Some(*row),
            Self::MissingColumn(_) | Self::Empty => None,
        }
    }
}

impl Display for ImportError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Csv {
                row: Some(row),
                source,
            } => write!(f, "row {row}: malformed csv: {source}"),
            Self::Csv { row: None, source } => write!(f, "malformed csv header: {source}"),
            Self::MissingColumn(column) => write!(f, "missing required column `{column}`"),
            Self::InvalidValue { row, column, value } => {
                write!(f, "row {row}: invalid value `{value}` for `{column}`")
            }
            Self::InvalidDocument { row, source } => write!(f, "row {row}: {source}"),
            Self::DuplicateCode {
                row,
                code,
                first_row,
            } => write!(f, "row {row}: code `{code}` already used in row {first_row}"),
            Self::Empty => write!(f, "file contains no data rows"),
        }
    }
}

impl Error for ImportError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Csv { source, .. } => Some(source),
            Self::InvalidDocument { source, .. } => Some(source),
            _ => None,
        }
    }
}

/// Parses every data row into a validated, normalized draft.
///
/// Fails on the first bad row. Codes must be unique within the file.
pub fn import_documents<R: Read>(reader: R) -> Result<Vec<DocumentDraft>, ImportError> {
    let mut csv_reader = csv::ReaderBuilder::new()
        .has_headers(true)
        .trim(csv::Trim::All)
        .flexible(true)
        .from_reader(reader);
    let headers = csv_reader
        .headers()
        .map_err(|source| ImportError::Csv { row: None, source })?
        .clone();
    let columns = ColumnIndex::from_headers(&headers)?;

    let mut drafts = Vec::new();
    let mut first_seen: HashMap<String, usize> = HashMap::new();
    for (index, result) in csv_reader.records().enumerate() {
        let row = index + 1;
        let record = result.map_err(|source| ImportError::Csv {
            row: Some(row),
            source,
        })?;
        if record.iter().all(str::is_empty) {
            continue;
        }

        let draft = columns.draft(&record, row)?.normalized();
        draft
            .validate()
            .map_err(|source| ImportError::InvalidDocument { row, source })?;
        if let Some(first_row) = first_seen.insert(draft.code.clone(), row) {
            return Err(ImportError::DuplicateCode {
                row,
                code: draft.code,
                first_row,
            });
        }
        drafts.push(draft);
    }

    if drafts.is_empty() {
        return Err(ImportError::Empty);
    }
    Ok(drafts)
}

struct ColumnIndex {
    positions: HashMap<&'static str, usize>,
}

impl ColumnIndex {
    fn from_headers(headers: &StringRecord) -> Result<Self, ImportError> {
        let mut positions = HashMap::new();
        for (position, header) in headers.iter().enumerate() {
            let header = header.trim().trim_start_matches('\u{feff}').to_lowercase();
            if let Some(column) = CSV_HEADER.iter().find(|column| **column == header) {
                positions.entry(*column).or_insert(position);
            }
        }
        for required in ["code", "title"] {
            if !positions.contains_key(required) {
                return Err(ImportError::MissingColumn(required));
            }
        }
        Ok(Self { positions })
    }

    fn text(&self, record: &StringRecord, column: &'static str) -> Option<String> {
        self.positions
            .get(column)
            .and_then(|position| record.get(*position))
            .map(str::to_string)
            .filter(|value| !value.is_empty())
    }

    fn number(
        &self,
        record: &StringRecord,
        column: &'static str,
        row: usize,
    ) -> Result<Option<i64>, ImportError> {
        self.text(record, column)
            .map(|value| {
                value
                    .parse::<i64>()
                    .map_err(|_| ImportError::InvalidValue { row, column, value })
            })
            .transpose()
    }

    fn draft(&self, record: &StringRecord, row: usize) -> Result<DocumentDraft, ImportError> {
        let mut draft = DocumentDraft::new(
            self.text(record, "code").unwrap_or_default(),
            self.text(record, "title").unwrap_or_default(),
        );
        draft.series = self.text(record, "series");
        draft.unit = self.text(record, "unit");
        draft.box_number = self.number(record, "box_number", row)?;
        draft.volume_number = self.number(record, "volume_number", row)?;
        draft.folio_start = self.number(record, "folio_start", row)?;
        draft.folio_end = self.number(record, "folio_end", row)?;
        draft.record_date = self.text(record, "record_date");
        draft.shelf = self.text(record, "shelf");
        draft.body = self.text(record, "body");
        draft.tray = self.text(record, "tray");
        if let Some(value) = self.text(record, "conservation") {
            draft.conservation = Conservation::parse(&value).ok_or(ImportError::InvalidValue {
                row,
                column: "conservation",
                value,
            })?;
        }
        if let Some(value) = self.text(record, "missing_volume") {
            draft.missing_volume = parse_flag(&value).ok_or(ImportError::InvalidValue {
                row,
                column: "missing_volume",
                value,
            })?;
        }
        Ok(draft)
    }
}

fn parse_flag(value: &str) -> Option<bool> {
    match value.to_lowercase().as_str() {
        "si" | "sí" | "s" | "yes" | "y" | "true" | "1" | "x" => Some(true),
        "no" | "n" | "false" | "0" => Some(false),
        _ => None,
    }
}
