//! Inventory document model.
//!
//! # Responsibility
//! - Define the catalogued physical item and its location metadata.
//! - Validate drafts before they reach any store.
//!
//! # Invariants
//! - `code` is trimmed, non-empty and unique across the inventory.
//! - `folio_end >= folio_start` when both are set.
//! - `record_date` is `YYYY-MM-DD` when set.

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::error::Error;
use std::fmt::{Display, Formatter};
use uuid::Uuid;

pub type DocumentId = Uuid;

static RECORD_DATE_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^\d{4}-(0[1-9]|1[0-2])-(0[1-9]|[12]\d|3[01])$").expect("valid date regex")
});

/// Physical conservation medium.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Conservation {
    #[serde(rename = "papel")]
    Paper,
    Digital,
    #[serde(rename = "mixto")]
    Mixed,
    Microfilm,
}

impl Conservation {
    pub const ALL: [Conservation; 4] = [
        Conservation::Paper,
        Conservation::Digital,
        Conservation::Mixed,
        Conservation::Microfilm,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Paper => "papel",
            Self::Digital => "digital",
            Self::Mixed => "mixto",
            Self::Microfilm => "microfilm",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_lowercase().as_str() {
            "papel" | "paper" => Some(Self::Paper),
            "digital" => Some(Self::Digital),
            "mixto" | "mixed" => Some(Self::Mixed),
            "microfilm" => Some(Self::Microfilm),
            _ => None,
        }
    }
}

/// Catalogued archival item.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Document {
    pub id: DocumentId,
    pub code: String,
    pub title: String,
    pub series: Option<String>,
    /// Producing organizational unit.
    pub unit: Option<String>,
    pub box_number: Option<i64>,
    pub volume_number: Option<i64>,
    pub folio_start: Option<i64>,
    pub folio_end: Option<i64>,
    pub record_date: Option<String>,
    pub shelf: Option<String>,
    pub body: Option<String>,
    pub tray: Option<String>,
    pub conservation: Conservation,
    pub missing_volume: bool,
    pub created_at: i64,
    pub updated_at: i64,
}

/// Writable document fields, used for create, update and import.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DocumentDraft {
    pub code: String,
    pub title: String,
    pub series: Option<String>,
    pub unit: Option<String>,
    pub box_number: Option<i64>,
    pub volume_number: Option<i64>,
    pub folio_start: Option<i64>,
    pub folio_end: Option<i64>,
    pub record_date: Option<String>,
    pub shelf: Option<String>,
    pub body: Option<String>,
    pub tray: Option<String>,
    pub conservation: Conservation,
    pub missing_volume: bool,
}

impl DocumentDraft {
    /// Draft with only the mandatory fields set.
    pub fn new(code: impl Into<String>, title: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            title: title.into(),
            series: None,
            unit: None,
            box_number: None,
            volume_number: None,
            folio_start: None,
            folio_end: None,
            record_date: None,
            shelf: None,
            body: None,
            tray: None,
            conservation: Conservation::Paper,
            missing_volume: false,
        }
    }

    /// Trims text fields and turns blank optionals into `None`.
    pub fn normalized(mut self) -> Self {
        self.code = self.code.trim().to_string();
        self.title = self.title.trim().to_string();
        for field in [
            &mut self.series,
            &mut self.unit,
            &mut self.record_date,
            &mut self.shelf,
            &mut self.body,
            &mut self.tray,
        ] {
            *field = field
                .take()
                .map(|value| value.trim().to_string())
                .filter(|value| !value.is_empty());
        }
        self
    }

    pub fn validate(&self) -> Result<(), DocumentValidationError> {
        if self.code.trim().is_empty() {
            return Err(DocumentValidationError::EmptyCode);
        }
        if self.title.trim().is_empty() {
            return Err(DocumentValidationError::EmptyTitle);
        }
        for (field, value) in [
            ("box_number", self.box_number),
            ("volume_number", self.volume_number),
            ("folio_start", self.folio_start),
            ("folio_end", self.folio_end),
        ] {
            if matches!(value, Some(number) if number < 0) {
                return Err(DocumentValidationError::NegativeNumber(field));
            }
        }
        if let (Some(start), Some(end)) = (self.folio_start, self.folio_end) {
            if end < start {
                return Err(DocumentValidationError::FolioRangeInverted { start, end });
            }
        }
        if let Some(date) = self.record_date.as_deref() {
            if !RECORD_DATE_RE.is_match(date.trim()) {
                return Err(DocumentValidationError::InvalidRecordDate(date.to_string()));
            }
        }
        Ok(())
    }
}

impl Document {
    /// Projects the writable fields back into a draft.
    pub fn to_draft(&self) -> DocumentDraft {
        DocumentDraft {
            code: self.code.clone(),
            title: self.title.clone(),
            series: self.series.clone(),
            unit: self.unit.clone(),
            box_number: self.box_number,
            volume_number: self.volume_number,
            folio_start: self.folio_start,
            folio_end: self.folio_end,
            record_date: self.record_date.clone(),
            shelf: self.shelf.clone(),
            body: self.body.clone(),
            tray: self.tray.clone(),
            conservation: self.conservation,
            missing_volume: self.missing_volume,
        }
    }

    /// Human-readable shelf location, e.g. `E3 / C2 / B1`.
    pub fn location_label(&self) -> Option<String> {
        let parts = [&self.shelf, &self.body, &self.tray]
            .into_iter()
            .flatten()
            .map(String::as_str)
            .collect::<Vec<_>>();
        if parts.is_empty() {
            None
        } else {
            Some(parts.join(" / "))
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DocumentValidationError {
    EmptyCode,
    EmptyTitle,
    NegativeNumber(&'static str),
    FolioRangeInverted { start: i64, end: i64 },
    InvalidRecordDate(String),
}

impl Display for DocumentValidationError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::EmptyCode => write!(f, "document code must not be empty"),
            Self::EmptyTitle => write!(f, "document title must not be empty"),
            Self::NegativeNumber(field) => write!(f, "`{field}` must not be negative"),
            Self::FolioRangeInverted { start, end } => {
                write!(f, "folio range is inverted: {start} > {end}")
            }
            Self::InvalidRecordDate(value) => {
                write!(f, "record date must be YYYY-MM-DD, got `{value}`")
            }
        }
    }
}

impl Error for DocumentValidationError {}

#[cfg(test)]
mod tests {
    use super::{Conservation, DocumentDraft, DocumentValidationError};

    #[test]
    fn normalized_trims_and_drops_blank_optionals() {
        let mut draft = DocumentDraft::new("  AC-001 ", " Actas ");
        draft.series = Some("   ".to_string());
        draft.unit = Some(" Secretaría ".to_string());
        let draft = draft.normalized();
        assert_eq!(draft.code, "AC-001");
        assert_eq!(draft.title, "Actas");
        assert_eq!(draft.series, None);
        assert_eq!(draft.unit.as_deref(), Some("Secretaría"));
    }

    #[test]
    fn validate_rejects_inverted_folios_and_bad_dates() {
        let mut draft = DocumentDraft::new("AC-001", "Actas");
        draft.folio_start = Some(10);
        draft.folio_end = Some(2);
        assert_eq!(
            draft.validate().unwrap_err(),
            DocumentValidationError::FolioRangeInverted { start: 10, end: 2 }
        );

        draft.folio_end = Some(20);
        draft.record_date = Some("2024-13-01".to_string());
        assert!(matches!(
            draft.validate().unwrap_err(),
            DocumentValidationError::InvalidRecordDate(_)
        ));

        draft.record_date = Some("2024-02-29".to_string());
        draft.validate().unwrap();
    }

    #[test]
    fn conservation_parses_spanish_and_english() {
        assert_eq!(Conservation::parse("Papel"), Some(Conservation::Paper));
        assert_eq!(Conservation::parse("mixed"), Some(Conservation::Mixed));
        assert_eq!(Conservation::parse("vellum"), None);
    }

    #[test]
    fn conservation_serde_names_match_stored_values() {
        for conservation in Conservation::ALL {
            let json = serde_json::to_string(&conservation).unwrap();
            assert_eq!(json, format!("\"{}\"", conservation.as_str()));
        }
    }
}
