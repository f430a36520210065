//! Loan (service request) model and lifecycle rules.
//!
//! # Responsibility
//! - Define the loan aggregate with its per-document associations.
//! - Own the pure status rules shared by every store implementation.
//!
//! # Invariants
//! - A loan is `Returned` iff every association has `returned_at`.
//! - A loan is `PartiallyReturned` iff some, but not all, associations have
//!   `returned_at`.
//! - `Returned`, `Rejected` and `Cancelled` are terminal.
//! - `returned_at` on the loan is set only together with `Returned`.

use crate::model::document::DocumentId;
use crate::model::user::UserId;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::error::Error;
use std::fmt::{Display, Formatter};
use uuid::Uuid;

pub type LoanId = Uuid;
pub type ReturnRecordId = Uuid;

/// Loan lifecycle state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LoanStatus {
    /// Requested, waiting for an archivist.
    Pending,
    /// Documents handed over to the requester.
    Delivered,
    /// Some documents are back.
    #[serde(rename = "partial")]
    PartiallyReturned,
    /// Every document is back.
    Returned,
    /// Due date passed with documents still out.
    Expired,
    Rejected,
    Cancelled,
}

impl LoanStatus {
    pub const ALL: [LoanStatus; 7] = [
        LoanStatus::Pending,
        LoanStatus::Delivered,
        LoanStatus::PartiallyReturned,
        LoanStatus::Returned,
        LoanStatus::Expired,
        LoanStatus::Rejected,
        LoanStatus::Cancelled,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Delivered => "delivered",
            Self::PartiallyReturned => "partial",
            Self::Returned => "returned",
            Self::Expired => "expired",
            Self::Rejected => "rejected",
            Self::Cancelled => "cancelled",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value.trim() {
            "pending" => Some(Self::Pending),
            "delivered" => Some(Self::Delivered),
            "partial" => Some(Self::PartiallyReturned),
            "returned" => Some(Self::Returned),
            "expired" => Some(Self::Expired),
            "rejected" => Some(Self::Rejected),
            "cancelled" => Some(Self::Cancelled),
            _ => None,
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            Self::Pending => "Pendiente",
            Self::Delivered => "Entregado",
            Self::PartiallyReturned => "Devolución parcial",
            Self::Returned => "Devuelto",
            Self::Expired => "Vencido",
            Self::Rejected => "Rechazado",
            Self::Cancelled => "Cancelado",
        }
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Returned | Self::Rejected | Self::Cancelled)
    }

    /// Documents are physically out with the requester.
    pub fn is_outstanding(self) -> bool {
        matches!(
            self,
            Self::Delivered | Self::PartiallyReturned | Self::Expired
        )
    }

    /// States that reserve their unreturned documents against new requests.
    pub fn holds_documents(self) -> bool {
        self == Self::Pending || self.is_outstanding()
    }

    /// Whether the lifecycle permits moving from `self` to `next`.
    pub fn can_transition(self, next: LoanStatus) -> bool {
        use LoanStatus::*;
        matches!(
            (self, next),
            (Pending, Delivered)
                | (Pending, Rejected)
                | (Pending, Cancelled)
                | (Delivered, PartiallyReturned)
                | (Delivered, Returned)
                | (Delivered, Expired)
                | (PartiallyReturned, Returned)
                | (PartiallyReturned, Expired)
                | (Expired, PartiallyReturned)
                | (Expired, Returned)
        )
    }
}

impl Display for LoanStatus {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Per-document association inside one loan.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoanDocument {
    pub document_id: DocumentId,
    pub returned_at: Option<i64>,
    pub return_notes: Option<String>,
}

impl LoanDocument {
    pub fn outstanding(document_id: DocumentId) -> Self {
        Self {
            document_id,
            returned_at: None,
            return_notes: None,
        }
    }

    pub fn is_returned(&self) -> bool {
        self.returned_at.is_some()
    }
}

/// Loan aggregate.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Loan {
    pub id: LoanId,
    pub requester_id: UserId,
    pub purpose: String,
    pub status: LoanStatus,
    pub created_at: i64,
    pub due_at: i64,
    pub delivered_at: Option<i64>,
    /// Set when the last document comes back.
    pub returned_at: Option<i64>,
    /// Staff account that delivered, rejected or cancelled the request.
    pub resolved_by: Option<UserId>,
    pub rejection_reason: Option<String>,
    pub documents: Vec<LoanDocument>,
}

/// Outcome of comparing associations against the return invariant.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReturnProgress {
    None,
    Partial,
    Complete,
}

impl Loan {
    /// Creates a pending request for the given documents.
    pub fn new_request(
        requester_id: UserId,
        purpose: impl Into<String>,
        document_ids: &[DocumentId],
        created_at: i64,
        due_at: i64,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            requester_id,
            purpose: purpose.into(),
            status: LoanStatus::Pending,
            created_at,
            due_at,
            delivered_at: None,
            returned_at: None,
            resolved_by: None,
            rejection_reason: None,
            documents: document_ids
                .iter()
                .copied()
                .map(LoanDocument::outstanding)
                .collect(),
        }
    }

    /// Validates request-level invariants.
    pub fn validate(&self) -> Result<(), LoanValidationError> {
        if self.documents.is_empty() {
            return Err(LoanValidationError::NoDocuments);
        }
        let mut seen = HashSet::new();
        for association in &self.documents {
            if !seen.insert(association.document_id) {
                return Err(LoanValidationError::DuplicateDocument(
                    association.document_id,
                ));
            }
        }
        if self.due_at <= self.created_at {
            return Err(LoanValidationError::DueBeforeCreation {
                created_at: self.created_at,
                due_at: self.due_at,
            });
        }
        if self.purpose.trim().is_empty() {
            return Err(LoanValidationError::EmptyPurpose);
        }
        Ok(())
    }

    pub fn returned_count(&self) -> usize {
        self.documents.iter().filter(|doc| doc.is_returned()).count()
    }

    pub fn pending_documents(&self) -> impl Iterator<Item = &LoanDocument> {
        self.documents.iter().filter(|doc| !doc.is_returned())
    }

    pub fn contains_document(&self, document_id: DocumentId) -> bool {
        self.documents
            .iter()
            .any(|doc| doc.document_id == document_id)
    }

    pub fn return_progress(&self) -> ReturnProgress {
        return_progress(&self.documents)
    }

    /// Status implied by the associations.
    ///
    /// Keeps the current status when nothing has been returned yet.
    pub fn derive_return_status(&self) -> LoanStatus {
        match self.return_progress() {
            ReturnProgress::Complete => LoanStatus::Returned,
            ReturnProgress::Partial => LoanStatus::PartiallyReturned,
            ReturnProgress::None => self.status,
        }
    }

    /// Whether documents are out past the due date.
    ///
    /// Already-expired loans are not overdue again.
    pub fn is_overdue(&self, now: i64) -> bool {
        matches!(
            self.status,
            LoanStatus::Delivered | LoanStatus::PartiallyReturned
        ) && self.due_at < now
    }
}

/// Classifies a set of associations against the return invariant.
pub fn return_progress(documents: &[LoanDocument]) -> ReturnProgress {
    let returned = documents.iter().filter(|doc| doc.is_returned()).count();
    if documents.is_empty() || returned == 0 {
        ReturnProgress::None
    } else if returned == documents.len() {
        ReturnProgress::Complete
    } else {
        ReturnProgress::Partial
    }
}

/// Append-only receipt for one returned document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReturnRecord {
    pub id: ReturnRecordId,
    pub loan_id: LoanId,
    pub document_id: DocumentId,
    pub received_at: i64,
    pub received_by: UserId,
    /// Opaque signature image bytes.
    pub signature: Vec<u8>,
    pub notes: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LoanValidationError {
    NoDocuments,
    DuplicateDocument(DocumentId),
    DueBeforeCreation { created_at: i64, due_at: i64 },
    EmptyPurpose,
}

impl Display for LoanValidationError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::NoDocuments => write!(f, "a loan needs at least one document"),
            Self::DuplicateDocument(id) => write!(f, "document listed twice: {id}"),
            Self::DueBeforeCreation { created_at, due_at } => write!(
                f,
                "due date {due_at} must be after creation time {created_at}"
            ),
            Self::EmptyPurpose => write!(f, "loan purpose must not be empty"),
        }
    }
}

impl Error for LoanValidationError {}
