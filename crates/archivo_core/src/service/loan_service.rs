//! Loan lifecycle use-cases.
//!
//! # Responsibility
//! - Accept loan requests and move them through delivery, rejection,
//!   cancellation, returns and expiry.
//! - Enforce who may act on a loan and who may see it.
//!
//! # Invariants
//! - A document can be reserved by at most one open loan.
//! - Return batches are validated completely before anything is written;
//!   a document already returned fails the whole batch.
//! - The post-return status comes from the stored associations, never from
//!   the caller's view of the loan.
//! - Accounts without `ViewAllLoans` only ever see their own loans.

use crate::access::{ensure_capability, AccessDenied, Capability};
use crate::model::document::DocumentId;
use crate::model::loan::{Loan, LoanId, LoanStatus, LoanValidationError, ReturnRecord};
use crate::model::role::Role;
use crate::model::user::{Session, UserId};
use crate::repo::loan_repo::{LoanListQuery, LoanRepository, ReturnWrite, StatusUpdate};
use crate::repo::RepoError;
use crate::session::clock::{duration_ms, SharedClock};
use log::{info, warn};
use std::collections::HashSet;
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::time::Duration;

pub type LoanServiceResult<T> = Result<T, LoanServiceError>;

#[derive(Debug)]
pub enum LoanServiceError {
    AccessDenied(AccessDenied),
    LoanNotFound(LoanId),
    UnknownDocuments(Vec<DocumentId>),
    /// Documents reserved by another open loan.
    DocumentsUnavailable(Vec<DocumentId>),
    InvalidTransition { from: LoanStatus, to: LoanStatus },
    /// The loan changed status between read and write.
    StatusChanged(LoanId),
    /// Only the requester or an administrator may cancel.
    NotRequester,
    MissingReason,
    EmptySelection,
    MissingSignature,
    /// The named receiver may not accept returns.
    InvalidReceiver(UserId),
    DocumentNotInLoan(DocumentId),
    AlreadyReturned(Vec<DocumentId>),
    Validation(LoanValidationError),
    Repo(RepoError),
}

impl LoanServiceError {
    pub fn user_message(&self) -> String {
        match self {
            Self::AccessDenied(_) => "No tiene permisos para realizar esta acción.".to_string(),
            Self::LoanNotFound(_) => "El préstamo no existe.".to_string(),
            Self::UnknownDocuments(ids) => {
                format!("{} documento(s) no existen en el inventario.", ids.len())
            }
            Self::DocumentsUnavailable(ids) => {
                format!("{} documento(s) ya están prestados o reservados.", ids.len())
            }
            Self::InvalidTransition { from, to } => format!(
                "Un préstamo {} no puede pasar a {}.",
                from.label().to_lowercase(),
                to.label().to_lowercase()
            ),
            Self::StatusChanged(_) => {
                "El préstamo fue modificado por otro usuario. Actualice e intente nuevamente."
                    .to_string()
            }
            Self::NotRequester => {
                "Solo el solicitante o un administrador puede cancelar la solicitud.".to_string()
            }
            Self::MissingReason => "Indique el motivo del rechazo.".to_string(),
            Self::EmptySelection => "Seleccione al menos un documento.".to_string(),
            Self::MissingSignature => "La firma de quien recibe es obligatoria.".to_string(),
            Self::InvalidReceiver(_) => {
                "Quien recibe debe ser personal autorizado a registrar devoluciones.".to_string()
            }
            Self::DocumentNotInLoan(_) => {
                "Uno de los documentos no pertenece a este préstamo.".to_string()
            }
            Self::AlreadyReturned(ids) => {
                format!("{} documento(s) ya fueron devueltos.", ids.len())
            }
            Self::Validation(err) => format!("Solicitud inválida: {err}."),
            Self::Repo(_) => "No se pudo completar la operación. Intente nuevamente.".to_string(),
        }
    }
}

impl Display for LoanServiceError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::AccessDenied(err) => write!(f, "{err}"),
            Self::LoanNotFound(id) => write!(f, "loan not found: {id}"),
            Self::UnknownDocuments(ids) => write!(f, "unknown documents: {}", join_ids(ids)),
            Self::DocumentsUnavailable(ids) => {
                write!(f, "documents already on loan: {}", join_ids(ids))
            }
            Self::InvalidTransition { from, to } => {
                write!(f, "invalid loan transition: {from} -> {to}")
            }
            Self::StatusChanged(id) => write!(f, "loan {id} changed status concurrently"),
            Self::NotRequester => write!(f, "only the requester or an admin may cancel"),
            Self::MissingReason => write!(f, "rejection reason is required"),
            Self::EmptySelection => write!(f, "no documents selected"),
            Self::MissingSignature => write!(f, "receiver signature is required"),
            Self::InvalidReceiver(id) => write!(f, "user {id} may not receive returns"),
            Self::DocumentNotInLoan(id) => write!(f, "document {id} is not part of the loan"),
            Self::AlreadyReturned(ids) => {
                write!(f, "documents already returned: {}", join_ids(ids))
            }
            Self::Validation(err) => write!(f, "{err}"),
            Self::Repo(err) => write!(f, "{err}"),
        }
    }
}

impl Error for LoanServiceError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::AccessDenied(err) => Some(err),
            Self::Validation(err) => Some(err),
            Self::Repo(err) => Some(err),
            _ => None,
        }
    }
}

impl From<RepoError> for LoanServiceError {
    fn from(value: RepoError) -> Self {
        match value {
            RepoError::NotFound { entity: "loan", id } => Self::LoanNotFound(id),
            RepoError::LoanValidation(err) => Self::Validation(err),
            other => Self::Repo(other),
        }
    }
}

impl From<AccessDenied> for LoanServiceError {
    fn from(value: AccessDenied) -> Self {
        Self::AccessDenied(value)
    }
}

impl From<LoanValidationError> for LoanServiceError {
    fn from(value: LoanValidationError) -> Self {
        Self::Validation(value)
    }
}

/// Loan request as submitted by a user.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewLoanRequest {
    pub document_ids: Vec<DocumentId>,
    pub purpose: String,
    /// Defaults to the configured loan period from now.
    pub due_at: Option<i64>,
}

/// Documents handed back in one visit, with the receiver's signature.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReturnBatch {
    pub document_ids: Vec<DocumentId>,
    pub received_by: UserId,
    /// Signature image bytes captured at the desk.
    pub signature: Vec<u8>,
    pub notes: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReturnOutcome {
    pub loan_id: LoanId,
    pub status: LoanStatus,
    /// Set once every document is back.
    pub returned_at: Option<i64>,
    pub returned_now: usize,
    pub returned_total: usize,
    pub outstanding: usize,
}

pub struct LoanService<R: LoanRepository> {
    repo: R,
    clock: SharedClock,
    default_loan_period: Duration,
}

impl<R: LoanRepository> LoanService<R> {
    pub fn new(repo: R, clock: SharedClock, default_loan_period: Duration) -> Self {
        Self {
            repo,
            clock,
            default_loan_period,
        }
    }

    /// Creates a pending request on behalf of the signed-in account.
    pub fn request_loan(
        &self,
        requester: &Session,
        request: NewLoanRequest,
    ) -> LoanServiceResult<Loan> {
        ensure_capability(requester.role, Capability::RequestLoans)?;
        let now = self.clock.now_ms();
        let due_at = request.due_at.unwrap_or_else(|| {
            now.saturating_add(duration_ms(self.default_loan_period))
        });
        let loan = Loan::new_request(
            requester.user_id,
            request.purpose.trim(),
            &request.document_ids,
            now,
            due_at,
        );
        loan.validate()?;

        let missing = self.repo.missing_documents(&request.document_ids)?;
        if !missing.is_empty() {
            return Err(LoanServiceError::UnknownDocuments(missing));
        }
        let held = self.repo.held_documents(&request.document_ids)?;
        if !held.is_empty() {
            return Err(LoanServiceError::DocumentsUnavailable(held));
        }

        self.repo.create_loan(&loan)?;
        info!(
            "event=loan_request module=loan status=ok loan_id={} requester={} documents={}",
            loan.id,
            loan.requester_id,
            loan.documents.len()
        );
        Ok(loan)
    }

    /// Hands the documents over: `Pending -> Delivered`.
    pub fn deliver(&self, actor: &Session, loan_id: LoanId) -> LoanServiceResult<Loan> {
        ensure_capability(actor.role, Capability::DeliverLoans)?;
        let loan = self.load(loan_id)?;
        let mut update = StatusUpdate::new(loan.status, LoanStatus::Delivered);
        update.delivered_at = Some(self.clock.now_ms());
        update.resolved_by = Some(actor.user_id);
        self.transition(&loan, update, actor)
    }

    /// Declines a pending request with a reason shown to the requester.
    pub fn reject(
        &self,
        actor: &Session,
        loan_id: LoanId,
        reason: &str,
    ) -> LoanServiceResult<Loan> {
        ensure_capability(actor.role, Capability::ResolveRequests)?;
        let reason = reason.trim();
        if reason.is_empty() {
            return Err(LoanServiceError::MissingReason);
        }
        let loan = self.load(loan_id)?;
        let mut update = StatusUpdate::new(loan.status, LoanStatus::Rejected);
        update.resolved_by = Some(actor.user_id);
        update.rejection_reason = Some(reason.to_string());
        self.transition(&loan, update, actor)
    }

    /// Withdraws a pending request. Requester or administrator only.
    pub fn cancel(&self, actor: &Session, loan_id: LoanId) -> LoanServiceResult<Loan> {
        let loan = self.load_visible(actor, loan_id)?;
        if loan.requester_id != actor.user_id && actor.role != Role::Admin {
            return Err(LoanServiceError::NotRequester);
        }
        let mut update = StatusUpdate::new(loan.status, LoanStatus::Cancelled);
        update.resolved_by = Some(actor.user_id);
        self.transition(&loan, update, actor)
    }

    /// Records a partial or complete return.
    pub fn return_documents(
        &self,
        actor: &Session,
        loan_id: LoanId,
        batch: ReturnBatch,
    ) -> LoanServiceResult<ReturnOutcome> {
        ensure_capability(actor.role, Capability::ReceiveReturns)?;
        if batch.document_ids.is_empty() {
            return Err(LoanServiceError::EmptySelection);
        }
        if batch.signature.is_empty() {
            return Err(LoanServiceError::MissingSignature);
        }
        self.ensure_receiver(actor, batch.received_by)?;

        let loan = self.load(loan_id)?;
        if !loan.status.is_outstanding() {
            return Err(LoanServiceError::InvalidTransition {
                from: loan.status,
                to: LoanStatus::Returned,
            });
        }

        let mut seen = HashSet::new();
        let mut selected = Vec::with_capacity(batch.document_ids.len());
        let mut already_returned = Vec::new();
        for document_id in batch.document_ids {
            if !seen.insert(document_id) {
                continue;
            }
            let association = loan
                .documents
                .iter()
                .find(|doc| doc.document_id == document_id)
                .ok_or(LoanServiceError::DocumentNotInLoan(document_id))?;
            if association.is_returned() {
                already_returned.push(document_id);
            }
            selected.push(document_id);
        }
        if !already_returned.is_empty() {
            warn!(
                "event=loan_return module=loan status=rejected reason=already_returned loan_id={} count={}",
                loan_id,
                already_returned.len()
            );
            return Err(LoanServiceError::AlreadyReturned(already_returned));
        }

        let write = ReturnWrite {
            document_ids: selected,
            received_at: self.clock.now_ms(),
            received_by: batch.received_by,
            signature: batch.signature,
            notes: batch
                .notes
                .map(|notes| notes.trim().to_string())
                .filter(|notes| !notes.is_empty()),
        };
        let applied = match self.repo.apply_return(loan_id, &write) {
            Ok(applied) => applied,
            Err(RepoError::Conflict {
                entity: "loan document return" | "return record",
                key,
            }) => {
                warn!(
                    "event=loan_return module=loan status=rejected reason=concurrent_return loan_id={}",
                    loan_id
                );
                let document_id = key
                    .parse()
                    .map_err(|_| RepoError::InvalidData(format!("bad document id `{key}`")))?;
                return Err(LoanServiceError::AlreadyReturned(vec![document_id]));
            }
            Err(err) => return Err(err.into()),
        };

        let returned_total = applied
            .documents
            .iter()
            .filter(|doc| doc.is_returned())
            .count();
        let outcome = ReturnOutcome {
            loan_id,
            status: applied.status,
            returned_at: applied.returned_at,
            returned_now: write.document_ids.len(),
            returned_total,
            outstanding: applied.documents.len() - returned_total,
        };
        info!(
            "event=loan_return module=loan status=ok loan_id={} returned_now={} outstanding={} loan_status={} actor={}",
            loan_id,
            outcome.returned_now,
            outcome.outstanding,
            outcome.status,
            actor.user_id
        );
        Ok(outcome)
    }

    /// Marks every overdue delivered or partial loan as expired.
    pub fn expire_overdue(&self, now: i64) -> LoanServiceResult<Vec<LoanId>> {
        let mut expired = Vec::new();
        for loan in self.repo.list_overdue(now)? {
            let update = StatusUpdate::new(loan.status, LoanStatus::Expired);
            match self.repo.update_status(loan.id, &update) {
                Ok(()) => expired.push(loan.id),
                Err(RepoError::Conflict {
                    entity: "loan status",
                    ..
                }) => {
                    warn!(
                        "event=loan_expire module=loan status=skipped reason=status_changed loan_id={}",
                        loan.id
                    );
                }
                Err(err) => return Err(err.into()),
            }
        }
        if !expired.is_empty() {
            info!(
                "event=loan_expire module=loan status=ok count={}",
                expired.len()
            );
        }
        Ok(expired)
    }

    pub fn get_loan(&self, actor: &Session, loan_id: LoanId) -> LoanServiceResult<Loan> {
        self.load_visible(actor, loan_id)
    }

    /// Lists loans newest first. Requesters only see their own.
    pub fn list_loans(
        &self,
        actor: &Session,
        mut query: LoanListQuery,
    ) -> LoanServiceResult<Vec<Loan>> {
        if !actor.role.has(Capability::ViewAllLoans) {
            query.requester = Some(actor.user_id);
        }
        Ok(self.repo.list_loans(&query)?)
    }

    pub fn list_return_records(
        &self,
        actor: &Session,
        loan_id: LoanId,
    ) -> LoanServiceResult<Vec<ReturnRecord>> {
        self.load_visible(actor, loan_id)?;
        Ok(self.repo.list_return_records(loan_id)?)
    }

    /// The receiver is the acting user or another account allowed to
    /// receive returns.
    fn ensure_receiver(&self, actor: &Session, received_by: UserId) -> LoanServiceResult<()> {
        if received_by == actor.user_id {
            return Ok(());
        }
        match self.repo.receiver_role(received_by)? {
            Some(role) if role.has(Capability::ReceiveReturns) => Ok(()),
            _ => {
                warn!(
                    "event=loan_return module=loan status=rejected reason=invalid_receiver actor_id={} receiver_id={}",
                    actor.user_id, received_by
                );
                Err(LoanServiceError::InvalidReceiver(received_by))
            }
        }
    }

    fn load(&self, loan_id: LoanId) -> LoanServiceResult<Loan> {
        self.repo
            .get_loan(loan_id)?
            .ok_or(LoanServiceError::LoanNotFound(loan_id))
    }

    /// Loads a loan, hiding other accounts' loans from plain requesters.
    fn load_visible(&self, actor: &Session, loan_id: LoanId) -> LoanServiceResult<Loan> {
        let loan = self.load(loan_id)?;
        if loan.requester_id != actor.user_id && !actor.role.has(Capability::ViewAllLoans) {
            return Err(LoanServiceError::LoanNotFound(loan_id));
        }
        Ok(loan)
    }

    fn transition(
        &self,
        loan: &Loan,
        update: StatusUpdate,
        actor: &Session,
    ) -> LoanServiceResult<Loan> {
        if !loan.status.can_transition(update.next) {
            return Err(LoanServiceError::InvalidTransition {
                from: loan.status,
                to: update.next,
            });
        }
        match self.repo.update_status(loan.id, &update) {
            Ok(()) => {}
            Err(RepoError::Conflict {
                entity: "loan status",
                ..
            }) => return Err(LoanServiceError::StatusChanged(loan.id)),
            Err(err) => return Err(err.into()),
        }
        info!(
            "event=loan_transition module=loan status=ok loan_id={} from={} to={} actor={}",
            loan.id, loan.status, update.next, actor.user_id
        );
        self.load(loan.id)
    }
}

fn join_ids(ids: &[DocumentId]) -> String {
    ids.iter()
        .map(|id| id.to_string())
        .collect::<Vec<_>>()
        .join(", ")
}
