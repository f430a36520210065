//! Inventory use-cases.
//!
//! # Responsibility
//! - Catalogue CRUD behind the archive-staff role gate.
//! - Serve the filtered listing and statistics queries.
//! - Spreadsheet export and all-or-nothing bulk import.
//!
//! # Invariants
//! - Drafts are normalized and validated before any write.
//! - An import either inserts every row or none.

use crate::access::{ensure_capability, AccessDenied, Capability};
use crate::interchange::{export_documents, import_documents, ExportError, ExportSummary, ImportError};
use crate::model::document::{Document, DocumentDraft, DocumentId, DocumentValidationError};
use crate::model::user::Session;
use crate::repo::document_repo::{DocumentFilter, DocumentPage, DocumentRepository, InventoryStats};
use crate::repo::{Page, RepoError};
use crate::session::clock::SharedClock;
use log::{info, warn};
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::io::{Read, Write};

#[derive(Debug)]
pub enum InventoryServiceError {
    AccessDenied(AccessDenied),
    DocumentNotFound(DocumentId),
    DuplicateCode(String),
    /// The document appears in loan history and cannot be deleted.
    DocumentInUse(DocumentId),
    Validation(DocumentValidationError),
    Import(ImportError),
    Export(ExportError),
    Repo(RepoError),
}

impl InventoryServiceError {
    pub fn user_message(&self) -> String {
        match self {
            Self::AccessDenied(_) => {
                "No tiene permisos para modificar el inventario.".to_string()
            }
            Self::DocumentNotFound(_) => "El documento no existe.".to_string(),
            Self::DuplicateCode(code) => format!("Ya existe un documento con el código {code}."),
            Self::DocumentInUse(_) => {
                "El documento tiene préstamos registrados y no puede eliminarse.".to_string()
            }
            Self::Validation(err) => format!("Datos del documento inválidos: {err}."),
            Self::Import(err) => match err.row() {
                Some(row) => format!("Error en la fila {row} del archivo: {err}."),
                None => format!("No se pudo leer el archivo: {err}."),
            },
            Self::Export(_) => "No se pudo generar el archivo de exportación.".to_string(),
            Self::Repo(_) => "No se pudo completar la operación. Intente nuevamente.".to_string(),
        }
    }
}

impl Display for InventoryServiceError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::AccessDenied(err) => write!(f, "{err}"),
            Self::DocumentNotFound(id) => write!(f, "document not found: {id}"),
            Self::DuplicateCode(code) => write!(f, "document code already exists: {code}"),
            Self::DocumentInUse(id) => write!(f, "document {id} is referenced by loans"),
            Self::Validation(err) => write!(f, "{err}"),
            Self::Import(err) => write!(f, "{err}"),
            Self::Export(err) => write!(f, "{err}"),
            Self::Repo(err) => write!(f, "{err}"),
        }
    }
}

impl Error for InventoryServiceError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::AccessDenied(err) => Some(err),
            Self::Validation(err) => Some(err),
            Self::Import(err) => Some(err),
            Self::Export(err) => Some(err),
            Self::Repo(err) => Some(err),
            Self::DocumentNotFound(_) | Self::DuplicateCode(_) | Self::DocumentInUse(_) => None,
        }
    }
}

impl From<RepoError> for InventoryServiceError {
    fn from(value: RepoError) -> Self {
        match value {
            RepoError::NotFound {
                entity: "document",
                id,
            } => Self::DocumentNotFound(id),
            RepoError::Conflict {
                entity: "document",
                key,
            } => Self::DuplicateCode(key),
            RepoError::DocumentValidation(err) => Self::Validation(err),
            other => Self::Repo(other),
        }
    }
}

impl From<AccessDenied> for InventoryServiceError {
    fn from(value: AccessDenied) -> Self {
        Self::AccessDenied(value)
    }
}

impl From<DocumentValidationError> for InventoryServiceError {
    fn from(value: DocumentValidationError) -> Self {
        Self::Validation(value)
    }
}

impl From<ImportError> for InventoryServiceError {
    fn from(value: ImportError) -> Self {
        Self::Import(value)
    }
}

impl From<ExportError> for InventoryServiceError {
    fn from(value: ExportError) -> Self {
        Self::Export(value)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ImportSummary {
    pub inserted: usize,
}

pub struct InventoryService<R: DocumentRepository> {
    repo: R,
    clock: SharedClock,
}

impl<R: DocumentRepository> InventoryService<R> {
    pub fn new(repo: R, clock: SharedClock) -> Self {
        Self { repo, clock }
    }

    pub fn create_document(
        &self,
        actor: &Session,
        draft: DocumentDraft,
    ) -> Result<Document, InventoryServiceError> {
        ensure_capability(actor.role, Capability::ManageInventory)?;
        let draft = draft.normalized();
        draft.validate()?;

        let document = self.repo.create_document(&draft, self.clock.now_ms())?;
        info!(
            "event=document_create module=inventory status=ok document_id={} actor={}",
            document.id, actor.user_id
        );
        Ok(document)
    }

    /// Replaces every writable field of an existing document.
    pub fn update_document(
        &self,
        actor: &Session,
        id: DocumentId,
        draft: DocumentDraft,
    ) -> Result<Document, InventoryServiceError> {
        ensure_capability(actor.role, Capability::ManageInventory)?;
        let draft = draft.normalized();
        draft.validate()?;

        let document = self
            .repo
            .update_document(id, &draft, self.clock.now_ms())?;
        info!(
            "event=document_update module=inventory status=ok document_id={} actor={}",
            id, actor.user_id
        );
        Ok(document)
    }

    pub fn delete_document(
        &self,
        actor: &Session,
        id: DocumentId,
    ) -> Result<(), InventoryServiceError> {
        ensure_capability(actor.role, Capability::ManageInventory)?;
        match self.repo.delete_document(id) {
            Ok(()) => {}
            Err(RepoError::Conflict {
                entity: "document loan history",
                ..
            }) => return Err(InventoryServiceError::DocumentInUse(id)),
            Err(err) => return Err(err.into()),
        }
        info!(
            "event=document_delete module=inventory status=ok document_id={} actor={}",
            id, actor.user_id
        );
        Ok(())
    }

    pub fn get_document(&self, id: DocumentId) -> Result<Document, InventoryServiceError> {
        self.repo
            .get_document(id)?
            .ok_or(InventoryServiceError::DocumentNotFound(id))
    }

    pub fn get_by_code(&self, code: &str) -> Result<Option<Document>, InventoryServiceError> {
        Ok(self.repo.get_by_code(code.trim())?)
    }

    /// Filtered listing ordered by code, with the total match count.
    pub fn list_documents(
        &self,
        filter: DocumentFilter,
        page: Page,
    ) -> Result<DocumentPage, InventoryServiceError> {
        Ok(self.repo.list_documents(&filter.normalized(), page)?)
    }

    /// Aggregates plus distinct filter options for the filtered set.
    pub fn inventory_stats(
        &self,
        filter: DocumentFilter,
    ) -> Result<InventoryStats, InventoryServiceError> {
        Ok(self.repo.inventory_stats(&filter.normalized())?)
    }

    /// Inserts all drafts in one transaction.
    pub fn import(
        &self,
        actor: &Session,
        drafts: Vec<DocumentDraft>,
    ) -> Result<ImportSummary, InventoryServiceError> {
        ensure_capability(actor.role, Capability::InterchangeInventory)?;
        let drafts = drafts
            .into_iter()
            .map(DocumentDraft::normalized)
            .collect::<Vec<_>>();
        for draft in &drafts {
            draft.validate()?;
        }

        let inserted = match self.repo.insert_documents(&drafts, self.clock.now_ms()) {
            Ok(inserted) => inserted,
            Err(err) => {
                warn!(
                    "event=inventory_import module=inventory status=error rows={} actor={}",
                    drafts.len(),
                    actor.user_id
                );
                return Err(err.into());
            }
        };
        info!(
            "event=inventory_import module=inventory status=ok rows={} actor={}",
            inserted, actor.user_id
        );
        Ok(ImportSummary { inserted })
    }

    /// Parses a CSV file and imports it atomically.
    pub fn import_csv<I: Read>(
        &self,
        actor: &Session,
        reader: I,
    ) -> Result<ImportSummary, InventoryServiceError> {
        ensure_capability(actor.role, Capability::InterchangeInventory)?;
        let drafts = import_documents(reader)?;
        self.import(actor, drafts)
    }

    pub fn export_csv<W: Write>(
        &self,
        actor: &Session,
        filter: DocumentFilter,
        writer: W,
        batch_size: u32,
    ) -> Result<ExportSummary, InventoryServiceError> {
        ensure_capability(actor.role, Capability::InterchangeInventory)?;
        Ok(export_documents(
            &self.repo,
            &filter.normalized(),
            writer,
            batch_size,
        )?)
    }
}
