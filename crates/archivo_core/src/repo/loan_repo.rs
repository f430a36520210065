//! Loan repository contracts and SQLite implementation.
//!
//! # Responsibility
//! - Persist loans with their per-document associations.
//! - Apply a return batch atomically: association updates, append-only
//!   return records and the recomputed loan status.
//!
//! # Invariants
//! - Status updates are conditional on the expected current status.
//! - An association is marked returned at most once; a second attempt fails
//!   the whole batch.
//! - The post-return status is derived from the associations read back
//!   inside the same transaction that wrote them.

use crate::model::document::DocumentId;
use crate::model::loan::{
    return_progress, Loan, LoanDocument, LoanId, LoanStatus, ReturnProgress, ReturnRecord,
};
use crate::model::role::Role;
use crate::model::user::UserId;
use crate::repo::user_repo::{SqliteUserRepository, UserRepository};
use crate::repo::{map_unique_violation, normalize_limit, parse_uuid, RepoError, RepoResult};
use rusqlite::types::Value;
use rusqlite::{params, params_from_iter, Connection, OptionalExtension, Row};
use uuid::Uuid;

pub const LOANS_DEFAULT_LIMIT: u32 = 50;
pub const LOANS_LIMIT_MAX: u32 = 200;

const LOAN_SELECT_SQL: &str = "SELECT
    id,
    requester_id,
    purpose,
    status,
    created_at,
    due_at,
    delivered_at,
    returned_at,
    resolved_by,
    rejection_reason
FROM loans";

/// Query options for loan listing.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LoanListQuery {
    pub requester: Option<UserId>,
    pub status: Option<LoanStatus>,
    pub limit: Option<u32>,
    pub offset: u32,
}

/// Conditional status change with the fields that accompany it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatusUpdate {
    pub expected: LoanStatus,
    pub next: LoanStatus,
    pub delivered_at: Option<i64>,
    pub resolved_by: Option<UserId>,
    pub rejection_reason: Option<String>,
}

impl StatusUpdate {
    pub fn new(expected: LoanStatus, next: LoanStatus) -> Self {
        Self {
            expected,
            next,
            delivered_at: None,
            resolved_by: None,
            rejection_reason: None,
        }
    }
}

/// One return batch, already validated by the service layer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReturnWrite {
    pub document_ids: Vec<DocumentId>,
    pub received_at: i64,
    pub received_by: UserId,
    pub signature: Vec<u8>,
    pub notes: Option<String>,
}

/// State of the loan after a return batch was committed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReturnApplied {
    pub status: LoanStatus,
    pub returned_at: Option<i64>,
    pub documents: Vec<LoanDocument>,
}

/// Repository interface for loans and return records.
pub trait LoanRepository {
    fn create_loan(&self, loan: &Loan) -> RepoResult<()>;
    fn get_loan(&self, id: LoanId) -> RepoResult<Option<Loan>>;
    /// Lists loans ordered by `created_at DESC, id ASC`.
    fn list_loans(&self, query: &LoanListQuery) -> RepoResult<Vec<Loan>>;
    fn update_status(&self, id: LoanId, update: &StatusUpdate) -> RepoResult<()>;
    /// Subset of `document_ids` not present in the inventory.
    fn missing_documents(&self, document_ids: &[DocumentId]) -> RepoResult<Vec<DocumentId>>;
    /// Subset of `document_ids` reserved by an open loan and not yet returned.
    fn held_documents(&self, document_ids: &[DocumentId]) -> RepoResult<Vec<DocumentId>>;
    fn apply_return(&self, id: LoanId, write: &ReturnWrite) -> RepoResult<ReturnApplied>;
    fn list_return_records(&self, id: LoanId) -> RepoResult<Vec<ReturnRecord>>;
    /// Delivered or partially returned loans whose due date is before `now`.
    fn list_overdue(&self, now: i64) -> RepoResult<Vec<Loan>>;
    /// Stored role of a prospective return receiver.
    fn receiver_role(&self, user_id: UserId) -> RepoResult<Option<Role>>;
}

/// SQLite-backed loan repository.
pub struct SqliteLoanRepository<'conn> {
    conn: &'conn Connection,
}

impl<'conn> SqliteLoanRepository<'conn> {
    pub fn new(conn: &'conn Connection) -> Self {
        Self { conn }
    }
}

impl LoanRepository for SqliteLoanRepository<'_> {
    fn create_loan(&self, loan: &Loan) -> RepoResult<()> {
        loan.validate()?;

        let tx = self.conn.unchecked_transaction()?;
        tx.execute(
            "INSERT INTO loans (
                id,
                requester_id,
                purpose,
                status,
                created_at,
                due_at,
                delivered_at,
                returned_at,
                resolved_by,
                rejection_reason
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10);",
            params![
                loan.id.to_string(),
                loan.requester_id.to_string(),
                loan.purpose.trim(),
                loan.status.as_str(),
                loan.created_at,
                loan.due_at,
                loan.delivered_at,
                loan.returned_at,
                loan.resolved_by.map(|id| id.to_string()),
                loan.rejection_reason.as_deref(),
            ],
        )?;
        for association in &loan.documents {
            tx.execute(
                "INSERT INTO loan_documents (loan_id, document_id, returned_at, return_notes)
                 VALUES (?1, ?2, ?3, ?4);",
                params![
                    loan.id.to_string(),
                    association.document_id.to_string(),
                    association.returned_at,
                    association.return_notes.as_deref(),
                ],
            )?;
        }
        tx.commit()?;
        Ok(())
    }

    fn get_loan(&self, id: LoanId) -> RepoResult<Option<Loan>> {
        let mut stmt = self
            .conn
            .prepare(&format!("{LOAN_SELECT_SQL} WHERE id = ?1;"))?;
        let mut rows = stmt.query([id.to_string()])?;
        match rows.next()? {
            Some(row) => {
                let mut loan = parse_loan_row(row)?;
                loan.documents = load_associations(self.conn, loan.id)?;
                Ok(Some(loan))
            }
            None => Ok(None),
        }
    }

    fn list_loans(&self, query: &LoanListQuery) -> RepoResult<Vec<Loan>> {
        let mut sql = format!("{LOAN_SELECT_SQL} WHERE 1 = 1");
        let mut bind_values: Vec<Value> = Vec::new();

        if let Some(requester) = query.requester {
            sql.push_str(" AND requester_id = ?");
            bind_values.push(Value::Text(requester.to_string()));
        }
        if let Some(status) = query.status {
            sql.push_str(" AND status = ?");
            bind_values.push(Value::Text(status.as_str().to_string()));
        }

        sql.push_str(" ORDER BY created_at DESC, id ASC LIMIT ?");
        bind_values.push(Value::Integer(i64::from(normalize_limit(
            query.limit,
            LOANS_DEFAULT_LIMIT,
            LOANS_LIMIT_MAX,
        ))));
        if query.offset > 0 {
            sql.push_str(" OFFSET ?");
            bind_values.push(Value::Integer(i64::from(query.offset)));
        }

        let mut stmt = self.conn.prepare(&sql)?;
        let mut rows = stmt.query(params_from_iter(bind_values))?;
        let mut loans = Vec::new();
        while let Some(row) = rows.next()? {
            let mut loan = parse_loan_row(row)?;
            loan.documents = load_associations(self.conn, loan.id)?;
            loans.push(loan);
        }
        Ok(loans)
    }

    fn update_status(&self, id: LoanId, update: &StatusUpdate) -> RepoResult<()> {
        let changed = self.conn.execute(
            "UPDATE loans
             SET
                status = ?3,
                delivered_at = COALESCE(?4, delivered_at),
                resolved_by = COALESCE(?5, resolved_by),
                rejection_reason = COALESCE(?6, rejection_reason)
             WHERE id = ?1
               AND status = ?2;",
            params![
                id.to_string(),
                update.expected.as_str(),
                update.next.as_str(),
                update.delivered_at,
                update.resolved_by.map(|user| user.to_string()),
                update.rejection_reason.as_deref(),
            ],
        )?;

        if changed == 0 {
            let exists: Option<String> = self
                .conn
                .query_row(
                    "SELECT status FROM loans WHERE id = ?1;",
                    [id.to_string()],
                    |row| row.get(0),
                )
                .optional()?;
            return Err(match exists {
                None => RepoError::NotFound { entity: "loan", id },
                Some(actual) => RepoError::Conflict {
                    entity: "loan status",
                    key: format!("{id} is `{actual}`, expected `{}`", update.expected),
                },
            });
        }
        Ok(())
    }

    fn missing_documents(&self, document_ids: &[DocumentId]) -> RepoResult<Vec<DocumentId>> {
        let mut missing = Vec::new();
        let mut stmt = self
            .conn
            .prepare("SELECT EXISTS(SELECT 1 FROM documents WHERE id = ?1);")?;
        for id in document_ids {
            let exists: i64 = stmt.query_row([id.to_string()], |row| row.get(0))?;
            if exists == 0 {
                missing.push(*id);
            }
        }
        Ok(missing)
    }

    fn held_documents(&self, document_ids: &[DocumentId]) -> RepoResult<Vec<DocumentId>> {
        let mut held = Vec::new();
        let mut stmt = self.conn.prepare(
            "SELECT EXISTS(
                SELECT 1
                FROM loan_documents ld
                INNER JOIN loans l ON l.id = ld.loan_id
                WHERE ld.document_id = ?1
                  AND ld.returned_at IS NULL
                  AND l.status IN ('pending', 'delivered', 'partial', 'expired')
            );",
        )?;
        for id in document_ids {
            let exists: i64 = stmt.query_row([id.to_string()], |row| row.get(0))?;
            if exists == 1 {
                held.push(*id);
            }
        }
        Ok(held)
    }

    fn apply_return(&self, id: LoanId, write: &ReturnWrite) -> RepoResult<ReturnApplied> {
        let tx = self.conn.unchecked_transaction()?;
        let loan_id = id.to_string();

        for document_id in &write.document_ids {
            let changed = tx.execute(
                "UPDATE loan_documents
                 SET returned_at = ?3, return_notes = ?4
                 WHERE loan_id = ?1
                   AND document_id = ?2
                   AND returned_at IS NULL;",
                params![
                    loan_id.as_str(),
                    document_id.to_string(),
                    write.received_at,
                    write.notes.as_deref(),
                ],
            )?;
            if changed == 0 {
                return Err(RepoError::Conflict {
                    entity: "loan document return",
                    key: document_id.to_string(),
                });
            }

            tx.execute(
                "INSERT INTO return_records (
                    id,
                    loan_id,
                    document_id,
                    received_at,
                    received_by,
                    signature,
                    notes
                ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7);",
                params![
                    Uuid::new_v4().to_string(),
                    loan_id.as_str(),
                    document_id.to_string(),
                    write.received_at,
                    write.received_by.to_string(),
                    write.signature.as_slice(),
                    write.notes.as_deref(),
                ],
            )
            .map_err(|err| map_unique_violation(err, "return record", &document_id.to_string()))?;
        }

        let documents = load_associations(&tx, id)?;
        let current: String = tx.query_row(
            "SELECT status FROM loans WHERE id = ?1;",
            [loan_id.as_str()],
            |row| row.get(0),
        )?;
        let current = parse_status(&current)?;

        let (status, returned_at) = match return_progress(&documents) {
            ReturnProgress::Complete => (LoanStatus::Returned, Some(write.received_at)),
            ReturnProgress::Partial => (LoanStatus::PartiallyReturned, None),
            ReturnProgress::None => (current, None),
        };
        tx.execute(
            "UPDATE loans SET status = ?2, returned_at = ?3 WHERE id = ?1;",
            params![loan_id.as_str(), status.as_str(), returned_at],
        )?;
        tx.commit()?;

        Ok(ReturnApplied {
            status,
            returned_at,
            documents,
        })
    }

    fn list_return_records(&self, id: LoanId) -> RepoResult<Vec<ReturnRecord>> {
        let mut stmt = self.conn.prepare(
            "SELECT id, loan_id, document_id, received_at, received_by, signature, notes
             FROM return_records
             WHERE loan_id = ?1
             ORDER BY received_at ASC, id ASC;",
        )?;
        let mut rows = stmt.query([id.to_string()])?;
        let mut records = Vec::new();
        while let Some(row) = rows.next()? {
            records.push(parse_return_record_row(row)?);
        }
        Ok(records)
    }

    fn list_overdue(&self, now: i64) -> RepoResult<Vec<Loan>> {
        let mut stmt = self.conn.prepare(&format!(
            "{LOAN_SELECT_SQL}
             WHERE status IN ('delivered', 'partial')
               AND due_at < ?1
             ORDER BY due_at ASC, id ASC;"
        ))?;
        let mut rows = stmt.query([now])?;
        let mut loans = Vec::new();
        while let Some(row) = rows.next()? {
            let mut loan = parse_loan_row(row)?;
            loan.documents = load_associations(self.conn, loan.id)?;
            loans.push(loan);
        }
        Ok(loans)
    }

    fn receiver_role(&self, user_id: UserId) -> RepoResult<Option<Role>> {
        SqliteUserRepository::new(self.conn).get_role(user_id)
    }
}

fn load_associations(conn: &Connection, loan_id: LoanId) -> RepoResult<Vec<LoanDocument>> {
    let mut stmt = conn.prepare(
        "SELECT ld.document_id, ld.returned_at, ld.return_notes
         FROM loan_documents ld
         INNER JOIN documents d ON d.id = ld.document_id
         WHERE ld.loan_id = ?1
         ORDER BY d.code ASC, ld.document_id ASC;",
    )?;
    let mut rows = stmt.query([loan_id.to_string()])?;
    let mut documents = Vec::new();
    while let Some(row) = rows.next()? {
        let document_id: String = row.get(0)?;
        documents.push(LoanDocument {
            document_id: parse_uuid(&document_id, "loan_documents.document_id")?,
            returned_at: row.get(1)?,
            return_notes: row.get(2)?,
        });
    }
    Ok(documents)
}

fn parse_loan_row(row: &Row<'_>) -> RepoResult<Loan> {
    let id: String = row.get("id")?;
    let requester_id: String = row.get("requester_id")?;
    let status: String = row.get("status")?;
    let resolved_by = match row.get::<_, Option<String>>("resolved_by")? {
        Some(value) => Some(parse_uuid(&value, "loans.resolved_by")?),
        None => None,
    };
    Ok(Loan {
        id: parse_uuid(&id, "loans.id")?,
        requester_id: parse_uuid(&requester_id, "loans.requester_id")?,
        purpose: row.get("purpose")?,
        status: parse_status(&status)?,
        created_at: row.get("created_at")?,
        due_at: row.get("due_at")?,
        delivered_at: row.get("delivered_at")?,
        returned_at: row.get("returned_at")?,
        resolved_by,
        rejection_reason: row.get("rejection_reason")?,
        documents: Vec::new(),
    })
}

fn parse_return_record_row(row: &Row<'_>) -> RepoResult<ReturnRecord> {
    let id: String = row.get("id")?;
    let loan_id: String = row.get("loan_id")?;
    let document_id: String = row.get("document_id")?;
    let received_by: String = row.get("received_by")?;
    Ok(ReturnRecord {
        id: parse_uuid(&id, "return_records.id")?,
        loan_id: parse_uuid(&loan_id, "return_records.loan_id")?,
        document_id: parse_uuid(&document_id, "return_records.document_id")?,
        received_at: row.get("received_at")?,
        received_by: parse_uuid(&received_by, "return_records.received_by")?,
        signature: row.get("signature")?,
        notes: row.get("notes")?,
    })
}

fn parse_status(value: &str) -> RepoResult<LoanStatus> {
    LoanStatus::parse(value)
        .ok_or_else(|| RepoError::InvalidData(format!("invalid loan status `{value}`")))
}
