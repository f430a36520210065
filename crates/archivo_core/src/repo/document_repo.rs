//! Inventory repository contracts and SQLite implementation.
//!
//! # Responsibility
//! - Provide document CRUD over the `documents` table.
//! - Implement the two inventory query functions: the filtered, paginated
//!   listing with total count, and the aggregate statistics with distinct
//!   filter options.
//!
//! # Invariants
//! - Every `None` filter field means "no filter".
//! - Listing order is deterministic: `code ASC, id ASC`.
//! - Bulk inserts are all-or-nothing.

use crate::model::document::{Conservation, Document, DocumentDraft, DocumentId};
use crate::repo::{
    bool_to_int, map_unique_violation, normalize_limit, parse_bool, parse_uuid, Page, RepoError,
    RepoResult,
};
use rusqlite::types::Value;
use rusqlite::{params, params_from_iter, Connection, Row};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use uuid::Uuid;

pub const DOCUMENTS_DEFAULT_LIMIT: u32 = 50;
pub const DOCUMENTS_LIMIT_MAX: u32 = 500;

const DOCUMENT_SELECT_SQL: &str = "SELECT
    id,
    code,
    title,
    series,
    unit,
    box_number,
    volume_number,
    folio_start,
    folio_end,
    record_date,
    shelf,
    body,
    tray,
    conservation,
    missing_volume,
    created_at,
    updated_at
FROM documents";

/// Optional filter fields shared by both query functions.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DocumentFilter {
    /// Case-insensitive substring over code, title and series.
    pub search: Option<String>,
    pub unit: Option<String>,
    pub series: Option<String>,
    /// Exact `YYYY-MM-DD` match.
    pub record_date: Option<String>,
    pub box_number: Option<i64>,
    pub conservation: Option<Conservation>,
    /// Only documents flagged with a missing volume.
    pub missing_only: bool,
}

impl DocumentFilter {
    /// Drops blank text fields so they act as "no filter".
    pub fn normalized(mut self) -> Self {
        for field in [
            &mut self.search,
            &mut self.unit,
            &mut self.series,
            &mut self.record_date,
        ] {
            *field = field
                .take()
                .map(|value| value.trim().to_string())
                .filter(|value| !value.is_empty());
        }
        self
    }
}

/// Result of the filtered listing query.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DocumentPage {
    pub rows: Vec<Document>,
    /// Rows matching the filter, ignoring pagination.
    pub total: u64,
    pub applied_limit: u32,
    pub offset: u32,
}

impl DocumentPage {
    pub fn has_more(&self) -> bool {
        u64::from(self.offset) + (self.rows.len() as u64) < self.total
    }
}

/// Result of the aggregate statistics query.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InventoryStats {
    pub total_documents: u64,
    pub missing_volumes: u64,
    /// Documents currently out on a delivered, partial or expired loan.
    pub documents_on_loan: u64,
    pub by_conservation: BTreeMap<Conservation, u64>,
    /// Distinct filter options within the filtered set, sorted.
    pub units: Vec<String>,
    pub series: Vec<String>,
    pub box_numbers: Vec<i64>,
}

/// Repository interface for inventory documents.
pub trait DocumentRepository {
    fn create_document(&self, draft: &DocumentDraft, now: i64) -> RepoResult<Document>;
    fn update_document(&self, id: DocumentId, draft: &DocumentDraft, now: i64)
        -> RepoResult<Document>;
    fn delete_document(&self, id: DocumentId) -> RepoResult<()>;
    fn get_document(&self, id: DocumentId) -> RepoResult<Option<Document>>;
    fn get_by_code(&self, code: &str) -> RepoResult<Option<Document>>;
    /// Filtered, paginated listing with total count.
    fn list_documents(&self, filter: &DocumentFilter, page: Page) -> RepoResult<DocumentPage>;
    /// Aggregates and distinct filter options for the filtered set.
    fn inventory_stats(&self, filter: &DocumentFilter) -> RepoResult<InventoryStats>;
    /// Inserts all drafts in one transaction and returns the inserted count.
    fn insert_documents(&self, drafts: &[DocumentDraft], now: i64) -> RepoResult<usize>;
}

/// SQLite-backed inventory repository.
pub struct SqliteDocumentRepository<'conn> {
    conn: &'conn Connection,
}

impl<'conn> SqliteDocumentRepository<'conn> {
    pub fn new(conn: &'conn Connection) -> Self {
        Self { conn }
    }
}

impl DocumentRepository for SqliteDocumentRepository<'_> {
    fn create_document(&self, draft: &DocumentDraft, now: i64) -> RepoResult<Document> {
        let id = Uuid::new_v4();
        insert_document(self.conn, id, draft, now)?;
        self.get_document(id)?.ok_or_else(|| {
            RepoError::InvalidData(format!("created document {id} missing in read-back"))
        })
    }

    fn update_document(
        &self,
        id: DocumentId,
        draft: &DocumentDraft,
        now: i64,
    ) -> RepoResult<Document> {
        draft.validate()?;
        let changed = self
            .conn
            .execute(
                "UPDATE documents
                 SET
                    code = ?2,
                    title = ?3,
                    series = ?4,
                    unit = ?5,
                    box_number = ?6,
                    volume_number = ?7,
                    folio_start = ?8,
                    folio_end = ?9,
                    record_date = ?10,
                    shelf = ?11,
                    body = ?12,
                    tray = ?13,
                    conservation = ?14,
                    missing_volume = ?15,
                    updated_at = ?16
                 WHERE id = ?1;",
                params![
                    id.to_string(),
                    draft.code.as_str(),
                    draft.title.as_str(),
                    draft.series.as_deref(),
                    draft.unit.as_deref(),
                    draft.box_number,
                    draft.volume_number,
                    draft.folio_start,
                    draft.folio_end,
                    draft.record_date.as_deref(),
                    draft.shelf.as_deref(),
                    draft.body.as_deref(),
                    draft.tray.as_deref(),
                    draft.conservation.as_str(),
                    bool_to_int(draft.missing_volume),
                    now,
                ],
            )
            .map_err(|err| map_unique_violation(err, "document", &draft.code))?;
        if changed == 0 {
            return Err(RepoError::NotFound {
                entity: "document",
                id,
            });
        }
        self.get_document(id)?.ok_or(RepoError::NotFound {
            entity: "document",
            id,
        })
    }

    fn delete_document(&self, id: DocumentId) -> RepoResult<()> {
        let in_loans: i64 = self.conn.query_row(
            "SELECT COUNT(*) FROM loan_documents WHERE document_id = ?1;",
            [id.to_string()],
            |row| row.get(0),
        )?;
        if in_loans > 0 {
            return Err(RepoError::Conflict {
                entity: "document loan history",
                key: id.to_string(),
            });
        }

        let changed = self
            .conn
            .execute("DELETE FROM documents WHERE id = ?1;", [id.to_string()])?;
        if changed == 0 {
            return Err(RepoError::NotFound {
                entity: "document",
                id,
            });
        }
        Ok(())
    }

    fn get_document(&self, id: DocumentId) -> RepoResult<Option<Document>> {
        let mut stmt = self
            .conn
            .prepare(&format!("{DOCUMENT_SELECT_SQL} WHERE id = ?1;"))?;
        let mut rows = stmt.query([id.to_string()])?;
        match rows.next()? {
            Some(row) => Ok(Some(parse_document_row(row)?)),
            None => Ok(None),
        }
    }

    fn get_by_code(&self, code: &str) -> RepoResult<Option<Document>> {
        let mut stmt = self
            .conn
            .prepare(&format!("{DOCUMENT_SELECT_SQL} WHERE code = ?1;"))?;
        let mut rows = stmt.query([code.trim()])?;
        match rows.next()? {
            Some(row) => Ok(Some(parse_document_row(row)?)),
            None => Ok(None),
        }
    }

    fn list_documents(&self, filter: &DocumentFilter, page: Page) -> RepoResult<DocumentPage> {
        let (where_sql, bind_values) = build_filter_clause(filter);

        let total: i64 = self.conn.query_row(
            &format!("SELECT COUNT(*) FROM documents WHERE {where_sql};"),
            params_from_iter(bind_values.iter()),
            |row| row.get(0),
        )?;

        let applied_limit = normalize_limit(page.limit, DOCUMENTS_DEFAULT_LIMIT, DOCUMENTS_LIMIT_MAX);
        let mut sql = format!("{DOCUMENT_SELECT_SQL} WHERE {where_sql} ORDER BY code ASC, id ASC");
        let mut page_values = bind_values;
        sql.push_str(" LIMIT ?");
        page_values.push(Value::Integer(i64::from(applied_limit)));
        if page.offset > 0 {
            sql.push_str(" OFFSET ?");
            page_values.push(Value::Integer(i64::from(page.offset)));
        }

        let mut stmt = self.conn.prepare(&sql)?;
        let mut rows = stmt.query(params_from_iter(page_values))?;
        let mut documents = Vec::new();
        while let Some(row) = rows.next()? {
            documents.push(parse_document_row(row)?);
        }

        Ok(DocumentPage {
            rows: documents,
            total: total.max(0) as u64,
            applied_limit,
            offset: page.offset,
        })
    }

    fn inventory_stats(&self, filter: &DocumentFilter) -> RepoResult<InventoryStats> {
        let (where_sql, bind_values) = build_filter_clause(filter);

        let (total, missing): (i64, i64) = self.conn.query_row(
            &format!(
                "SELECT COUNT(*), COALESCE(SUM(missing_volume), 0)
                 FROM documents
                 WHERE {where_sql};"
            ),
            params_from_iter(bind_values.iter()),
            |row| Ok((row.get(0)?, row.get(1)?)),
        )?;

        let on_loan: i64 = self.conn.query_row(
            &format!(
                "SELECT COUNT(DISTINCT ld.document_id)
                 FROM loan_documents ld
                 INNER JOIN loans l ON l.id = ld.loan_id
                 WHERE ld.returned_at IS NULL
                   AND l.status IN ('delivered', 'partial', 'expired')
                   AND ld.document_id IN (SELECT id FROM documents WHERE {where_sql});"
            ),
            params_from_iter(bind_values.iter()),
            |row| row.get(0),
        )?;

        let mut by_conservation = Conservation::ALL
            .into_iter()
            .map(|conservation| (conservation, 0_u64))
            .collect::<BTreeMap<_, _>>();
        {
            let mut stmt = self.conn.prepare(&format!(
                "SELECT conservation, COUNT(*)
                 FROM documents
                 WHERE {where_sql}
                 GROUP BY conservation;"
            ))?;
            let mut rows = stmt.query(params_from_iter(bind_values.iter()))?;
            while let Some(row) = rows.next()? {
                let text: String = row.get(0)?;
                let count: i64 = row.get(1)?;
                by_conservation.insert(parse_conservation(&text)?, count.max(0) as u64);
            }
        }

        let units = distinct_text(self.conn, "unit", &where_sql, &bind_values)?;
        let series = distinct_text(self.conn, "series", &where_sql, &bind_values)?;

        let mut box_numbers = Vec::new();
        {
            let mut stmt = self.conn.prepare(&format!(
                "SELECT DISTINCT box_number
                 FROM documents
                 WHERE {where_sql} AND box_number IS NOT NULL
                 ORDER BY box_number ASC;"
            ))?;
            let mut rows = stmt.query(params_from_iter(bind_values.iter()))?;
            while let Some(row) = rows.next()? {
                box_numbers.push(row.get(0)?);
            }
        }

        Ok(InventoryStats {
            total_documents: total.max(0) as u64,
            missing_volumes: missing.max(0) as u64,
            documents_on_loan: on_loan.max(0) as u64,
            by_conservation,
            units,
            series,
            box_numbers,
        })
    }

    fn insert_documents(&self, drafts: &[DocumentDraft], now: i64) -> RepoResult<usize> {
        let tx = self.conn.unchecked_transaction()?;
        for draft in drafts {
            insert_document(&tx, Uuid::new_v4(), draft, now)?;
        }
        tx.commit()?;
        Ok(drafts.len())
    }
}

fn insert_document(
    conn: &Connection,
    id: DocumentId,
    draft: &DocumentDraft,
    now: i64,
) -> RepoResult<()> {
    draft.validate()?;
    conn.execute(
        "INSERT INTO documents (
            id,
            code,
            title,
            series,
            unit,
            box_number,
            volume_number,
            folio_start,
            folio_end,
            record_date,
            shelf,
            body,
            tray,
            conservation,
            missing_volume,
            created_at,
            updated_at
        ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16, ?16);",
        params![
            id.to_string(),
            draft.code.as_str(),
            draft.title.as_str(),
            draft.series.as_deref(),
            draft.unit.as_deref(),
            draft.box_number,
            draft.volume_number,
            draft.folio_start,
            draft.folio_end,
            draft.record_date.as_deref(),
            draft.shelf.as_deref(),
            draft.body.as_deref(),
            draft.tray.as_deref(),
            draft.conservation.as_str(),
            bool_to_int(draft.missing_volume),
            now,
        ],
    )
    .map_err(|err| map_unique_violation(err, "document", &draft.code))?;
    Ok(())
}

/// Builds the shared `WHERE` body and its positional bind values.
fn build_filter_clause(filter: &DocumentFilter) -> (String, Vec<Value>) {
    let mut sql = String::from("1 = 1");
    let mut bind_values = Vec::new();

    if let Some(search) = filter.search.as_deref() {
        let pattern = format!("%{}%", escape_like(&search.to_lowercase()));
        sql.push_str(
            " AND (fold_case(code) LIKE ? ESCAPE '\\'
                   OR fold_case(title) LIKE ? ESCAPE '\\'
                   OR fold_case(COALESCE(series, '')) LIKE ? ESCAPE '\\')",
        );
        for _ in 0..3 {
            bind_values.push(Value::Text(pattern.clone()));
        }
    }
    if let Some(unit) = filter.unit.as_deref() {
        sql.push_str(" AND unit = ?");
        bind_values.push(Value::Text(unit.to_string()));
    }
    if let Some(series) = filter.series.as_deref() {
        sql.push_str(" AND series = ?");
        bind_values.push(Value::Text(series.to_string()));
    }
    if let Some(date) = filter.record_date.as_deref() {
        sql.push_str(" AND record_date = ?");
        bind_values.push(Value::Text(date.to_string()));
    }
    if let Some(box_number) = filter.box_number {
        sql.push_str(" AND box_number = ?");
        bind_values.push(Value::Integer(box_number));
    }
    if let Some(conservation) = filter.conservation {
        sql.push_str(" AND conservation = ?");
        bind_values.push(Value::Text(conservation.as_str().to_string()));
    }
    if filter.missing_only {
        sql.push_str(" AND missing_volume = 1");
    }

    (sql, bind_values)
}

fn escape_like(value: &str) -> String {
    value
        .replace('\\', "\\\\")
        .replace('%', "\\%")
        .replace('_', "\\_")
}

fn distinct_text(
    conn: &Connection,
    column: &str,
    where_sql: &str,
    bind_values: &[Value],
) -> RepoResult<Vec<String>> {
    let mut stmt = conn.prepare(&format!(
        "SELECT DISTINCT {column}
         FROM documents
         WHERE {where_sql} AND {column} IS NOT NULL
         ORDER BY {column} COLLATE NOCASE ASC;"
    ))?;
    let mut rows = stmt.query(params_from_iter(bind_values.iter()))?;
    let mut values = Vec::new();
    while let Some(row) = rows.next()? {
        values.push(row.get(0)?);
    }
    Ok(values)
}

fn parse_document_row(row: &Row<'_>) -> RepoResult<Document> {
    let id_text: String = row.get("id")?;
    let conservation_text: String = row.get("conservation")?;
    Ok(Document {
        id: parse_uuid(&id_text, "documents.id")?,
        code: row.get("code")?,
        title: row.get("title")?,
        series: row.get("series")?,
        unit: row.get("unit")?,
        box_number: row.get("box_number")?,
        volume_number: row.get("volume_number")?,
        folio_start: row.get("folio_start")?,
        folio_end: row.get("folio_end")?,
        record_date: row.get("record_date")?,
        shelf: row.get("shelf")?,
        body: row.get("body")?,
        tray: row.get("tray")?,
        conservation: parse_conservation(&conservation_text)?,
        missing_volume: parse_bool(row.get("missing_volume")?, "documents.missing_volume")?,
        created_at: row.get("created_at")?,
        updated_at: row.get("updated_at")?,
    })
}

fn parse_conservation(value: &str) -> RepoResult<Conservation> {
    Conservation::parse(value).ok_or_else(|| {
        RepoError::InvalidData(format!(
            "invalid conservation `{value}` in documents.conservation"
        ))
    })
}
