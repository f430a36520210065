mod common;

use archivo_core::interchange::ImportError;
use archivo_core::{
    Conservation, DocumentDraft, DocumentFilter, InventoryServiceError, Page, Role,
};
use common::{account, fixture, staff};

fn seed(fx: &common::Fixture, admin: &archivo_core::Session) {
    let drafts = (1..=7)
        .map(|n| {
            let mut draft = DocumentDraft::new(format!("SEC-{n:03}"), format!("Acta número {n}"));
            draft.unit = Some(if n % 2 == 0 { "Secretaría" } else { "Rectorado" }.to_string());
            draft.series = Some("Actas, sesiones".to_string());
            draft.box_number = Some(n);
            draft.folio_start = Some(1);
            draft.folio_end = Some(10 * n);
            draft.record_date = Some(format!("1998-03-{n:02}"));
            draft.shelf = Some("E1".to_string());
            draft.conservation = if n == 3 {
                Conservation::Digital
            } else {
                Conservation::Paper
            };
            draft.missing_volume = n == 5;
            draft
        })
        .collect();
    fx.ctx.inventory().import(admin, drafts).unwrap();
}

#[test]
fn filtered_export_imports_into_empty_store_with_same_rows() {
    let source = fixture();
    let (admin, _) = staff(&source.ctx);
    seed(&source, &admin);

    let filter = DocumentFilter {
        unit: Some("Rectorado".to_string()),
        ..DocumentFilter::default()
    };
    let mut buffer = Vec::new();
    let summary = source
        .ctx
        .inventory()
        .export_csv(&admin, filter.clone(), &mut buffer, 3)
        .unwrap();
    assert_eq!(summary.rows, 4);
    assert_eq!(summary.batches, 2);

    let target = fixture();
    let (target_admin, _) = staff(&target.ctx);
    let imported = target
        .ctx
        .inventory()
        .import_csv(&target_admin, buffer.as_slice())
        .unwrap();
    assert_eq!(imported.inserted, 4);

    let original = source
        .ctx
        .inventory()
        .list_documents(filter, Page::default())
        .unwrap();
    let copied = target
        .ctx
        .inventory()
        .list_documents(DocumentFilter::default(), Page::default())
        .unwrap();
    assert_eq!(copied.total, 4);
    let drafts = |rows: &[archivo_core::Document]| {
        rows.iter().map(|doc| doc.to_draft()).collect::<Vec<_>>()
    };
    assert_eq!(drafts(&copied.rows), drafts(&original.rows));
}

#[test]
fn export_reads_in_batches_until_a_short_page() {
    let fx = fixture();
    let (admin, _) = staff(&fx.ctx);
    seed(&fx, &admin);

    let mut buffer = Vec::new();
    let summary = fx
        .ctx
        .inventory()
        .export_csv(&admin, DocumentFilter::default(), &mut buffer, 3)
        .unwrap();
    assert_eq!(summary.rows, 7);
    assert_eq!(summary.batches, 3);

    let text = String::from_utf8(buffer).unwrap();
    let mut lines = text.lines();
    assert!(lines.next().unwrap().starts_with("code,title,series"));
    assert_eq!(lines.count(), 7);
    assert!(text.contains("\"Actas, sesiones\""));
}

#[test]
fn interchange_requires_archive_staff() {
    let fx = fixture();
    let supervisor = account(&fx.ctx, "sup@archivo.test", Role::Supervisor);

    let err = fx
        .ctx
        .inventory()
        .export_csv(&supervisor, DocumentFilter::default(), Vec::new(), 10)
        .unwrap_err();
    assert!(matches!(err, InventoryServiceError::AccessDenied(_)));
    let err = fx
        .ctx
        .inventory()
        .import_csv(&supervisor, "code,title\nA-1,Uno\n".as_bytes())
        .unwrap_err();
    assert!(matches!(err, InventoryServiceError::AccessDenied(_)));
}

#[test]
fn import_rejects_whole_file_on_bad_row() {
    let fx = fixture();
    let (admin, _) = staff(&fx.ctx);
    let csv = "code,title,box_number\nA-1,Uno,1\nA-2,Dos,caja\nA-3,Tres,3\n";

    let err = fx
        .ctx
        .inventory()
        .import_csv(&admin, csv.as_bytes())
        .unwrap_err();
    match err {
        InventoryServiceError::Import(err @ ImportError::InvalidValue { .. }) => {
            assert_eq!(err.row(), Some(2));
        }
        other => panic!("unexpected error: {other}"),
    }
    let stats = fx
        .ctx
        .inventory()
        .inventory_stats(DocumentFilter::default())
        .unwrap();
    assert_eq!(stats.total_documents, 0);
}

#[test]
fn import_conflicting_with_store_inserts_nothing() {
    let fx = fixture();
    let (admin, _) = staff(&fx.ctx);
    common::document(&fx.ctx, &admin, "A-2");

    let err = fx
        .ctx
        .inventory()
        .import_csv(&admin, "code,title\nA-1,Uno\nA-2,Dos\n".as_bytes())
        .unwrap_err();
    assert!(matches!(err, InventoryServiceError::DuplicateCode(code) if code == "A-2"));
    assert!(fx.ctx.inventory().get_by_code("A-1").unwrap().is_none());
}
