mod common;

use archivo_core::repo::loan_repo::LoanRepository;
use archivo_core::{
    Document, LoanListQuery, LoanService, LoanServiceError, LoanStatus, NewLoanRequest,
    ReturnBatch, Role, Session,
};
use common::{account, document, fixture, staff, Fixture, DAY_MS, T0};
use std::time::Duration;
use uuid::Uuid;

struct Desk {
    fx: Fixture,
    admin: Session,
    archivist: Session,
    reader: Session,
    docs: Vec<Document>,
}

fn desk() -> Desk {
    let fx = fixture();
    let (admin, archivist) = staff(&fx.ctx);
    let reader = account(&fx.ctx, "lector@archivo.test", Role::User);
    let docs = ["EXP-1", "EXP-2", "EXP-3"]
        .iter()
        .map(|code| document(&fx.ctx, &admin, code))
        .collect();
    Desk {
        fx,
        admin,
        archivist,
        reader,
        docs,
    }
}

fn request(docs: &[&Document]) -> NewLoanRequest {
    NewLoanRequest {
        document_ids: docs.iter().map(|doc| doc.id).collect(),
        purpose: "Investigación histórica".to_string(),
        due_at: None,
    }
}

fn batch(receiver: &Session, docs: &[&Document]) -> ReturnBatch {
    ReturnBatch {
        document_ids: docs.iter().map(|doc| doc.id).collect(),
        received_by: receiver.user_id,
        signature: vec![0x89, b'P', b'N', b'G'],
        notes: None,
    }
}

fn return_record_count<R: LoanRepository>(
    loans: &LoanService<R>,
    actor: &Session,
    loan_id: Uuid,
) -> usize {
    loans.list_return_records(actor, loan_id).unwrap().len()
}

#[test]
fn request_starts_pending_with_default_due_date() {
    let desk = desk();
    let loans = desk.fx.ctx.loans();

    let loan = loans
        .request_loan(&desk.reader, request(&[&desk.docs[0], &desk.docs[1]]))
        .unwrap();
    assert_eq!(loan.status, LoanStatus::Pending);
    assert_eq!(loan.requester_id, desk.reader.user_id);
    assert_eq!(loan.created_at, T0);
    assert_eq!(loan.due_at, T0 + 15 * DAY_MS);
    assert_eq!(loan.documents.len(), 2);
    assert!(loan.documents.iter().all(|doc| doc.returned_at.is_none()));
}

#[test]
fn request_rejects_unknown_held_and_empty_selections() {
    let desk = desk();
    let loans = desk.fx.ctx.loans();

    let ghost = Uuid::new_v4();
    let err = loans
        .request_loan(
            &desk.reader,
            NewLoanRequest {
                document_ids: vec![desk.docs[0].id, ghost],
                purpose: "Consulta".to_string(),
                due_at: None,
            },
        )
        .unwrap_err();
    assert!(matches!(err, LoanServiceError::UnknownDocuments(ids) if ids == vec![ghost]));

    assert!(matches!(
        loans.request_loan(&desk.reader, request(&[])),
        Err(LoanServiceError::Validation(_))
    ));

    loans
        .request_loan(&desk.reader, request(&[&desk.docs[0]]))
        .unwrap();
    let err = loans
        .request_loan(&desk.admin, request(&[&desk.docs[0], &desk.docs[1]]))
        .unwrap_err();
    assert!(
        matches!(err, LoanServiceError::DocumentsUnavailable(ids) if ids == vec![desk.docs[0].id])
    );
}

#[test]
fn partial_then_complete_return_follows_associations() {
    let desk = desk();
    let loans = desk.fx.ctx.loans();
    let all = desk.docs.iter().collect::<Vec<_>>();

    let loan = loans.request_loan(&desk.reader, request(&all)).unwrap();
    let delivered = loans.deliver(&desk.archivist, loan.id).unwrap();
    assert_eq!(delivered.status, LoanStatus::Delivered);
    assert_eq!(delivered.delivered_at, Some(T0));
    assert_eq!(delivered.resolved_by, Some(desk.archivist.user_id));

    desk.fx.clock.advance(Duration::from_secs(3600));
    let first = loans
        .return_documents(
            &desk.archivist,
            loan.id,
            batch(&desk.archivist, &[&desk.docs[0], &desk.docs[1]]),
        )
        .unwrap();
    assert_eq!(first.status, LoanStatus::PartiallyReturned);
    assert_eq!(first.returned_now, 2);
    assert_eq!(first.outstanding, 1);
    assert_eq!(first.returned_at, None);

    desk.fx.clock.advance(Duration::from_secs(3600));
    let second = loans
        .return_documents(
            &desk.archivist,
            loan.id,
            batch(&desk.archivist, &[&desk.docs[2]]),
        )
        .unwrap();
    assert_eq!(second.status, LoanStatus::Returned);
    assert_eq!(second.returned_total, 3);
    assert_eq!(second.outstanding, 0);
    assert_eq!(second.returned_at, Some(T0 + 2 * 3_600_000));

    let stored = loans.get_loan(&desk.reader, loan.id).unwrap();
    assert_eq!(stored.status, LoanStatus::Returned);
    assert_eq!(stored.returned_at, second.returned_at);
    assert_eq!(return_record_count(&loans, &desk.admin, loan.id), 3);

    // Returned documents can be requested again.
    loans.request_loan(&desk.admin, request(&all)).unwrap();
}

#[test]
fn re_returning_a_document_fails_without_duplicate_records() {
    let desk = desk();
    let loans = desk.fx.ctx.loans();
    let loan = loans
        .request_loan(&desk.reader, request(&[&desk.docs[0], &desk.docs[1]]))
        .unwrap();
    loans.deliver(&desk.admin, loan.id).unwrap();
    loans
        .return_documents(&desk.admin, loan.id, batch(&desk.admin, &[&desk.docs[0]]))
        .unwrap();

    let err = loans
        .return_documents(
            &desk.admin,
            loan.id,
            batch(&desk.admin, &[&desk.docs[0], &desk.docs[1]]),
        )
        .unwrap_err();
    assert!(matches!(err, LoanServiceError::AlreadyReturned(ids) if ids == vec![desk.docs[0].id]));

    let stored = loans.get_loan(&desk.admin, loan.id).unwrap();
    assert_eq!(stored.status, LoanStatus::PartiallyReturned);
    assert_eq!(stored.returned_count(), 1);
    assert_eq!(return_record_count(&loans, &desk.admin, loan.id), 1);
}

#[test]
fn return_batch_validation() {
    let desk = desk();
    let loans = desk.fx.ctx.loans();
    let loan = loans
        .request_loan(&desk.reader, request(&[&desk.docs[0]]))
        .unwrap();

    assert!(matches!(
        loans.return_documents(&desk.admin, loan.id, batch(&desk.admin, &[&desk.docs[0]])),
        Err(LoanServiceError::InvalidTransition {
            from: LoanStatus::Pending,
            ..
        })
    ));
    loans.deliver(&desk.admin, loan.id).unwrap();

    assert!(matches!(
        loans.return_documents(&desk.admin, loan.id, batch(&desk.admin, &[])),
        Err(LoanServiceError::EmptySelection)
    ));
    let mut unsigned = batch(&desk.admin, &[&desk.docs[0]]);
    unsigned.signature.clear();
    assert!(matches!(
        loans.return_documents(&desk.admin, loan.id, unsigned),
        Err(LoanServiceError::MissingSignature)
    ));
    assert!(matches!(
        loans.return_documents(&desk.admin, loan.id, batch(&desk.admin, &[&desk.docs[2]])),
        Err(LoanServiceError::DocumentNotInLoan(id)) if id == desk.docs[2].id
    ));
    assert!(matches!(
        loans.return_documents(&desk.reader, loan.id, batch(&desk.reader, &[&desk.docs[0]])),
        Err(LoanServiceError::AccessDenied(_))
    ));

    let mut repeated = batch(&desk.admin, &[&desk.docs[0], &desk.docs[0]]);
    repeated.notes = Some("  folios completos ".to_string());
    let outcome = loans
        .return_documents(&desk.admin, loan.id, repeated)
        .unwrap();
    assert_eq!(outcome.returned_now, 1);
    assert_eq!(outcome.status, LoanStatus::Returned);
    let records = loans.list_return_records(&desk.admin, loan.id).unwrap();
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].notes.as_deref(), Some("folios completos"));
    assert_eq!(records[0].received_by, desk.admin.user_id);
}

#[test]
fn return_receiver_must_be_staff_allowed_to_receive() {
    let desk = desk();
    let loans = desk.fx.ctx.loans();
    let supervisor = account(&desk.fx.ctx, "sup@archivo.test", Role::Supervisor);
    let loan = loans
        .request_loan(&desk.reader, request(&[&desk.docs[0], &desk.docs[1]]))
        .unwrap();
    loans.deliver(&desk.admin, loan.id).unwrap();

    for receiver in [desk.reader.user_id, supervisor.user_id, Uuid::new_v4()] {
        let mut forged = batch(&desk.admin, &[&desk.docs[0]]);
        forged.received_by = receiver;
        assert!(matches!(
            loans.return_documents(&desk.admin, loan.id, forged),
            Err(LoanServiceError::InvalidReceiver(id)) if id == receiver
        ));
    }
    assert_eq!(return_record_count(&loans, &desk.admin, loan.id), 0);

    // A colleague at the desk may sign for the batch.
    let outcome = loans
        .return_documents(
            &desk.admin,
            loan.id,
            batch(&desk.archivist, &[&desk.docs[0]]),
        )
        .unwrap();
    assert_eq!(outcome.status, LoanStatus::PartiallyReturned);
    let records = loans.list_return_records(&desk.admin, loan.id).unwrap();
    assert_eq!(records[0].received_by, desk.archivist.user_id);
}

#[test]
fn reject_and_cancel_only_apply_to_pending_requests() {
    let desk = desk();
    let loans = desk.fx.ctx.loans();
    let supervisor = account(&desk.fx.ctx, "sup@archivo.test", Role::Supervisor);
    let other_reader = account(&desk.fx.ctx, "otro@archivo.test", Role::User);

    let first = loans
        .request_loan(&desk.reader, request(&[&desk.docs[0]]))
        .unwrap();
    assert!(matches!(
        loans.reject(&supervisor, first.id, "   "),
        Err(LoanServiceError::MissingReason)
    ));
    assert!(matches!(
        loans.deliver(&supervisor, first.id),
        Err(LoanServiceError::AccessDenied(_))
    ));
    let rejected = loans
        .reject(&supervisor, first.id, "Documento en restauración")
        .unwrap();
    assert_eq!(rejected.status, LoanStatus::Rejected);
    assert_eq!(
        rejected.rejection_reason.as_deref(),
        Some("Documento en restauración")
    );
    assert!(matches!(
        loans.deliver(&desk.admin, first.id),
        Err(LoanServiceError::InvalidTransition {
            from: LoanStatus::Rejected,
            to: LoanStatus::Delivered
        })
    ));

    let second = loans
        .request_loan(&desk.reader, request(&[&desk.docs[0]]))
        .unwrap();
    assert!(matches!(
        loans.cancel(&other_reader, second.id),
        Err(LoanServiceError::LoanNotFound(_))
    ));
    assert!(matches!(
        loans.cancel(&supervisor, second.id),
        Err(LoanServiceError::NotRequester)
    ));
    let cancelled = loans.cancel(&desk.reader, second.id).unwrap();
    assert_eq!(cancelled.status, LoanStatus::Cancelled);
}

#[test]
fn requesters_only_see_their_own_loans() {
    let desk = desk();
    let loans = desk.fx.ctx.loans();
    let other_reader = account(&desk.fx.ctx, "otro@archivo.test", Role::User);

    let mine = loans
        .request_loan(&desk.reader, request(&[&desk.docs[0]]))
        .unwrap();
    desk.fx.clock.advance(Duration::from_secs(1));
    let theirs = loans
        .request_loan(&other_reader, request(&[&desk.docs[1]]))
        .unwrap();

    let visible = loans
        .list_loans(&desk.reader, LoanListQuery::default())
        .unwrap();
    assert_eq!(
        visible.iter().map(|loan| loan.id).collect::<Vec<_>>(),
        vec![mine.id]
    );
    // An explicit requester filter cannot widen a plain user's view.
    let widened = loans
        .list_loans(
            &desk.reader,
            LoanListQuery {
                requester: Some(other_reader.user_id),
                ..LoanListQuery::default()
            },
        )
        .unwrap();
    assert_eq!(widened.len(), 1);
    assert_eq!(widened[0].id, mine.id);
    assert!(matches!(
        loans.get_loan(&desk.reader, theirs.id),
        Err(LoanServiceError::LoanNotFound(_))
    ));

    let everything = loans
        .list_loans(&desk.archivist, LoanListQuery::default())
        .unwrap();
    assert_eq!(
        everything.iter().map(|loan| loan.id).collect::<Vec<_>>(),
        vec![theirs.id, mine.id]
    );
    let pending_only = loans
        .list_loans(
            &desk.archivist,
            LoanListQuery {
                status: Some(LoanStatus::Delivered),
                ..LoanListQuery::default()
            },
        )
        .unwrap();
    assert!(pending_only.is_empty());
}

#[test]
fn overdue_loans_expire_and_can_still_be_returned() {
    let desk = desk();
    let loans = desk.fx.ctx.loans();

    let late = loans
        .request_loan(
            &desk.reader,
            NewLoanRequest {
                due_at: Some(T0 + DAY_MS),
                ..request(&[&desk.docs[0], &desk.docs[1]])
            },
        )
        .unwrap();
    let on_time = loans
        .request_loan(&desk.reader, request(&[&desk.docs[2]]))
        .unwrap();
    loans.deliver(&desk.admin, late.id).unwrap();
    loans.deliver(&desk.admin, on_time.id).unwrap();

    assert!(loans.expire_overdue(T0).unwrap().is_empty());
    desk.fx.clock.advance(Duration::from_secs(2 * 24 * 3600));
    let now = T0 + 2 * DAY_MS;
    assert_eq!(loans.expire_overdue(now).unwrap(), vec![late.id]);
    assert!(loans.expire_overdue(now).unwrap().is_empty());
    assert_eq!(
        loans.get_loan(&desk.admin, late.id).unwrap().status,
        LoanStatus::Expired
    );

    let partial = loans
        .return_documents(&desk.admin, late.id, batch(&desk.admin, &[&desk.docs[0]]))
        .unwrap();
    assert_eq!(partial.status, LoanStatus::PartiallyReturned);
    let done = loans
        .return_documents(&desk.admin, late.id, batch(&desk.admin, &[&desk.docs[1]]))
        .unwrap();
    assert_eq!(done.status, LoanStatus::Returned);
    assert_eq!(done.returned_at, Some(now));
}

#[test]
fn accounts_referenced_by_loans_cannot_be_deleted() {
    let desk = desk();
    desk.fx
        .ctx
        .loans()
        .request_loan(&desk.reader, request(&[&desk.docs[0]]))
        .unwrap();

    let err = desk
        .fx
        .ctx
        .users()
        .delete_user(&desk.admin, desk.reader.user_id)
        .unwrap_err();
    assert!(matches!(
        err,
        archivo_core::UserServiceError::UserInUse(id) if id == desk.reader.user_id
    ));
}
