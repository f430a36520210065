mod common;

use archivo_core::access::ROUTES;
use archivo_core::table::{CellValue, SortDirection, TableColumn, TableSorter};
use archivo_core::{authorize, LoanStatus, NewLoanRequest, ReturnBatch, Role, Session};
use common::{document, fixture, staff};
use proptest::prelude::*;
use proptest::test_runner::Config;
use uuid::Uuid;

fn role_strategy() -> impl Strategy<Value = Role> {
    prop::sample::select(Role::ALL.to_vec())
}

proptest! {
    #![proptest_config(Config::with_cases(32))]
    #[test]
    fn loan_status_tracks_returned_associations(
        documents in 1_usize..6,
        batches in prop::collection::vec(prop::collection::vec(any::<prop::sample::Index>(), 1..4), 1..6)
    ) {
        let fx = fixture();
        let (admin, _) = staff(&fx.ctx);
        let docs = (0..documents)
            .map(|n| document(&fx.ctx, &admin, &format!("P-{n}")))
            .collect::<Vec<_>>();
        let loans = fx.ctx.loans();
        let loan = loans
            .request_loan(
                &admin,
                NewLoanRequest {
                    document_ids: docs.iter().map(|doc| doc.id).collect(),
                    purpose: "Prueba".to_string(),
                    due_at: None,
                },
            )
            .unwrap();
        loans.deliver(&admin, loan.id).unwrap();

        for picks in batches {
            let current = loans.get_loan(&admin, loan.id).unwrap();
            let pending = current
                .pending_documents()
                .map(|doc| doc.document_id)
                .collect::<Vec<_>>();
            if pending.is_empty() {
                break;
            }
            let selection = picks
                .iter()
                .map(|index| pending[index.index(pending.len())])
                .collect::<Vec<_>>();
            loans
                .return_documents(
                    &admin,
                    loan.id,
                    ReturnBatch {
                        document_ids: selection,
                        received_by: admin.user_id,
                        signature: vec![1, 2, 3],
                        notes: None,
                    },
                )
                .unwrap();

            let stored = loans.get_loan(&admin, loan.id).unwrap();
            let returned = stored.returned_count();
            let expected = if returned == stored.documents.len() {
                LoanStatus::Returned
            } else {
                LoanStatus::PartiallyReturned
            };
            prop_assert_eq!(stored.status, expected);
            prop_assert_eq!(stored.returned_at.is_some(), expected == LoanStatus::Returned);
            prop_assert_eq!(
                loans.list_return_records(&admin, loan.id).unwrap().len(),
                returned
            );
        }
    }

    #[test]
    fn query_and_trailing_slash_never_change_decisions(
        route in 0_usize..ROUTES.len(),
        role in prop::option::of(role_strategy()),
        query in "[a-z0-9=&]{0,12}"
    ) {
        let session = role.map(|role| Session::new("t", Uuid::new_v4(), role, "P", 0));
        let path = ROUTES[route].path;
        let plain = authorize(path, session.as_ref());
        let decorated = authorize(&format!("{path}/?{query}"), session.as_ref());
        prop_assert_eq!(plain, decorated);
    }

    #[test]
    fn sorting_keeps_empty_cells_last(
        values in prop::collection::vec(prop::option::of(-50_i64..50), 0..40),
        descending in any::<bool>()
    ) {
        let sorter = TableSorter::new(vec![TableColumn::new(
            "value",
            "Valor",
            |row: &Option<i64>| CellValue::opt_int(*row),
        )]);
        let direction = if descending { SortDirection::Desc } else { SortDirection::Asc };
        let mut rows = values.clone();
        prop_assert!(sorter.sort(&mut rows, "value", direction));

        let filled = rows.iter().take_while(|row| row.is_some()).count();
        prop_assert!(rows[filled..].iter().all(Option::is_none));
        let numbers = rows[..filled].iter().flatten().copied().collect::<Vec<_>>();
        let mut expected = values.iter().flatten().copied().collect::<Vec<_>>();
        expected.sort_unstable();
        if descending {
            expected.reverse();
        }
        prop_assert_eq!(numbers, expected);
    }
}
