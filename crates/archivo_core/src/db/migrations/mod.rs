//! Archive store schema steps.
//!
//! # Layout
//! - `accounts`: `users`, `sessions`, `password_resets`.
//! - `inventory`: `documents`, unique by code.
//! - `loans`: `loans`, `loan_documents`, `return_records`. Accounts and
//!   documents that appear in loan history are `RESTRICT`ed.
//! - `session_activity`: `sessions.last_seen_at`, backfilled from
//!   `created_at`, for idle-session expiry.
//!
//! # Invariants
//! - Step versions are strictly increasing; the applied version is mirrored
//!   to `PRAGMA user_version`.
//! - Pending steps run in one transaction. A failing step leaves the store
//!   at its previous version.

use crate::db::{DbError, DbResult};
use log::{error, info};
use rusqlite::Connection;

#[derive(Debug, Clone, Copy)]
struct SchemaStep {
    version: u32,
    name: &'static str,
    sql: &'static str,
}

const SCHEMA_STEPS: &[SchemaStep] = &[
    SchemaStep {
        version: 1,
        name: "accounts",
        sql: include_str!("0001_users.sql"),
    },
    SchemaStep {
        version: 2,
        name: "inventory",
        sql: include_str!("0002_inventory.sql"),
    },
    SchemaStep {
        version: 3,
        name: "loans",
        sql: include_str!("0003_loans.sql"),
    },
    SchemaStep {
        version: 4,
        name: "session_activity",
        sql: include_str!("0004_session_activity.sql"),
    },
];

/// Schema version this build writes.
pub fn latest_version() -> u32 {
    SCHEMA_STEPS.last().map_or(0, |step| step.version)
}

/// Brings the archive store up to [`latest_version`].
pub fn apply_migrations(conn: &mut Connection) -> DbResult<()> {
    apply_steps_up_to(conn, latest_version())
}

fn apply_steps_up_to(conn: &mut Connection, target: u32) -> DbResult<()> {
    let from_version = stored_version(conn)?;
    let latest = latest_version();
    if from_version > latest {
        return Err(DbError::UnsupportedSchemaVersion {
            db_version: from_version,
            latest_supported: latest,
        });
    }
    if from_version >= target {
        return Ok(());
    }

    let tx = conn.transaction()?;
    let mut applied = 0_usize;
    for step in SCHEMA_STEPS
        .iter()
        .filter(|step| step.version > from_version && step.version <= target)
    {
        let outcome = tx
            .execute_batch(step.sql)
            .and_then(|()| tx.execute_batch(&format!("PRAGMA user_version = {};", step.version)));
        if let Err(err) = outcome {
            error!(
                "event=schema_step module=db status=error version={} name={} error={}",
                step.version, step.name, err
            );
            return Err(err.into());
        }
        info!(
            "event=schema_step module=db status=ok version={} name={}",
            step.version, step.name
        );
        applied += 1;
    }
    tx.commit()?;

    info!(
        "event=store_migrate module=db status=ok from_version={} to_version={} steps={}",
        from_version, target, applied
    );
    Ok(())
}

fn stored_version(conn: &Connection) -> DbResult<u32> {
    let version = conn.query_row("PRAGMA user_version;", [], |row| row.get::<_, u32>(0))?;
    Ok(version)
}

#[cfg(test)]
mod tests {
    use super::{apply_migrations, apply_steps_up_to, latest_version, stored_version, SCHEMA_STEPS};
    use rusqlite::Connection;

    #[test]
    fn step_versions_increase_from_one() {
        let versions = SCHEMA_STEPS.iter().map(|step| step.version).collect::<Vec<_>>();
        let expected = (1..=SCHEMA_STEPS.len() as u32).collect::<Vec<_>>();
        assert_eq!(versions, expected);
        assert_eq!(latest_version(), 4);
    }

    #[test]
    fn session_activity_step_backfills_existing_sessions() {
        let mut conn = Connection::open_in_memory().unwrap();
        apply_steps_up_to(&mut conn, 3).unwrap();
        assert_eq!(stored_version(&conn).unwrap(), 3);
        conn.execute_batch(
            "INSERT INTO users (id, email, display_name, role, password_hash)
             VALUES ('u1', 'a@b.test', 'A', 'usuario', 'x');
             INSERT INTO sessions (token, user_id, created_at) VALUES ('t1', 'u1', 1234);",
        )
        .unwrap();

        apply_migrations(&mut conn).unwrap();
        let last_seen: i64 = conn
            .query_row(
                "SELECT last_seen_at FROM sessions WHERE token = 't1';",
                [],
                |row| row.get(0),
            )
            .unwrap();
        assert_eq!(last_seen, 1234);
        assert_eq!(stored_version(&conn).unwrap(), latest_version());
    }
}
