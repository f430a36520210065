#![allow(dead_code)]

use archivo_core::repo::auth_repo::{CredentialStore, NewAccount, SqliteCredentialStore};
use archivo_core::session::{ManualClock, SharedClock};
use archivo_core::{AppConfig, AppContext, Document, DocumentDraft, Role, Session};
use std::sync::Arc;
use uuid::Uuid;

pub const T0: i64 = 1_700_000_000_000;
pub const DAY_MS: i64 = 24 * 60 * 60 * 1000;

pub struct Fixture {
    pub ctx: AppContext,
    pub clock: ManualClock,
}

pub fn fixture() -> Fixture {
    fixture_with(AppConfig::default())
}

pub fn fixture_with(config: AppConfig) -> Fixture {
    let clock = ManualClock::new(T0);
    let shared: SharedClock = Arc::new(clock.clone());
    let ctx = AppContext::in_memory(config, shared).unwrap();
    Fixture { ctx, clock }
}

/// Stores an account without hashing a real password and returns a
/// session for it.
pub fn account(ctx: &AppContext, email: &str, role: Role) -> Session {
    let store = SqliteCredentialStore::new(ctx.connection());
    let account = store
        .create_account(&NewAccount {
            email: email.to_string(),
            display_name: email.split('@').next().unwrap_or(email).to_string(),
            role,
            password_hash: "unused".to_string(),
            created_at: T0,
        })
        .unwrap();
    Session::new(
        Uuid::new_v4().simple().to_string(),
        account.id,
        account.role,
        account.display_name,
        T0,
    )
}

pub fn staff(ctx: &AppContext) -> (Session, Session) {
    (
        account(ctx, "admin@archivo.test", Role::Admin),
        account(ctx, "archivista@archivo.test", Role::Archivist),
    )
}

pub fn document(ctx: &AppContext, actor: &Session, code: &str) -> Document {
    ctx.inventory()
        .create_document(actor, DocumentDraft::new(code, format!("Expediente {code}")))
        .unwrap()
}

/// Stores an account with an open session token and attaches it to `ctx`.
pub fn signed_in(ctx: &mut AppContext, email: &str, role: Role) -> Session {
    let session = account(ctx, email, role);
    SqliteCredentialStore::new(ctx.connection())
        .insert_session(&session)
        .unwrap();
    ctx.restore_session(&session.token)
        .unwrap()
        .cloned()
        .unwrap()
}
