mod common;

use archivo_core::session::{ActivityKind, RoleResolution, WatchState};
use archivo_core::{AppConfig, AppContext, AuthEvent, ContextError, Role, RouteDecision, View};
use common::{account, fixture, fixture_with, signed_in};
use std::sync::mpsc;
use std::time::Duration;
use uuid::Uuid;

fn short_session_config() -> AppConfig {
    let mut config = AppConfig::default();
    config.session.inactivity_timeout_secs = 60;
    config.session.warning_secs = 5;
    config.session.poll_interval_secs = 1;
    config
}

#[test]
fn idle_session_expires_after_threshold_and_warning() {
    let mut fx = fixture_with(short_session_config());
    signed_in(&mut fx.ctx, "ana@archivo.test", Role::Archivist);
    let (expired_tx, expired_rx) = mpsc::channel();
    let watchdog = fx
        .ctx
        .start_inactivity_watchdog(move || {
            let _ = expired_tx.send(());
        })
        .unwrap();

    fx.clock.advance(Duration::from_secs(30));
    assert!(watchdog.record_activity(ActivityKind::Keyboard));
    fx.clock.advance(Duration::from_secs(59));
    assert!(matches!(watchdog.state(), WatchState::Active { .. }));

    fx.clock.advance(Duration::from_secs(3));
    assert_eq!(
        watchdog.state(),
        WatchState::Expiring {
            remaining: Duration::from_secs(3)
        }
    );
    // Activity during the warning no longer rescues the session.
    assert!(!watchdog.record_activity(ActivityKind::Pointer));

    fx.clock.advance(Duration::from_secs(3));
    expired_rx.recv_timeout(Duration::from_secs(10)).unwrap();
}

#[test]
fn expired_context_is_signed_out_and_sent_to_login() {
    let mut fx = fixture_with(short_session_config());
    let session = signed_in(&mut fx.ctx, "ana@archivo.test", Role::Archivist);
    let events = fx.ctx.auth_events().subscribe();
    assert_eq!(
        fx.ctx.authorize("/devoluciones"),
        RouteDecision::Allow(View::Returns)
    );

    let (expired_tx, expired_rx) = mpsc::channel();
    let _watchdog = fx
        .ctx
        .start_inactivity_watchdog(move || {
            let _ = expired_tx.send(());
        })
        .unwrap();
    fx.clock.advance(Duration::from_secs(66));
    expired_rx.recv_timeout(Duration::from_secs(10)).unwrap();

    assert!(fx.ctx.is_session_expired());
    assert!(fx.ctx.session().is_none());
    assert!(fx.ctx.nav_items().is_empty());
    assert_eq!(
        fx.ctx.authorize("/devoluciones"),
        RouteDecision::RedirectToLogin
    );
    assert!(matches!(
        fx.ctx.require_session(),
        Err(ContextError::SessionExpired)
    ));

    assert!(fx.ctx.enforce_session_expiry().unwrap());
    assert!(!fx.ctx.enforce_session_expiry().unwrap());
    assert_eq!(
        events.try_recv().unwrap(),
        AuthEvent::SessionExpired {
            user_id: session.user_id
        }
    );
    assert!(fx.ctx.restore_session(&session.token).unwrap().is_none());
}

#[test]
fn watchdog_of_previous_session_cannot_expire_a_new_one() {
    let mut fx = fixture_with(short_session_config());
    signed_in(&mut fx.ctx, "ana@archivo.test", Role::User);
    let (expired_tx, expired_rx) = mpsc::channel();
    let _stale = fx
        .ctx
        .start_inactivity_watchdog(move || {
            let _ = expired_tx.send(());
        })
        .unwrap();

    fx.ctx.clear_session();
    signed_in(&mut fx.ctx, "luis@archivo.test", Role::User);
    fx.clock.advance(Duration::from_secs(66));
    expired_rx.recv_timeout(Duration::from_secs(10)).unwrap();

    assert!(!fx.ctx.is_session_expired());
    assert!(fx.ctx.session().is_some());
}

#[test]
fn watchdog_needs_a_held_session() {
    let fx = fixture_with(short_session_config());
    assert!(matches!(
        fx.ctx.start_inactivity_watchdog(|| {}),
        Err(ContextError::NotSignedIn)
    ));
}

#[test]
fn stale_tokens_are_revoked_on_restore() {
    let mut fx = fixture_with(short_session_config());
    let session = signed_in(&mut fx.ctx, "ana@archivo.test", Role::User);
    fx.ctx.clear_session();

    // Each restore counts as use of the token.
    fx.clock.advance(Duration::from_secs(50));
    assert!(fx.ctx.restore_session(&session.token).unwrap().is_some());
    fx.ctx.clear_session();
    fx.clock.advance(Duration::from_secs(50));
    assert!(fx.ctx.restore_session(&session.token).unwrap().is_some());
    fx.ctx.clear_session();

    fx.clock.advance(Duration::from_secs(65));
    assert!(fx.ctx.restore_session(&session.token).unwrap().is_none());
    assert!(fx.ctx.auth().current_session(&session.token).unwrap().is_none());
}

#[test]
fn focus_changes_do_not_count_as_activity() {
    let mut fx = fixture_with(short_session_config());
    signed_in(&mut fx.ctx, "ana@archivo.test", Role::User);
    let watchdog = fx.ctx.start_inactivity_watchdog(|| {}).unwrap();

    fx.clock.advance(Duration::from_secs(50));
    assert!(!watchdog.record_activity(ActivityKind::Focus));
    fx.clock.advance(Duration::from_secs(12));
    assert!(matches!(watchdog.state(), WatchState::Expiring { .. }));
}

#[test]
fn stopped_watchdog_never_fires() {
    let mut fx = fixture_with(short_session_config());
    signed_in(&mut fx.ctx, "ana@archivo.test", Role::User);
    let (expired_tx, expired_rx) = mpsc::channel::<()>();
    let mut watchdog = fx
        .ctx
        .start_inactivity_watchdog(move || {
            let _ = expired_tx.send(());
        })
        .unwrap();
    watchdog.stop();
    assert!(!watchdog.is_running());

    fx.clock.advance(Duration::from_secs(3600));
    assert!(expired_rx.recv_timeout(Duration::from_millis(1500)).is_err());
    assert!(!fx.ctx.is_session_expired());
}

#[test]
fn unknown_account_resolves_to_lowest_role() {
    let fx = fixture();
    let resolution = fx.ctx.resolve_role(Uuid::new_v4());
    assert_eq!(resolution, RoleResolution::Missing);
    assert_eq!(resolution.role(), Role::lowest());

    let archivist = account(&fx.ctx, "arch@archivo.test", Role::Archivist);
    assert_eq!(
        fx.ctx.resolve_role(archivist.user_id),
        RoleResolution::Resolved(Role::Archivist)
    );
}

#[test]
fn file_store_resolves_role_on_separate_connection() {
    let dir = tempfile::tempdir().unwrap();
    let mut config = AppConfig::default();
    config.store.path = dir.path().join("archivo.sqlite3");

    let ctx = AppContext::open(config).unwrap();
    let admin = account(&ctx, "admin@archivo.test", Role::Admin);
    assert_eq!(
        ctx.resolve_role(admin.user_id),
        RoleResolution::Resolved(Role::Admin)
    );
}
