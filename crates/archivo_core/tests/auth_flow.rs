mod common;

use archivo_core::{AuthError, AuthEvent, Role, RouteDecision, View};
use common::fixture;
use std::time::Duration;

#[test]
fn sign_up_then_sign_in_issues_session_with_lowest_role() {
    let fx = fixture();
    let auth = fx.ctx.auth();

    let account = auth
        .sign_up("  Ana.Perez@Archivo.Test ", "clave-segura", "Ana Pérez")
        .unwrap();
    assert_eq!(account.email, "ana.perez@archivo.test");
    assert_eq!(account.role, Role::User);
    assert_eq!(account.display_name, "Ana Pérez");

    let session = auth.sign_in("ANA.PEREZ@archivo.test", "clave-segura").unwrap();
    assert_eq!(session.user_id, account.id);
    assert_eq!(session.role, Role::User);

    let stored = auth.current_session(&session.token).unwrap().unwrap();
    assert_eq!(stored.user_id, account.id);
}

#[test]
fn unknown_email_and_wrong_password_are_indistinguishable() {
    let fx = fixture();
    let auth = fx.ctx.auth();
    auth.sign_up("ana@archivo.test", "clave-segura", "Ana").unwrap();

    let wrong_password = auth.sign_in("ana@archivo.test", "otra-clave").unwrap_err();
    let unknown = auth.sign_in("nadie@archivo.test", "clave-segura").unwrap_err();
    assert!(matches!(wrong_password, AuthError::InvalidCredentials));
    assert!(matches!(unknown, AuthError::InvalidCredentials));
    assert_eq!(wrong_password.user_message(), unknown.user_message());
}

#[test]
fn sign_up_rejects_duplicates_bad_email_and_short_password() {
    let fx = fixture();
    let auth = fx.ctx.auth();
    auth.sign_up("ana@archivo.test", "clave-segura", "").unwrap();

    assert!(matches!(
        auth.sign_up("ANA@archivo.test", "clave-segura", "Otra"),
        Err(AuthError::EmailTaken)
    ));
    assert!(matches!(
        auth.sign_up("sin-arroba", "clave-segura", "X"),
        Err(AuthError::InvalidEmail)
    ));
    assert!(matches!(
        auth.sign_up("beto@archivo.test", "corta", "Beto"),
        Err(AuthError::WeakPassword)
    ));
}

#[test]
fn sign_out_revokes_token_and_publishes_events() {
    let fx = fixture();
    let auth = fx.ctx.auth();
    let events = auth.subscribe();
    let account = auth
        .provision_account("jefe@archivo.test", "clave-segura", "Jefe", Role::Admin)
        .unwrap();

    let session = auth.sign_in("jefe@archivo.test", "clave-segura").unwrap();
    assert!(auth.sign_out(&session.token).unwrap());
    assert!(!auth.sign_out(&session.token).unwrap());
    assert!(auth.current_session(&session.token).unwrap().is_none());

    let received = events.try_iter().collect::<Vec<_>>();
    assert_eq!(
        received,
        vec![
            AuthEvent::SignedIn {
                user_id: account.id
            },
            AuthEvent::SignedOut {
                user_id: account.id
            },
        ]
    );
}

#[test]
fn reset_token_is_single_use_and_revokes_sessions() {
    let fx = fixture();
    let auth = fx.ctx.auth();
    let account = auth
        .sign_up("ana@archivo.test", "clave-segura", "Ana")
        .unwrap();
    let session = auth.sign_in("ana@archivo.test", "clave-segura").unwrap();

    let reset = auth
        .request_password_reset("ana@archivo.test")
        .unwrap()
        .unwrap();
    assert_eq!(reset.user_id, account.id);

    assert_eq!(
        auth.reset_password(&reset.token, "nueva-clave").unwrap(),
        account.id
    );
    assert!(matches!(
        auth.reset_password(&reset.token, "otra-nueva-clave"),
        Err(AuthError::InvalidResetToken)
    ));
    assert!(auth.current_session(&session.token).unwrap().is_none());
    assert!(auth.sign_in("ana@archivo.test", "clave-segura").is_err());
    assert!(auth.sign_in("ana@archivo.test", "nueva-clave").is_ok());
}

#[test]
fn reset_token_expires_after_ttl() {
    let fx = fixture();
    let auth = fx.ctx.auth();
    auth.sign_up("ana@archivo.test", "clave-segura", "Ana").unwrap();
    let reset = auth
        .request_password_reset("ana@archivo.test")
        .unwrap()
        .unwrap();

    fx.clock
        .advance(fx.ctx.config().auth.reset_token_ttl() + Duration::from_secs(1));
    assert!(matches!(
        auth.reset_password(&reset.token, "nueva-clave"),
        Err(AuthError::InvalidResetToken)
    ));
}

#[test]
fn reset_request_for_unknown_email_issues_nothing() {
    let fx = fixture();
    assert!(fx
        .ctx
        .auth()
        .request_password_reset("nadie@archivo.test")
        .unwrap()
        .is_none());
}

#[test]
fn update_password_checks_the_current_one() {
    let fx = fixture();
    let auth = fx.ctx.auth();
    auth.sign_up("ana@archivo.test", "clave-segura", "Ana").unwrap();
    let session = auth.sign_in("ana@archivo.test", "clave-segura").unwrap();

    assert!(matches!(
        auth.update_password(&session, "equivocada", "nueva-clave"),
        Err(AuthError::InvalidCredentials)
    ));
    auth.update_password(&session, "clave-segura", "nueva-clave")
        .unwrap();
    assert!(auth.sign_in("ana@archivo.test", "nueva-clave").is_ok());
}

#[test]
fn context_holds_session_and_resolves_role_from_store() {
    let mut fx = fixture();
    let account = fx
        .ctx
        .auth()
        .provision_account("arch@archivo.test", "clave-segura", "Arch", Role::Archivist)
        .unwrap();

    assert_eq!(fx.ctx.authorize("/devoluciones"), RouteDecision::RedirectToLogin);
    let token = {
        let session = fx.ctx.sign_in("arch@archivo.test", "clave-segura").unwrap();
        assert_eq!(session.role, Role::Archivist);
        session.token.clone()
    };
    assert_eq!(
        fx.ctx.authorize("/devoluciones"),
        RouteDecision::Allow(View::Returns)
    );

    // A role change is picked up when the token is restored.
    let admin = common::account(&fx.ctx, "admin@archivo.test", Role::Admin);
    fx.ctx
        .users()
        .set_role(&admin, account.id, Role::User)
        .unwrap();
    fx.ctx.clear_session();
    let restored = fx.ctx.restore_session(&token).unwrap().unwrap();
    assert_eq!(restored.role, Role::User);
    assert_eq!(
        fx.ctx.authorize("/devoluciones"),
        RouteDecision::RedirectToHome
    );

    assert!(fx.ctx.sign_out().unwrap());
    assert!(fx.ctx.session().is_none());
    assert!(fx.ctx.restore_session(&token).unwrap().is_none());
}
