mod common;

use archivo_core::{ProfileUpdate, Role, UserServiceError};
use common::{account, fixture};

#[test]
fn admins_change_roles_but_never_their_own() {
    let fx = fixture();
    let admin = account(&fx.ctx, "admin@archivo.test", Role::Admin);
    let reader = account(&fx.ctx, "lector@archivo.test", Role::User);
    let users = fx.ctx.users();

    let promoted = users
        .set_role(&admin, reader.user_id, Role::Archivist)
        .unwrap();
    assert_eq!(promoted.role, Role::Archivist);
    assert_eq!(
        fx.ctx.resolve_role(reader.user_id).role(),
        Role::Archivist
    );

    assert!(matches!(
        users.set_role(&admin, admin.user_id, Role::User),
        Err(UserServiceError::CannotDemoteSelf)
    ));
    assert!(matches!(
        users.set_role(&reader, admin.user_id, Role::User),
        Err(UserServiceError::AccessDenied(_))
    ));
}

#[test]
fn listing_and_deleting_accounts_is_admin_only() {
    let fx = fixture();
    let admin = account(&fx.ctx, "admin@archivo.test", Role::Admin);
    let supervisor = account(&fx.ctx, "sup@archivo.test", Role::Supervisor);
    let users = fx.ctx.users();

    assert_eq!(users.list_users(&admin).unwrap().len(), 2);
    assert!(matches!(
        users.list_users(&supervisor),
        Err(UserServiceError::AccessDenied(_))
    ));
    assert!(matches!(
        users.delete_user(&admin, admin.user_id),
        Err(UserServiceError::CannotDeleteSelf)
    ));

    users.delete_user(&admin, supervisor.user_id).unwrap();
    assert!(matches!(
        users.get_user(supervisor.user_id),
        Err(UserServiceError::UserNotFound(_))
    ));
}

#[test]
fn profile_updates_are_self_service() {
    let fx = fixture();
    let admin = account(&fx.ctx, "admin@archivo.test", Role::Admin);
    let reader = account(&fx.ctx, "lector@archivo.test", Role::User);
    let other = account(&fx.ctx, "otro@archivo.test", Role::User);
    let users = fx.ctx.users();

    let updated = users
        .update_profile(
            &reader,
            reader.user_id,
            ProfileUpdate {
                display_name: Some("  Lectora Pérez ".to_string()),
                unit: Some("Biblioteca".to_string()),
                ..ProfileUpdate::default()
            },
        )
        .unwrap();
    assert_eq!(updated.display_name, "Lectora Pérez");
    assert_eq!(updated.unit.as_deref(), Some("Biblioteca"));
    assert_eq!(updated.role, Role::User);

    assert!(matches!(
        users.update_profile(&other, reader.user_id, ProfileUpdate::default()),
        Err(UserServiceError::AccessDenied(_))
    ));
    assert!(matches!(
        users.update_profile(
            &reader,
            reader.user_id,
            ProfileUpdate {
                display_name: Some("   ".to_string()),
                ..ProfileUpdate::default()
            },
        ),
        Err(UserServiceError::EmptyDisplayName)
    ));
    users
        .update_profile(
            &admin,
            reader.user_id,
            ProfileUpdate {
                phone: Some("555-0101".to_string()),
                ..ProfileUpdate::default()
            },
        )
        .unwrap();
    assert_eq!(
        users.get_user(reader.user_id).unwrap().display_name,
        "Lectora Pérez"
    );
}
