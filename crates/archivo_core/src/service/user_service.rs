//! Account administration use-cases.
//!
//! # Invariants
//! - Role changes and deletions require `Capability::ManageUsers`.
//! - An administrator can neither demote nor delete their own account.
//! - Any account may edit its own profile.

use crate::access::{ensure_capability, AccessDenied, Capability};
use crate::model::role::Role;
use crate::model::user::{ProfileUpdate, Session, UserAccount, UserId};
use crate::repo::user_repo::UserRepository;
use crate::repo::RepoError;
use log::info;
use std::error::Error;
use std::fmt::{Display, Formatter};

#[derive(Debug)]
pub enum UserServiceError {
    AccessDenied(AccessDenied),
    UserNotFound(UserId),
    CannotDemoteSelf,
    CannotDeleteSelf,
    /// The account is referenced by loans and cannot be removed.
    UserInUse(UserId),
    EmptyDisplayName,
    Repo(RepoError),
}

impl UserServiceError {
    pub fn user_message(&self) -> String {
        match self {
            Self::AccessDenied(_) => "No tiene permisos para administrar usuarios.".to_string(),
            Self::UserNotFound(_) => "El usuario no existe.".to_string(),
            Self::CannotDemoteSelf => "No puede quitarse el rol de administrador.".to_string(),
            Self::CannotDeleteSelf => "No puede eliminar su propia cuenta.".to_string(),
            Self::UserInUse(_) => {
                "El usuario tiene préstamos registrados y no puede eliminarse.".to_string()
            }
            Self::EmptyDisplayName => "El nombre no puede estar vacío.".to_string(),
            Self::Repo(_) => "No se pudo completar la operación. Intente nuevamente.".to_string(),
        }
    }
}

impl Display for UserServiceError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::AccessDenied(err) => write!(f, "{err}"),
            Self::UserNotFound(id) => write!(f, "user not found: {id}"),
            Self::CannotDemoteSelf => write!(f, "administrators cannot demote themselves"),
            Self::CannotDeleteSelf => write!(f, "administrators cannot delete themselves"),
            Self::UserInUse(id) => write!(f, "user {id} is referenced by loans"),
            Self::EmptyDisplayName => write!(f, "display name cannot be empty"),
            Self::Repo(err) => write!(f, "{err}"),
        }
    }
}

impl Error for UserServiceError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::AccessDenied(err) => Some(err),
            Self::Repo(err) => Some(err),
            _ => None,
        }
    }
}

impl From<RepoError> for UserServiceError {
    fn from(value: RepoError) -> Self {
        match value {
            RepoError::NotFound { entity: "user", id } => Self::UserNotFound(id),
            other => Self::Repo(other),
        }
    }
}

impl From<AccessDenied> for UserServiceError {
    fn from(value: AccessDenied) -> Self {
        Self::AccessDenied(value)
    }
}

pub struct UserService<R: UserRepository> {
    repo: R,
}

impl<R: UserRepository> UserService<R> {
    pub fn new(repo: R) -> Self {
        Self { repo }
    }

    pub fn get_user(&self, id: UserId) -> Result<UserAccount, UserServiceError> {
        self.repo
            .get_user(id)?
            .ok_or(UserServiceError::UserNotFound(id))
    }

    pub fn list_users(&self, actor: &Session) -> Result<Vec<UserAccount>, UserServiceError> {
        ensure_capability(actor.role, Capability::ManageUsers)?;
        Ok(self.repo.list_users()?)
    }

    /// Updates profile fields. `None` keeps the stored value.
    pub fn update_profile(
        &self,
        actor: &Session,
        user_id: UserId,
        update: ProfileUpdate,
    ) -> Result<UserAccount, UserServiceError> {
        if actor.user_id != user_id {
            ensure_capability(actor.role, Capability::ManageUsers)?;
        }
        let update = ProfileUpdate {
            display_name: update
                .display_name
                .map(|name| name.trim().to_string()),
            phone: update.phone.map(|phone| phone.trim().to_string()),
            unit: update.unit.map(|unit| unit.trim().to_string()),
        };
        if update
            .display_name
            .as_deref()
            .is_some_and(|name| name.is_empty())
        {
            return Err(UserServiceError::EmptyDisplayName);
        }

        self.repo.update_profile(user_id, &update)?;
        info!(
            "event=user_update_profile module=user status=ok user_id={} actor={}",
            user_id, actor.user_id
        );
        self.get_user(user_id)
    }

    pub fn set_role(
        &self,
        actor: &Session,
        user_id: UserId,
        role: Role,
    ) -> Result<UserAccount, UserServiceError> {
        ensure_capability(actor.role, Capability::ManageUsers)?;
        if actor.user_id == user_id && role != Role::Admin {
            return Err(UserServiceError::CannotDemoteSelf);
        }

        self.repo.set_role(user_id, role)?;
        info!(
            "event=user_set_role module=user status=ok user_id={} role={} actor={}",
            user_id, role, actor.user_id
        );
        self.get_user(user_id)
    }

    pub fn delete_user(&self, actor: &Session, user_id: UserId) -> Result<(), UserServiceError> {
        ensure_capability(actor.role, Capability::ManageUsers)?;
        if actor.user_id == user_id {
            return Err(UserServiceError::CannotDeleteSelf);
        }

        match self.repo.delete_user(user_id) {
            Ok(()) => {}
            Err(RepoError::Conflict { entity: "user", .. }) => {
                return Err(UserServiceError::UserInUse(user_id));
            }
            Err(err) => return Err(err.into()),
        }
        info!(
            "event=user_delete module=user status=ok user_id={} actor={}",
            user_id, actor.user_id
        );
        Ok(())
    }
}
