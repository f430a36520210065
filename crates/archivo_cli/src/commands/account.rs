//! Account, session and role subcommands.

use super::{format_timestamp, CliError, Runtime};
use archivo_core::repo::user_repo::{SqliteUserRepository, UserRepository};
use archivo_core::{RepoError, Role, UserId};
use clap::Args;

#[derive(Args, Debug)]
pub struct InitArgs {
    /// Email of the first administrator; only used on an empty store
    #[arg(long, requires = "admin_password")]
    pub admin_email: Option<String>,

    #[arg(long)]
    pub admin_password: Option<String>,

    #[arg(long, default_value = "Administrador")]
    pub admin_name: String,
}

#[derive(Args, Debug)]
pub struct SignUpArgs {
    #[arg(long)]
    pub email: String,

    #[arg(long)]
    pub password: String,

    #[arg(long, default_value = "")]
    pub name: String,
}

#[derive(Args, Debug)]
pub struct SignInArgs {
    #[arg(long)]
    pub email: String,

    #[arg(long)]
    pub password: String,
}

#[derive(Args, Debug)]
pub struct ResetRequestArgs {
    #[arg(long)]
    pub email: String,
}

#[derive(Args, Debug)]
pub struct ResetPasswordArgs {
    #[arg(long)]
    pub token: String,

    #[arg(long)]
    pub password: String,
}

#[derive(Args, Debug)]
pub struct SetRoleArgs {
    pub user_id: UserId,

    /// admin | archivero | supervisor | usuario
    pub role: String,
}

pub fn init(runtime: &mut Runtime, args: InitArgs) -> Result<(), CliError> {
    let ctx = runtime.ctx();
    println!("store ready at {}", ctx.config().store.path.display());

    let (Some(email), Some(password)) = (args.admin_email, args.admin_password) else {
        return Ok(());
    };
    let existing = SqliteUserRepository::new(ctx.connection())
        .list_users()
        .map_err(|err: RepoError| CliError::Usage(err.to_string()))?;
    if !existing.is_empty() {
        return Err(CliError::Usage(
            "store already has accounts; sign in as an administrator and use set-role".to_string(),
        ));
    }

    let account = ctx
        .auth()
        .provision_account(&email, &password, &args.admin_name, Role::Admin)?;
    println!("administrator created: {} <{}>", account.id, account.email);
    Ok(())
}

pub fn sign_up(runtime: &mut Runtime, args: SignUpArgs) -> Result<(), CliError> {
    let account = runtime
        .ctx()
        .auth()
        .sign_up(&args.email, &args.password, &args.name)?;
    println!(
        "account created: {} <{}> role={}",
        account.id,
        account.email,
        account.role.label()
    );
    Ok(())
}

pub fn sign_in(runtime: &mut Runtime, args: SignInArgs) -> Result<(), CliError> {
    let session = runtime
        .ctx_mut()
        .sign_in(&args.email, &args.password)?
        .clone();
    runtime.remember(&session)?;
    println!(
        "signed in as {} ({})",
        session.display_name,
        session.role.label()
    );
    Ok(())
}

pub fn sign_out(runtime: &mut Runtime) -> Result<(), CliError> {
    let was_open = runtime.ctx_mut().sign_out()?;
    runtime.forget()?;
    println!("{}", if was_open { "signed out" } else { "no active session" });
    Ok(())
}

pub fn whoami(runtime: &Runtime) -> Result<(), CliError> {
    let session = runtime.session()?;
    let account = runtime.ctx().users().get_user(session.user_id)?;
    println!("{} <{}>", account.display_name, account.email);
    println!("role: {}", session.role.label());
    if let Some(unit) = &account.unit {
        println!("unit: {unit}");
    }
    println!("signed in since {}", format_timestamp(session.created_at));
    Ok(())
}

pub fn reset_request(runtime: &Runtime, args: ResetRequestArgs) -> Result<(), CliError> {
    if let Some(reset) = runtime.ctx().auth().request_password_reset(&args.email)? {
        println!("reset token: {}", reset.token);
        println!("valid until {}", format_timestamp(reset.expires_at));
    } else {
        println!("if the address is registered, a reset token was issued");
    }
    Ok(())
}

pub fn reset_password(runtime: &Runtime, args: ResetPasswordArgs) -> Result<(), CliError> {
    runtime
        .ctx()
        .auth()
        .reset_password(&args.token, &args.password)?;
    runtime.forget()?;
    println!("password updated; sign in again");
    Ok(())
}

pub fn set_role(runtime: &Runtime, args: SetRoleArgs) -> Result<(), CliError> {
    let role = Role::parse(&args.role).map_err(|err| CliError::Usage(err.to_string()))?;
    let session = runtime.session()?;
    let account = runtime
        .ctx()
        .users()
        .set_role(session, args.user_id, role)?;
    println!("{} is now {}", account.email, account.role.label());
    Ok(())
}
