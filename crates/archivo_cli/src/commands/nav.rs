//! Navigation and route-guard subcommands.

use super::{CliError, Runtime};
use archivo_core::RouteDecision;
use clap::Args;

#[derive(Args, Debug)]
pub struct RouteArgs {
    /// Client path, e.g. `/prestamos`
    pub path: String,
}

pub fn nav(runtime: &Runtime) -> Result<(), CliError> {
    let session = runtime.session()?;
    println!("menu for {}:", session.role.label());
    for item in runtime.ctx().nav_items() {
        println!("  {:<14} {}", item.path, item.label);
    }
    Ok(())
}

pub fn route(runtime: &Runtime, args: RouteArgs) -> Result<(), CliError> {
    match runtime.ctx().authorize(&args.path) {
        RouteDecision::Allow(view) => println!("allow {view:?}"),
        decision => println!(
            "redirect {}",
            decision.redirect_path().unwrap_or_default()
        ),
    }
    Ok(())
}
