//! Ls command implementation

use clap::Args;
use miette::{IntoDiagnostic, Result};

use super::Context;
use crate::remote::{RemotePath, Session};
use crate::transport::RemoteError;

/// Arguments for the ls command
#[derive(Debug, Args)]
pub struct LsArgs {
    /// Remote directory to list (default: the application root)
    pub path: Option<String>,
}

/// Run the ls command
pub fn run(ctx: &Context, args: LsArgs) -> Result<()> {
    let dir = args
        .path
        .as_deref()
        .map_or_else(RemotePath::app_root, RemotePath::parse);

    let mut repl = ctx.open_device().into_diagnostic()?;
    let mut session = Session::open(&mut repl).into_diagnostic()?;

    for line in list(&mut session, &dir).into_diagnostic()? {
        println!("{}", line);
    }

    session.close().into_diagnostic()?;
    Ok(())
}

/// Entries of `dir`, directories marked with a trailing `/`
pub fn list(session: &mut Session<'_>, dir: &RemotePath) -> std::result::Result<Vec<String>, RemoteError> {
    let mut lines = Vec::new();
    for name in session.list_dir(dir)? {
        if session.is_file(&dir.join(&name))? {
            lines.push(name);
        } else {
            lines.push(format!("{}/", name));
        }
    }
    Ok(lines)
}
