//! Autorun command implementation

use clap::Subcommand;
use miette::{IntoDiagnostic, Result};

use super::Context;
use crate::deploy::{BootstrapManager, EntryPoint, ObservedBootstrap};
use crate::remote::{BOOTSTRAP_FILE, Session};

/// Bootstrap file subcommands
#[derive(Debug, Subcommand)]
pub enum AutorunCommand {
    /// Run a function on boot
    Set {
        /// Function to run, e.g. app.main.run
        #[arg(value_name = "MODULE.FUNCTION")]
        entry_point: EntryPoint,
    },

    /// Stop running anything on boot
    Clear,

    /// Show what the board runs on boot
    Show,
}

/// Run the autorun command
pub fn run(ctx: &Context, command: AutorunCommand) -> Result<()> {
    let mut repl = ctx.open_device().into_diagnostic()?;
    let mut session = Session::open(&mut repl).into_diagnostic()?;
    let manager = BootstrapManager::new(ctx.config.deploy_settings().pacing);

    match command {
        AutorunCommand::Set { entry_point } => {
            let state = manager
                .set_entry_point(&mut session, &entry_point)
                .into_diagnostic()?;
            println!("Bootstrap: {}", state);
        }
        AutorunCommand::Clear => {
            let state = manager.clear_main(&mut session).into_diagnostic()?;
            println!("Bootstrap: {}", state);
        }
        AutorunCommand::Show => match manager.read(&mut session).into_diagnostic()? {
            ObservedBootstrap::Missing => println!("{} does not exist", BOOTSTRAP_FILE),
            ObservedBootstrap::Managed(state) => println!("Bootstrap: {}", state),
            ObservedBootstrap::Unmanaged => {
                println!("{} was not written by replflash", BOOTSTRAP_FILE)
            }
        },
    }

    session.close().into_diagnostic()?;
    Ok(())
}
