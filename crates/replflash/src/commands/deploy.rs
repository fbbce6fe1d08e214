//! Deploy command implementation

use camino::Utf8PathBuf;
use clap::Args;
use miette::{IntoDiagnostic, Result};
use std::io::{self, BufRead, Write};

use super::Context;
use crate::deploy::{
    BootstrapAction, DeployOutcome, DeployPlan, DeployRequest, DeploySettings, Deployer,
};
use crate::transport::{Issued, MemoryBoard};

/// Arguments for the deploy command
#[derive(Debug, Args)]
pub struct DeployArgs {
    /// Local file or directory to deploy
    pub path: Utf8PathBuf,

    /// Subdirectory of the application root to deploy into
    #[arg(long)]
    pub subpath: Option<String>,

    /// Erase the application root first
    #[arg(long)]
    pub erase: bool,

    /// Send every file as binary
    #[arg(long)]
    pub binary: bool,

    /// Lines sent between two flushes of a text file
    #[arg(long, value_name = "LINES")]
    pub flush_every: Option<usize>,

    /// Function to run on boot, e.g. app.main.run
    #[arg(long, value_name = "MODULE.FUNCTION", conflicts_with = "clear_entry_point")]
    pub entry_point: Option<String>,

    /// Remove the autorun call from the bootstrap file
    #[arg(long)]
    pub clear_entry_point: bool,

    /// Do not ask for confirmation
    #[arg(short = 'y', long)]
    pub yes: bool,

    /// Deploy to a simulated board and print the statements that would be sent
    #[arg(long)]
    pub dry_run: bool,
}

impl DeployArgs {
    fn request(&self) -> DeployRequest {
        DeployRequest {
            local_path: self.path.clone(),
            remote_subpath: self.subpath.clone(),
            erase: self.erase,
            force_binary: self.binary,
            flush_every: self.flush_every,
            entry_point: self.entry_point.clone(),
            clear_entry_point: self.clear_entry_point,
        }
    }
}

/// Run the deploy command
pub fn run(ctx: &Context, args: DeployArgs) -> Result<()> {
    let request = args.request();

    if args.dry_run {
        return dry_run(ctx, &request);
    }

    let deployer = Deployer::new(ctx.config.deploy_settings());
    let plan = DeployPlan::prepare(&request, deployer.settings()).into_diagnostic()?;
    let mut repl = ctx.open_device().into_diagnostic()?;

    let result = if args.yes {
        describe(&plan);
        deployer.run(&plan, &mut repl, &mut |_: &DeployPlan| true)
    } else {
        deployer.run(&plan, &mut repl, &mut prompt)
    };
    let outcome = result.into_diagnostic()?;

    match outcome {
        DeployOutcome::Aborted => println!("Aborted, the board was not changed"),
        DeployOutcome::Completed(summary) => {
            tracing::info!("Deployment complete!");
            println!(
                "Deployed {} files ({} bytes) to {}",
                summary.mirror.files(),
                summary.mirror.bytes,
                summary.target
            );
            println!("Bootstrap: {}", summary.bootstrap);
        }
    }
    Ok(())
}

fn dry_run(ctx: &Context, request: &DeployRequest) -> Result<()> {
    let settings = DeploySettings {
        show_progress: false,
        ..ctx.config.deploy_settings()
    };
    let deployer = Deployer::new(settings);
    let plan = DeployPlan::prepare(request, deployer.settings()).into_diagnostic()?;
    describe(&plan);

    let mut board = MemoryBoard::new();
    deployer
        .run(&plan, &mut board, &mut |_: &DeployPlan| true)
        .into_diagnostic()?;

    println!("\nStatements for an empty board:");
    for issued in board.issued() {
        match issued {
            Issued::Exec(code) => println!("  {}", code),
            Issued::ExecNoWait(code) => println!("  {}  (no wait)", code),
            Issued::Eval(expr) => println!("  ? {}", expr),
        }
    }
    Ok(())
}

fn describe(plan: &DeployPlan) {
    println!("Source: {}", plan.local.path);
    println!("Target: {}", plan.target);
    if plan.erase {
        println!("Erase:  {} and everything below it", crate::remote::APP_ROOT);
    }
    match &plan.bootstrap {
        BootstrapAction::PathOnly => println!("Boot:   no autorun"),
        BootstrapAction::ClearMain => println!("Boot:   autorun removed"),
        BootstrapAction::EntryPoint(entry) => println!("Boot:   runs {}()", entry),
    }

    let transfers = plan.transfers();
    println!("Files:  {}", transfers.len());
    for (local, remote, mode) in &transfers {
        tracing::debug!("{} -> {} ({:?})", local, remote, mode);
    }
}

fn prompt(plan: &DeployPlan) -> bool {
    describe(plan);
    print!("Proceed? [y/N] ");
    if io::stdout().flush().is_err() {
        return false;
    }

    let mut answer = String::new();
    if io::stdin().lock().read_line(&mut answer).is_err() {
        return false;
    }
    matches!(answer.trim(), "y" | "Y" | "yes")
}
