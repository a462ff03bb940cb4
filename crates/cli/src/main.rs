use clap::Parser;
use log::debug;
use runwatch_core::error::Result;
use runwatch_core::session::{RunSession, SessionState};
use std::process::ExitCode;

use runwatch_cli::cli_args::Args;
use runwatch_cli::run_setup::{build_run, print_invocation};
use runwatch_cli::run_view::{exit_code, RunView};

async fn execute(args: Args) -> Result<Option<SessionState>> {
    let (target, settings) = build_run(&args)?;
    debug!("Run target: {target}");

    if args.dry_run {
        print_invocation(&target, &settings);
        println!("Dry run is specified, exiting without executing.");
        return Ok(None);
    }

    let (handle, events) = RunSession::start(target, settings);
    let state = RunView::new(args.yes).follow(handle, events).await?;

    Ok(Some(state))
}

fn main() -> ExitCode {
    env_logger::init();

    let args = Args::parse();

    let runtime = match tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
    {
        Ok(runtime) => runtime,
        Err(e) => {
            eprintln!("Unable to start the async runtime: {e}");
            return ExitCode::FAILURE;
        }
    };

    let result = runtime.block_on(execute(args));
    // A terminal prompt may still be blocked on stdin.
    runtime.shutdown_background();

    match result {
        Ok(Some(state)) => exit_code(state),
        Ok(None) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("{e}");
            ExitCode::FAILURE
        }
    }
}
