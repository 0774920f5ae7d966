pub mod cli;
pub mod commands;

use binder_core::logging;
use clap::Parser;
use cli::Binder;
use commands::handle_command;
use std::process;

/// Run the binder CLI application
pub fn run_main() {
    let args = Binder::parse();
    let _log_guard = logging::init(args.verbose);

    if let Err(e) = handle_command(args.command, args.profile) {
        tracing::debug!(error = ?e, "Command failed");
        eprintln!("Error: {}", e);
        process::exit(1);
    }
}
