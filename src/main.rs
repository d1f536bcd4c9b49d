//! Kodegen Releasify - release packager for update-aware applications.
//!
//! This binary validates a package, post-processes its content and publishes
//! full and delta releases into a release directory.

use env_logger::Env;
use kodegen_releasify::cli;
use std::process;

#[tokio::main]
async fn main() {
    let args = cli::parse_args();

    let default_filter = if args.verbose { "debug" } else { "info" };
    env_logger::Builder::from_env(Env::default().default_filter_or(default_filter)).init();

    let exit_code = match cli::run(args).await {
        Ok(code) => code,
        Err(e) => {
            eprintln!("Error: {e}");
            for suggestion in e.recovery_suggestions() {
                eprintln!("  hint: {suggestion}");
            }
            1
        }
    };

    process::exit(exit_code);
}
