//! `bt` — personal, multi-host backup engine CLI.
//!
//! Usage:
//!   bt config init
//!   bt init
//!   bt add [PATH]
//!   bt backup
//!   bt status [--deleted]
//!   bt log FILE
//!   bt restore FILE --digest=HEX

use std::process::ExitCode;

use bt::infrastructure::cli;

#[tokio::main]
async fn main() -> ExitCode {
    cli::run().await
}