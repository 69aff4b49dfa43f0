use std::process::ExitCode;

use clap::Parser;
use research_app::cli::Cli;

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    match research_app::platform::run_app(cli).await {
        Ok(code) => code,
        Err(err) => {
            eprintln!("research: {err:#}");
            ExitCode::FAILURE
        }
    }
}
