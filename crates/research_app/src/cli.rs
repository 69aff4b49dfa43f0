use std::path::PathBuf;

use clap::{Parser, Subcommand};

use crate::platform::logging::LogDestination;

#[derive(Debug, Parser)]
#[command(
    name = "research",
    version,
    about = "Run a research query against a research service and follow its progress"
)]
pub struct Cli {
    /// Research question. Read from stdin when omitted.
    pub query: Option<String>,

    /// Configuration file (defaults to ./research.ron when present).
    #[arg(long, value_name = "PATH", global = true)]
    pub config: Option<PathBuf>,

    /// Base URL of the research service.
    #[arg(long, value_name = "URL", env = "RESEARCH_SERVICE_URL", global = true)]
    pub service_url: Option<String>,

    /// Use the single-shot endpoint instead of the event stream.
    #[arg(long, global = true)]
    pub no_stream: bool,

    /// Where log output goes.
    #[arg(long, value_enum, default_value_t = LogDestination::File, global = true)]
    pub log: LogDestination,

    /// Log at debug level.
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Subcommand)]
pub enum Command {
    /// Check whether the research service is reachable.
    Health,
    /// Run the last failed query again.
    Retry,
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn command_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn parses_query_and_flags() {
        let cli = Cli::try_parse_from([
            "research",
            "how do tides work",
            "--no-stream",
            "--log",
            "both",
            "-v",
        ])
        .unwrap();
        assert_eq!(cli.query.as_deref(), Some("how do tides work"));
        assert!(cli.no_stream);
        assert!(cli.verbose);
        assert_eq!(cli.log, LogDestination::Both);
        assert_eq!(cli.command, None);
    }

    #[test]
    fn parses_subcommands_with_global_flags() {
        let cli = Cli::try_parse_from(["research", "health", "--service-url", "http://svc:9000"])
            .unwrap();
        assert_eq!(cli.command, Some(Command::Health));
        assert_eq!(cli.service_url.as_deref(), Some("http://svc:9000"));
        assert_eq!(cli.query, None);

        let cli = Cli::try_parse_from(["research", "retry", "--log", "off"]).unwrap();
        assert_eq!(cli.command, Some(Command::Retry));
        assert_eq!(cli.log, LogDestination::Off);
    }
}
