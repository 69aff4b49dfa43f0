use std::collections::VecDeque;
use std::future::Future;
use std::io::IsTerminal;
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Context};
use research_core::{update, AppState, Msg, Outcome};
use research_engine::{EngineHandle, HealthMonitor, ReqwestService, ResearchService};
use research_logging::research_info;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncReadExt, AsyncWriteExt, BufReader};

use super::config::{AppConfig, ConfigOverrides};
use super::effects::EffectRunner;
use super::render::{Line, Renderer};
use super::{logging, persistence};
use crate::cli::{Cli, Command};

const LOG_LEVEL_ENV: &str = "RESEARCH_LOG";
const EXIT_USAGE: u8 = 2;
const EXIT_CANCELLED: u8 = 130;
const CANCEL_GRACE: Duration = Duration::from_secs(2);

pub async fn run_app(cli: Cli) -> anyhow::Result<ExitCode> {
    let mut config = AppConfig::load(cli.config.as_deref())?;
    config.apply_overrides(&ConfigOverrides {
        service_url: cli.service_url.clone(),
        no_stream: cli.no_stream,
    });

    let level = logging::level_for(cli.verbose, std::env::var(LOG_LEVEL_ENV).ok().as_deref());
    logging::initialize(cli.log, level, &config.log_file);
    research_info!(
        "research starting (service_url={}, streaming={})",
        config.service_url,
        config.streaming
    );

    let service = ReqwestService::new(config.service_settings())
        .with_context(|| format!("invalid service url {:?}", config.service_url))?;
    let service: Arc<dyn ResearchService> = Arc::new(service);

    match cli.command {
        Some(Command::Health) => Ok(check_health(service).await),
        Some(Command::Retry) => {
            let query = persistence::load_last_query(&config.state_dir)
                .context("no failed query to retry")?;
            run_research(service, &config, Start::Retry(query)).await
        }
        None => {
            let query = match cli.query {
                Some(query) => query,
                None => read_query().await?,
            };
            run_research(service, &config, Start::Query(query)).await
        }
    }
}

async fn check_health(service: Arc<dyn ResearchService>) -> ExitCode {
    if HealthMonitor::new(service).check().await {
        println!("online");
        ExitCode::SUCCESS
    } else {
        println!("offline");
        ExitCode::FAILURE
    }
}

enum Start {
    Query(String),
    Retry(String),
}

enum Step {
    Interrupted(std::io::Result<()>),
    Engine(Option<Msg>),
}

struct App {
    state: AppState,
    renderer: Renderer,
}

impl App {
    fn new() -> Self {
        Self {
            state: AppState::new(),
            renderer: Renderer::new(),
        }
    }

    /// Applies `msg` and everything the resulting effects feed back, printing
    /// whenever the state changed.
    fn dispatch(&mut self, runner: &mut EffectRunner, msg: Msg) {
        let mut inbox = VecDeque::from([msg]);
        while let Some(msg) = inbox.pop_front() {
            let state = std::mem::take(&mut self.state);
            let (state, effects) = update(state, msg);
            self.state = state;
            inbox.extend(runner.run(effects));
            if self.state.consume_dirty() {
                print_lines(self.renderer.render(&self.state.view()));
            }
        }
    }

    fn outcome(&self) -> Option<Outcome> {
        self.state.session().and_then(|session| session.outcome())
    }
}

async fn run_research(
    service: Arc<dyn ResearchService>,
    config: &AppConfig,
    start: Start,
) -> anyhow::Result<ExitCode> {
    let engine = EngineHandle::new(service, config.stream_mode());
    let mut runner = EffectRunner::new(engine, config.state_dir.clone());
    let mut app = App::new();
    let interactive = std::io::stdin().is_terminal();

    let first = match start {
        Start::Query(query) => {
            if let Some(previous) = persistence::load_last_query(&config.state_dir) {
                app.dispatch(&mut runner, Msg::RestoreLastQuery(previous));
            }
            Msg::QuerySubmitted(query)
        }
        Start::Retry(query) => {
            app.dispatch(&mut runner, Msg::RestoreLastQuery(query));
            Msg::RetryClicked
        }
    };
    app.dispatch(&mut runner, first);
    if app.state.session().is_none() {
        return Ok(ExitCode::from(EXIT_USAGE));
    }

    let ctrl_c = tokio::signal::ctrl_c();
    tokio::pin!(ctrl_c);
    let mut retry_offered = false;

    loop {
        match app.outcome() {
            Some(Outcome::Success) => return Ok(ExitCode::SUCCESS),
            Some(Outcome::Failure) => {
                if interactive && !retry_offered && app.state.can_retry() {
                    retry_offered = true;
                    prompt("Retry? [y/N] ").await?;
                    let stdin = BufReader::new(tokio::io::stdin());
                    match ask_retry(stdin, &mut ctrl_c)
                        .await
                        .context("failed to read the retry answer")?
                    {
                        RetryAnswer::Yes => {
                            app.dispatch(&mut runner, Msg::RetryClicked);
                            continue;
                        }
                        RetryAnswer::No => {}
                        RetryAnswer::Interrupted => {
                            eprintln!();
                            eprintln!("cancelled");
                            return Ok(ExitCode::from(EXIT_CANCELLED));
                        }
                    }
                }
                return Ok(ExitCode::FAILURE);
            }
            None => {}
        }

        let step = tokio::select! {
            biased;
            signal = &mut ctrl_c => Step::Interrupted(signal),
            msg = runner.next_msg() => Step::Engine(msg),
        };

        match step {
            Step::Interrupted(signal) => {
                signal.context("failed to listen for ctrl-c")?;
                let session_id = app.state.session_id();
                app.dispatch(&mut runner, Msg::CancelClicked);
                eprintln!("cancelled");
                if let Some(session_id) = session_id {
                    runner.wait_finished(session_id, CANCEL_GRACE).await;
                }
                return Ok(ExitCode::from(EXIT_CANCELLED));
            }
            Step::Engine(Some(msg)) => app.dispatch(&mut runner, msg),
            Step::Engine(None) => bail!("research engine stopped unexpectedly"),
        }
    }
}

fn print_lines(lines: Vec<Line>) {
    for line in lines {
        match line {
            Line::Out(text) => println!("{text}"),
            Line::Err(text) => eprintln!("{text}"),
        }
    }
}

async fn read_query() -> anyhow::Result<String> {
    let mut stdin = BufReader::new(tokio::io::stdin());
    let mut query = String::new();
    if std::io::stdin().is_terminal() {
        prompt("Query: ").await?;
        stdin.read_line(&mut query).await?;
    } else {
        stdin.read_to_string(&mut query).await?;
    }
    Ok(query)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum RetryAnswer {
    Yes,
    No,
    Interrupted,
}

/// Reads one answer line, giving up as soon as `interrupt` fires. The signal
/// is consumed here so it cannot cancel a session started afterwards.
async fn ask_retry<R, I>(mut input: R, interrupt: I) -> std::io::Result<RetryAnswer>
where
    R: AsyncBufRead + Unpin,
    I: Future<Output = std::io::Result<()>>,
{
    let mut answer = String::new();
    tokio::select! {
        biased;
        signal = interrupt => {
            signal?;
            Ok(RetryAnswer::Interrupted)
        }
        read = input.read_line(&mut answer) => {
            read?;
            if matches!(answer.trim().to_ascii_lowercase().as_str(), "y" | "yes") {
                Ok(RetryAnswer::Yes)
            } else {
                Ok(RetryAnswer::No)
            }
        }
    }
}

async fn prompt(text: &str) -> std::io::Result<()> {
    let mut stderr = tokio::io::stderr();
    stderr.write_all(text.as_bytes()).await?;
    stderr.flush().await
}

#[cfg(test)]
mod tests {
    use std::future::{pending, ready};

    use super::*;

    #[tokio::test]
    async fn retry_answer_is_read_from_input() {
        let never = || pending::<std::io::Result<()>>();
        assert_eq!(ask_retry(&b"yes\n"[..], never()).await.unwrap(), RetryAnswer::Yes);
        assert_eq!(ask_retry(&b" Y \n"[..], never()).await.unwrap(), RetryAnswer::Yes);
        assert_eq!(ask_retry(&b"n\n"[..], never()).await.unwrap(), RetryAnswer::No);
        assert_eq!(ask_retry(&b""[..], never()).await.unwrap(), RetryAnswer::No);
    }

    #[tokio::test]
    async fn interrupt_at_the_prompt_wins_over_a_pending_answer() {
        let answer = ask_retry(&b"y\n"[..], ready(Ok(()))).await.unwrap();
        assert_eq!(answer, RetryAnswer::Interrupted);
    }

    #[tokio::test]
    async fn pinned_signal_future_can_be_lent_to_the_prompt() {
        let interrupt = ready(std::io::Result::Ok(()));
        tokio::pin!(interrupt);
        let answer = ask_retry(tokio::io::empty(), &mut interrupt).await.unwrap();
        assert_eq!(answer, RetryAnswer::Interrupted);
    }
}
