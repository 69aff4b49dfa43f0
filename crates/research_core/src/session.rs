use std::fmt;

use serde_json::Value;

use crate::{ProgressEvent, SearchItem};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    Success,
    Failure,
}

/// Lifecycle phase of one research session. The phase alone decides what a
/// caller should render; the other [`SessionState`] fields are annotations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Phase {
    #[default]
    Idle,
    /// Request issued, nothing received yet.
    Running,
    Planning,
    Searching,
    Reporting,
    Done(Outcome),
}

impl Phase {
    fn rank(self) -> u8 {
        match self {
            Phase::Idle => 0,
            Phase::Running => 1,
            Phase::Planning => 2,
            Phase::Searching => 3,
            Phase::Reporting => 4,
            Phase::Done(_) => 5,
        }
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, Phase::Done(_))
    }

    /// True between start and settlement.
    pub fn is_in_flight(self) -> bool {
        !matches!(self, Phase::Idle | Phase::Done(_))
    }

    /// Maps a service stage label onto the phase it announces, if any.
    fn from_stage(stage: &str) -> Option<Phase> {
        match stage.trim().to_ascii_lowercase().as_str() {
            "planning" | "plan" => Some(Phase::Planning),
            "searching" | "search" => Some(Phase::Searching),
            "reporting" | "report" | "writing" | "generating" | "generating_report"
            | "synthesizing" => Some(Phase::Reporting),
            _ => None,
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            Phase::Idle => "idle",
            Phase::Running => "running",
            Phase::Planning => "planning",
            Phase::Searching => "searching",
            Phase::Reporting => "reporting",
            Phase::Done(Outcome::Success) => "done",
            Phase::Done(Outcome::Failure) => "failed",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum QueryError {
    #[error("query must not be empty")]
    Empty,
}

/// Trims a user query, rejecting blank input.
pub fn normalize_query(raw: &str) -> Result<String, QueryError> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Err(QueryError::Empty);
    }
    Ok(trimmed.to_string())
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SearchFailure {
    pub index: usize,
    pub error: String,
}

/// Result of folding one event into a session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Applied {
    Accepted,
    /// The event was terminal; the session is now `Done`.
    Settled(Outcome),
    /// The event was inert for the current state and changed nothing.
    Ignored(IgnoreReason),
}

impl Applied {
    pub fn is_ignored(&self) -> bool {
        matches!(self, Applied::Ignored(_))
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IgnoreReason {
    NotStarted,
    AlreadySettled,
    PlanAlreadyReceived,
    NoPlan,
    OutOfPhase(Phase),
    IndexRegressed { current: usize, index: usize },
    IndexOutOfRange { index: usize, planned: usize },
}

impl fmt::Display for IgnoreReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            IgnoreReason::NotStarted => write!(f, "session not started"),
            IgnoreReason::AlreadySettled => write!(f, "session already settled"),
            IgnoreReason::PlanAlreadyReceived => write!(f, "search plan already received"),
            IgnoreReason::NoPlan => write!(f, "no search plan received yet"),
            IgnoreReason::OutOfPhase(phase) => write!(f, "not expected in phase {}", phase.label()),
            IgnoreReason::IndexRegressed { current, index } => {
                write!(f, "search index {index} is behind current index {current}")
            }
            IgnoreReason::IndexOutOfRange { index, planned } => {
                write!(f, "search index {index} exceeds plan of {planned}")
            }
        }
    }
}

/// State of one research session, owned by whoever drives it.
#[derive(Debug, Clone, PartialEq)]
pub struct SessionState {
    query: String,
    phase: Phase,
    plan: Option<Vec<SearchItem>>,
    current_stage: Option<String>,
    current_search_index: usize,
    completed_count: usize,
    last_message: Option<String>,
    search_failures: Vec<SearchFailure>,
    result: Option<Value>,
    error: Option<String>,
}

impl SessionState {
    /// Creates an idle session for `query`. The query is trimmed and fixed for
    /// the lifetime of the session.
    pub fn new(query: &str) -> Result<Self, QueryError> {
        Ok(Self {
            query: normalize_query(query)?,
            phase: Phase::Idle,
            plan: None,
            current_stage: None,
            current_search_index: 0,
            completed_count: 0,
            last_message: None,
            search_failures: Vec::new(),
            result: None,
            error: None,
        })
    }

    /// Moves `Idle` to `Running`. Returns false if the session was already started.
    pub fn start(&mut self) -> bool {
        if self.phase != Phase::Idle {
            return false;
        }
        self.phase = Phase::Running;
        true
    }

    pub fn query(&self) -> &str {
        &self.query
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub fn plan(&self) -> &[SearchItem] {
        self.plan.as_deref().unwrap_or(&[])
    }

    pub fn has_plan(&self) -> bool {
        self.plan.is_some()
    }

    pub fn current_stage(&self) -> Option<&str> {
        self.current_stage.as_deref()
    }

    pub fn current_search_index(&self) -> usize {
        self.current_search_index
    }

    pub fn completed_count(&self) -> usize {
        self.completed_count
    }

    pub fn last_message(&self) -> Option<&str> {
        self.last_message.as_deref()
    }

    pub fn search_failures(&self) -> &[SearchFailure] {
        &self.search_failures
    }

    pub fn result(&self) -> Option<&Value> {
        self.result.as_ref()
    }

    pub fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }

    pub fn outcome(&self) -> Option<Outcome> {
        match self.phase {
            Phase::Done(outcome) => Some(outcome),
            _ => None,
        }
    }

    pub fn is_settled(&self) -> bool {
        self.phase.is_terminal()
    }

    /// Folds one event into the session. Events the current state does not
    /// expect are inert and reported as [`Applied::Ignored`].
    pub fn apply(&mut self, event: &ProgressEvent) -> Applied {
        match self.phase {
            Phase::Idle => return Applied::Ignored(IgnoreReason::NotStarted),
            Phase::Done(_) => return Applied::Ignored(IgnoreReason::AlreadySettled),
            _ => {}
        }

        match event {
            ProgressEvent::Status { stage, message } => {
                self.current_stage = Some(stage.clone());
                self.note_message(message);
                if let Some(next) = Phase::from_stage(stage) {
                    // Stages only ever move the session forward.
                    if next.rank() > self.phase.rank() {
                        self.phase = next;
                    }
                }
                Applied::Accepted
            }
            ProgressEvent::Plan { items, message } => {
                if self.plan.is_some() {
                    return Applied::Ignored(IgnoreReason::PlanAlreadyReceived);
                }
                if self.phase == Phase::Reporting {
                    return Applied::Ignored(IgnoreReason::OutOfPhase(self.phase));
                }
                self.plan = Some(items.clone());
                self.current_search_index = 0;
                self.phase = Phase::Searching;
                self.note_message(message);
                Applied::Accepted
            }
            ProgressEvent::SearchStarted { index, message, .. } => {
                if let Err(reason) = self.planned_len() {
                    return Applied::Ignored(reason);
                }
                if *index < self.current_search_index {
                    return Applied::Ignored(IgnoreReason::IndexRegressed {
                        current: self.current_search_index,
                        index: *index,
                    });
                }
                self.current_search_index = *index;
                self.note_message(message);
                Applied::Accepted
            }
            ProgressEvent::SearchCompleted {
                completed, message, ..
            } => {
                if let Err(reason) = self.planned_len() {
                    return Applied::Ignored(reason);
                }
                self.completed_count = *completed;
                self.note_message(message);
                Applied::Accepted
            }
            ProgressEvent::SearchFailed { index, error } => {
                let planned = match self.planned_len() {
                    Ok(planned) => planned,
                    Err(reason) => return Applied::Ignored(reason),
                };
                if *index > planned {
                    return Applied::Ignored(IgnoreReason::IndexOutOfRange {
                        index: *index,
                        planned,
                    });
                }
                self.search_failures.push(SearchFailure {
                    index: *index,
                    error: error.clone(),
                });
                Applied::Accepted
            }
            ProgressEvent::Complete { result, .. } => {
                self.result = Some(result.clone());
                self.phase = Phase::Done(Outcome::Success);
                Applied::Settled(Outcome::Success)
            }
            ProgressEvent::Failed { message } => {
                self.error = Some(message.clone());
                self.phase = Phase::Done(Outcome::Failure);
                Applied::Settled(Outcome::Failure)
            }
        }
    }

    fn planned_len(&self) -> Result<usize, IgnoreReason> {
        self.plan
            .as_ref()
            .map(Vec::len)
            .ok_or(IgnoreReason::NoPlan)
    }

    fn note_message(&mut self, message: &Option<String>) {
        if let Some(message) = message {
            self.last_message = Some(message.clone());
        }
    }
}

/// Pure reducer form of [`SessionState::apply`].
pub fn reduce(mut state: SessionState, event: &ProgressEvent) -> (SessionState, Applied) {
    let applied = state.apply(event);
    (state, applied)
}
