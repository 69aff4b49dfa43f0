use research_core::{AppViewModel, HealthState, Outcome, Phase, SessionId, SessionView};
use serde_json::Value;

/// One line of terminal output.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Line {
    Out(String),
    Err(String),
}

/// Turns successive view models into the lines that changed since the last
/// render.
#[derive(Debug, Default)]
pub struct Renderer {
    last_health: HealthState,
    last_input_error: Option<String>,
    last_progress: Option<String>,
    plan_shown: Option<SessionId>,
    settled_shown: Option<SessionId>,
}

impl Renderer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn render(&mut self, view: &AppViewModel) -> Vec<Line> {
        let mut lines = Vec::new();

        if view.health != self.last_health {
            self.last_health = view.health;
            if view.health == HealthState::Offline {
                lines.push(Line::Err(
                    "warning: the research service is not responding".to_string(),
                ));
            }
        }

        if view.input_error != self.last_input_error {
            self.last_input_error = view.input_error.clone();
            if let Some(error) = &view.input_error {
                lines.push(Line::Err(format!("error: {error}")));
            }
        }

        if let Some(session) = &view.session {
            self.render_session(session, &mut lines);
        }
        lines
    }

    fn render_session(&mut self, session: &SessionView, lines: &mut Vec<Line>) {
        let id = session.session_id;

        if !session.plan.is_empty() && self.plan_shown != Some(id) {
            self.plan_shown = Some(id);
            lines.push(Line::Out(format!(
                "[{id}] plan: {} searches",
                session.plan.len()
            )));
            for (position, item) in session.plan.iter().enumerate() {
                if item.reason.is_empty() {
                    lines.push(Line::Out(format!("  {}. {}", position + 1, item.query)));
                } else {
                    lines.push(Line::Out(format!(
                        "  {}. {} ({})",
                        position + 1,
                        item.query,
                        item.reason
                    )));
                }
            }
        }

        if let Phase::Done(outcome) = session.phase {
            if self.settled_shown == Some(id) {
                return;
            }
            self.settled_shown = Some(id);
            self.last_progress = None;
            match outcome {
                Outcome::Success => {
                    let rendered = session.result.as_ref().map(render_result);
                    lines.push(Line::Out(format!("[{id}] done")));
                    if let Some(rendered) = rendered.filter(|text| !text.is_empty()) {
                        lines.push(Line::Out(rendered));
                    }
                }
                Outcome::Failure => {
                    let error = session.error.as_deref().unwrap_or("unknown error");
                    lines.push(Line::Err(format!("[{id}] research failed: {error}")));
                }
            }
            return;
        }

        let progress = progress_line(session);
        if self.last_progress.as_deref() != Some(progress.as_str()) {
            self.last_progress = Some(progress.clone());
            lines.push(Line::Out(progress));
        }
    }
}

pub fn progress_line(session: &SessionView) -> String {
    let mut line = format!("[{}] {}", session.session_id, session.progress_label());
    if session.phase == Phase::Searching {
        if let Some(item) = session.current_item() {
            line.push_str(&format!(": {}", item.query));
        }
    }
    if let Some(message) = &session.last_message {
        line.push_str(&format!(" | {message}"));
    }
    line
}

/// Renders a final result: plain text as-is, the `report` or `markdown` field
/// of an object when present, pretty JSON otherwise.
pub fn render_result(result: &Value) -> String {
    match result {
        Value::Null => String::new(),
        Value::String(text) => text.clone(),
        Value::Object(map) => ["report", "markdown"]
            .iter()
            .find_map(|key| map.get(*key).and_then(Value::as_str))
            .map(ToOwned::to_owned)
            .unwrap_or_else(|| pretty_json(result)),
        other => pretty_json(other),
    }
}

fn pretty_json(value: &Value) -> String {
    serde_json::to_string_pretty(value).unwrap_or_else(|_| value.to_string())
}
