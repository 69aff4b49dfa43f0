use crate::session::{Applied, Outcome};
use crate::{AppState, Effect, Msg};

/// Pure update function: applies a message to state and returns any effects.
pub fn update(mut state: AppState, msg: Msg) -> (AppState, Vec<Effect>) {
    let effects = match msg {
        Msg::QuerySubmitted(raw) => submit(&mut state, &raw),
        Msg::RetryClicked => {
            if !state.can_retry() {
                return (state, Vec::new());
            }
            match state.last_query().map(ToOwned::to_owned) {
                Some(query) => submit(&mut state, &query),
                None => Vec::new(),
            }
        }
        Msg::CancelClicked => {
            if !state.is_in_flight() {
                return (state, Vec::new());
            }
            match state.clear_session() {
                Some(session_id) => vec![Effect::CancelResearch { session_id }],
                None => Vec::new(),
            }
        }
        Msg::RecheckHealthClicked => vec![Effect::CheckHealth],
        Msg::RestoreLastQuery(query) => {
            state.restore_last_query(query);
            Vec::new()
        }
        Msg::SessionEvent { session_id, event } => {
            match state.apply_session_event(session_id, &event) {
                Some(Applied::Settled(Outcome::Success)) => {
                    vec![Effect::PersistLastQuery { query: None }]
                }
                Some(Applied::Settled(Outcome::Failure)) => vec![Effect::PersistLastQuery {
                    query: state.last_query().map(ToOwned::to_owned),
                }],
                _ => Vec::new(),
            }
        }
        Msg::HealthChecked { online } => {
            state.set_health(online);
            Vec::new()
        }
        Msg::NoOp => Vec::new(),
    };

    (state, effects)
}

fn submit(state: &mut AppState, raw: &str) -> Vec<Effect> {
    // One session at a time; a new query waits for the current one to settle.
    if state.is_in_flight() {
        return Vec::new();
    }
    match state.begin_session(raw) {
        Ok((session_id, query)) => vec![
            Effect::CheckHealth,
            Effect::StartResearch { session_id, query },
        ],
        Err(err) => {
            state.set_input_error(Some(err));
            Vec::new()
        }
    }
}
