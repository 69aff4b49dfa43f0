//! Research core: pure session state machine and view-model helpers.
mod effect;
mod event;
mod msg;
mod session;
mod state;
mod update;
mod view_model;

pub use effect::Effect;
pub use event::{ProgressEvent, SearchItem, SessionId};
pub use msg::Msg;
pub use session::{
    normalize_query, reduce, Applied, IgnoreReason, Outcome, Phase, QueryError, SearchFailure,
    SessionState,
};
pub use state::{AppState, HealthState};
pub use update::update;
pub use view_model::{AppViewModel, SessionView};
