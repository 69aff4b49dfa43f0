mod common;

use std::time::Duration;

use common::{init_logging, sse, ChannelService};
use pretty_assertions::assert_eq;
use research_core::{ProgressEvent, QueryError};
use research_engine::{
    EngineEvent, EngineHandle, FailureKind, StartError, StreamMode, TransportError,
};

async fn next(engine: &mut EngineHandle) -> EngineEvent {
    tokio::time::timeout(Duration::from_secs(5), engine.recv())
        .await
        .expect("engine event in time")
        .expect("engine channel open")
}

#[tokio::test]
async fn session_events_are_tagged_and_followed_by_finish() {
    init_logging();
    let service = ChannelService::scripted(&[
        &sse("status", r#"{"stage":"planning"}"#),
        &sse("complete", r#"{"success":true,"result":"done"}"#),
    ]);
    let mut engine = EngineHandle::new(service, StreamMode::Streaming);
    engine.start_session(7, "tides").unwrap();
    assert_eq!(engine.active_sessions(), 1);

    assert_eq!(
        next(&mut engine).await,
        EngineEvent::Session {
            session_id: 7,
            event: ProgressEvent::Status {
                stage: "planning".into(),
                message: None
            }
        }
    );
    assert!(matches!(
        next(&mut engine).await,
        EngineEvent::Session {
            session_id: 7,
            event: ProgressEvent::Complete { .. }
        }
    ));
    assert_eq!(
        next(&mut engine).await,
        EngineEvent::SessionFinished {
            session_id: 7,
            cancelled: false
        }
    );
    assert_eq!(engine.active_sessions(), 0);
}

#[tokio::test]
async fn diagnostics_carry_the_session_id() {
    let service = ChannelService::scripted(&[
        "data: [1,2]\n",
        &sse("complete", r#"{"success":false,"message":"nope"}"#),
    ]);
    let mut engine = EngineHandle::new(service, StreamMode::Streaming);
    engine.start_session(3, "q").unwrap();

    assert!(matches!(
        next(&mut engine).await,
        EngineEvent::Diagnostic { session_id: 3, .. }
    ));
    assert_eq!(
        next(&mut engine).await,
        EngineEvent::Session {
            session_id: 3,
            event: ProgressEvent::failed("nope")
        }
    );
}

#[tokio::test]
async fn cancel_reports_a_cancelled_finish() {
    let (service, feed) = ChannelService::new();
    let mut engine = EngineHandle::new(service.clone(), StreamMode::Streaming);
    engine.start_session(1, "q").unwrap();
    assert!(feed.send(&sse("status", r#"{"stage":"planning"}"#)));
    assert!(matches!(
        next(&mut engine).await,
        EngineEvent::Session { session_id: 1, .. }
    ));

    engine.cancel(1);
    assert_eq!(
        next(&mut engine).await,
        EngineEvent::SessionFinished {
            session_id: 1,
            cancelled: true
        }
    );
    assert_eq!(engine.active_sessions(), 0);
    assert!(service.released());

    // Unknown ids are a no-op.
    engine.cancel(42);
}

#[tokio::test]
async fn blank_query_is_rejected_without_spawning() {
    let (service, _feed) = ChannelService::new();
    let mut engine = EngineHandle::new(service.clone(), StreamMode::Streaming);
    assert_eq!(
        engine.start_session(1, " \t "),
        Err(StartError::Query(QueryError::Empty))
    );
    assert_eq!(engine.active_sessions(), 0);
    assert_eq!(service.opened(), 0);
}

#[tokio::test]
async fn health_checks_report_online_and_offline() {
    let (healthy, _feed) = ChannelService::new();
    let mut engine = EngineHandle::new(healthy, StreamMode::Streaming);
    engine.check_health();
    assert_eq!(next(&mut engine).await, EngineEvent::Health { online: true });

    let refusing = ChannelService::refusing(TransportError::new(
        FailureKind::Network,
        "connection refused",
    ));
    let mut engine = EngineHandle::new(refusing, StreamMode::SingleShot);
    engine.check_health();
    assert_eq!(next(&mut engine).await, EngineEvent::Health { online: false });
}

#[tokio::test]
async fn dropping_the_engine_cancels_running_sessions() {
    let (service, feed) = ChannelService::new();
    let mut engine = EngineHandle::new(service.clone(), StreamMode::Streaming);
    engine.start_session(9, "q").unwrap();
    assert!(feed.send(&sse("status", r#"{"stage":"planning"}"#)));
    next(&mut engine).await;
    drop(engine);

    for _ in 0..100 {
        if service.released() {
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    assert!(service.released());
}

#[tokio::test]
async fn a_session_id_stays_reserved_until_finished() {
    let (service, feed) = ChannelService::new();
    let mut engine = EngineHandle::new(service.clone(), StreamMode::Streaming);
    engine.start_session(5, "first").unwrap();
    assert_eq!(
        engine.start_session(5, "second"),
        Err(StartError::AlreadyRunning(5))
    );
    assert_eq!(engine.active_sessions(), 1);

    assert!(feed.send(&sse("status", r#"{"stage":"planning"}"#)));
    assert!(matches!(
        next(&mut engine).await,
        EngineEvent::Session { session_id: 5, .. }
    ));

    // Cancelled but not yet finished: the id is still taken.
    engine.cancel(5);
    assert_eq!(
        engine.start_session(5, "third"),
        Err(StartError::AlreadyRunning(5))
    );
    assert_eq!(
        next(&mut engine).await,
        EngineEvent::SessionFinished {
            session_id: 5,
            cancelled: true
        }
    );
    assert_eq!(engine.active_sessions(), 0);
    assert!(service.released());
    assert_eq!(service.opened(), 1);
}
