//! Event collection and assertion helpers.

use pdca_protocol::ipc::Event;
use pdca_protocol::stage_models::Stage;
use tokio::sync::mpsc;

/// Drain every event currently buffered in the channel.
#[allow(dead_code)]
pub fn drain_events(rx: &mut mpsc::Receiver<Event>) -> Vec<Event> {
    let mut events = Vec::new();
    while let Ok(event) = rx.try_recv() {
        events.push(event);
    }
    events
}

/// Assert that events start with RunStarted and end with a terminal event.
#[allow(dead_code)]
pub fn assert_event_sequence(events: &[Event]) {
    assert!(!events.is_empty(), "Event sequence is empty");

    assert!(
        matches!(events[0], Event::RunStarted { .. }),
        "First event should be RunStarted, got: {:?}",
        events[0]
    );

    let last = events.last().unwrap();
    assert!(
        last.is_terminal(),
        "Last event should be RunCompleted or RunFailed, got: {last:?}"
    );
}

/// Count events matching a predicate.
#[allow(dead_code)]
pub fn count_events(events: &[Event], predicate: impl Fn(&Event) -> bool) -> usize {
    events.iter().filter(|event| predicate(event)).count()
}

/// Stages in the order they were started.
#[allow(dead_code)]
pub fn started_stages(events: &[Event]) -> Vec<Stage> {
    events
        .iter()
        .filter_map(|event| match event {
            Event::StepStarted { stage, .. } => Some(*stage),
            _ => None,
        })
        .collect()
}
