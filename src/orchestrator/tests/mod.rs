//! Tests for the orchestrator
//!
//! - `lifecycle` - status event transitions against test doubles
//! - `commands` - owner commands through the command dispatcher
//! - `recovery` - startup re-registration
//! - `wiring` - the spawned orchestrator end to end with a polling loop

use super::Command;
use super::lifecycle::LifecycleMachine;
use crate::error::Result;
use crate::types::Event;
use std::time::Duration;
use tokio::sync::{broadcast, oneshot};


/// Run one command on `machine` and return its answer
async fn run_command<T>(
    machine: &LifecycleMachine,
    build: impl FnOnce(oneshot::Sender<Result<T>>) -> Command,
) -> Result<T> {
    let (reply, rx) = oneshot::channel();
    machine.execute(build(reply)).await;
    rx.await.unwrap()
}

/// Wait for the first event matching `wanted`, skipping others
async fn next_event(
    events: &mut broadcast::Receiver<Event>,
    wanted: impl Fn(&Event) -> bool,
) -> Event {
    tokio::time::timeout(Duration::from_secs(5), async {
        loop {
            let event = events.recv().await.unwrap();
            if wanted(&event) {
                return event;
            }
        }
    })
    .await
    .expect("timed out waiting for event")
}
