//! Shared fixtures for the integration tests: an in-process aria2 stand-in
//! and configuration pointing at wiremock servers.

#![allow(dead_code)]

use aria_pilot::Config;
use base64::Engine;
use serde_json::{Value, json};
use std::collections::HashMap;
use std::path::Path;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, Request, Respond, ResponseTemplate};

/// A bulk transfer submission seen by the fake daemon
#[derive(Clone, Debug)]
pub struct SubmittedTorrent {
    pub gid: String,
    pub bytes: Vec<u8>,
    pub dir: String,
}

#[derive(Default)]
struct DaemonState {
    next_gid: u64,
    statuses: HashMap<String, Value>,
    locators: Vec<String>,
    torrents: Vec<SubmittedTorrent>,
}

/// aria2 JSON-RPC stand-in. New jobs report `waiting` until a test moves them on.
#[derive(Clone, Default)]
pub struct FakeAria2 {
    state: Arc<Mutex<DaemonState>>,
}

impl FakeAria2 {
    /// Start a mock server answering on `/jsonrpc`
    pub async fn start() -> (Self, MockServer) {
        let fake = FakeAria2::default();
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/jsonrpc"))
            .respond_with(fake.clone())
            .mount(&server)
            .await;
        (fake, server)
    }

    pub fn set_status(&self, gid: &str, status: &str, completed: u64, total: u64, name: &str) {
        let mut state = self.state.lock().unwrap();
        state.statuses.insert(gid.to_string(), status_json(gid, status, completed, total, name));
    }

    pub fn fail(&self, gid: &str, message: &str) {
        let mut state = self.state.lock().unwrap();
        let mut status = status_json(gid, "error", 0, 0, "");
        status["errorMessage"] = json!(message);
        state.statuses.insert(gid.to_string(), status);
    }

    pub fn locators(&self) -> Vec<String> {
        self.state.lock().unwrap().locators.clone()
    }

    pub fn torrents(&self) -> Vec<SubmittedTorrent> {
        self.state.lock().unwrap().torrents.clone()
    }

    fn answer(&self, call: &Value) -> Value {
        let id = call["id"].clone();
        let params = &call["params"];
        let mut state = self.state.lock().unwrap();

        let result = match call["method"].as_str().unwrap_or_default() {
            "aria2.getVersion" => json!({ "version": "1.37.0", "enabledFeatures": ["BitTorrent"] }),
            "aria2.addUri" => {
                let gid = new_gid(&mut state);
                state
                    .locators
                    .push(params[0][0].as_str().unwrap_or_default().to_string());
                json!(gid)
            }
            "aria2.addTorrent" => {
                let gid = new_gid(&mut state);
                let bytes = base64::engine::general_purpose::STANDARD
                    .decode(params[0].as_str().unwrap_or_default())
                    .unwrap_or_default();
                let dir = params[2]["dir"].as_str().unwrap_or_default().to_string();
                state.torrents.push(SubmittedTorrent {
                    gid: gid.clone(),
                    bytes,
                    dir,
                });
                json!(gid)
            }
            "aria2.remove" => {
                let gid = params[0].as_str().unwrap_or_default().to_string();
                let removed = status_json(&gid, "removed", 0, 0, "");
                state.statuses.insert(gid.clone(), removed);
                json!(gid)
            }
            "aria2.tellActive" => Value::Array(
                state
                    .statuses
                    .values()
                    .filter(|s| s["status"] == "active")
                    .cloned()
                    .collect(),
            ),
            "aria2.tellStatus" => {
                let gid = params[0].as_str().unwrap_or_default();
                match state.statuses.get(gid) {
                    Some(status) => status.clone(),
                    None => {
                        return json!({
                            "jsonrpc": "2.0",
                            "id": id,
                            "error": { "code": 1, "message": format!("GID {gid} is not found") }
                        });
                    }
                }
            }
            other => {
                return json!({
                    "jsonrpc": "2.0",
                    "id": id,
                    "error": { "code": 1, "message": format!("No such method: {other}") }
                });
            }
        };
        json!({ "jsonrpc": "2.0", "id": id, "result": result })
    }
}

impl Respond for FakeAria2 {
    fn respond(&self, request: &Request) -> ResponseTemplate {
        let Ok(body) = serde_json::from_slice::<Value>(&request.body) else {
            return ResponseTemplate::new(400);
        };
        let answer = match &body {
            Value::Array(calls) => Value::Array(calls.iter().map(|c| self.answer(c)).collect()),
            call => self.answer(call),
        };
        ResponseTemplate::new(200).set_body_json(answer)
    }
}

fn new_gid(state: &mut DaemonState) -> String {
    state.next_gid += 1;
    let gid = format!("{:016x}", state.next_gid);
    state
        .statuses
        .insert(gid.clone(), status_json(&gid, "waiting", 0, 0, ""));
    gid
}

fn status_json(gid: &str, status: &str, completed: u64, total: u64, name: &str) -> Value {
    let mut value = json!({
        "gid": gid,
        "infoHash": "",
        "status": status,
        "completedLength": completed.to_string(),
        "totalLength": total.to_string(),
    });
    if !name.is_empty() {
        value["bittorrent"] = json!({ "info": { "name": name } });
    }
    value
}

/// Configuration rooted in `dir`, talking to the given servers
pub fn config_for(dir: &Path, aria2: &MockServer, classifier: &MockServer) -> Config {
    let mut config = Config::default();
    config.daemon.rpc_url = format!("{}/jsonrpc", aria2.uri());
    config.daemon.polling_interval = Duration::from_millis(25);
    config.classifier.url = format!("{}/predict", classifier.uri());
    config.directories.series = dir.join("series");
    config.directories.movies = dir.join("movies");
    config.directories.general = dir.join("general");
    config.directories.metadata_dir = dir.join("metadata");
    config.persistence.database_path = dir.join("state").join("aria-pilot.db");
    config.notifications.retry.max_attempts = 1;
    config.notifications.retry.initial_delay = Duration::from_millis(1);
    config.api.enabled = false;
    std::fs::create_dir_all(&config.directories.metadata_dir).unwrap();
    config
}

/// Wait for the first broadcast event matching `wanted`
pub async fn wait_for_event(
    events: &mut tokio::sync::broadcast::Receiver<aria_pilot::Event>,
    wanted: impl Fn(&aria_pilot::Event) -> bool,
) -> aria_pilot::Event {
    tokio::time::timeout(Duration::from_secs(10), async {
        loop {
            match events.recv().await {
                Ok(event) if wanted(&event) => return event,
                Ok(_) => {}
                Err(e) => panic!("event stream closed: {e}"),
            }
        }
    })
    .await
    .expect("timed out waiting for event")
}
