#![allow(dead_code)]

use std::sync::{Arc, Mutex};
use std::time::Duration;

use apnamanager_client::{ClientConfig, Host, SessionStore, Transport};
use serde_json::{Value, json};
use url::Url;
use wiremock::MockServer;

/// Host that records every side effect for assertions.
#[derive(Default)]
pub struct RecordingHost {
    pub toasts: Mutex<Vec<String>>,
    pub navigations: Mutex<Vec<String>>,
    pub removed_items: Mutex<Vec<String>>,
    pub expired_cookies: Mutex<Vec<String>>,
}

impl RecordingHost {
    pub fn toasts(&self) -> Vec<String> {
        self.toasts.lock().unwrap().clone()
    }

    pub fn navigations(&self) -> Vec<String> {
        self.navigations.lock().unwrap().clone()
    }

    pub fn removed_items(&self) -> Vec<String> {
        self.removed_items.lock().unwrap().clone()
    }

    pub fn expired_cookies(&self) -> Vec<String> {
        self.expired_cookies.lock().unwrap().clone()
    }
}

impl Host for RecordingHost {
    fn toast_error(&self, message: &str) {
        self.toasts.lock().unwrap().push(message.to_string());
    }

    fn navigate(&self, route: &str) {
        self.navigations.lock().unwrap().push(route.to_string());
    }

    fn remove_local_item(&self, key: &str) {
        self.removed_items.lock().unwrap().push(key.to_string());
    }

    fn expire_cookie(&self, name: &str) {
        self.expired_cookies.lock().unwrap().push(name.to_string());
    }
}

pub fn config_for(server: &MockServer) -> ClientConfig {
    let url = Url::parse(&format!("{}/api", server.uri())).expect("mock server url");
    ClientConfig::new(url).with_reconnect(0, Duration::from_millis(10))
}

pub fn transport_with(config: ClientConfig) -> (Arc<Transport>, Arc<RecordingHost>) {
    let host = Arc::new(RecordingHost::default());
    let transport = Transport::new(config, host.clone()).expect("transport should build");
    (Arc::new(transport), host)
}

pub fn transport_for(server: &MockServer) -> (Arc<Transport>, Arc<RecordingHost>) {
    transport_with(config_for(server))
}

pub fn store_for(server: &MockServer) -> (Arc<SessionStore>, Arc<RecordingHost>) {
    let (transport, host) = transport_for(server);
    (SessionStore::new(transport), host)
}

pub fn user_json(id: &str, role: &str) -> Value {
    json!({
        "_id": id,
        "username": "asha",
        "role": role,
    })
}

pub fn envelope(data: Value) -> Value {
    json!({ "data": data })
}
