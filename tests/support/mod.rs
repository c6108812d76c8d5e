#![allow(dead_code)]

use coldwatch::adapters::MemoryStore;
use coldwatch::error::{RemoteError, StoreError};
use coldwatch::ports::{
    AlertPresenter, BoxFuture, KeyValueStore, MuteScope, MuteService, NotificationLog,
    PushRegistrar, SensorService, SessionService, SharedStore, TimeProvider,
};
use coldwatch::types::{
    AuthPayload, NotificationRecord, Role, SensorDescriptor, SensorKind, SensorReading,
};
use coldwatch::{App, AppConfig};

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};
use time::macros::datetime;
use time::{Duration, OffsetDateTime};

pub const START: OffsetDateTime = datetime!(2025-01-12 09:30 UTC);
pub const EMAIL: &str = "ops@example.com";
pub const PASSWORD: &str = "hunter2";
pub const USER_ID: &str = "42";

pub type TestApp = App<TestClock, FakeBackend, RecordingPresenter, FixedRegistrar>;

#[derive(Clone)]
pub struct TestClock(Arc<Mutex<OffsetDateTime>>);

impl TestClock {
    pub fn new() -> Self {
        Self(Arc::new(Mutex::new(START)))
    }

    pub fn advance(&self, by: Duration) {
        *self.0.lock().expect("clock lock") += by;
    }
}

impl TimeProvider for TestClock {
    fn now(&self) -> OffsetDateTime {
        *self.0.lock().expect("clock lock")
    }
}

#[derive(Clone, Default)]
pub struct RecordingPresenter {
    pub shown: Arc<Mutex<Vec<(String, String)>>>,
}

impl RecordingPresenter {
    pub fn bodies(&self) -> Vec<String> {
        self.shown
            .lock()
            .expect("presenter lock")
            .iter()
            .map(|(_, body)| body.clone())
            .collect()
    }
}

impl AlertPresenter for RecordingPresenter {
    fn present(&self, title: &str, body: &str) {
        self.shown
            .lock()
            .expect("presenter lock")
            .push((title.to_string(), body.to_string()));
    }
}

#[derive(Clone)]
pub struct FixedRegistrar;

impl PushRegistrar for FixedRegistrar {
    fn device_token(&self) -> Option<String> {
        Some("device-token".to_string())
    }
}

#[derive(Default)]
pub struct BackendState {
    pub sensors: Vec<SensorDescriptor>,
    pub readings: HashMap<String, SensorReading>,
    pub global_mute: bool,
    /// Keyed by sensor id.
    pub sensor_mutes: HashMap<String, bool>,
    /// Push token sent with each mute call.
    pub mute_tokens: Vec<Option<String>>,
    /// Newest first.
    pub history: Vec<NotificationRecord>,
    pub registered_tokens: Vec<(String, String)>,
    pub invalidated_tokens: Vec<(String, String)>,
    pub offline: bool,
    pub login_calls: usize,
}

/// In-memory stand-in for the monitoring backend. One account: [`EMAIL`].
#[derive(Clone, Default)]
pub struct FakeBackend {
    state: Arc<Mutex<BackendState>>,
}

impl FakeBackend {
    pub fn state(&self) -> MutexGuard<'_, BackendState> {
        self.state.lock().expect("backend lock")
    }

    pub fn add_sensor(&self, name: &str, kind: SensorKind, min: f64, max: f64) {
        let mut state = self.state();
        let id = (state.sensors.len() + 1).to_string();
        state.sensors.push(SensorDescriptor {
            id,
            name: name.to_string(),
            kind,
            min_threshold: min,
            max_threshold: max,
        });
    }

    pub fn set_reading(&self, name: &str, value: f64, observed_at: OffsetDateTime) {
        self.state().readings.insert(name.to_string(), SensorReading {
            sensor_name: name.to_string(),
            value,
            observed_at,
        });
    }

    pub fn go_offline(&self, offline: bool) {
        self.state().offline = offline;
    }

    pub fn sensor_id(&self, name: &str) -> String {
        self.state()
            .sensors
            .iter()
            .find(|sensor| sensor.name == name)
            .map(|sensor| sensor.id.clone())
            .unwrap_or_default()
    }

    pub fn sensor(&self, name: &str) -> SensorDescriptor {
        self.state()
            .sensors
            .iter()
            .find(|sensor| sensor.name == name)
            .cloned()
            .expect("sensor added")
    }

    fn check_mute(&self, scope: MuteScope<'_>) -> Result<(), RemoteError> {
        self.state()
            .mute_tokens
            .push(scope.push_token.map(str::to_string));
        self.check()
    }

    fn check(&self) -> Result<(), RemoteError> {
        if self.state().offline {
            Err(RemoteError::Transport("connection refused".to_string()))
        } else {
            Ok(())
        }
    }
}

impl SessionService for FakeBackend {
    fn authenticate<'a>(
        &'a self,
        email: &'a str,
        password: &'a str,
    ) -> BoxFuture<'a, Result<AuthPayload, RemoteError>> {
        let result = self.check().and_then(|()| {
            self.state().login_calls += 1;
            if email == EMAIL && password == PASSWORD {
                Ok(AuthPayload {
                    token: format!("tok-{}", self.state().login_calls),
                    user_id: USER_ID.to_string(),
                    role: Role::Client,
                })
            } else {
                Err(RemoteError::Unauthorized)
            }
        });
        Box::pin(async move { result })
    }

    fn register_push_token<'a>(
        &'a self,
        user_id: &'a str,
        push_token: &'a str,
    ) -> BoxFuture<'a, Result<(), RemoteError>> {
        let result = self.check().map(|()| {
            self.state()
                .registered_tokens
                .push((user_id.to_string(), push_token.to_string()));
        });
        Box::pin(async move { result })
    }

    fn invalidate_token<'a>(
        &'a self,
        user_id: &'a str,
        push_token: &'a str,
    ) -> BoxFuture<'a, Result<(), RemoteError>> {
        let result = self.check().map(|()| {
            self.state()
                .invalidated_tokens
                .push((user_id.to_string(), push_token.to_string()));
        });
        Box::pin(async move { result })
    }
}

impl SensorService for FakeBackend {
    fn list_assigned_sensors<'a>(
        &'a self,
        _user_id: &'a str,
    ) -> BoxFuture<'a, Result<Vec<SensorDescriptor>, RemoteError>> {
        let result = self.check().map(|()| self.state().sensors.clone());
        Box::pin(async move { result })
    }

    fn latest_reading<'a>(
        &'a self,
        sensor: &'a SensorDescriptor,
    ) -> BoxFuture<'a, Result<SensorReading, RemoteError>> {
        let result = self.check().and_then(|()| {
            self.state()
                .readings
                .get(&sensor.name)
                .cloned()
                .ok_or_else(|| RemoteError::Malformed("no reading".to_string()))
        });
        Box::pin(async move { result })
    }
}

impl MuteService for FakeBackend {
    fn get_global_mute<'a>(&'a self, scope: MuteScope<'a>) -> BoxFuture<'a, Result<bool, RemoteError>> {
        let result = self.check_mute(scope).map(|()| self.state().global_mute);
        Box::pin(async move { result })
    }

    fn set_global_mute<'a>(
        &'a self,
        scope: MuteScope<'a>,
        muted: bool,
    ) -> BoxFuture<'a, Result<(), RemoteError>> {
        let result = self
            .check_mute(scope)
            .map(|()| self.state().global_mute = muted);
        Box::pin(async move { result })
    }

    fn get_sensor_mute<'a>(
        &'a self,
        scope: MuteScope<'a>,
        sensor_id: &'a str,
    ) -> BoxFuture<'a, Result<bool, RemoteError>> {
        let result = self.check_mute(scope).map(|()| {
            self.state()
                .sensor_mutes
                .get(sensor_id)
                .copied()
                .unwrap_or(false)
        });
        Box::pin(async move { result })
    }

    fn set_sensor_mute<'a>(
        &'a self,
        scope: MuteScope<'a>,
        sensor_id: &'a str,
        muted: bool,
    ) -> BoxFuture<'a, Result<(), RemoteError>> {
        let result = self.check_mute(scope).map(|()| {
            self.state()
                .sensor_mutes
                .insert(sensor_id.to_string(), muted);
        });
        Box::pin(async move { result })
    }
}

impl NotificationLog for FakeBackend {
    fn fetch_page<'a>(
        &'a self,
        _user_id: &'a str,
        page: u32,
        page_size: u32,
    ) -> BoxFuture<'a, Result<Vec<NotificationRecord>, RemoteError>> {
        let result = self.check().map(|()| {
            let start = (page.saturating_sub(1) * page_size) as usize;
            self.state()
                .history
                .iter()
                .skip(start)
                .take(page_size as usize)
                .cloned()
                .collect()
        });
        Box::pin(async move { result })
    }

    fn publish<'a>(
        &'a self,
        _user_id: &'a str,
        sensor_name: Option<&'a str>,
        message: &'a str,
    ) -> BoxFuture<'a, Result<(), RemoteError>> {
        let result = self.check().map(|()| {
            let record = NotificationRecord {
                message: message.to_string(),
                sensor_name: sensor_name.map(str::to_string),
                created_at: START,
            };
            self.state().history.insert(0, record);
        });
        Box::pin(async move { result })
    }
}

/// Device storage whose writes to one key fail, as on a full disk.
pub struct FailingStore {
    inner: Arc<MemoryStore>,
    failing_key: &'static str,
}

impl KeyValueStore for FailingStore {
    fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        self.inner.get(key)
    }

    fn set(&self, key: &str, value: &str) -> Result<(), StoreError> {
        if key == self.failing_key {
            return Err(StoreError::Io {
                key: key.to_string(),
                source: std::io::Error::other("no space left on device"),
            });
        }
        self.inner.set(key, value)
    }

    fn delete(&self, key: &str) -> Result<(), StoreError> {
        self.inner.delete(key)
    }
}

pub struct Harness {
    pub app: TestApp,
    pub backend: FakeBackend,
    pub store: Arc<MemoryStore>,
    pub clock: TestClock,
    pub presenter: RecordingPresenter,
}

impl Harness {
    pub fn new() -> Self {
        let store = Arc::new(MemoryStore::default());
        let shared = Arc::clone(&store) as SharedStore;
        Self::with_parts(FakeBackend::default(), store, shared, TestClock::new())
    }

    /// Writes to `failing_key` fail; everything else lands in `store`.
    pub fn with_failing_key(failing_key: &'static str) -> Self {
        let store = Arc::new(MemoryStore::default());
        let shared = Arc::new(FailingStore {
            inner: Arc::clone(&store),
            failing_key,
        }) as SharedStore;
        Self::with_parts(FakeBackend::default(), store, shared, TestClock::new())
    }

    /// A fresh process over the same device storage and backend.
    pub fn restart(&self) -> Self {
        let shared = Arc::clone(&self.store) as SharedStore;
        Self::with_parts(
            self.backend.clone(),
            Arc::clone(&self.store),
            shared,
            self.clock.clone(),
        )
    }

    fn with_parts(
        backend: FakeBackend,
        store: Arc<MemoryStore>,
        shared: SharedStore,
        clock: TestClock,
    ) -> Self {
        let presenter = RecordingPresenter::default();
        let config = AppConfig::new("http://backend.invalid", "/nonexistent");
        let app = App::new(
            clock.clone(),
            backend.clone(),
            presenter.clone(),
            FixedRegistrar,
            shared,
            &config,
        );
        Self {
            app,
            backend,
            store,
            clock,
            presenter,
        }
    }

    pub fn credentials() -> coldwatch::types::Credentials {
        coldwatch::types::Credentials {
            email: EMAIL.to_string(),
            password: PASSWORD.to_string(),
        }
    }
}
