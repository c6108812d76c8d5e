use crate::error::{RemoteError, StoreError};
use crate::ports::store::{read_json, write_json};
use crate::ports::{SensorService, SharedStore, TimeProvider};
use crate::session::SessionScoped;
use crate::types::{AlertEvent, AlertKind, SensorDescriptor, SensorReading};

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Mutex;
use time::{Duration, OffsetDateTime};
use tokio::task::JoinHandle;

pub(crate) const SENSORS_KEY: &str = "sensors";

pub const DEFAULT_OFFLINE_AFTER: Duration = Duration::minutes(15);

#[derive(Debug, Clone, PartialEq)]
pub enum SweepDiagnostic {
    SensorUnreachable { sensor: String, reason: RemoteError },
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct SweepReport {
    pub alerts: Vec<AlertEvent>,
    pub diagnostics: Vec<SweepDiagnostic>,
}

#[derive(Debug, Serialize, Deserialize)]
struct CachedSensors {
    user_id: String,
    sensors: Vec<SensorDescriptor>,
}

pub struct SensorPoller<T, R> {
    time: T,
    remote: R,
    store: SharedStore,
    offline_after: Duration,
    latest: Mutex<HashMap<String, SensorReading>>,
}

impl<T, R> SensorPoller<T, R>
where
    T: TimeProvider,
    R: SensorService,
{
    pub fn new(time: T, remote: R, store: SharedStore) -> Self {
        Self {
            time,
            remote,
            store,
            offline_after: DEFAULT_OFFLINE_AFTER,
            latest: Mutex::new(HashMap::new()),
        }
    }

    pub fn with_offline_after(mut self, offline_after: Duration) -> Self {
        self.offline_after = offline_after;
        self
    }

    pub async fn refresh_sensors(&self, user_id: &str) -> Result<Vec<SensorDescriptor>, StoreError> {
        match self.remote.list_assigned_sensors(user_id).await {
            Ok(sensors) => {
                let cached = CachedSensors {
                    user_id: user_id.to_string(),
                    sensors,
                };
                write_json(self.store.as_ref(), SENSORS_KEY, &cached)?;
                self.latest
                    .lock()
                    .expect("latest readings lock")
                    .retain(|name, _| cached.sensors.iter().any(|sensor| &sensor.name == name));
                Ok(cached.sensors)
            }
            Err(err) => {
                tracing::warn!(user_id, error = %err, "sensor list unavailable, using cached set");
                self.cached_sensors(user_id)
            }
        }
    }

    pub fn cached_sensors(&self, user_id: &str) -> Result<Vec<SensorDescriptor>, StoreError> {
        let cached: Option<CachedSensors> = read_json(self.store.as_ref(), SENSORS_KEY)?;
        Ok(cached
            .filter(|cached| cached.user_id == user_id)
            .map(|cached| cached.sensors)
            .unwrap_or_default())
    }

    pub async fn sync_once(&self, user_id: &str, sensors: &[SensorDescriptor]) -> SweepReport {
        let now = self.time.now();
        let pending: Vec<(&SensorDescriptor, JoinHandle<Result<SensorReading, RemoteError>>)> =
            sensors
                .iter()
                .map(|sensor| {
                    let remote = self.remote.clone();
                    let descriptor = sensor.clone();
                    let handle =
                        tokio::spawn(async move { remote.latest_reading(&descriptor).await });
                    (sensor, handle)
                })
                .collect();

        let mut report = SweepReport::default();
        for (sensor, handle) in pending {
            let result = match handle.await {
                Ok(result) => result,
                Err(err) => Err(RemoteError::Transport(err.to_string())),
            };
            let reading = match result {
                Ok(reading) => reading,
                Err(reason) => {
                    tracing::warn!(
                        user_id,
                        sensor = %sensor.name,
                        error = %reason,
                        "sensor unreachable"
                    );
                    report.diagnostics.push(SweepDiagnostic::SensorUnreachable {
                        sensor: sensor.name.clone(),
                        reason,
                    });
                    continue;
                }
            };

            if let Some(alert) = evaluate(sensor, &reading, now, self.offline_after) {
                tracing::debug!(sensor = %sensor.name, kind = ?alert.kind, "alert detected");
                report.alerts.push(alert);
            }
            self.latest
                .lock()
                .expect("latest readings lock")
                .insert(sensor.name.clone(), reading);
        }
        report
    }

    pub fn latest_readings(&self) -> HashMap<String, SensorReading> {
        self.latest.lock().expect("latest readings lock").clone()
    }
}

impl<T, R> SessionScoped for SensorPoller<T, R>
where
    T: TimeProvider,
    R: SensorService,
{
    fn clear_session_state(&self, _user_id: &str) -> Result<(), StoreError> {
        self.latest.lock().expect("latest readings lock").clear();
        self.store.delete(SENSORS_KEY)
    }
}

/// First match wins: staleness, then the kind's bounds. At most one alert.
pub fn evaluate(
    sensor: &SensorDescriptor,
    reading: &SensorReading,
    now: OffsetDateTime,
    offline_after: Duration,
) -> Option<AlertEvent> {
    let age = now - reading.observed_at;
    let kind = if age > offline_after {
        AlertKind::Offline {
            age_minutes: age.as_seconds_f64() / 60.0,
        }
    } else if sensor.is_out_of_bounds(reading.value) {
        AlertKind::Threshold {
            value: reading.value,
            unit: sensor.kind.unit(),
        }
    } else {
        return None;
    };
    Some(AlertEvent {
        sensor: sensor.name.clone(),
        kind,
        detected_at: now,
    })
}
