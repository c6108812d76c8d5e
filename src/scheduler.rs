use crate::error::SweepError;
use crate::mutes::MuteStateStore;
use crate::notifications::NotificationCoordinator;
use crate::poller::{SensorPoller, SweepDiagnostic};
use crate::ports::{AlertPresenter, MuteService, NotificationLog, SensorService, TimeProvider};
use crate::types::{AlertEvent, Session};

use std::collections::HashSet;
use std::sync::{Arc, Mutex};

#[derive(Debug, Clone, Default, PartialEq)]
pub struct SweepOutcome {
    pub recorded: Vec<AlertEvent>,
    pub suppressed: Vec<AlertEvent>,
    pub diagnostics: Vec<SweepDiagnostic>,
}

pub struct Scheduler<T, S, M, L, P> {
    poller: Arc<SensorPoller<T, S>>,
    mutes: Arc<MuteStateStore<M>>,
    notifications: Arc<NotificationCoordinator<T, L, P>>,
    cold_started: Mutex<HashSet<String>>,
}

impl<T, S, M, L, P> Scheduler<T, S, M, L, P>
where
    T: TimeProvider,
    S: SensorService,
    M: MuteService,
    L: NotificationLog,
    P: AlertPresenter,
{
    pub fn new(
        poller: Arc<SensorPoller<T, S>>,
        mutes: Arc<MuteStateStore<M>>,
        notifications: Arc<NotificationCoordinator<T, L, P>>,
    ) -> Self {
        Self {
            poller,
            mutes,
            notifications,
            cold_started: Mutex::new(HashSet::new()),
        }
    }

    /// Returns `None` when the session already had its cold-start sweep.
    pub async fn on_cold_start(&self, session: &Session) -> Result<Option<SweepOutcome>, SweepError> {
        let first = self
            .cold_started
            .lock()
            .expect("cold start lock")
            .insert(session.token.clone());
        if !first {
            tracing::debug!(user_id = %session.user_id, "cold-start sweep already ran");
            return Ok(None);
        }
        self.sweep(session).await.map(Some)
    }

    pub async fn on_manual_refresh(&self, session: &Session) -> Result<SweepOutcome, SweepError> {
        self.sweep(session).await
    }

    async fn sweep(&self, session: &Session) -> Result<SweepOutcome, SweepError> {
        let user_id = session.user_id.as_str();
        let sensors = self.poller.refresh_sensors(user_id).await?;
        let report = self.poller.sync_once(user_id, &sensors).await;

        let mut outcome = SweepOutcome {
            diagnostics: report.diagnostics,
            ..SweepOutcome::default()
        };
        for alert in report.alerts {
            if self.mutes.is_suppressed(user_id, &alert.sensor) {
                tracing::debug!(user_id, sensor = %alert.sensor, "alert suppressed by mute");
                outcome.suppressed.push(alert);
                continue;
            }
            self.notifications.record(user_id, &alert).await?;
            outcome.recorded.push(alert);
        }

        tracing::info!(
            user_id,
            sensors = sensors.len(),
            recorded = outcome.recorded.len(),
            suppressed = outcome.suppressed.len(),
            unreachable = outcome.diagnostics.len(),
            "sweep finished"
        );
        Ok(outcome)
    }
}

#[cfg(test)]
#[allow(non_snake_case)]
mod tests {
    use super::*;
    use crate::adapters::MemoryStore;
    use crate::error::RemoteError;
    use crate::ports::{BoxFuture, MuteScope, SharedStore};
    use crate::types::{
        AlertKind, NotificationRecord, Role, SensorDescriptor, SensorKind, SensorReading,
    };
    use std::collections::HashMap;
    use time::macros::datetime;
    use time::{Duration, OffsetDateTime};

    const NOW: OffsetDateTime = datetime!(2025-01-12 09:30 UTC);

    #[derive(Clone)]
    struct FixedTime;

    impl TimeProvider for FixedTime {
        fn now(&self) -> OffsetDateTime {
            NOW
        }
    }

    #[derive(Clone, Default)]
    struct TestBackend {
        sensors: Arc<Vec<SensorDescriptor>>,
        readings: Arc<HashMap<String, SensorReading>>,
        sensor_mutes: Arc<Mutex<HashMap<String, bool>>>,
        reading_calls: Arc<Mutex<usize>>,
    }

    impl SensorService for TestBackend {
        fn list_assigned_sensors<'a>(
            &'a self,
            _user_id: &'a str,
        ) -> BoxFuture<'a, Result<Vec<SensorDescriptor>, RemoteError>> {
            let sensors = self.sensors.as_ref().clone();
            Box::pin(async move { Ok(sensors) })
        }

        fn latest_reading<'a>(
            &'a self,
            sensor: &'a SensorDescriptor,
        ) -> BoxFuture<'a, Result<SensorReading, RemoteError>> {
            *self.reading_calls.lock().expect("calls lock") += 1;
            let result = self
                .readings
                .get(&sensor.name)
                .cloned()
                .ok_or_else(|| RemoteError::Transport("no reading".to_string()));
            Box::pin(async move { result })
        }
    }

    impl MuteService for TestBackend {
        fn get_global_mute<'a>(&'a self, _scope: MuteScope<'a>) -> BoxFuture<'a, Result<bool, RemoteError>> {
            Box::pin(async move { Ok(false) })
        }

        fn set_global_mute<'a>(
            &'a self,
            _scope: MuteScope<'a>,
            _muted: bool,
        ) -> BoxFuture<'a, Result<(), RemoteError>> {
            Box::pin(async move { Ok(()) })
        }

        fn get_sensor_mute<'a>(
            &'a self,
            _scope: MuteScope<'a>,
            sensor_id: &'a str,
        ) -> BoxFuture<'a, Result<bool, RemoteError>> {
            let muted = self
                .sensor_mutes
                .lock()
                .expect("mutes lock")
                .get(sensor_id)
                .copied()
                .unwrap_or(false);
            Box::pin(async move { Ok(muted) })
        }

        fn set_sensor_mute<'a>(
            &'a self,
            _scope: MuteScope<'a>,
            sensor_id: &'a str,
            muted: bool,
        ) -> BoxFuture<'a, Result<(), RemoteError>> {
            self.sensor_mutes
                .lock()
                .expect("mutes lock")
                .insert(sensor_id.to_string(), muted);
            Box::pin(async move { Ok(()) })
        }
    }

    impl NotificationLog for TestBackend {
        fn fetch_page<'a>(
            &'a self,
            _user_id: &'a str,
            _page: u32,
            _page_size: u32,
        ) -> BoxFuture<'a, Result<Vec<NotificationRecord>, RemoteError>> {
            Box::pin(async move { Ok(Vec::new()) })
        }

        fn publish<'a>(
            &'a self,
            _user_id: &'a str,
            _sensor_name: Option<&'a str>,
            _message: &'a str,
        ) -> BoxFuture<'a, Result<(), RemoteError>> {
            Box::pin(async move { Ok(()) })
        }
    }

    #[derive(Clone)]
    struct SilentPresenter;

    impl AlertPresenter for SilentPresenter {
        fn present(&self, _title: &str, _body: &str) {}
    }

    type TestScheduler = Scheduler<FixedTime, TestBackend, TestBackend, TestBackend, SilentPresenter>;

    struct Fixture {
        scheduler: TestScheduler,
        mutes: Arc<MuteStateStore<TestBackend>>,
        notifications: Arc<NotificationCoordinator<FixedTime, TestBackend, SilentPresenter>>,
        backend: TestBackend,
    }

    fn fixture(sensors: Vec<SensorDescriptor>, readings: Vec<SensorReading>) -> Fixture {
        let backend = TestBackend {
            sensors: Arc::new(sensors),
            readings: Arc::new(
                readings
                    .into_iter()
                    .map(|reading| (reading.sensor_name.clone(), reading))
                    .collect(),
            ),
            ..TestBackend::default()
        };
        let store: SharedStore = Arc::new(MemoryStore::default());
        let poller = Arc::new(SensorPoller::new(
            FixedTime,
            backend.clone(),
            Arc::clone(&store),
        ));
        let mutes = Arc::new(MuteStateStore::new(backend.clone(), Arc::clone(&store)));
        let notifications = Arc::new(NotificationCoordinator::new(
            FixedTime,
            backend.clone(),
            SilentPresenter,
            store,
        ));
        Fixture {
            scheduler: Scheduler::new(poller, Arc::clone(&mutes), Arc::clone(&notifications)),
            mutes,
            notifications,
            backend,
        }
    }

    fn session() -> Session {
        Session {
            token: "tok-1".to_string(),
            user_id: "42".to_string(),
            role: Role::Client,
            issued_at: NOW,
        }
    }

    fn sensor(name: &str, kind: SensorKind, min: f64, max: f64) -> SensorDescriptor {
        SensorDescriptor {
            id: name.to_lowercase(),
            name: name.to_string(),
            kind,
            min_threshold: min,
            max_threshold: max,
        }
    }

    fn reading(name: &str, value: f64, minutes_ago: i64) -> SensorReading {
        SensorReading {
            sensor_name: name.to_string(),
            value,
            observed_at: NOW - Duration::minutes(minutes_ago),
        }
    }

    #[tokio::test]
    async fn on_manual_refresh__should_record_low_fuel_alert() {
        // Given
        let fixture = fixture(
            vec![sensor("Tank-1", SensorKind::Fuel, 20.0, 90.0)],
            vec![reading("Tank-1", 15.0, 5)],
        );

        // When
        let outcome = fixture
            .scheduler
            .on_manual_refresh(&session())
            .await
            .expect("sweep");

        // Then
        assert_eq!(outcome.recorded.len(), 1);
        assert_eq!(
            outcome.recorded[0].kind,
            AlertKind::Threshold {
                value: 15.0,
                unit: "%"
            }
        );
        assert_eq!(fixture.notifications.unread_count("42"), 1);
        assert_eq!(
            fixture.notifications.local_log("42").expect("log").len(),
            1
        );
    }

    #[tokio::test]
    async fn on_manual_refresh__should_suppress_alerts_for_muted_sensor() {
        // Given
        let fixture = fixture(
            vec![sensor("Tank-1", SensorKind::Fuel, 20.0, 90.0)],
            vec![reading("Tank-1", 15.0, 5)],
        );
        fixture
            .mutes
            .set_sensor_muted("42", &sensor("Tank-1", SensorKind::Fuel, 20.0, 90.0), true)
            .await
            .expect("mute");

        // When
        let outcome = fixture
            .scheduler
            .on_manual_refresh(&session())
            .await
            .expect("sweep");

        // Then
        assert!(outcome.recorded.is_empty());
        assert_eq!(outcome.suppressed.len(), 1);
        assert_eq!(fixture.notifications.unread_count("42"), 0);
        assert!(fixture.notifications.local_log("42").expect("log").is_empty());
    }

    #[tokio::test]
    async fn on_manual_refresh__should_suppress_offline_alerts_under_global_mute() {
        // Given
        let fixture = fixture(
            vec![sensor("Temp-A", SensorKind::Temperature, -5.0, 8.0)],
            vec![reading("Temp-A", 4.0, 30)],
        );
        fixture
            .mutes
            .set_global_muted("42", true)
            .await
            .expect("mute");

        // When
        let outcome = fixture
            .scheduler
            .on_manual_refresh(&session())
            .await
            .expect("sweep");

        // Then
        assert!(outcome.recorded.is_empty());
        assert!(outcome.suppressed[0].is_offline());
    }

    #[tokio::test]
    async fn on_manual_refresh__should_record_only_offline_alert_for_stale_sensor() {
        // Given
        let fixture = fixture(
            vec![sensor("Temp-A", SensorKind::Temperature, -5.0, 8.0)],
            vec![reading("Temp-A", 40.0, 20)],
        );

        // When
        let outcome = fixture
            .scheduler
            .on_manual_refresh(&session())
            .await
            .expect("sweep");

        // Then
        assert_eq!(outcome.recorded.len(), 1);
        assert!(outcome.recorded[0].is_offline());
        assert_eq!(
            fixture.notifications.local_log("42").expect("log")[0].message,
            "Sensor Temp-A is offline. Last reading 20 minutes ago."
        );
    }

    #[tokio::test]
    async fn on_manual_refresh__should_report_unreachable_sensor_and_continue() {
        // Given
        let fixture = fixture(
            vec![
                sensor("Tank-1", SensorKind::Fuel, 20.0, 90.0),
                sensor("Tank-2", SensorKind::Fuel, 20.0, 90.0),
            ],
            vec![reading("Tank-2", 95.0, 1)],
        );

        // When
        let outcome = fixture
            .scheduler
            .on_manual_refresh(&session())
            .await
            .expect("sweep");

        // Then
        assert_eq!(outcome.diagnostics.len(), 1);
        assert_eq!(outcome.recorded.len(), 1);
        assert_eq!(outcome.recorded[0].sensor, "Tank-2");
    }

    #[tokio::test]
    async fn on_cold_start__should_sweep_once_per_session() {
        // Given
        let fixture = fixture(
            vec![sensor("Tank-1", SensorKind::Fuel, 20.0, 90.0)],
            vec![reading("Tank-1", 15.0, 5)],
        );

        // When
        let first = fixture
            .scheduler
            .on_cold_start(&session())
            .await
            .expect("first sweep");
        let second = fixture
            .scheduler
            .on_cold_start(&session())
            .await
            .expect("second sweep");

        // Then
        assert!(first.is_some());
        assert!(second.is_none());
        assert_eq!(*fixture.backend.reading_calls.lock().expect("calls lock"), 1);
        assert_eq!(fixture.notifications.unread_count("42"), 1);
    }
}
