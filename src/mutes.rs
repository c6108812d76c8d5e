use crate::error::{MuteError, RemoteError, RemoteSyncFailed, StoreError};
use crate::ports::store::{read_json, write_json};
use crate::ports::{MuteScope, MuteService, SharedStore};
use crate::session::{PUSH_TOKEN_KEY, SessionScoped};
use crate::types::SensorDescriptor;

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Mutex;

pub(crate) const GLOBAL_MUTE_KEY: &str = "mute.global";
pub(crate) const SENSOR_MUTES_KEY: &str = "mute.sensors";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct MuteFlag {
    pub muted: bool,
    /// The backend has confirmed this exact value.
    pub synced: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MuteApplied {
    LocalAndRemote,
    LocalOnly(RemoteSyncFailed),
}

impl MuteApplied {
    pub fn is_synced(&self) -> bool {
        matches!(self, MuteApplied::LocalAndRemote)
    }

    pub fn into_result(self) -> Result<(), RemoteSyncFailed> {
        match self {
            MuteApplied::LocalAndRemote => Ok(()),
            MuteApplied::LocalOnly(err) => Err(err),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MuteRefresh {
    pub confirmed: usize,
    pub retried: usize,
    /// `"global"` or sensor names whose remote read failed.
    pub failed: Vec<String>,
}

#[derive(Debug, Serialize, Deserialize)]
struct GlobalMute {
    user_id: String,
    flag: MuteFlag,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct SensorMute {
    sensor_id: String,
    flag: MuteFlag,
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct SensorMutes {
    user_id: String,
    flags: BTreeMap<String, SensorMute>,
}

pub struct MuteStateStore<R> {
    remote: R,
    store: SharedStore,
    write_lock: Mutex<()>,
}

impl<R: MuteService> MuteStateStore<R> {
    pub fn new(remote: R, store: SharedStore) -> Self {
        Self {
            remote,
            store,
            write_lock: Mutex::new(()),
        }
    }

    pub fn is_global_muted(&self, user_id: &str) -> bool {
        self.global_flag(user_id).is_some_and(|flag| flag.muted)
    }

    pub fn is_sensor_muted(&self, user_id: &str, sensor_name: &str) -> bool {
        self.sensor_flag(user_id, sensor_name)
            .is_some_and(|flag| flag.muted)
    }

    pub fn is_suppressed(&self, user_id: &str, sensor_name: &str) -> bool {
        self.is_global_muted(user_id) || self.is_sensor_muted(user_id, sensor_name)
    }

    pub fn global_flag(&self, user_id: &str) -> Option<MuteFlag> {
        self.load_global(user_id).map(|record| record.flag)
    }

    pub fn sensor_flag(&self, user_id: &str, sensor_name: &str) -> Option<MuteFlag> {
        self.load_sensors(user_id)
            .flags
            .get(sensor_name)
            .map(|entry| entry.flag)
    }

    pub async fn set_global_muted(
        &self,
        user_id: &str,
        muted: bool,
    ) -> Result<MuteApplied, MuteError> {
        self.write_global(user_id, MuteFlag {
            muted,
            synced: false,
        })?;

        let push_token = self.push_token();
        let scope = MuteScope {
            user_id,
            push_token: push_token.as_deref(),
        };
        match self.remote.set_global_mute(scope, muted).await {
            Ok(()) => {
                self.confirm_global(user_id, muted)?;
                Ok(MuteApplied::LocalAndRemote)
            }
            Err(err) => {
                tracing::warn!(user_id, muted, error = %err, "global mute not synced");
                Ok(MuteApplied::LocalOnly(RemoteSyncFailed(err)))
            }
        }
    }

    pub async fn set_sensor_muted(
        &self,
        user_id: &str,
        sensor: &SensorDescriptor,
        muted: bool,
    ) -> Result<MuteApplied, MuteError> {
        self.update_sensors(user_id, |flags| {
            flags.insert(sensor.name.clone(), SensorMute {
                sensor_id: sensor.id.clone(),
                flag: MuteFlag {
                    muted,
                    synced: false,
                },
            });
        })?;

        let push_token = self.push_token();
        let scope = MuteScope {
            user_id,
            push_token: push_token.as_deref(),
        };
        match self.remote.set_sensor_mute(scope, &sensor.id, muted).await {
            Ok(()) => {
                self.confirm_sensor(user_id, &sensor.name, muted)?;
                Ok(MuteApplied::LocalAndRemote)
            }
            Err(err) => {
                tracing::warn!(
                    user_id,
                    sensor = %sensor.name,
                    muted,
                    error = %err,
                    "sensor mute not synced"
                );
                Ok(MuteApplied::LocalOnly(RemoteSyncFailed(err)))
            }
        }
    }

    /// Unsynced flags of sensors missing from `sensors` are kept until pushed.
    pub async fn refresh(
        &self,
        user_id: &str,
        sensors: &[SensorDescriptor],
    ) -> Result<MuteRefresh, MuteError> {
        let mut summary = MuteRefresh {
            retried: self.retry_unsynced(user_id).await?,
            ..MuteRefresh::default()
        };

        let push_token = self.push_token();
        let scope = MuteScope {
            user_id,
            push_token: push_token.as_deref(),
        };
        match self.remote.get_global_mute(scope).await {
            Ok(muted) => {
                self.write_global(user_id, MuteFlag {
                    muted,
                    synced: true,
                })?;
                summary.confirmed += 1;
            }
            Err(err) => {
                tracing::warn!(user_id, error = %err, "global mute refresh failed");
                summary.failed.push("global".to_string());
            }
        }

        let mut fetched: BTreeMap<&str, (&SensorDescriptor, Result<bool, RemoteError>)> =
            BTreeMap::new();
        for sensor in sensors {
            let result = self.remote.get_sensor_mute(scope, &sensor.id).await;
            fetched.insert(sensor.name.as_str(), (sensor, result));
        }

        self.update_sensors(user_id, |flags| {
            flags.retain(|name, entry| fetched.contains_key(name.as_str()) || !entry.flag.synced);
            for (name, (sensor, result)) in &fetched {
                match result {
                    Ok(muted) => {
                        flags.insert(name.to_string(), SensorMute {
                            sensor_id: sensor.id.clone(),
                            flag: MuteFlag {
                                muted: *muted,
                                synced: true,
                            },
                        });
                        summary.confirmed += 1;
                    }
                    Err(err) => {
                        tracing::warn!(user_id, sensor = %name, error = %err, "sensor mute refresh failed");
                        summary.failed.push(name.to_string());
                    }
                }
            }
        })?;

        Ok(summary)
    }

    async fn retry_unsynced(&self, user_id: &str) -> Result<usize, StoreError> {
        let push_token = self.push_token();
        let scope = MuteScope {
            user_id,
            push_token: push_token.as_deref(),
        };

        let mut retried = 0;
        if let Some(flag) = self.global_flag(user_id).filter(|flag| !flag.synced) {
            retried += 1;
            match self.remote.set_global_mute(scope, flag.muted).await {
                Ok(()) => self.confirm_global(user_id, flag.muted)?,
                Err(err) => tracing::warn!(user_id, error = %err, "global mute retry failed"),
            }
        }

        let pending: Vec<(String, SensorMute)> = self
            .load_sensors(user_id)
            .flags
            .into_iter()
            .filter(|(_, entry)| !entry.flag.synced)
            .collect();
        for (name, entry) in pending {
            retried += 1;
            match self
                .remote
                .set_sensor_mute(scope, &entry.sensor_id, entry.flag.muted)
                .await
            {
                Ok(()) => self.confirm_sensor(user_id, &name, entry.flag.muted)?,
                Err(err) => {
                    tracing::warn!(user_id, sensor = %name, error = %err, "sensor mute retry failed")
                }
            }
        }
        Ok(retried)
    }

    fn push_token(&self) -> Option<String> {
        self.store.get(PUSH_TOKEN_KEY).unwrap_or_else(|err| {
            tracing::warn!(error = %err, "failed to read push token");
            None
        })
    }

    fn load_global(&self, user_id: &str) -> Option<GlobalMute> {
        match read_json::<GlobalMute>(self.store.as_ref(), GLOBAL_MUTE_KEY) {
            Ok(record) => record.filter(|record| record.user_id == user_id),
            Err(err) => {
                tracing::warn!(error = %err, "failed to read global mute");
                None
            }
        }
    }

    fn load_sensors(&self, user_id: &str) -> SensorMutes {
        match read_json::<SensorMutes>(self.store.as_ref(), SENSOR_MUTES_KEY) {
            Ok(Some(record)) if record.user_id == user_id => record,
            Ok(_) => SensorMutes {
                user_id: user_id.to_string(),
                flags: BTreeMap::new(),
            },
            Err(err) => {
                tracing::warn!(error = %err, "failed to read sensor mutes");
                SensorMutes {
                    user_id: user_id.to_string(),
                    flags: BTreeMap::new(),
                }
            }
        }
    }

    fn write_global(&self, user_id: &str, flag: MuteFlag) -> Result<(), StoreError> {
        let _guard = self.write_lock.lock().expect("mute write lock");
        let record = GlobalMute {
            user_id: user_id.to_string(),
            flag,
        };
        write_json(self.store.as_ref(), GLOBAL_MUTE_KEY, &record)
    }

    fn confirm_global(&self, user_id: &str, muted: bool) -> Result<(), StoreError> {
        match self.global_flag(user_id) {
            Some(flag) if flag.muted == muted => self.write_global(user_id, MuteFlag {
                muted,
                synced: true,
            }),
            _ => Ok(()),
        }
    }

    fn confirm_sensor(&self, user_id: &str, sensor_name: &str, muted: bool) -> Result<(), StoreError> {
        self.update_sensors(user_id, |flags| {
            if let Some(entry) = flags.get_mut(sensor_name)
                && entry.flag.muted == muted
            {
                entry.flag.synced = true;
            }
        })
    }

    fn update_sensors<F>(&self, user_id: &str, update: F) -> Result<(), StoreError>
    where
        F: FnOnce(&mut BTreeMap<String, SensorMute>),
    {
        let _guard = self.write_lock.lock().expect("mute write lock");
        let mut record = self.load_sensors(user_id);
        update(&mut record.flags);
        write_json(self.store.as_ref(), SENSOR_MUTES_KEY, &record)
    }
}

impl<R: MuteService> SessionScoped for MuteStateStore<R> {
    fn clear_session_state(&self, _user_id: &str) -> Result<(), StoreError> {
        let _guard = self.write_lock.lock().expect("mute write lock");
        let global = self.store.delete(GLOBAL_MUTE_KEY);
        let sensors = self.store.delete(SENSOR_MUTES_KEY);
        global.and(sensors)
    }
}
