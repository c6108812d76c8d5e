use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Admin,
    Client,
}

impl Role {
    pub fn as_str(self) -> &'static str {
        match self {
            Role::Admin => "admin",
            Role::Client => "client",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim() {
            "admin" => Some(Role::Admin),
            "client" | "cliente" => Some(Role::Client),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Session {
    pub token: String,
    pub user_id: String,
    pub role: Role,
    #[serde(with = "time::serde::rfc3339")]
    pub issued_at: OffsetDateTime,
}

#[derive(Debug, Clone)]
pub struct Credentials {
    pub email: String,
    pub password: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthPayload {
    pub token: String,
    pub user_id: String,
    pub role: Role,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SensorKind {
    Temperature,
    Fuel,
}

impl SensorKind {
    pub fn as_str(self) -> &'static str {
        match self {
            SensorKind::Temperature => "temperature",
            SensorKind::Fuel => "fuel",
        }
    }

    pub fn unit(self) -> &'static str {
        match self {
            SensorKind::Temperature => "°C",
            SensorKind::Fuel => "%",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SensorDescriptor {
    pub id: String,
    pub name: String,
    pub kind: SensorKind,
    pub min_threshold: f64,
    pub max_threshold: f64,
}

impl SensorDescriptor {
    /// Strict bounds: a value equal to either threshold is in range.
    pub fn is_out_of_bounds(&self, value: f64) -> bool {
        value < self.min_threshold || value > self.max_threshold
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SensorReading {
    pub sensor_name: String,
    pub value: f64,
    #[serde(with = "time::serde::rfc3339")]
    pub observed_at: OffsetDateTime,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NotificationRecord {
    pub message: String,
    pub sensor_name: Option<String>,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
}

#[derive(Debug, Clone, PartialEq)]
pub enum AlertKind {
    Offline { age_minutes: f64 },
    Threshold { value: f64, unit: &'static str },
}

#[derive(Debug, Clone, PartialEq)]
pub struct AlertEvent {
    pub sensor: String,
    pub kind: AlertKind,
    pub detected_at: OffsetDateTime,
}

impl AlertEvent {
    pub const TITLE: &'static str = "Sensor alert";

    pub fn message(&self) -> String {
        match &self.kind {
            AlertKind::Offline { age_minutes } => format!(
                "Sensor {} is offline. Last reading {} minutes ago.",
                self.sensor,
                age_minutes.floor()
            ),
            AlertKind::Threshold { value, unit } => {
                format!("Sensor {} is out of bounds: {value}{unit}", self.sensor)
            }
        }
    }

    pub fn is_offline(&self) -> bool {
        matches!(self.kind, AlertKind::Offline { .. })
    }
}
