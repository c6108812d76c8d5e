use crate::error::RemoteError;
use crate::ports::{
    BoxFuture, MuteScope, MuteService, NotificationLog, SensorService, SessionService,
};
use crate::types::{
    AuthPayload, NotificationRecord, Role, SensorDescriptor, SensorKind, SensorReading,
};

use reqwest::StatusCode;
use serde::Deserialize;
use serde::de::DeserializeOwned;
use serde_json::Value as JsonValue;
use std::time::Duration;
use time::format_description::well_known::Rfc3339;
use time::macros::format_description;
use time::{OffsetDateTime, PrimitiveDateTime};

const LOGIN: &str = "login.php";
const LOGOUT: &str = "logout.php";
const REGISTER_PUSH_TOKEN: &str = "register_push_token.php";
const ASSIGNED_SENSORS: &str = "sensoresUsuario.php";
const LATEST_READING: &str = "ultimaLectura.php";
const GET_GLOBAL_MUTE: &str = "get_global_notifications.php";
const SET_GLOBAL_MUTE: &str = "mute_global_notifications.php";
const GET_SENSOR_MUTE: &str = "get_sensor_mute_state.php";
const SET_SENSOR_MUTE: &str = "mute_sensor_notifications.php";
const NOTIFICATIONS: &str = "getUserNotifications.php";
const SEND_NOTIFICATION: &str = "send_notification.php";

const LOGOUT_CONFIRMATION: &str = "Token desactivado exitosamente";

#[derive(Debug, Clone)]
pub struct HttpBackend {
    base_url: String,
    client: reqwest::Client,
}

impl HttpBackend {
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self, RemoteError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(transport)?;
        Ok(Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            client,
        })
    }

    fn url(&self, endpoint: &str) -> String {
        format!("{}/{endpoint}", self.base_url)
    }

    async fn post_form<T: DeserializeOwned>(
        &self,
        endpoint: &str,
        form: &[(&str, &str)],
    ) -> Result<T, RemoteError> {
        let response = self
            .client
            .post(self.url(endpoint))
            .form(form)
            .send()
            .await
            .map_err(transport)?;
        decode(response).await
    }

    async fn post_json(&self, endpoint: &str, body: &JsonValue) -> Result<(), RemoteError> {
        let response = self
            .client
            .post(self.url(endpoint))
            .json(body)
            .send()
            .await
            .map_err(transport)?;
        body_text(response).await.map(|_| ())
    }

    async fn get<T: DeserializeOwned>(
        &self,
        endpoint: &str,
        query: &[(&str, &str)],
    ) -> Result<T, RemoteError> {
        let response = self
            .client
            .get(self.url(endpoint))
            .query(query)
            .send()
            .await
            .map_err(transport)?;
        decode(response).await
    }

    async fn mute_state(&self, endpoint: &str, form: &[(&str, &str)]) -> Result<bool, RemoteError> {
        let response: MuteResponse = self.post_form(endpoint, form).await?;
        if response.success == Some(false) {
            return Err(RemoteError::Rejected {
                status: StatusCode::OK.as_u16(),
                message: response.message.unwrap_or_default(),
            });
        }
        response
            .muteado
            .as_ref()
            .and_then(flag_from_json)
            .ok_or_else(|| RemoteError::Malformed("missing mute flag".to_string()))
    }

    async fn set_mute(&self, endpoint: &str, form: &[(&str, &str)]) -> Result<(), RemoteError> {
        let response: MuteResponse = self.post_form(endpoint, form).await?;
        match response.success {
            Some(false) => Err(RemoteError::Rejected {
                status: StatusCode::OK.as_u16(),
                message: response.message.unwrap_or_default(),
            }),
            _ => Ok(()),
        }
    }
}

impl SessionService for HttpBackend {
    fn authenticate<'a>(
        &'a self,
        email: &'a str,
        password: &'a str,
    ) -> BoxFuture<'a, Result<AuthPayload, RemoteError>> {
        Box::pin(async move {
            let response: LoginResponse = self
                .post_form(LOGIN, &[("email", email), ("password", password)])
                .await?;
            login_payload(response)
        })
    }

    fn register_push_token<'a>(
        &'a self,
        user_id: &'a str,
        push_token: &'a str,
    ) -> BoxFuture<'a, Result<(), RemoteError>> {
        Box::pin(async move {
            let body = serde_json::json!({ "userId": user_id, "token": push_token });
            self.post_json(REGISTER_PUSH_TOKEN, &body).await
        })
    }

    fn invalidate_token<'a>(
        &'a self,
        user_id: &'a str,
        push_token: &'a str,
    ) -> BoxFuture<'a, Result<(), RemoteError>> {
        Box::pin(async move {
            let response = self
                .client
                .post(self.url(LOGOUT))
                .form(&[("user_id", user_id), ("token", push_token)])
                .send()
                .await
                .map_err(transport)?;
            let body = body_text(response).await?;
            if body.contains(LOGOUT_CONFIRMATION) {
                Ok(())
            } else {
                Err(RemoteError::Malformed(format!(
                    "logout not confirmed: {}",
                    body.trim()
                )))
            }
        })
    }
}

impl SensorService for HttpBackend {
    fn list_assigned_sensors<'a>(
        &'a self,
        user_id: &'a str,
    ) -> BoxFuture<'a, Result<Vec<SensorDescriptor>, RemoteError>> {
        Box::pin(async move {
            let response: JsonValue = self.get(ASSIGNED_SENSORS, &[("user_id", user_id)]).await?;
            sensors_from_json(response)
        })
    }

    fn latest_reading<'a>(
        &'a self,
        sensor: &'a SensorDescriptor,
    ) -> BoxFuture<'a, Result<SensorReading, RemoteError>> {
        Box::pin(async move {
            let response: ReadingResponse = self
                .get(LATEST_READING, &[("sensor_name", sensor.name.as_str())])
                .await?;
            reading_from_response(sensor, response)
        })
    }
}

impl MuteService for HttpBackend {
    fn get_global_mute<'a>(&'a self, scope: MuteScope<'a>) -> BoxFuture<'a, Result<bool, RemoteError>> {
        Box::pin(async move {
            self.mute_state(GET_GLOBAL_MUTE, &global_mute_form(scope, None))
                .await
        })
    }

    fn set_global_mute<'a>(
        &'a self,
        scope: MuteScope<'a>,
        muted: bool,
    ) -> BoxFuture<'a, Result<(), RemoteError>> {
        Box::pin(async move {
            let muted = muted.to_string();
            self.set_mute(SET_GLOBAL_MUTE, &global_mute_form(scope, Some(muted.as_str())))
                .await
        })
    }

    fn get_sensor_mute<'a>(
        &'a self,
        scope: MuteScope<'a>,
        sensor_id: &'a str,
    ) -> BoxFuture<'a, Result<bool, RemoteError>> {
        Box::pin(async move {
            self.mute_state(GET_SENSOR_MUTE, &sensor_mute_form(scope, sensor_id, None))
                .await
        })
    }

    fn set_sensor_mute<'a>(
        &'a self,
        scope: MuteScope<'a>,
        sensor_id: &'a str,
        muted: bool,
    ) -> BoxFuture<'a, Result<(), RemoteError>> {
        Box::pin(async move {
            let muted = muted.to_string();
            self.set_mute(
                SET_SENSOR_MUTE,
                &sensor_mute_form(scope, sensor_id, Some(muted.as_str())),
            )
            .await
        })
    }
}

impl NotificationLog for HttpBackend {
    fn fetch_page<'a>(
        &'a self,
        user_id: &'a str,
        page: u32,
        page_size: u32,
    ) -> BoxFuture<'a, Result<Vec<NotificationRecord>, RemoteError>> {
        Box::pin(async move {
            let page = page.to_string();
            let limit = page_size.to_string();
            let response: Vec<WireNotification> = self
                .get(
                    NOTIFICATIONS,
                    &[
                        ("user_id", user_id),
                        ("page", page.as_str()),
                        ("limit", limit.as_str()),
                    ],
                )
                .await?;
            response.into_iter().map(notification_from_wire).collect()
        })
    }

    fn publish<'a>(
        &'a self,
        user_id: &'a str,
        sensor_name: Option<&'a str>,
        message: &'a str,
    ) -> BoxFuture<'a, Result<(), RemoteError>> {
        Box::pin(async move {
            let body = serde_json::json!({
                "userId": user_id,
                "sensorName": sensor_name,
                "message": message,
            });
            self.post_json(SEND_NOTIFICATION, &body).await
        })
    }
}

#[derive(Debug, Deserialize)]
struct LoginResponse {
    token: Option<String>,
    #[serde(rename = "userId")]
    user_id: Option<JsonValue>,
    rol: Option<String>,
    error: Option<String>,
}

#[derive(Debug, Deserialize)]
struct WireSensor {
    id: JsonValue,
    nombre: String,
    tipo: String,
    umbral: JsonValue,
    #[serde(rename = "umbralMax")]
    umbral_max: JsonValue,
}

#[derive(Debug, Deserialize)]
struct ReadingResponse {
    #[serde(rename = "Temperatura")]
    temperature: Option<JsonValue>,
    nivel_combustible: Option<JsonValue>,
    fecha_actual: Option<String>,
    error: Option<String>,
}

#[derive(Debug, Deserialize)]
struct MuteResponse {
    success: Option<bool>,
    muteado: Option<JsonValue>,
    message: Option<String>,
}

#[derive(Debug, Deserialize)]
struct WireNotification {
    mensaje: String,
    sensor_nombre: Option<String>,
    fecha: String,
}

/// The global setter names the device token `pushToken`; every other mute call uses `token`.
fn global_mute_form<'a>(
    scope: MuteScope<'a>,
    muted: Option<&'a str>,
) -> Vec<(&'static str, &'a str)> {
    let mut form = Vec::with_capacity(3);
    match muted {
        Some(muted) => {
            form.push(("muteado", muted));
            form.push(("usuario_id", scope.user_id));
            form.extend(scope.push_token.map(|token| ("pushToken", token)));
        }
        None => {
            form.push(("usuario_id", scope.user_id));
            form.extend(scope.push_token.map(|token| ("token", token)));
        }
    }
    form
}

fn sensor_mute_form<'a>(
    scope: MuteScope<'a>,
    sensor_id: &'a str,
    muted: Option<&'a str>,
) -> Vec<(&'static str, &'a str)> {
    let mut form = vec![("usuario_id", scope.user_id), ("sensor_id", sensor_id)];
    form.extend(muted.map(|muted| ("muteado", muted)));
    form.extend(scope.push_token.map(|token| ("token", token)));
    form
}

fn login_payload(response: LoginResponse) -> Result<AuthPayload, RemoteError> {
    let Some(token) = response.token.filter(|token| !token.is_empty()) else {
        return match response.error {
            Some(_) => Err(RemoteError::Unauthorized),
            None => Err(RemoteError::Malformed("login response without token".to_string())),
        };
    };
    let user_id = response
        .user_id
        .as_ref()
        .and_then(id_from_json)
        .ok_or_else(|| RemoteError::Malformed("login response without user id".to_string()))?;
    let role = response
        .rol
        .as_deref()
        .and_then(Role::parse)
        .ok_or_else(|| RemoteError::Malformed("login response with unknown role".to_string()))?;
    Ok(AuthPayload {
        token,
        user_id,
        role,
    })
}

/// An empty assignment comes back as `{"message": ...}` instead of `[]`.
fn sensors_from_json(value: JsonValue) -> Result<Vec<SensorDescriptor>, RemoteError> {
    match value {
        JsonValue::Array(items) => items
            .into_iter()
            .map(|item| {
                let wire: WireSensor = serde_json::from_value(item)
                    .map_err(|err| RemoteError::Malformed(err.to_string()))?;
                sensor_from_wire(wire)
            })
            .collect(),
        JsonValue::Object(map) if map.contains_key("message") => Ok(Vec::new()),
        other => Err(RemoteError::Malformed(format!(
            "unexpected sensor list: {other}"
        ))),
    }
}

fn sensor_from_wire(wire: WireSensor) -> Result<SensorDescriptor, RemoteError> {
    let kind = match wire.tipo.as_str() {
        "temperatura" => SensorKind::Temperature,
        "combustible" => SensorKind::Fuel,
        other => {
            return Err(RemoteError::Malformed(format!(
                "unknown sensor kind '{other}' for {}",
                wire.nombre
            )));
        }
    };
    let threshold = |value: &JsonValue, label: &str| {
        number_from_json(value).ok_or_else(|| {
            RemoteError::Malformed(format!("invalid {label} threshold for {}", wire.nombre))
        })
    };
    Ok(SensorDescriptor {
        id: id_from_json(&wire.id).unwrap_or_default(),
        min_threshold: threshold(&wire.umbral, "min")?,
        max_threshold: threshold(&wire.umbral_max, "max")?,
        name: wire.nombre,
        kind,
    })
}

fn reading_from_response(
    sensor: &SensorDescriptor,
    response: ReadingResponse,
) -> Result<SensorReading, RemoteError> {
    if let Some(error) = response.error {
        return Err(RemoteError::Rejected {
            status: StatusCode::OK.as_u16(),
            message: error,
        });
    }
    let raw_value = match sensor.kind {
        SensorKind::Temperature => response.temperature,
        SensorKind::Fuel => response.nivel_combustible,
    };
    let value = raw_value
        .as_ref()
        .and_then(number_from_json)
        .ok_or_else(|| RemoteError::Malformed(format!("missing value for {}", sensor.name)))?;
    let observed_at = response
        .fecha_actual
        .as_deref()
        .and_then(parse_timestamp)
        .ok_or_else(|| RemoteError::Malformed(format!("invalid timestamp for {}", sensor.name)))?;
    Ok(SensorReading {
        sensor_name: sensor.name.clone(),
        value,
        observed_at,
    })
}

fn notification_from_wire(wire: WireNotification) -> Result<NotificationRecord, RemoteError> {
    let created_at = parse_timestamp(&wire.fecha)
        .ok_or_else(|| RemoteError::Malformed(format!("invalid notification date '{}'", wire.fecha)))?;
    Ok(NotificationRecord {
        message: wire.mensaje,
        sensor_name: wire.sensor_nombre.filter(|name| !name.is_empty()),
        created_at,
    })
}

pub(crate) fn parse_timestamp(raw: &str) -> Option<OffsetDateTime> {
    let raw = raw.trim();
    if let Ok(parsed) = OffsetDateTime::parse(raw, &Rfc3339) {
        return Some(parsed);
    }
    let format = format_description!("[year]-[month]-[day] [hour]:[minute]:[second]");
    PrimitiveDateTime::parse(raw, format)
        .ok()
        .map(PrimitiveDateTime::assume_utc)
}

fn number_from_json(value: &JsonValue) -> Option<f64> {
    let parsed = match value {
        JsonValue::Number(number) => number.as_f64(),
        JsonValue::String(raw) => raw.trim().parse().ok(),
        _ => None,
    };
    parsed.filter(|value: &f64| value.is_finite())
}

fn id_from_json(value: &JsonValue) -> Option<String> {
    match value {
        JsonValue::String(raw) if !raw.is_empty() => Some(raw.clone()),
        JsonValue::Number(number) => Some(number.to_string()),
        _ => None,
    }
}

fn flag_from_json(value: &JsonValue) -> Option<bool> {
    match value {
        JsonValue::Bool(flag) => Some(*flag),
        JsonValue::Number(number) => number.as_i64().map(|value| value == 1),
        JsonValue::String(raw) => match raw.trim() {
            "1" | "true" => Some(true),
            "0" | "false" => Some(false),
            _ => None,
        },
        _ => None,
    }
}

async fn body_text(response: reqwest::Response) -> Result<String, RemoteError> {
    let status = response.status();
    let body = response.text().await.map_err(transport)?;
    if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
        return Err(RemoteError::Unauthorized);
    }
    if !status.is_success() {
        return Err(RemoteError::Rejected {
            status: status.as_u16(),
            message: body.trim().to_string(),
        });
    }
    Ok(body)
}

async fn decode<T: DeserializeOwned>(response: reqwest::Response) -> Result<T, RemoteError> {
    let body = body_text(response).await?;
    serde_json::from_str(&body).map_err(|err| RemoteError::Malformed(err.to_string()))
}

fn transport(err: reqwest::Error) -> RemoteError {
    RemoteError::Transport(err.to_string())
}
