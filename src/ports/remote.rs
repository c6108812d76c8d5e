use crate::error::RemoteError;
use crate::ports::BoxFuture;
use crate::types::{AuthPayload, NotificationRecord, SensorDescriptor, SensorReading};

pub trait SessionService: Clone + Send + Sync + 'static {
    fn authenticate<'a>(
        &'a self,
        email: &'a str,
        password: &'a str,
    ) -> BoxFuture<'a, Result<AuthPayload, RemoteError>>;

    fn register_push_token<'a>(
        &'a self,
        user_id: &'a str,
        push_token: &'a str,
    ) -> BoxFuture<'a, Result<(), RemoteError>>;

    fn invalidate_token<'a>(
        &'a self,
        user_id: &'a str,
        push_token: &'a str,
    ) -> BoxFuture<'a, Result<(), RemoteError>>;
}

pub trait SensorService: Clone + Send + Sync + 'static {
    fn list_assigned_sensors<'a>(
        &'a self,
        user_id: &'a str,
    ) -> BoxFuture<'a, Result<Vec<SensorDescriptor>, RemoteError>>;

    fn latest_reading<'a>(
        &'a self,
        sensor: &'a SensorDescriptor,
    ) -> BoxFuture<'a, Result<SensorReading, RemoteError>>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MuteScope<'a> {
    pub user_id: &'a str,
    pub push_token: Option<&'a str>,
}

pub trait MuteService: Clone + Send + Sync + 'static {
    fn get_global_mute<'a>(&'a self, scope: MuteScope<'a>) -> BoxFuture<'a, Result<bool, RemoteError>>;

    fn set_global_mute<'a>(
        &'a self,
        scope: MuteScope<'a>,
        muted: bool,
    ) -> BoxFuture<'a, Result<(), RemoteError>>;

    fn get_sensor_mute<'a>(
        &'a self,
        scope: MuteScope<'a>,
        sensor_id: &'a str,
    ) -> BoxFuture<'a, Result<bool, RemoteError>>;

    fn set_sensor_mute<'a>(
        &'a self,
        scope: MuteScope<'a>,
        sensor_id: &'a str,
        muted: bool,
    ) -> BoxFuture<'a, Result<(), RemoteError>>;
}

pub trait NotificationLog: Clone + Send + Sync + 'static {
    fn fetch_page<'a>(
        &'a self,
        user_id: &'a str,
        page: u32,
        page_size: u32,
    ) -> BoxFuture<'a, Result<Vec<NotificationRecord>, RemoteError>>;

    fn publish<'a>(
        &'a self,
        user_id: &'a str,
        sensor_name: Option<&'a str>,
        message: &'a str,
    ) -> BoxFuture<'a, Result<(), RemoteError>>;
}
