use std::future::Future;
use std::pin::Pin;

pub mod alerts;
pub mod remote;
pub mod store;
pub mod time;

pub use alerts::{AlertPresenter, PushRegistrar};
pub use remote::{MuteScope, MuteService, NotificationLog, SensorService, SessionService};
pub use store::{KeyValueStore, SharedStore};
pub use self::time::TimeProvider;

pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;
