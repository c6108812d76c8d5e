pub mod adapters;
pub mod app;
pub mod config;
pub mod error;
pub mod logging;
pub mod mutes;
pub mod notifications;
pub mod poller;
pub mod ports;
pub mod scheduler;
pub mod session;
pub mod types;

pub use app::{App, Backend, ColdStart, ColdwatchApp};
pub use config::AppConfig;
pub use error::AppError;
