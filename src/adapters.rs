use crate::ports;

use base64::{URL_SAFE_NO_PAD, encode_config};
use rand::rngs::OsRng;
use rand::{CryptoRng, RngCore};
use time::OffsetDateTime;

mod http;
mod store;

pub use http::HttpBackend;
pub use store::{FileStore, MemoryStore};

#[derive(Debug, Clone, Copy, Default)]
pub struct SystemTimeProvider;

impl ports::TimeProvider for SystemTimeProvider {
    fn now(&self) -> OffsetDateTime {
        OffsetDateTime::now_utc()
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct TerminalPresenter;

impl ports::AlertPresenter for TerminalPresenter {
    fn present(&self, title: &str, body: &str) {
        println!("[{title}] {body}");
    }
}

/// Stands in for the platform push service.
#[derive(Debug, Clone, Copy, Default)]
pub struct RandomPushRegistrar;

impl ports::PushRegistrar for RandomPushRegistrar {
    fn device_token(&self) -> Option<String> {
        let mut rng = OsRng;
        Some(device_token_with_rng(&mut rng))
    }
}

pub(crate) fn device_token_with_rng<R: RngCore + CryptoRng>(rng: &mut R) -> String {
    let mut bytes = [0u8; 32];
    rng.fill_bytes(&mut bytes);
    encode_config(bytes, URL_SAFE_NO_PAD)
}
