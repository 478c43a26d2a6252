use std::path::PathBuf;
use std::time::Duration;

use crate::error::AppError;

#[derive(Clone, Default)]
pub struct Config {
    /// Directory holding one subscription file per recipient.
    pub data_path: PathBuf,
    pub logs_path: PathBuf,
    /// Offset between successive timer registrations at startup.
    pub stagger_step: Duration,
    /// Endpoint the webhook notifier delivers to.
    pub webhook_url: String,
}

impl Config {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn load(&mut self) -> Result<(), AppError> {
        self.data_path = std::env::var("DATA_PATH")
            .unwrap_or("data/subscriptions".to_string())
            .into();
        self.logs_path = std::env::var("LOGS_PATH").unwrap_or("logs".to_string()).into();
        self.stagger_step = std::env::var("STAGGER_SECS")
            .ok()
            .and_then(|v| v.parse::<u64>().ok())
            .map_or(Duration::from_secs(5), Duration::from_secs);
        self.webhook_url = std::env::var("WEBHOOK_URL").map_err(|_| AppError::MissingConfig {
            key: "WEBHOOK_URL".to_string(),
        })?;
        Ok(())
    }
}
