use std::env;
use std::time::Duration;

/// Process-wide configuration, loaded once at startup and handed to
/// each component explicitly so they stay independently testable.
#[derive(Debug, Clone)]
pub struct AppConfig {
    /// Marketplace access token (static credential, assumed valid).
    pub sp_api_key: String,
    pub sp_base_url: String,
    pub internal_base_url: String,
    /// Store code the task feeds are filtered by.
    pub store_code: String,
    /// How many days back each sweep reaches (today inclusive).
    pub sweep_window_days: u32,
    /// Idle wait between sweeps when nothing was processed.
    pub loop_interval: Duration,
    /// Pause after every task to bound request rate.
    pub task_pause: Duration,
    /// Cooldown after a sweep-level fetch failure.
    pub error_cooldown: Duration,
}

impl AppConfig {
    pub fn from_env() -> Self {
        Self {
            sp_api_key: env::var("SP_API_KEY").unwrap_or_default(),
            sp_base_url: trim_base(
                env::var("SP_BASE_URL")
                    .unwrap_or_else(|_| "https://app.servicepoints.nl/api/v2".to_string()),
            ),
            internal_base_url: trim_base(
                env::var("INTERNAL_API_BASE")
                    .unwrap_or_else(|_| "http://47.95.157.46:8520/api".to_string()),
            ),
            store_code: env::var("STORE_CODE").unwrap_or_else(|_| "SP00001".to_string()),
            sweep_window_days: env_u64("SWEEP_WINDOW_DAYS", 3) as u32,
            loop_interval: Duration::from_secs(env_u64("LOOP_INTERVAL_SECS", 30)),
            task_pause: Duration::from_secs(env_u64("TASK_PAUSE_SECS", 3)),
            error_cooldown: Duration::from_secs(env_u64("ERROR_COOLDOWN_SECS", 5)),
        }
    }
}

fn trim_base(url: String) -> String {
    url.trim_end_matches('/').to_string()
}

fn env_u64(key: &str, default: u64) -> u64 {
    env::var(key)
        .ok()
        .and_then(|v| v.parse::<u64>().ok())
        .filter(|v| *v > 0)
        .unwrap_or(default)
}
