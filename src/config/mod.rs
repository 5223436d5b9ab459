//! Configuration module for linkvault.
//!
//! Loads configuration from environment variables.

use serde::Deserialize;
use std::env;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

/// Bot running mode
#[derive(Debug, Clone, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum BotMode {
    #[default]
    Polling,
    Webhook,
}

/// Application configuration
#[derive(Debug, Clone)]
pub struct Config {
    // Telegram
    pub bot_token: String,
    pub bot_mode: BotMode,
    pub webhook_url: Option<String>,
    pub webhook_port: u16,
    pub webhook_secret: Option<String>,

    /// Bot username (without @) for deep link construction.
    /// Optional - will be fetched via getMe if not set.
    pub bot_username: Option<String>,

    /// Owner user IDs (comma-separated)
    /// These users can run every admin command.
    pub owner_ids: Vec<u64>,

    /// The canonical channel holding shared media.
    pub db_channel_id: i64,
    /// Public username of the canonical channel, for `t.me/<name>/<id>` links.
    pub db_channel_username: Option<String>,

    // MongoDB
    pub mongodb_uri: String,
    pub mongodb_database: String,

    // Local JSON tables
    pub data_dir: PathBuf,
    pub fallback_data_dir: Option<PathBuf>,

    // Batch copier
    pub copy_concurrency: usize,
    pub copy_max_retries: u32,
    pub attach_max_retries: u32,
    pub batch_idle_timeout: Duration,

    // Auto-delete
    pub sweep_interval: Duration,

    // Backups
    pub backup_interval: Option<Duration>,
    pub backup_keep: usize,

    // Search
    pub search_scan_limit: i64,

    /// Text of the button attached to every delivered file. Empty disables it.
    pub brand_button_text: Option<String>,

    /// Port of the health endpoint. Disabled when unset.
    pub health_port: Option<u16>,
}

impl Config {
    /// Load configuration from environment variables.
    ///
    /// # Panics
    /// Panics if required environment variables are not set or malformed.
    pub fn from_env() -> Self {
        dotenvy::dotenv().ok();

        let bot_mode = env::var("BOT_MODE")
            .unwrap_or_else(|_| "polling".to_string())
            .to_lowercase();

        let bot_mode = match bot_mode.as_str() {
            "webhook" => BotMode::Webhook,
            _ => BotMode::Polling,
        };

        let webhook_url = env::var("WEBHOOK_URL").ok().filter(|s| !s.is_empty());

        // Validate webhook URL is set if mode is webhook
        if bot_mode == BotMode::Webhook && webhook_url.is_none() {
            panic!("WEBHOOK_URL must be set when BOT_MODE is webhook");
        }

        // Parse bot username (strip @ if present)
        let bot_username = env::var("BOT_USERNAME")
            .ok()
            .map(|s| s.trim_start_matches('@').to_string())
            .filter(|s| !s.is_empty());

        let db_channel_id = env::var("DB_CHANNEL_ID")
            .expect("DB_CHANNEL_ID must be set")
            .trim()
            .parse::<i64>()
            .expect("DB_CHANNEL_ID must be an integer chat id");
        assert!(db_channel_id != 0, "DB_CHANNEL_ID must be non-zero");

        let backup_hours: f64 = parse_or("BACKUP_INTERVAL_HOURS", 24.0);

        Self {
            bot_token: env::var("BOT_TOKEN").expect("BOT_TOKEN must be set"),
            bot_mode,
            webhook_url,
            webhook_port: parse_or("WEBHOOK_PORT", 8443),
            webhook_secret: env::var("WEBHOOK_SECRET").ok().filter(|s| !s.is_empty()),
            bot_username,
            owner_ids: parse_ids(&env::var("OWNER_IDS").unwrap_or_default()),
            db_channel_id,
            db_channel_username: env::var("DB_CHANNEL_USERNAME")
                .ok()
                .map(|s| s.trim_start_matches('@').to_string())
                .filter(|s| !s.is_empty()),
            mongodb_uri: env::var("MONGODB_URI").expect("MONGODB_URI must be set"),
            mongodb_database: env::var("MONGODB_DATABASE")
                .unwrap_or_else(|_| "linkvault".to_string()),
            data_dir: env::var("DATA_DIR")
                .map(PathBuf::from)
                .unwrap_or_else(|_| PathBuf::from("data")),
            fallback_data_dir: env::var("FALLBACK_DATA_DIR")
                .ok()
                .filter(|s| !s.is_empty())
                .map(PathBuf::from)
                .or_else(|| Some(env::temp_dir().join("linkvault"))),
            copy_concurrency: parse_or("COPY_CONCURRENCY", 5usize).max(1),
            copy_max_retries: parse_or("COPY_MAX_RETRIES", 5),
            attach_max_retries: parse_or("ATTACH_MAX_RETRIES", 3),
            batch_idle_timeout: Duration::from_secs(parse_or("BATCH_IDLE_TIMEOUT", 120)),
            sweep_interval: Duration::from_secs(parse_or("SWEEP_INTERVAL", 60u64).max(1)),
            backup_interval: (backup_hours > 0.0)
                .then(|| Duration::from_secs_f64(backup_hours * 3600.0)),
            backup_keep: parse_or("BACKUP_KEEP", 7usize).max(1),
            search_scan_limit: parse_or("SEARCH_SCAN_LIMIT", 1000i64).max(1),
            brand_button_text: Some(
                env::var("BRAND_BUTTON_TEXT").unwrap_or_else(|_| "📦 Shared via LinkVault".to_string()),
            )
            .filter(|s| !s.trim().is_empty()),
            health_port: env::var("HEALTH_PORT").ok().and_then(|s| s.trim().parse().ok()),
        }
    }
}

/// Parse a comma-separated list of user IDs, skipping junk.
pub fn parse_ids(raw: &str) -> Vec<u64> {
    raw.split(',')
        .filter_map(|s| s.trim().parse::<u64>().ok())
        .collect()
}

/// Read and parse `key`, using `default` when unset.
///
/// # Panics
/// Panics if the variable is set but does not parse.
fn parse_or<T: FromStr>(key: &str, default: T) -> T {
    match env::var(key) {
        Ok(raw) if !raw.trim().is_empty() => raw
            .trim()
            .parse()
            .unwrap_or_else(|_| panic!("{} has an invalid value: {}", key, raw)),
        _ => default,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_ids() {
        assert_eq!(parse_ids("1, 2,x,,3"), vec![1, 2, 3]);
        assert!(parse_ids("").is_empty());
    }
}
