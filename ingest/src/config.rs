//! Service configuration: TOML file, environment overrides, validation.

use anyhow::{anyhow, Result};
use serde::Deserialize;
use std::env;
use std::path::Path;
use tracing::warn;

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct AppConfig {
    pub bind_addr: String,
    /// Required on `POST /api/upload` when set.
    pub upload_api_key: Option<String>,
    pub public_base_url: String,

    pub aws_region: Option<String>,
    /// Endpoint override for LocalStack-style test stacks.
    pub aws_endpoint: Option<String>,
    /// Battle/index table names derive from this prefix.
    pub table_prefix: String,
    pub ship_index_table: String,
    pub player_index_table: String,
    pub clan_index_table: String,
    pub bucket: String,

    pub webhook_url: Option<String>,

    pub max_replay_bytes: u64,
    pub request_timeout_seconds: u64,
    /// Wall-clock budget for answering the upload call with a real arena
    /// id; past it the upload is acknowledged as queued.
    pub interactive_decode_seconds: u64,
    pub render_queue_depth: usize,
    pub video_font_path: Option<String>,
    pub video_output_seconds: f64,
    pub presign_expiry_seconds: u64,
    /// Raw replay retention in days; 0 keeps blobs forever. Enforced by
    /// operators (lifecycle rules), recorded here so tooling agrees.
    pub retention_days: u32,
}

impl Default for AppConfig {
    fn default() -> Self {
        AppConfig {
            bind_addr: "127.0.0.1:8080".to_string(),
            upload_api_key: None,
            public_base_url: "http://127.0.0.1:8080".to_string(),
            aws_region: None,
            aws_endpoint: None,
            table_prefix: "wows-replay-vault".to_string(),
            ship_index_table: "wows-replay-vault-ship-index".to_string(),
            player_index_table: "wows-replay-vault-player-index".to_string(),
            clan_index_table: "wows-replay-vault-clan-index".to_string(),
            bucket: "wows-replay-vault".to_string(),
            webhook_url: None,
            max_replay_bytes: 64 * 1024 * 1024,
            request_timeout_seconds: 30,
            interactive_decode_seconds: 25,
            render_queue_depth: 64,
            video_font_path: None,
            video_output_seconds: 60.0,
            presign_expiry_seconds: 3600,
            retention_days: 0,
        }
    }
}

impl AppConfig {
    pub async fn load() -> Result<Self> {
        let path = env::var("INGEST_CONFIG").unwrap_or_else(|_| "./config.toml".to_string());
        let file_path = Path::new(&path);
        let mut config = if file_path.exists() {
            let content = tokio::fs::read_to_string(file_path).await?;
            toml::from_str(&content)?
        } else {
            warn!("config.toml not found, using defaults");
            AppConfig::default()
        };
        config.apply_env_overrides();
        config.normalize();
        config.validate()?;
        Ok(config)
    }

    pub fn normalize(&mut self) {
        if let Some(key) = &self.upload_api_key {
            if key.trim().is_empty() {
                self.upload_api_key = None;
            }
        }
        if let Some(url) = &self.webhook_url {
            if url.trim().is_empty() {
                self.webhook_url = None;
            }
        }
        if let Some(endpoint) = &self.aws_endpoint {
            if endpoint.trim().is_empty() {
                self.aws_endpoint = None;
            }
        }
    }

    pub fn validate(&self) -> Result<()> {
        self.bind_addr
            .parse::<std::net::SocketAddr>()
            .map_err(|err| anyhow!("invalid bind_addr: {}", err))?;
        if self.bucket.trim().is_empty() {
            return Err(anyhow!("bucket must not be empty"));
        }
        if self.max_replay_bytes == 0 {
            return Err(anyhow!("max_replay_bytes must be greater than 0"));
        }
        if self.render_queue_depth == 0 {
            return Err(anyhow!("render_queue_depth must be greater than 0"));
        }
        if self.video_output_seconds <= 0.0 {
            return Err(anyhow!("video_output_seconds must be positive"));
        }
        Ok(())
    }

    fn apply_env_overrides(&mut self) {
        if let Ok(value) = env::var("INGEST_BIND_ADDR") {
            self.bind_addr = value;
        }
        if let Ok(value) = env::var("INGEST_UPLOAD_API_KEY") {
            self.upload_api_key = Some(value);
        }
        if let Ok(value) = env::var("INGEST_PUBLIC_BASE_URL") {
            self.public_base_url = value;
        }
        if let Ok(value) = env::var("INGEST_AWS_REGION") {
            self.aws_region = Some(value);
        }
        if let Ok(value) = env::var("INGEST_AWS_ENDPOINT") {
            self.aws_endpoint = Some(value);
        }
        if let Ok(value) = env::var("INGEST_TABLE_PREFIX") {
            self.table_prefix = value;
        }
        if let Ok(value) = env::var("INGEST_SHIP_INDEX_TABLE") {
            self.ship_index_table = value;
        }
        if let Ok(value) = env::var("INGEST_PLAYER_INDEX_TABLE") {
            self.player_index_table = value;
        }
        if let Ok(value) = env::var("INGEST_CLAN_INDEX_TABLE") {
            self.clan_index_table = value;
        }
        if let Ok(value) = env::var("INGEST_BUCKET") {
            self.bucket = value;
        }
        if let Ok(value) = env::var("INGEST_WEBHOOK_URL") {
            self.webhook_url = Some(value);
        }
        if let Ok(value) = env::var("INGEST_MAX_REPLAY_BYTES") {
            self.max_replay_bytes = value.parse().unwrap_or(self.max_replay_bytes);
        }
        if let Ok(value) = env::var("INGEST_REQUEST_TIMEOUT_SECONDS") {
            self.request_timeout_seconds = value.parse().unwrap_or(self.request_timeout_seconds);
        }
        if let Ok(value) = env::var("INGEST_INTERACTIVE_DECODE_SECONDS") {
            self.interactive_decode_seconds =
                value.parse().unwrap_or(self.interactive_decode_seconds);
        }
        if let Ok(value) = env::var("INGEST_RENDER_QUEUE_DEPTH") {
            self.render_queue_depth = value.parse().unwrap_or(self.render_queue_depth);
        }
        if let Ok(value) = env::var("INGEST_VIDEO_FONT_PATH") {
            self.video_font_path = Some(value);
        }
        if let Ok(value) = env::var("INGEST_RETENTION_DAYS") {
            self.retention_days = value.parse().unwrap_or(self.retention_days);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_validate() {
        AppConfig::default().validate().unwrap();
    }

    #[test]
    fn normalize_drops_blank_optionals() {
        let mut config = AppConfig {
            upload_api_key: Some("  ".into()),
            webhook_url: Some(String::new()),
            ..AppConfig::default()
        };
        config.normalize();
        assert!(config.upload_api_key.is_none());
        assert!(config.webhook_url.is_none());
    }

    #[test]
    fn bad_bind_addr_is_rejected() {
        let config = AppConfig {
            bind_addr: "not-an-addr".into(),
            ..AppConfig::default()
        };
        assert!(config.validate().is_err());
    }
}
