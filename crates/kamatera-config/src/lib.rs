//! プロバイダー設定
//!
//! YAMLファイルを読み込み、環境変数で上書きする:
//!
//! 1. `$KAMATERA_CONFIG_PATH`、または `<config dir>/kamatera/config.yaml` (任意)
//! 2. `KAMATERA_API_CLIENT_ID`, `KAMATERA_API_SECRET`, `KAMATERA_API_URL`
//!
//! 結果は [`ProviderSettings`] としてAPIクライアントに渡す。
//! 下流では環境変数を読まない。

pub mod error;

pub use error::*;

use kamatera_cloud::{PollPolicy, RetryPolicy};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, warn};

pub const ENV_CONFIG_PATH: &str = "KAMATERA_CONFIG_PATH";
pub const ENV_API_CLIENT_ID: &str = "KAMATERA_API_CLIENT_ID";
pub const ENV_API_SECRET: &str = "KAMATERA_API_SECRET";
pub const ENV_API_URL: &str = "KAMATERA_API_URL";

pub const DEFAULT_API_URL: &str = "https://cloudcli.cloudwm.com";

/// コマンドキューのポーリング間隔の下限
pub const MIN_POLL_INTERVAL_SECS: u64 = 1;

/// 設定ファイルのパスを取得
pub fn config_path() -> Result<PathBuf> {
    if let Some(path) = env_value(ENV_CONFIG_PATH) {
        return Ok(PathBuf::from(path));
    }
    Ok(dirs::config_dir()
        .ok_or(ConfigError::ConfigDirNotFound)?
        .join("kamatera")
        .join("config.yaml"))
}

fn env_value(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|v| !v.is_empty())
}

#[derive(Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProviderSettings {
    pub api_url: String,
    pub api_client_id: String,
    pub api_secret: String,
    pub request_timeout_secs: u64,
    pub retry: RetrySettings,
    pub poll: PollSettings,
}

impl Default for ProviderSettings {
    fn default() -> Self {
        Self {
            api_url: DEFAULT_API_URL.to_string(),
            api_client_id: String::new(),
            api_secret: String::new(),
            request_timeout_secs: 60,
            retry: RetrySettings::default(),
            poll: PollSettings::default(),
        }
    }
}

impl fmt::Debug for ProviderSettings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let secret = if self.api_secret.is_empty() { "" } else { "[REDACTED]" };
        f.debug_struct("ProviderSettings")
            .field("api_url", &self.api_url)
            .field("api_client_id", &self.api_client_id)
            .field("api_secret", &secret)
            .field("request_timeout_secs", &self.request_timeout_secs)
            .field("retry", &self.retry)
            .field("poll", &self.poll)
            .finish()
    }
}

impl ProviderSettings {
    /// ファイル (存在すれば) → 環境変数で上書き → 認証情報チェック
    pub fn load() -> Result<Self> {
        let path = config_path()?;
        let mut settings = if path.exists() {
            debug!(path = %path.display(), "loading provider settings");
            Self::from_file(&path)?
        } else {
            debug!(path = %path.display(), "no settings file, using defaults");
            Self::default()
        };
        settings.apply_env();
        settings.ensure_credentials()?;
        Ok(settings)
    }

    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_yaml_str(&content)
    }

    pub fn from_yaml_str(content: &str) -> Result<Self> {
        if content.trim().is_empty() {
            return Ok(Self::default());
        }
        Ok(serde_yaml::from_str(content)?)
    }

    /// 環境変数がファイルの値より優先される (空の変数は無視)
    pub fn apply_env(&mut self) {
        if let Some(id) = env_value(ENV_API_CLIENT_ID) {
            self.api_client_id = id;
        }
        if let Some(secret) = env_value(ENV_API_SECRET) {
            self.api_secret = secret;
        }
        if let Some(url) = env_value(ENV_API_URL) {
            self.api_url = url;
        }
    }

    pub fn ensure_credentials(&self) -> Result<()> {
        if self.api_client_id.is_empty() {
            return Err(ConfigError::MissingCredential(ENV_API_CLIENT_ID));
        }
        if self.api_secret.is_empty() {
            return Err(ConfigError::MissingCredential(ENV_API_SECRET));
        }
        Ok(())
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        self.retry.to_policy()
    }

    pub fn poll_policy(&self) -> PollPolicy {
        self.poll.to_policy()
    }
}

/// 一時的なAPI障害のバックオフ設定
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetrySettings {
    pub max_attempts: u32,
    pub initial_delay_ms: u64,
    pub max_delay_ms: u64,
    pub multiplier: f64,
}

impl Default for RetrySettings {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_delay_ms: 1_000,
            max_delay_ms: 30_000,
            multiplier: 2.0,
        }
    }
}

impl RetrySettings {
    pub fn to_policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_attempts: self.max_attempts.max(1),
            initial_delay: Duration::from_millis(self.initial_delay_ms),
            max_delay: Duration::from_millis(self.max_delay_ms),
            multiplier: self.multiplier.max(1.0),
        }
    }
}

/// コマンド完了・プロビジョニング待ちの設定
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PollSettings {
    pub interval_secs: u64,
    pub max_interval_secs: u64,
    pub multiplier: f64,
    pub timeout_secs: u64,
}

impl Default for PollSettings {
    fn default() -> Self {
        Self {
            interval_secs: 2,
            max_interval_secs: 10,
            multiplier: 1.5,
            timeout_secs: 2_400,
        }
    }
}

impl PollSettings {
    /// [`MIN_POLL_INTERVAL_SECS`] 未満の間隔は下限まで引き上げる
    pub fn to_policy(&self) -> PollPolicy {
        let interval_secs = self.interval_secs.max(MIN_POLL_INTERVAL_SECS);
        if interval_secs != self.interval_secs {
            warn!(
                interval_secs = self.interval_secs,
                min = MIN_POLL_INTERVAL_SECS,
                "poll interval too short, using minimum"
            );
        }
        PollPolicy {
            interval: Duration::from_secs(interval_secs),
            max_interval: Duration::from_secs(self.max_interval_secs.max(interval_secs)),
            multiplier: self.multiplier.max(1.0),
            timeout: Duration::from_secs(self.timeout_secs),
        }
    }
}
