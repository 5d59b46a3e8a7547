use crate::error::{ReportsError, Result};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

const APP_DIR: &str = "erasure-reports";

pub const ENV_API_URL: &str = "ERASURE_REPORTS_API_URL";
pub const ENV_TOKEN: &str = "ERASURE_REPORTS_TOKEN";

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// APIのベースURL
    pub api_base_url: String,
    /// HTTPタイムアウト（未設定ならタイムアウトなし）
    pub timeout_seconds: Option<u64>,
    /// ストレージキーの名前空間
    pub cache_namespace: String,
    pub cache_ttl_seconds: u64,
    pub page_size: usize,
    /// 一括エクスポートの同時取得数
    pub bulk_concurrency: usize,
    /// ローカルストレージのパス（未設定ならデータディレクトリ）
    pub storage_path: Option<PathBuf>,
    /// 認証トークン（環境変数が優先）
    #[serde(skip)]
    pub token: Option<String>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            api_base_url: "http://localhost:8080/api".into(),
            timeout_seconds: None,
            cache_namespace: APP_DIR.into(),
            cache_ttl_seconds: 300,
            page_size: 5,
            bulk_concurrency: 4,
            storage_path: None,
            token: None,
        }
    }
}

impl Config {
    /// 設定ファイルを読み込み、環境変数で上書きする
    pub fn load() -> Result<Self> {
        let config_path = Self::config_path()?;

        let mut config = if config_path.exists() {
            let content = std::fs::read_to_string(&config_path)?;
            serde_json::from_str(&content)?
        } else {
            Self::default()
        };

        config.apply_env();
        Ok(config)
    }

    pub fn save(&self) -> Result<()> {
        let config_path = Self::config_path()?;

        if let Some(parent) = config_path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let content = serde_json::to_string_pretty(self)?;
        std::fs::write(&config_path, content)?;
        Ok(())
    }

    pub fn config_path() -> Result<PathBuf> {
        let base = match dirs::config_dir() {
            Some(dir) => dir,
            None => dirs::home_dir()
                .map(|home| home.join(".config"))
                .ok_or_else(|| ReportsError::Config("ホームディレクトリが見つかりません".into()))?,
        };
        Ok(base.join(APP_DIR).join("config.json"))
    }

    /// ローカルストレージファイルのパス
    pub fn storage_path(&self) -> Result<PathBuf> {
        if let Some(path) = &self.storage_path {
            return Ok(path.clone());
        }
        let base = dirs::data_dir()
            .or_else(|| dirs::home_dir().map(|home| home.join(".local").join("share")))
            .ok_or_else(|| ReportsError::Config("データディレクトリが見つかりません".into()))?;
        Ok(base.join(APP_DIR).join("storage.json"))
    }

    pub fn cache_ttl(&self) -> Duration {
        Duration::from_secs(self.cache_ttl_seconds)
    }

    pub fn timeout(&self) -> Option<Duration> {
        self.timeout_seconds.map(Duration::from_secs)
    }

    pub fn set_api_base_url(&mut self, url: String) -> Result<()> {
        url::Url::parse(&url)?;
        self.api_base_url = url;
        self.save()
    }

    fn apply_env(&mut self) {
        if let Ok(url) = std::env::var(ENV_API_URL) {
            if !url.trim().is_empty() {
                self.api_base_url = url;
            }
        }
        self.token = std::env::var(ENV_TOKEN).ok().filter(|t| !t.trim().is_empty());
    }
}
