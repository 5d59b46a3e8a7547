//! 実行コンテキスト
//!
//! 設定からストレージ・キャッシュ・APIクライアント・読み込み処理を組み立てる。
//! 選択状態も同じストレージに `<namespace>:selection` として保存し、
//! コマンドの実行をまたいで保持する。

use crate::api::{HttpReportsApi, ReportsApi};
use crate::config::Config;
use crate::error::Result;
use crate::identity::IdentityChain;
use crate::loader::{LoadOutcome, LoadSnapshot, ReportLoader};
use crate::storage::{FileStorage, PROFILE_KEY, TOKEN_KEY};
use erasure_reports_common::{CacheStore, Clock, KeyValueStorage, SelectionSet, SystemClock};
use std::sync::Arc;
use tracing::warn;

/// CLIで使う読み込み処理の具体型
pub type CliLoader = ReportLoader<HttpReportsApi, Arc<FileStorage>>;

pub struct App {
    config: Config,
    storage: Arc<FileStorage>,
}

impl App {
    /// 設定されたパスのストレージを開く
    pub fn open(config: Config) -> Result<Self> {
        let path = config.storage_path()?;
        let storage = Arc::new(FileStorage::open(&path));
        Ok(Self::with_storage(config, storage))
    }

    pub fn with_storage(config: Config, storage: Arc<FileStorage>) -> Self {
        Self { config, storage }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn storage(&self) -> &Arc<FileStorage> {
        &self.storage
    }

    /// 環境変数のトークンを優先し、なければ保存済みのトークン
    pub fn token(&self) -> Option<String> {
        self.config
            .token
            .clone()
            .or_else(|| self.storage.get_item(TOKEN_KEY))
    }

    pub fn cache(&self) -> CacheStore<Arc<FileStorage>> {
        CacheStore::with_clock(
            self.storage.clone(),
            SystemClock,
            self.config.cache_namespace.clone(),
            self.config.cache_ttl(),
        )
    }

    pub fn loader(&self) -> Result<CliLoader> {
        let token = self.token();
        let api = HttpReportsApi::from_config(&self.config, token.clone())?;
        let identity = IdentityChain::standard(self.storage.clone(), token);
        Ok(ReportLoader::new(api, self.cache(), identity))
    }

    fn selection_key(&self) -> String {
        format!("{}:selection", self.config.cache_namespace)
    }

    /// 保存済みの選択状態（読めない場合は空）
    pub fn load_selection(&self) -> SelectionSet {
        let Some(text) = self.storage.get_item(&self.selection_key()) else {
            return SelectionSet::new();
        };
        serde_json::from_str(&text).unwrap_or_else(|e| {
            warn!(error = %e, "discarding unreadable selection");
            SelectionSet::new()
        })
    }

    pub fn save_selection(&self, selection: &SelectionSet) -> Result<()> {
        let key = self.selection_key();
        if selection.is_empty() {
            self.storage.remove_item(&key);
            return Ok(());
        }
        let text = serde_json::to_string(selection)?;
        self.storage.set_item(&key, &text)?;
        Ok(())
    }

    /// 利用者プロファイルとしてメールアドレスを保存する
    pub fn save_email(&self, email: &str) -> Result<()> {
        let profile = serde_json::json!({ "email": email });
        self.storage.set_item(PROFILE_KEY, &profile.to_string())?;
        Ok(())
    }

    pub fn save_token(&self, token: &str) -> Result<()> {
        self.storage.set_item(TOKEN_KEY, token)?;
        Ok(())
    }
}

/// キャッシュ由来の行を先に通知しながら読み込む
///
/// `on_cached` はネットワークの結果より前にキャッシュの行が公開されたときだけ呼ばれる。
pub async fn load_with_preview<A, S, C, F>(loader: &ReportLoader<A, S, C>, mut on_cached: F) -> Result<LoadOutcome>
where
    A: ReportsApi,
    S: KeyValueStorage,
    C: Clock,
    F: FnMut(&LoadSnapshot),
{
    let mut rx = loader.subscribe();
    let observe = async {
        while rx.changed().await.is_ok() {
            let snapshot = rx.borrow_and_update().clone();
            if !snapshot.is_loading() {
                break;
            }
            if snapshot.from_cache {
                on_cached(&snapshot);
            }
        }
    };

    let (outcome, ()) = tokio::join!(loader.load(), observe);
    outcome
}
