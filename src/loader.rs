//! レポート読み込みモジュール
//!
//! 状態遷移: `Idle → Loading → (Success | Empty | Error)`
//!
//! ## 処理フロー
//! 1. キャッシュにあれば即座に公開（ネットワーク完了前に表示できるように）
//! 2. 操作者のメールアドレスを解決（失敗時は通信せずにエラー）
//! 3. 一覧APIを呼び出し、全レコードを正規化
//! 4. 結果を公開してキャッシュに書き込む
//!
//! どの終了経路でも `Loading` のまま残らない。
//! ネットワークの結果は常にキャッシュ由来の状態を上書きする。

use crate::api::ReportsApi;
use crate::error::{ReportsError, Result};
use crate::identity::IdentityChain;
use chrono::{DateTime, Local, NaiveDate};
use erasure_reports_common::{normalize_records, CacheStore, Clock, KeyValueStorage, NormalizedReportRow, SystemClock};
use std::sync::Arc;
use tokio::sync::watch;
use tracing::{debug, info, warn};

/// 一覧のキャッシュキー
pub const REPORTS_CACHE_KEY: &str = "reports";

/// 一覧が空だったときの案内
pub const EMPTY_NOTICE: &str = "表示できるレポートがありません";

/// 読み込みエラーの種類
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoadErrorKind {
    Identity,
    Transport,
    Other,
}

impl From<&ReportsError> for LoadErrorKind {
    fn from(error: &ReportsError) -> Self {
        match error {
            ReportsError::Identity => LoadErrorKind::Identity,
            e if e.is_transport() => LoadErrorKind::Transport,
            _ => LoadErrorKind::Other,
        }
    }
}

/// 読み込み状態
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LoadStatus {
    Idle,
    Loading,
    Success,
    /// 一覧は取得できたが0件（エラーではない）
    Empty,
    Error { kind: LoadErrorKind, message: String },
}

/// 公開される状態のスナップショット
#[derive(Debug, Clone)]
pub struct LoadSnapshot {
    pub status: LoadStatus,
    pub rows: Arc<Vec<NormalizedReportRow>>,
    /// 行がキャッシュ由来か
    pub from_cache: bool,
    /// 案内メッセージ（エラーではない）
    pub notice: Option<String>,
}

impl Default for LoadSnapshot {
    fn default() -> Self {
        Self {
            status: LoadStatus::Idle,
            rows: Arc::new(Vec::new()),
            from_cache: false,
            notice: None,
        }
    }
}

impl LoadSnapshot {
    pub fn is_loading(&self) -> bool {
        self.status == LoadStatus::Loading
    }
}

/// 読み込み結果
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LoadOutcome {
    Loaded { count: usize },
    Empty { notice: String },
}

/// レポート一覧の読み込み
pub struct ReportLoader<A, S, C = SystemClock> {
    api: A,
    cache: CacheStore<S, C>,
    identity: IdentityChain,
    state: watch::Sender<LoadSnapshot>,
}

impl<A, S, C> ReportLoader<A, S, C>
where
    A: ReportsApi,
    S: KeyValueStorage,
    C: Clock,
{
    pub fn new(api: A, cache: CacheStore<S, C>, identity: IdentityChain) -> Self {
        let (state, _) = watch::channel(LoadSnapshot::default());
        Self {
            api,
            cache,
            identity,
            state,
        }
    }

    /// 状態の変化を購読する
    pub fn subscribe(&self) -> watch::Receiver<LoadSnapshot> {
        self.state.subscribe()
    }

    pub fn snapshot(&self) -> LoadSnapshot {
        self.state.borrow().clone()
    }

    pub fn rows(&self) -> Arc<Vec<NormalizedReportRow>> {
        self.state.borrow().rows.clone()
    }

    pub fn cache(&self) -> &CacheStore<S, C> {
        &self.cache
    }

    pub fn api(&self) -> &A {
        &self.api
    }

    /// キャッシュの時計から今日の日付を求める
    fn today(&self) -> NaiveDate {
        DateTime::from_timestamp_millis(self.cache.clock().now_millis())
            .map(|dt| dt.with_timezone(&Local).date_naive())
            .unwrap_or_else(|| Local::now().date_naive())
    }

    fn publish(&self, status: LoadStatus, rows: Vec<NormalizedReportRow>, from_cache: bool, notice: Option<String>) {
        self.state.send_replace(LoadSnapshot {
            status,
            rows: Arc::new(rows),
            from_cache,
            notice,
        });
    }

    /// レポート一覧を読み込む
    ///
    /// キャッシュがあれば `Loading` のままキャッシュの行を先に公開し、
    /// その後ネットワークの結果で上書きする。
    pub async fn load(&self) -> Result<LoadOutcome> {
        match self.cache.get::<Vec<NormalizedReportRow>>(REPORTS_CACHE_KEY) {
            Some(cached) => {
                debug!(rows = cached.len(), "publishing cached reports");
                self.publish(LoadStatus::Loading, cached, true, None);
            }
            None => {
                self.state.send_modify(|snapshot| snapshot.status = LoadStatus::Loading);
            }
        }

        match self.fetch().await {
            Ok(rows) if rows.is_empty() => {
                info!("report listing is empty");
                self.publish(LoadStatus::Empty, Vec::new(), false, Some(EMPTY_NOTICE.to_string()));
                Ok(LoadOutcome::Empty {
                    notice: EMPTY_NOTICE.to_string(),
                })
            }
            Ok(rows) => {
                let count = rows.len();
                self.cache.set(REPORTS_CACHE_KEY, &rows);
                self.publish(LoadStatus::Success, rows, false, None);
                Ok(LoadOutcome::Loaded { count })
            }
            Err(e) => {
                warn!(error = %e, "report load failed");
                let status = LoadStatus::Error {
                    kind: LoadErrorKind::from(&e),
                    message: e.to_string(),
                };
                self.publish(status, Vec::new(), false, None);
                Err(e)
            }
        }
    }

    async fn fetch(&self) -> Result<Vec<NormalizedReportRow>> {
        let identity = self.identity.resolve().ok_or(ReportsError::Identity)?;

        let records = self.api.list_reports(&identity.email).await?.into_records();
        info!(records = records.len(), source = %identity.source, "report listing fetched");

        Ok(normalize_records(&records, self.today()))
    }
}
