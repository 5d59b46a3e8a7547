//! TTL付きキャッシュストア
//!
//! 名前空間付きのキーバリューストレージ上に、タイムスタンプ付きのエントリを保存する。
//! 期限切れエントリは読み込み時に削除し、書き込み時には削除しない。
//! 書き込み失敗（容量超過など）は握りつぶし、呼び出し側を止めない。
//!
//! ストレージと時計はどちらもトレイトで注入するため、テストではメモリ実装と
//! 手動時計に差し替えられる。

use crate::error::{Error, Result};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tracing::{debug, warn};

/// キャッシュの既定TTL（5分）
pub const DEFAULT_CACHE_TTL: Duration = Duration::from_secs(5 * 60);

/// 同期的なキーバリューストレージ（ブラウザのlocalStorage相当）
pub trait KeyValueStorage {
    fn get_item(&self, key: &str) -> Option<String>;

    /// 容量制限などで失敗しうる
    fn set_item(&self, key: &str, value: &str) -> Result<()>;

    fn remove_item(&self, key: &str);
}

impl<T: KeyValueStorage + ?Sized> KeyValueStorage for Arc<T> {
    fn get_item(&self, key: &str) -> Option<String> {
        (**self).get_item(key)
    }

    fn set_item(&self, key: &str, value: &str) -> Result<()> {
        (**self).set_item(key, value)
    }

    fn remove_item(&self, key: &str) {
        (**self).remove_item(key)
    }
}

/// メモリ上のストレージ
///
/// `with_quota` で合計バイト数の上限を設定すると、超過する書き込みが失敗する。
#[derive(Debug, Default)]
pub struct MemoryStorage {
    items: Mutex<HashMap<String, String>>,
    quota_bytes: Option<usize>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_quota(quota_bytes: usize) -> Self {
        Self {
            items: Mutex::new(HashMap::new()),
            quota_bytes: Some(quota_bytes),
        }
    }

    pub fn len(&self) -> usize {
        self.items.lock().map(|items| items.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl KeyValueStorage for MemoryStorage {
    fn get_item(&self, key: &str) -> Option<String> {
        self.items.lock().ok()?.get(key).cloned()
    }

    fn set_item(&self, key: &str, value: &str) -> Result<()> {
        let mut items = self
            .items
            .lock()
            .map_err(|_| Error::Storage("storage lock poisoned".into()))?;

        if let Some(quota) = self.quota_bytes {
            let used: usize = items
                .iter()
                .filter(|(k, _)| k.as_str() != key)
                .map(|(k, v)| k.len() + v.len())
                .sum();
            if used + key.len() + value.len() > quota {
                return Err(Error::Storage(format!("quota of {} bytes exceeded", quota)));
            }
        }

        items.insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn remove_item(&self, key: &str) {
        if let Ok(mut items) = self.items.lock() {
            items.remove(key);
        }
    }
}

/// 現在時刻（エポックミリ秒）の取得元
pub trait Clock {
    fn now_millis(&self) -> i64;
}

impl<T: Clock + ?Sized> Clock for Arc<T> {
    fn now_millis(&self) -> i64 {
        (**self).now_millis()
    }
}

/// システム時計
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now_millis(&self) -> i64 {
        chrono::Utc::now().timestamp_millis()
    }
}

/// 手動で進める時計（テスト用）
#[derive(Debug, Default)]
pub struct ManualClock {
    now: AtomicI64,
}

impl ManualClock {
    pub fn new(now_millis: i64) -> Self {
        Self {
            now: AtomicI64::new(now_millis),
        }
    }

    pub fn set(&self, now_millis: i64) {
        self.now.store(now_millis, Ordering::SeqCst);
    }

    pub fn advance(&self, by: Duration) {
        self.now.fetch_add(by.as_millis() as i64, Ordering::SeqCst);
    }
}

impl Clock for ManualClock {
    fn now_millis(&self) -> i64 {
        self.now.load(Ordering::SeqCst)
    }
}

/// キャッシュエントリ
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheEntry<T> {
    pub data: T,
    /// 書き込み時刻（エポックミリ秒）
    pub timestamp: i64,
}

/// エントリの状態（削除せずに参照する）
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheEntryInfo {
    pub age: Duration,
    pub expired: bool,
    pub size_bytes: usize,
}

/// TTL付きキャッシュ
#[derive(Debug)]
pub struct CacheStore<S, C = SystemClock> {
    storage: S,
    clock: C,
    namespace: String,
    ttl: Duration,
}

impl<S: KeyValueStorage> CacheStore<S, SystemClock> {
    /// システム時計と既定TTLでキャッシュを作成
    pub fn new(storage: S, namespace: impl Into<String>) -> Self {
        Self::with_clock(storage, SystemClock, namespace, DEFAULT_CACHE_TTL)
    }
}

impl<S: KeyValueStorage, C: Clock> CacheStore<S, C> {
    pub fn with_clock(storage: S, clock: C, namespace: impl Into<String>, ttl: Duration) -> Self {
        Self {
            storage,
            clock,
            namespace: namespace.into(),
            ttl,
        }
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    pub fn storage(&self) -> &S {
        &self.storage
    }

    pub fn clock(&self) -> &C {
        &self.clock
    }

    fn storage_key(&self, key: &str) -> String {
        format!("{}:cache:{}", self.namespace, key)
    }

    fn is_fresh(&self, timestamp: i64) -> bool {
        let age = self.clock.now_millis().saturating_sub(timestamp);
        i128::from(age) < self.ttl.as_millis() as i128
    }

    /// 有効なエントリを取得する
    ///
    /// 期限切れ・破損したエントリは削除して `None` を返す。
    pub fn get<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        let storage_key = self.storage_key(key);
        let text = self.storage.get_item(&storage_key)?;

        let entry: CacheEntry<T> = match serde_json::from_str(&text) {
            Ok(entry) => entry,
            Err(e) => {
                debug!(key = %storage_key, error = %e, "evicting unreadable cache entry");
                self.storage.remove_item(&storage_key);
                return None;
            }
        };

        if !self.is_fresh(entry.timestamp) {
            debug!(key = %storage_key, "evicting expired cache entry");
            self.storage.remove_item(&storage_key);
            return None;
        }

        Some(entry.data)
    }

    /// エントリを上書き保存する（失敗しても呼び出し側には返さない）
    pub fn set<T: Serialize + ?Sized>(&self, key: &str, data: &T) {
        let storage_key = self.storage_key(key);
        let entry = CacheEntry {
            data,
            timestamp: self.clock.now_millis(),
        };

        let result = serde_json::to_string(&entry)
            .map_err(Error::from)
            .and_then(|text| self.storage.set_item(&storage_key, &text));

        if let Err(e) = result {
            warn!(key = %storage_key, error = %e, "cache write failed, continuing without cache");
        }
    }

    pub fn remove(&self, key: &str) {
        self.storage.remove_item(&self.storage_key(key));
    }

    /// エントリの経過時間などを取得する（期限切れでも削除しない）
    pub fn info(&self, key: &str) -> Option<CacheEntryInfo> {
        let text = self.storage.get_item(&self.storage_key(key))?;
        let entry: CacheEntry<serde_json::Value> = serde_json::from_str(&text).ok()?;
        let age_ms = self.clock.now_millis().saturating_sub(entry.timestamp).max(0);

        Some(CacheEntryInfo {
            age: Duration::from_millis(age_ms as u64),
            expired: !self.is_fresh(entry.timestamp),
            size_bytes: text.len(),
        })
    }
}
