//! ローカルストレージモジュール
//!
//! ブラウザのlocalStorage相当のキーバリューストアを1つのJSONファイルで提供する。
//! キャッシュ・選択状態・プロフィール・認証情報がここに保存される。

use erasure_reports_common::{Error, KeyValueStorage, Result};
use std::collections::BTreeMap;
use std::fs::File;
use std::io::{BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use tracing::warn;

/// 保存済みプロフィールのキー
pub const PROFILE_KEY: &str = "user";
/// 旧形式の認証情報のキー
pub const LEGACY_AUTH_KEY: &str = "authUser";
/// 認証トークンのキー
pub const TOKEN_KEY: &str = "token";

/// JSONファイルに書き出すストレージ
#[derive(Debug)]
pub struct FileStorage {
    path: PathBuf,
    items: Mutex<BTreeMap<String, String>>,
}

impl FileStorage {
    /// ストレージファイルを開く（存在しない・壊れている場合は空）
    pub fn open(path: &Path) -> Self {
        Self {
            path: path.to_path_buf(),
            items: Mutex::new(Self::read_items(path)),
        }
    }

    fn read_items(path: &Path) -> BTreeMap<String, String> {
        let file = match File::open(path) {
            Ok(f) => f,
            Err(_) => return BTreeMap::new(),
        };

        match serde_json::from_reader(BufReader::new(file)) {
            Ok(items) => items,
            Err(e) => {
                warn!(path = %path.display(), error = %e, "storage file is unreadable, starting empty");
                BTreeMap::new()
            }
        }
    }

    fn write_items(&self, items: &BTreeMap<String, String>) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let mut writer = BufWriter::new(File::create(&self.path)?);
        serde_json::to_writer_pretty(&mut writer, items)?;
        writer.flush()?;
        Ok(())
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn keys(&self) -> Vec<String> {
        self.items
            .lock()
            .map(|items| items.keys().cloned().collect())
            .unwrap_or_default()
    }
}

impl KeyValueStorage for FileStorage {
    fn get_item(&self, key: &str) -> Option<String> {
        self.items.lock().ok()?.get(key).cloned()
    }

    fn set_item(&self, key: &str, value: &str) -> Result<()> {
        let mut items = self
            .items
            .lock()
            .map_err(|_| Error::Storage("storage lock poisoned".into()))?;
        let previous = items.insert(key.to_string(), value.to_string());

        if let Err(e) = self.write_items(&items) {
            // ファイルに書けなかった値はメモリにも残さない
            match previous {
                Some(old) => items.insert(key.to_string(), old),
                None => items.remove(key),
            };
            return Err(e);
        }
        Ok(())
    }

    fn remove_item(&self, key: &str) {
        let Ok(mut items) = self.items.lock() else {
            return;
        };
        if items.remove(key).is_some() {
            if let Err(e) = self.write_items(&items) {
                warn!(key, error = %e, "failed to persist storage removal");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_missing_file_is_empty() {
        let dir = tempdir().expect("Failed to create temp dir");
        let storage = FileStorage::open(&dir.path().join("storage.json"));
        assert!(storage.get_item("anything").is_none());
        assert!(storage.keys().is_empty());
    }

    #[test]
    fn test_set_persists_across_open() {
        let dir = tempdir().expect("Failed to create temp dir");
        let path = dir.path().join("nested").join("storage.json");

        let storage = FileStorage::open(&path);
        storage.set_item(PROFILE_KEY, r#"{"email":"a@example.com"}"#).unwrap();

        let reopened = FileStorage::open(&path);
        assert_eq!(
            reopened.get_item(PROFILE_KEY).as_deref(),
            Some(r#"{"email":"a@example.com"}"#)
        );
    }

    #[test]
    fn test_remove_persists() {
        let dir = tempdir().expect("Failed to create temp dir");
        let path = dir.path().join("storage.json");

        let storage = FileStorage::open(&path);
        storage.set_item("k", "v").unwrap();
        storage.remove_item("k");

        assert!(FileStorage::open(&path).get_item("k").is_none());
    }

    #[test]
    fn test_corrupt_file_starts_empty() {
        let dir = tempdir().expect("Failed to create temp dir");
        let path = dir.path().join("storage.json");
        std::fs::write(&path, "not json").unwrap();

        let storage = FileStorage::open(&path);
        assert!(storage.keys().is_empty());
        storage.set_item("k", "v").unwrap();
        assert_eq!(FileStorage::open(&path).get_item("k").as_deref(), Some("v"));
    }

    #[test]
    fn test_write_failure_is_reported() {
        let dir = tempdir().expect("Failed to create temp dir");
        // ディレクトリをファイルとして開くと書き込みに失敗する
        let storage = FileStorage::open(dir.path());
        assert!(storage.set_item("k", "v").is_err());
        assert!(storage.get_item("k").is_none());
    }
}
