//! 複数選択の管理
//!
//! 選択はページングや絞り込みとは独立しており、表示から外れた行のIDも
//! 選択されたまま残る。明示的な操作か一括エクスポート成功時にのみクリアされる。

use crate::types::NormalizedReportRow;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// 選択中の行IDの集合
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SelectionSet {
    ids: BTreeSet<String>,
}

impl SelectionSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// 1件の選択を反転する。反転後に選択状態なら `true`
    pub fn toggle_one(&mut self, id: &str) -> bool {
        if self.ids.remove(id) {
            false
        } else {
            self.ids.insert(id.to_string());
            true
        }
    }

    /// 表示中の行をまとめて反転する
    ///
    /// 表示中がすべて選択済みなら全解除、そうでなければ全選択。
    /// 戻り値は操作後に表示中が選択状態なら `true`（表示中が空なら `false`）。
    pub fn toggle_all_visible<S: AsRef<str>>(&mut self, visible_ids: &[S]) -> bool {
        if visible_ids.is_empty() {
            return false;
        }

        let all_selected = visible_ids.iter().all(|id| self.ids.contains(id.as_ref()));
        if all_selected {
            for id in visible_ids {
                self.ids.remove(id.as_ref());
            }
            false
        } else {
            self.ids.extend(visible_ids.iter().map(|id| id.as_ref().to_string()));
            true
        }
    }

    pub fn is_selected(&self, id: &str) -> bool {
        self.ids.contains(id)
    }

    pub fn clear(&mut self) {
        self.ids.clear();
    }

    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

    pub fn ids(&self) -> impl Iterator<Item = &str> {
        self.ids.iter().map(String::as_str)
    }

    /// 選択中のIDに一致する行を行順で返す
    pub fn resolve<'a>(&self, rows: &'a [NormalizedReportRow]) -> Vec<&'a NormalizedReportRow> {
        rows.iter().filter(|row| self.ids.contains(&row.id)).collect()
    }

    /// どの行にも一致しない選択ID
    pub fn dangling(&self, rows: &[NormalizedReportRow]) -> Vec<&str> {
        let present: BTreeSet<&str> = rows.iter().map(|row| row.id.as_str()).collect();
        self.ids()
            .filter(|id| !present.contains(id))
            .collect()
    }
}

impl<S: Into<String>> FromIterator<S> for SelectionSet {
    fn from_iter<I: IntoIterator<Item = S>>(iter: I) -> Self {
        Self {
            ids: iter.into_iter().map(Into::into).collect(),
        }
    }
}
