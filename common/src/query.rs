//! 絞り込み・並べ替え・ページング
//!
//! 正規化済み行の集合に対する純粋関数。条件はすべてAND結合で、
//! 評価順序は結果に影響しない。

use crate::error::{Error, Result};
use crate::normalizer::parse_report_datetime;
use crate::types::NormalizedReportRow;
use chrono::{NaiveDate, NaiveDateTime, NaiveTime};
use serde::Serialize;
use std::cmp::Ordering;
use std::collections::{BTreeSet, HashSet};

/// 1ページあたりの行数
pub const DEFAULT_PAGE_SIZE: usize = 5;

/// デバイス数の区分
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeviceBucket {
    /// 1〜50台
    UpTo50,
    /// 51〜100台
    UpTo100,
    /// 101〜200台
    UpTo200,
    /// 201台以上
    Over200,
}

impl DeviceBucket {
    pub fn contains(&self, devices: usize) -> bool {
        match self {
            DeviceBucket::UpTo50 => (1..=50).contains(&devices),
            DeviceBucket::UpTo100 => (51..=100).contains(&devices),
            DeviceBucket::UpTo200 => (101..=200).contains(&devices),
            DeviceBucket::Over200 => devices >= 201,
        }
    }
}

impl std::str::FromStr for DeviceBucket {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim() {
            "1-50" => Ok(DeviceBucket::UpTo50),
            "51-100" => Ok(DeviceBucket::UpTo100),
            "101-200" => Ok(DeviceBucket::UpTo200),
            "201+" => Ok(DeviceBucket::Over200),
            other => Err(Error::InvalidValue(format!(
                "Unknown device range: {}. Use 1-50, 51-100, 101-200, or 201+",
                other
            ))),
        }
    }
}

impl std::fmt::Display for DeviceBucket {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DeviceBucket::UpTo50 => write!(f, "1-50"),
            DeviceBucket::UpTo100 => write!(f, "51-100"),
            DeviceBucket::UpTo200 => write!(f, "101-200"),
            DeviceBucket::Over200 => write!(f, "201+"),
        }
    }
}

/// 並べ替えキー
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortKey {
    Id,
    Date,
    Devices,
    Status,
    Department,
}

impl std::str::FromStr for SortKey {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "id" => Ok(SortKey::Id),
            "date" => Ok(SortKey::Date),
            "devices" => Ok(SortKey::Devices),
            "status" => Ok(SortKey::Status),
            "department" | "dept" => Ok(SortKey::Department),
            _ => Err(Error::InvalidValue(format!(
                "Unknown sort key: {}. Use id, date, devices, status, or department",
                s
            ))),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SortDirection {
    #[default]
    Asc,
    Desc,
}

/// 絞り込み・並べ替え・ページング条件
#[derive(Debug, Clone)]
pub struct ReportQuery {
    /// IDまたは部署に対する部分一致（大文字小文字を区別しない）
    pub search: Option<String>,
    pub status: Option<String>,
    pub method: Option<String>,
    /// YYYY-MM-DD（不正な値は無視）
    pub date_from: Option<String>,
    /// YYYY-MM-DD、その日の終わりまで含む（不正な値は無視）
    pub date_to: Option<String>,
    pub device_bucket: Option<DeviceBucket>,
    /// (id, date, department) の重複を除去
    pub dedupe: bool,
    pub sort: Option<(SortKey, SortDirection)>,
    /// 1始まり
    pub page: usize,
    pub page_size: usize,
}

impl Default for ReportQuery {
    fn default() -> Self {
        Self {
            search: None,
            status: None,
            method: None,
            date_from: None,
            date_to: None,
            device_bucket: None,
            dedupe: false,
            sort: None,
            page: 1,
            page_size: DEFAULT_PAGE_SIZE,
        }
    }
}

/// 1ページ分の結果
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct QueryPage {
    pub rows: Vec<NormalizedReportRow>,
    pub page: usize,
    pub total_pages: usize,
    pub filtered_count: usize,
}

impl QueryPage {
    /// 表示中の行ID（「表示中を全選択」用）
    pub fn visible_ids(&self) -> Vec<String> {
        self.rows.iter().map(|r| r.id.clone()).collect()
    }
}

/// 日付入力の検証
///
/// パースして再フォーマットした結果が入力と一致する場合のみ有効。
/// 入力途中の値（`2024-3-`）や存在しない日付（`2024-13-40`）を弾く。
pub fn is_valid_date_format(value: &str) -> bool {
    NaiveDate::parse_from_str(value, "%Y-%m-%d")
        .map(|date| date.format("%Y-%m-%d").to_string() == value)
        .unwrap_or(false)
}

/// 総ページ数（最低1）
pub fn total_pages(count: usize, page_size: usize) -> usize {
    let page_size = page_size.max(1);
    count.div_ceil(page_size).max(1)
}

/// 検証済みの日付範囲
#[derive(Debug, Clone, Copy)]
struct DateBounds {
    from: Option<NaiveDateTime>,
    to: Option<NaiveDateTime>,
}

impl DateBounds {
    fn from_query(query: &ReportQuery) -> Self {
        let from = query
            .date_from
            .as_deref()
            .filter(|v| is_valid_date_format(v))
            .and_then(|v| NaiveDate::parse_from_str(v, "%Y-%m-%d").ok())
            .map(|d| d.and_time(NaiveTime::MIN));

        // 終了日は23:59:59.999まで含む
        let to = query
            .date_to
            .as_deref()
            .filter(|v| is_valid_date_format(v))
            .and_then(|v| NaiveDate::parse_from_str(v, "%Y-%m-%d").ok())
            .and_then(|d| d.and_hms_milli_opt(23, 59, 59, 999));

        Self { from, to }
    }

    fn matches(&self, row: &NormalizedReportRow) -> bool {
        if self.from.is_none() && self.to.is_none() {
            return true;
        }
        let Some(date) = parse_report_datetime(&row.date) else {
            return false;
        };
        self.from.map_or(true, |from| date >= from) && self.to.map_or(true, |to| date <= to)
    }
}

fn matches_filters(row: &NormalizedReportRow, query: &ReportQuery, bounds: &DateBounds, needle: Option<&str>) -> bool {
    if let Some(needle) = needle {
        let hit = row.id.to_lowercase().contains(needle)
            || row.department.to_lowercase().contains(needle);
        if !hit {
            return false;
        }
    }

    if let Some(status) = query.status.as_deref().filter(|s| !s.is_empty()) {
        if row.status != status {
            return false;
        }
    }

    if let Some(method) = query.method.as_deref().filter(|m| !m.is_empty()) {
        if row.method != method {
            return false;
        }
    }

    if let Some(bucket) = &query.device_bucket {
        if !bucket.contains(row.devices) {
            return false;
        }
    }

    bounds.matches(row)
}

fn compare_rows(a: &NormalizedReportRow, b: &NormalizedReportRow, key: SortKey) -> Ordering {
    match key {
        SortKey::Id => a.id.to_lowercase().cmp(&b.id.to_lowercase()),
        SortKey::Status => a.status.to_lowercase().cmp(&b.status.to_lowercase()),
        SortKey::Department => a.department.to_lowercase().cmp(&b.department.to_lowercase()),
        SortKey::Devices => a.devices.cmp(&b.devices),
        SortKey::Date => {
            // パースできない日付は末尾
            match (parse_report_datetime(&a.date), parse_report_datetime(&b.date)) {
                (Some(x), Some(y)) => x.cmp(&y),
                (Some(_), None) => Ordering::Less,
                (None, Some(_)) => Ordering::Greater,
                (None, None) => Ordering::Equal,
            }
        }
    }
}

/// 絞り込み・重複除去・並べ替えを適用する（ページングなし）
pub fn filter_rows<'a>(rows: &'a [NormalizedReportRow], query: &ReportQuery) -> Vec<&'a NormalizedReportRow> {
    let bounds = DateBounds::from_query(query);
    let needle = query
        .search
        .as_deref()
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_lowercase);

    let mut filtered: Vec<&NormalizedReportRow> = rows
        .iter()
        .filter(|row| matches_filters(row, query, &bounds, needle.as_deref()))
        .collect();

    if query.dedupe {
        let mut seen: HashSet<(&str, &str, &str)> = HashSet::new();
        filtered.retain(|row| seen.insert((row.id.as_str(), row.date.as_str(), row.department.as_str())));
    }

    if let Some((key, direction)) = query.sort {
        // sort_byは安定ソートなので同値は入力順のまま
        filtered.sort_by(|a, b| {
            let ordering = compare_rows(a, b, key);
            match direction {
                SortDirection::Asc => ordering,
                SortDirection::Desc => ordering.reverse(),
            }
        });
    }

    filtered
}

/// 条件を適用して1ページ分を返す
///
/// 総ページ数を超えるページを要求した場合は空のページを返す。
/// ページ番号の補正（条件変更時に1ページ目へ戻す等）は呼び出し側の責務。
pub fn apply_query(rows: &[NormalizedReportRow], query: &ReportQuery) -> QueryPage {
    let filtered = filter_rows(rows, query);
    let page_size = query.page_size.max(1);
    let page = query.page.max(1);
    let filtered_count = filtered.len();

    let start = (page - 1).saturating_mul(page_size);
    let page_rows = filtered
        .into_iter()
        .skip(start)
        .take(page_size)
        .cloned()
        .collect();

    QueryPage {
        rows: page_rows,
        page,
        total_pages: total_pages(filtered_count, page_size),
        filtered_count,
    }
}

/// 絞り込み候補の対象フィールド
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RowField {
    Status,
    Method,
    Department,
}

/// 行集合から重複のない値一覧を取得する（フィルタの選択肢用）
pub fn distinct_values(rows: &[NormalizedReportRow], field: RowField) -> Vec<String> {
    rows.iter()
        .map(|row| match field {
            RowField::Status => row.status.as_str(),
            RowField::Method => row.method.as_str(),
            RowField::Department => row.department.as_str(),
        })
        .collect::<BTreeSet<_>>()
        .into_iter()
        .map(str::to_string)
        .collect()
}
