//! レポート正規化モジュール
//!
//! 一覧APIの生レコード1件を、表示用の正規化済み行1件に変換する。
//!
//! ## 処理フロー
//! 1. 埋め込みJSON（`report_details_json`）のパース（失敗時は空の詳細で続行）
//! 2. ID・日付・デバイス数などをフォールバック順に解決
//! 3. 既定値で全フィールドを埋める
//!
//! パースに失敗しても行は破棄せず、ログに記録して既定値で埋める。

use crate::types::{non_empty, NormalizedReportRow, RawReportRecord, ReportDetails};
use chrono::{DateTime, Local, NaiveDate, NaiveDateTime};
use serde_json::Value;
use tracing::warn;

pub const DEFAULT_ID: &str = "N/A";
pub const DEFAULT_STATUS: &str = "completed";
pub const DEFAULT_DEPARTMENT: &str = "IT";
pub const DEFAULT_METHOD: &str = "N/A";

/// 埋め込みJSONのパース結果
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DetailsParse {
    /// 正常にパースできた
    Parsed,
    /// 埋め込みJSONが存在しない（空文字列含む）
    Missing,
    /// パース失敗（既定値で代替）
    Malformed(String),
}

/// 詳細情報とパース結果のタグ
#[derive(Debug, Clone)]
pub struct ParsedDetails {
    pub details: ReportDetails,
    pub outcome: DetailsParse,
}

/// 埋め込みJSONをパースする（失敗しない）
pub fn parse_details(raw: &RawReportRecord) -> ParsedDetails {
    let Some(text) = non_empty(raw.report_details_json.as_deref()) else {
        return ParsedDetails {
            details: ReportDetails::default(),
            outcome: DetailsParse::Missing,
        };
    };

    match serde_json::from_str::<ReportDetails>(text) {
        Ok(details) => ParsedDetails {
            details,
            outcome: DetailsParse::Parsed,
        },
        Err(e) => ParsedDetails {
            details: ReportDetails::default(),
            outcome: DetailsParse::Malformed(e.to_string()),
        },
    }
}

/// 生レコードを正規化する（今日の日付はローカル時計から取得）
///
/// 日時が欠落したレコードは実行日の日付になるため、結果は実行日に依存する。
pub fn normalize_record(raw: &RawReportRecord) -> NormalizedReportRow {
    normalize_record_on(raw, Local::now().date_naive())
}

/// 生レコードを正規化する
///
/// # Arguments
/// * `raw` - 一覧APIの生レコード
/// * `today` - 日時が欠落・解析不能な場合に使う日付
pub fn normalize_record_on(raw: &RawReportRecord, today: NaiveDate) -> NormalizedReportRow {
    let ParsedDetails { details, outcome } = parse_details(raw);

    if let DetailsParse::Malformed(reason) = &outcome {
        warn!(
            record_id = raw.id.as_deref().unwrap_or(DEFAULT_ID),
            %reason,
            "report_details_json could not be parsed, using defaults"
        );
    }

    let id = non_empty(details.report_id.as_deref())
        .or_else(|| non_empty(raw.id.as_deref()))
        .unwrap_or(DEFAULT_ID)
        .to_string();

    let date = non_empty(details.datetime.as_deref())
        .and_then(parse_report_datetime)
        .map(|dt| dt.date())
        .unwrap_or(today)
        .format("%Y-%m-%d")
        .to_string();

    let devices = match &details.erasure_log {
        Some(Value::Array(entries)) => entries.len(),
        _ => 1,
    };

    let status = non_empty(details.status.as_deref())
        .map(str::to_lowercase)
        .unwrap_or_else(|| DEFAULT_STATUS.to_string());

    let department = non_empty(details.department.as_deref())
        .unwrap_or(DEFAULT_DEPARTMENT)
        .to_string();

    let method = non_empty(details.erasure_method.as_deref())
        .unwrap_or(DEFAULT_METHOD)
        .to_string();

    NormalizedReportRow {
        id,
        date,
        devices,
        status,
        department,
        method,
        raw: Some(raw.clone()),
        details: Some(details),
    }
}

/// 複数レコードを順序を保って正規化する
pub fn normalize_records(records: &[RawReportRecord], today: NaiveDate) -> Vec<NormalizedReportRow> {
    records
        .iter()
        .map(|raw| normalize_record_on(raw, today))
        .collect()
}

/// レポート日時をパースする
///
/// 対応形式: RFC 3339、`YYYY-MM-DDTHH:MM:SS[.fff]`、`YYYY-MM-DD HH:MM:SS`、`YYYY-MM-DD`。
/// 日付部分は記載どおりに扱い、タイムゾーン変換はしない。日付のみは0時として扱う。
pub fn parse_report_datetime(value: &str) -> Option<NaiveDateTime> {
    let value = value.trim();

    if let Ok(dt) = DateTime::parse_from_rfc3339(value) {
        return Some(dt.naive_local());
    }

    for format in ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f", "%Y-%m-%dT%H:%M"] {
        if let Ok(dt) = NaiveDateTime::parse_from_str(value, format) {
            return Some(dt);
        }
    }

    // 先頭10文字が日付として読めればそれを使う
    value
        .get(..10)
        .and_then(|prefix| NaiveDate::parse_from_str(prefix, "%Y-%m-%d").ok())
        .and_then(|date| date.and_hms_opt(0, 0, 0))
}
