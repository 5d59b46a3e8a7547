//! レポートの型定義
//!
//! CLIと将来のWebフロントエンドで共有される型:
//! - RawReportRecord: 一覧APIが返す生レコード
//! - ReportDetails: 生レコードに埋め込まれたJSON文字列をパースしたもの
//! - NormalizedReportRow: 表示・絞り込み・エクスポートが依存する正規化済み行

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};

/// 一覧APIの生レコード
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RawReportRecord {
    #[serde(default, deserialize_with = "lenient_string", skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,

    /// 作成者のメールアドレス
    #[serde(default, deserialize_with = "lenient_string", skip_serializing_if = "Option::is_none")]
    pub user_email: Option<String>,

    /// 埋め込みJSON（スキーマは緩く、欠落・破損あり）
    #[serde(default, deserialize_with = "json_text", skip_serializing_if = "Option::is_none")]
    pub report_details_json: Option<String>,

    #[serde(default, deserialize_with = "lenient_string", skip_serializing_if = "Option::is_none")]
    pub created_at: Option<String>,

    /// その他のフィールド（エクスポート用にそのまま保持）
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// `report_details_json` をパースした詳細情報
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReportDetails {
    #[serde(deserialize_with = "lenient_string", skip_serializing_if = "Option::is_none")]
    pub report_id: Option<String>,

    /// ISO形式の日時
    #[serde(deserialize_with = "lenient_string", skip_serializing_if = "Option::is_none")]
    pub datetime: Option<String>,

    #[serde(deserialize_with = "lenient_string", skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,

    #[serde(deserialize_with = "lenient_string", skip_serializing_if = "Option::is_none")]
    pub department: Option<String>,

    #[serde(deserialize_with = "lenient_string", skip_serializing_if = "Option::is_none")]
    pub erasure_method: Option<String>,

    /// 処理したデバイスごとのログ（配列判定は正規化時に行う）
    #[serde(skip_serializing_if = "Option::is_none")]
    pub erasure_log: Option<Value>,

    // ブランディング・署名（エクスポート時のみ使用）
    #[serde(deserialize_with = "lenient_string", skip_serializing_if = "Option::is_none")]
    pub company_name: Option<String>,
    #[serde(deserialize_with = "lenient_string", skip_serializing_if = "Option::is_none")]
    pub company_logo: Option<String>,
    #[serde(deserialize_with = "lenient_string", skip_serializing_if = "Option::is_none")]
    pub technician_name: Option<String>,
    #[serde(deserialize_with = "lenient_string", skip_serializing_if = "Option::is_none")]
    pub technician_signature: Option<String>,
    #[serde(deserialize_with = "lenient_string", skip_serializing_if = "Option::is_none")]
    pub validator_name: Option<String>,
    #[serde(deserialize_with = "lenient_string", skip_serializing_if = "Option::is_none")]
    pub validator_signature: Option<String>,

    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// 正規化済みレポート行
///
/// 全フィールドが既定値で埋まっていることが保証される。
/// `raw` / `details` は作成後に変更されない逆参照で、エクスポートでのみ使う。
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct NormalizedReportRow {
    pub id: String,
    /// YYYY-MM-DD
    pub date: String,
    pub devices: usize,
    pub status: String,
    pub department: String,
    pub method: String,

    #[serde(rename = "_raw", default, skip_serializing_if = "Option::is_none")]
    pub raw: Option<RawReportRecord>,

    #[serde(rename = "_details", default, skip_serializing_if = "Option::is_none")]
    pub details: Option<ReportDetails>,
}

impl NormalizedReportRow {
    /// ドキュメント取得に使う正式なレポートID
    ///
    /// 詳細のIDを優先し、なければ生レコードのID。生レコードがなければ `None`。
    pub fn canonical_report_id(&self) -> Option<String> {
        let raw = self.raw.as_ref()?;
        self.details
            .as_ref()
            .and_then(|d| non_empty(d.report_id.as_deref()))
            .or_else(|| non_empty(raw.id.as_deref()))
            .map(str::to_string)
    }
}

/// 一覧APIのレスポンス
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ListingResponse {
    #[serde(default)]
    pub success: bool,
    #[serde(default)]
    pub data: Option<ListingData>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

/// `data` は配列または単一レコード
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ListingData {
    Many(Vec<RawReportRecord>),
    One(Box<RawReportRecord>),
}

impl ListingResponse {
    /// レコードを配列として取り出す（単一レコードは1要素の配列）
    pub fn into_records(self) -> Vec<RawReportRecord> {
        match self.data {
            Some(ListingData::Many(records)) => records,
            Some(ListingData::One(record)) => vec![*record],
            None => Vec::new(),
        }
    }
}

/// 空文字列を `None` として扱う
pub fn non_empty(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|v| !v.is_empty())
}

/// 文字列・数値を文字列として受け付け、それ以外は `None`
fn lenient_string<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<Value>::deserialize(deserializer)?;
    Ok(match value {
        Some(Value::String(s)) => Some(s),
        Some(Value::Number(n)) => Some(n.to_string()),
        Some(Value::Bool(b)) => Some(b.to_string()),
        _ => None,
    })
}

/// 埋め込みJSONは通常文字列だが、オブジェクトで届いた場合は再シリアライズする
fn json_text<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<Value>::deserialize(deserializer)?;
    Ok(match value {
        Some(Value::String(s)) => Some(s),
        Some(Value::Null) | None => None,
        Some(other) => Some(other.to_string()),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_raw_record_numeric_id() {
        let raw: RawReportRecord = serde_json::from_value(json!({
            "id": 42,
            "user_email": "ops@example.com",
            "report_details_json": "{}"
        }))
        .unwrap();
        assert_eq!(raw.id.as_deref(), Some("42"));
        assert_eq!(raw.user_email.as_deref(), Some("ops@example.com"));
    }

    #[test]
    fn test_raw_record_keeps_extra_fields() {
        let raw: RawReportRecord = serde_json::from_value(json!({
            "id": "r-1",
            "pdf_url": "/files/r-1.pdf"
        }))
        .unwrap();
        assert_eq!(raw.extra.get("pdf_url"), Some(&json!("/files/r-1.pdf")));
    }

    #[test]
    fn test_details_object_is_reserialized() {
        let raw: RawReportRecord = serde_json::from_value(json!({
            "id": "r-1",
            "report_details_json": {"status": "Completed"}
        }))
        .unwrap();
        let text = raw.report_details_json.unwrap();
        assert!(text.contains("Completed"));
    }

    #[test]
    fn test_listing_single_record() {
        let response: ListingResponse = serde_json::from_value(json!({
            "success": true,
            "data": {"id": "only"}
        }))
        .unwrap();
        let records = response.into_records();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].id.as_deref(), Some("only"));
    }

    #[test]
    fn test_listing_missing_data() {
        let response: ListingResponse = serde_json::from_value(json!({"success": true})).unwrap();
        assert!(response.into_records().is_empty());
    }

    #[test]
    fn test_canonical_report_id_fallback() {
        let mut row = NormalizedReportRow {
            raw: Some(RawReportRecord {
                id: Some("raw-7".to_string()),
                ..Default::default()
            }),
            details: Some(ReportDetails::default()),
            ..Default::default()
        };
        assert_eq!(row.canonical_report_id().as_deref(), Some("raw-7"));

        row.details = Some(ReportDetails {
            report_id: Some("ER-7".to_string()),
            ..Default::default()
        });
        assert_eq!(row.canonical_report_id().as_deref(), Some("ER-7"));

        row.raw = None;
        assert_eq!(row.canonical_report_id(), None);
    }

    #[test]
    fn test_row_serializes_back_references() {
        let row = NormalizedReportRow {
            id: "ER-1".to_string(),
            raw: Some(RawReportRecord::default()),
            ..Default::default()
        };
        let value = serde_json::to_value(&row).unwrap();
        assert!(value.get("_raw").is_some());
        assert!(value.get("_details").is_none());
    }
}
