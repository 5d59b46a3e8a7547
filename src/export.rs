//! エクスポートモジュール
//!
//! - 単体エクスポート: 1行のドキュメントを取得してファイルに保存
//! - 一括エクスポート: 選択中の各行のドキュメントを並行取得し、成功分を1つのZIPにまとめる
//!
//! 一括エクスポートは一部が失敗しても中断しない。全件失敗した場合のみエラーとし、
//! ZIPは作らない。成功時は選択をクリアする。

use crate::api::ReportsApi;
use crate::error::{ReportsError, Result};
use chrono::NaiveDate;
use erasure_reports_common::{NormalizedReportRow, SelectionSet};
use futures::stream::{self, StreamExt};
use indicatif::ProgressBar;
use regex::Regex;
use std::collections::HashMap;
use std::io::{Cursor, Write};
use std::path::{Path, PathBuf};
use tracing::{info, warn};
use zip::write::FileOptions;
use zip::{CompressionMethod, ZipWriter};

/// ファイル名に使えない文字を置換する
fn sanitize_file_component(value: &str) -> String {
    lazy_static::lazy_static! {
        static ref UNSAFE_RE: Regex = Regex::new(r"[^A-Za-z0-9._-]").unwrap();
    }
    UNSAFE_RE.replace_all(value, "_").to_string()
}

/// 単体ドキュメントのファイル名（ZIP内のエントリ名も同じ）
pub fn report_file_name(row: &NormalizedReportRow) -> String {
    format!(
        "Erasure_Report_{}_{}.pdf",
        sanitize_file_component(&row.id),
        sanitize_file_component(&row.date)
    )
}

/// 一括エクスポートのZIPファイル名
pub fn archive_file_name(date: NaiveDate) -> String {
    format!("Erasure_Reports_{}.zip", date.format("%Y-%m-%d"))
}

/// 取得済みドキュメント
#[derive(Debug, Clone)]
pub struct ExportedDocument {
    pub row_id: String,
    pub file_name: String,
    pub bytes: Vec<u8>,
}

/// 行ごとの取得結果
#[derive(Debug)]
pub struct ExportResult {
    pub row_id: String,
    pub outcome: Result<ExportedDocument>,
}

/// 一括エクスポートの集計
#[derive(Debug, Clone)]
pub struct BulkExportTally {
    pub succeeded: usize,
    pub failed: usize,
    pub archive_path: PathBuf,
    /// 失敗した行IDと理由
    pub failures: Vec<(String, String)>,
}

impl std::fmt::Display for BulkExportTally {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.failed > 0 {
            write!(f, "{}件ダウンロード、{}件失敗", self.succeeded, self.failed)
        } else {
            write!(f, "{}件ダウンロードしました", self.succeeded)
        }
    }
}

/// 一括エクスポートのオプション
#[derive(Debug, Clone)]
pub struct BulkExportOptions {
    /// 同時取得数
    pub concurrency: usize,
    /// ZIPファイル名に使う日付
    pub date: NaiveDate,
}

/// 1行分のドキュメントを取得する
pub async fn fetch_row_document<A>(api: &A, row: &NormalizedReportRow) -> Result<ExportedDocument>
where
    A: ReportsApi + ?Sized,
{
    let report_id = row
        .canonical_report_id()
        .ok_or_else(|| ReportsError::MissingRaw(row.id.clone()))?;

    let bytes = api.fetch_document(&report_id).await?;

    Ok(ExportedDocument {
        row_id: row.id.clone(),
        file_name: report_file_name(row),
        bytes,
    })
}

/// 単体エクスポート
///
/// 失敗は呼び出し側に返すだけで、他の行には影響しない。
pub async fn download_one<A>(api: &A, row: &NormalizedReportRow, output_dir: &Path) -> Result<PathBuf>
where
    A: ReportsApi + ?Sized,
{
    let document = fetch_row_document(api, row).await?;

    std::fs::create_dir_all(output_dir)?;
    let path = output_dir.join(&document.file_name);
    std::fs::write(&path, &document.bytes)?;

    info!(row_id = %row.id, path = %path.display(), "report downloaded");
    Ok(path)
}

/// 複数行のドキュメントを並行取得する（完了順は不定）
pub async fn fetch_documents<A>(
    api: &A,
    rows: &[&NormalizedReportRow],
    concurrency: usize,
    progress: &ProgressBar,
) -> Vec<ExportResult>
where
    A: ReportsApi + ?Sized,
{
    stream::iter(rows.iter().copied())
        .map(|row| async move {
            ExportResult {
                row_id: row.id.clone(),
                outcome: fetch_row_document(api, row).await,
            }
        })
        .buffer_unordered(concurrency.max(1))
        .inspect(|_| progress.inc(1))
        .collect()
        .await
}

/// 取得済みドキュメントをZIPにまとめる
///
/// エントリ名が重複した場合は拡張子の前に `-2`, `-3` … を付ける。
pub fn build_archive(documents: &[ExportedDocument]) -> Result<Vec<u8>> {
    let mut sorted: Vec<&ExportedDocument> = documents.iter().collect();
    sorted.sort_by(|a, b| a.file_name.cmp(&b.file_name));

    let mut writer = ZipWriter::new(Cursor::new(Vec::new()));
    let options = FileOptions::default().compression_method(CompressionMethod::Deflated);
    let mut used: HashMap<String, usize> = HashMap::new();

    for document in sorted {
        let count = used.entry(document.file_name.clone()).or_insert(0);
        *count += 1;
        let entry_name = if *count == 1 {
            document.file_name.clone()
        } else {
            with_suffix(&document.file_name, *count)
        };

        writer.start_file(entry_name, options)?;
        writer.write_all(&document.bytes)?;
    }

    Ok(writer.finish()?.into_inner())
}

fn with_suffix(file_name: &str, n: usize) -> String {
    match file_name.rsplit_once('.') {
        Some((stem, ext)) => format!("{}-{}.{}", stem, n, ext),
        None => format!("{}-{}", file_name, n),
    }
}

/// 結果を1回で畳み込み、成功分と失敗分に分ける
fn partition_results(results: Vec<ExportResult>) -> (Vec<ExportedDocument>, Vec<(String, String)>) {
    results
        .into_iter()
        .fold((Vec::new(), Vec::new()), |(mut documents, mut failures), result| {
            match result.outcome {
                Ok(document) => documents.push(document),
                Err(e) => {
                    warn!(row_id = %result.row_id, error = %e, "report export failed, skipping");
                    failures.push((result.row_id, e.to_string()));
                }
            }
            (documents, failures)
        })
}

/// 一括エクスポート
///
/// # Arguments
/// * `rows` - 現在の行集合（選択IDと突き合わせる）
/// * `selection` - 選択状態（成功時にクリアされる）
/// * `output_dir` - ZIPの出力先
///
/// # Returns
/// 成功・失敗件数とZIPのパス。1件も成功しなければ `BulkExportFailed`。
pub async fn download_selected<A>(
    api: &A,
    rows: &[NormalizedReportRow],
    selection: &mut SelectionSet,
    output_dir: &Path,
    options: &BulkExportOptions,
    progress: &ProgressBar,
) -> Result<BulkExportTally>
where
    A: ReportsApi + ?Sized,
{
    let targets = selection.resolve(rows);
    if targets.is_empty() {
        return Err(ReportsError::EmptySelection);
    }

    progress.set_length(targets.len() as u64);
    let results = fetch_documents(api, &targets, options.concurrency, progress).await;
    progress.finish_and_clear();

    let (documents, failures) = partition_results(results);
    if documents.is_empty() {
        return Err(ReportsError::BulkExportFailed {
            failed: failures.len(),
        });
    }

    let archive = build_archive(&documents)?;
    std::fs::create_dir_all(output_dir)?;
    let archive_path = output_dir.join(archive_file_name(options.date));
    std::fs::write(&archive_path, archive)?;

    selection.clear();

    let tally = BulkExportTally {
        succeeded: documents.len(),
        failed: failures.len(),
        archive_path,
        failures,
    };
    info!(succeeded = tally.succeeded, failed = tally.failed, "bulk export finished");
    Ok(tally)
}

#[cfg(test)]
mod tests {
    use super::*;
    use erasure_reports_common::{RawReportRecord, ReportDetails};

    fn row(id: &str, date: &str) -> NormalizedReportRow {
        NormalizedReportRow {
            id: id.to_string(),
            date: date.to_string(),
            raw: Some(RawReportRecord {
                id: Some(id.to_string()),
                ..Default::default()
            }),
            details: Some(ReportDetails::default()),
            ..Default::default()
        }
    }

    fn document(file_name: &str) -> ExportedDocument {
        ExportedDocument {
            row_id: file_name.to_string(),
            file_name: file_name.to_string(),
            bytes: b"%PDF".to_vec(),
        }
    }

    #[test]
    fn test_report_file_name_is_sanitized() {
        assert_eq!(report_file_name(&row("ER-1", "2024-03-15")), "Erasure_Report_ER-1_2024-03-15.pdf");
        assert_eq!(report_file_name(&row("a/b c", "2024-03-15")), "Erasure_Report_a_b_c_2024-03-15.pdf");
    }

    #[test]
    fn test_archive_file_name() {
        let date = NaiveDate::from_ymd_opt(2024, 3, 15).unwrap();
        assert_eq!(archive_file_name(date), "Erasure_Reports_2024-03-15.zip");
    }

    #[test]
    fn test_with_suffix() {
        assert_eq!(with_suffix("a.pdf", 2), "a-2.pdf");
        assert_eq!(with_suffix("noext", 3), "noext-3");
    }

    #[test]
    fn test_build_archive_renames_duplicates() {
        let bytes = build_archive(&[document("a.pdf"), document("a.pdf"), document("b.pdf")]).unwrap();
        let mut archive = zip::ZipArchive::new(Cursor::new(bytes)).unwrap();
        let mut names: Vec<String> = (0..archive.len())
            .map(|i| archive.by_index(i).unwrap().name().to_string())
            .collect();
        names.sort();
        assert_eq!(names, vec!["a-2.pdf", "a.pdf", "b.pdf"]);
    }

    #[test]
    fn test_tally_display() {
        let mut tally = BulkExportTally {
            succeeded: 3,
            failed: 2,
            archive_path: PathBuf::from("x.zip"),
            failures: Vec::new(),
        };
        assert_eq!(tally.to_string(), "3件ダウンロード、2件失敗");
        tally.failed = 0;
        assert_eq!(tally.to_string(), "3件ダウンロードしました");
    }

    #[test]
    fn test_partition_results() {
        let results = vec![
            ExportResult {
                row_id: "ok".into(),
                outcome: Ok(document("ok.pdf")),
            },
            ExportResult {
                row_id: "bad".into(),
                outcome: Err(ReportsError::MissingRaw("bad".into())),
            },
        ];
        let (documents, failures) = partition_results(results);
        assert_eq!(documents.len(), 1);
        assert_eq!(failures.len(), 1);
        assert_eq!(failures[0].0, "bad");
    }
}
