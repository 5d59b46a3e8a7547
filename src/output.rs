//! 一覧表示の整形

use crate::error::Result;
use erasure_reports_common::{distinct_values, NormalizedReportRow, QueryPage, RowField, SelectionSet};
use std::fmt::Write;
use std::time::Duration;

/// ページを表形式にする（選択中の行に `*` を付ける）
pub fn render_table(page: &QueryPage, selection: &SelectionSet) -> String {
    let mut out = String::new();
    let _ = writeln!(
        out,
        "  {:<20} {:<10} {:>7} {:<10} {:<12} METHOD",
        "ID", "DATE", "DEVICES", "STATUS", "DEPARTMENT"
    );
    for row in &page.rows {
        let marker = if selection.is_selected(&row.id) { '*' } else { ' ' };
        let _ = writeln!(
            out,
            "{} {:<20} {:<10} {:>7} {:<10} {:<12} {}",
            marker, row.id, row.date, row.devices, row.status, row.department, row.method
        );
    }
    let _ = write!(
        out,
        "ページ {}/{}（{}件中）、選択中 {}件",
        page.page,
        page.total_pages,
        page.filtered_count,
        selection.len()
    );
    out
}

pub fn render_page_json(page: &QueryPage) -> Result<String> {
    Ok(serde_json::to_string_pretty(page)?)
}

/// 絞り込み結果が0件のときに、指定可能な値を案内する
pub fn render_filter_hints(rows: &[NormalizedReportRow]) -> String {
    format!(
        "条件に一致するレポートがありません\n  ステータス: {}\n  消去方式: {}",
        distinct_values(rows, RowField::Status).join(", "),
        distinct_values(rows, RowField::Method).join(", ")
    )
}

/// 経過時間を「N分M秒」で表す
pub fn format_age(age: Duration) -> String {
    let secs = age.as_secs();
    if secs >= 60 {
        format!("{}分{}秒", secs / 60, secs % 60)
    } else {
        format!("{}秒", secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn page() -> QueryPage {
        QueryPage {
            rows: vec![
                NormalizedReportRow {
                    id: "ER-1".into(),
                    date: "2024-03-15".into(),
                    devices: 12,
                    status: "completed".into(),
                    department: "IT".into(),
                    method: "NIST".into(),
                    ..Default::default()
                },
                NormalizedReportRow {
                    id: "ER-2".into(),
                    status: "failed".into(),
                    method: "DoD".into(),
                    ..Default::default()
                },
            ],
            page: 1,
            total_pages: 3,
            filtered_count: 12,
        }
    }

    #[test]
    fn test_table_marks_selected_rows() {
        let selection: SelectionSet = ["ER-2"].into_iter().collect();
        let table = render_table(&page(), &selection);
        let lines: Vec<&str> = table.lines().collect();

        assert_eq!(lines.len(), 4);
        assert!(lines[1].starts_with("  ER-1"));
        assert!(lines[2].starts_with("* ER-2"));
        assert_eq!(lines[3], "ページ 1/3（12件中）、選択中 1件");
    }

    #[test]
    fn test_page_json_omits_missing_raw() {
        let json = render_page_json(&page()).unwrap();
        assert!(json.contains("\"total_pages\": 3"));
        assert!(!json.contains("_raw"));
    }

    #[test]
    fn test_filter_hints_list_distinct_values() {
        let hints = render_filter_hints(&page().rows);
        assert!(hints.contains("ステータス: completed, failed"));
        assert!(hints.contains("消去方式: DoD, NIST"));
    }

    #[test]
    fn test_format_age() {
        assert_eq!(format_age(Duration::from_secs(42)), "42秒");
        assert_eq!(format_age(Duration::from_secs(150)), "2分30秒");
    }
}
