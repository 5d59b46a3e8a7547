use clap::{Args, Parser, Subcommand};
use erasure_reports_common::{DeviceBucket, ReportQuery, SortDirection, SortKey};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "erasure-reports")]
#[command(about = "データ消去監査レポートの一覧・一括エクスポートツール", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// 詳細ログを出力
    #[arg(short, long, global = true)]
    pub verbose: bool,
}

#[derive(Subcommand)]
pub enum Commands {
    /// レポート一覧を表示
    List {
        #[command(flatten)]
        filters: FilterArgs,

        /// ページ番号（1始まり）
        #[arg(short, long, default_value = "1")]
        page: usize,

        /// 表示中のページをJSONで出力
        #[arg(long)]
        json: bool,
    },

    /// エクスポート対象の選択を切り替え
    Select {
        /// 選択を反転するレポートID
        ids: Vec<String>,

        /// 一覧と同じ条件で表示されるページ全体を反転
        #[arg(long)]
        page_visible: bool,

        #[command(flatten)]
        filters: FilterArgs,

        /// --page-visible の対象ページ
        #[arg(short, long, default_value = "1")]
        page: usize,

        /// 選択をすべて解除
        #[arg(long)]
        clear: bool,

        /// 選択中のIDを表示
        #[arg(long)]
        show: bool,
    },

    /// レポート1件をPDFでダウンロード
    Export {
        /// レポートID
        #[arg(required = true)]
        id: String,

        /// 出力ディレクトリ（デフォルト: カレント）
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// 選択中のレポートをZIPにまとめてダウンロード
    ExportSelected {
        /// 出力ディレクトリ（デフォルト: カレント）
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// キャッシュ管理
    Cache {
        /// キャッシュを削除
        #[arg(long)]
        clear: bool,

        /// キャッシュ情報を表示
        #[arg(long)]
        info: bool,
    },

    /// 設定を表示/編集
    Config {
        /// 設定を表示
        #[arg(long)]
        show: bool,

        /// APIのベースURLを設定
        #[arg(long)]
        set_api_url: Option<String>,

        /// 利用者のメールアドレスを保存
        #[arg(long)]
        set_email: Option<String>,

        /// 認証トークンを保存
        #[arg(long)]
        set_token: Option<String>,
    },
}

/// 絞り込み・並べ替え条件
#[derive(Args, Clone, Debug, Default)]
pub struct FilterArgs {
    /// IDまたは部署で検索
    #[arg(short, long)]
    pub search: Option<String>,

    /// ステータス（completed/failed等）
    #[arg(long)]
    pub status: Option<String>,

    /// 消去方式
    #[arg(long)]
    pub method: Option<String>,

    /// 開始日 (YYYY-MM-DD)
    #[arg(long)]
    pub from: Option<String>,

    /// 終了日 (YYYY-MM-DD、当日を含む)
    #[arg(long)]
    pub to: Option<String>,

    /// デバイス数 (1-50/51-100/101-200/201+)
    #[arg(long)]
    pub devices: Option<DeviceBucket>,

    /// 重複（ID・日付・部署が同じ）を除去
    #[arg(long)]
    pub dedupe: bool,

    /// 並べ替えキー (id/date/devices/status/department)
    #[arg(long)]
    pub sort: Option<SortKey>,

    /// 降順で並べ替え
    #[arg(long)]
    pub desc: bool,
}

impl FilterArgs {
    pub fn to_query(&self, page: usize, page_size: usize) -> ReportQuery {
        let direction = if self.desc { SortDirection::Desc } else { SortDirection::Asc };
        ReportQuery {
            search: self.search.clone(),
            status: self.status.clone(),
            method: self.method.clone(),
            date_from: self.from.clone(),
            date_to: self.to.clone(),
            device_bucket: self.devices,
            dedupe: self.dedupe,
            sort: self.sort.map(|key| (key, direction)),
            page,
            page_size,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_list_filters() {
        let cli = Cli::try_parse_from([
            "erasure-reports",
            "list",
            "--status",
            "completed",
            "--devices",
            "51-100",
            "--sort",
            "devices",
            "--desc",
            "--page",
            "2",
        ])
        .unwrap();

        let Commands::List { filters, page, json } = cli.command else {
            panic!("expected list command");
        };
        assert_eq!(page, 2);
        assert!(!json);

        let query = filters.to_query(page, 5);
        assert_eq!(query.status.as_deref(), Some("completed"));
        assert_eq!(query.device_bucket, Some(DeviceBucket::UpTo100));
        assert_eq!(query.sort, Some((SortKey::Devices, SortDirection::Desc)));
        assert_eq!(query.page, 2);
    }

    #[test]
    fn test_invalid_device_bucket_is_rejected() {
        assert!(Cli::try_parse_from(["erasure-reports", "list", "--devices", "7"]).is_err());
    }

    #[test]
    fn test_parse_select_ids() {
        let cli = Cli::try_parse_from(["erasure-reports", "-v", "select", "ER-1", "ER-2"]).unwrap();
        assert!(cli.verbose);
        let Commands::Select { ids, page_visible, .. } = cli.command else {
            panic!("expected select command");
        };
        assert_eq!(ids, vec!["ER-1", "ER-2"]);
        assert!(!page_visible);
    }

    #[test]
    fn test_export_requires_id() {
        assert!(Cli::try_parse_from(["erasure-reports", "export"]).is_err());
    }
}
