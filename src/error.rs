use thiserror::Error;

#[derive(Error, Debug)]
pub enum ReportsError {
    #[error("設定エラー: {0}")]
    Config(String),

    #[error("利用者を特定できません。`erasure-reports config --set-email` でメールアドレスを設定するか、再ログインしてください")]
    Identity,

    #[error("通信エラー: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("HTTPエラー {status}: {url}")]
    HttpStatus { status: u16, url: String },

    #[error("APIエラー: {0}")]
    Api(String),

    #[error("不正なURL: {0}")]
    InvalidUrl(#[from] url::ParseError),

    #[error("レポートが見つかりません: {0}")]
    RowNotFound(String),

    #[error("元レコードがないためエクスポートできません: {0}")]
    MissingRaw(String),

    #[error("レポートが選択されていません")]
    EmptySelection,

    #[error("一括エクスポートに失敗しました（{failed}件すべて失敗）")]
    BulkExportFailed { failed: usize },

    #[error("JSON解析エラー: {0}")]
    JsonParse(#[from] serde_json::Error),

    #[error("IOエラー: {0}")]
    Io(#[from] std::io::Error),

    #[error("アーカイブ生成エラー: {0}")]
    Zip(#[from] zip::result::ZipError),

    #[error("ストレージエラー: {0}")]
    Storage(#[from] erasure_reports_common::Error),
}

impl ReportsError {
    /// 通信系のエラーか（一覧・ドキュメント取得の失敗）
    pub fn is_transport(&self) -> bool {
        matches!(
            self,
            ReportsError::Transport(_) | ReportsError::HttpStatus { .. } | ReportsError::Api(_)
        )
    }
}

pub type Result<T> = std::result::Result<T, ReportsError>;
