//! レポートAPIクライアント
//!
//! 一覧エンドポイントとドキュメントエンドポイントを呼び出す。
//! どちらもブラックボックスとして扱い、レスポンスの形だけに依存する。
//!
//! - 一覧: `GET {base}/reports?email=...` → `{ success, data, error? }`
//! - ドキュメント: `GET {base}/reports/{id}/pdf` → バイナリ

use crate::config::Config;
use crate::error::{ReportsError, Result};
use async_trait::async_trait;
use erasure_reports_common::ListingResponse;
use reqwest::{Client, RequestBuilder, Url};
use tracing::debug;

/// リモートAPIの抽象
#[async_trait]
pub trait ReportsApi: Send + Sync {
    /// 利用者のレポート一覧を取得する
    async fn list_reports(&self, email: &str) -> Result<ListingResponse>;

    /// レポート1件のドキュメント（PDF）を取得する
    async fn fetch_document(&self, report_id: &str) -> Result<Vec<u8>>;
}

/// reqwestによる実装
#[derive(Debug, Clone)]
pub struct HttpReportsApi {
    client: Client,
    base_url: Url,
    token: Option<String>,
}

impl HttpReportsApi {
    pub fn new(base_url: &str, token: Option<String>) -> Result<Self> {
        Self::with_client(Client::new(), base_url, token)
    }

    pub fn with_client(client: Client, base_url: &str, token: Option<String>) -> Result<Self> {
        let base_url = Url::parse(base_url)?;
        if base_url.cannot_be_a_base() {
            return Err(ReportsError::Config(format!("APIのベースURLが不正です: {}", base_url)));
        }
        Ok(Self {
            client,
            base_url,
            token,
        })
    }

    /// 設定からクライアントを構築する
    pub fn from_config(config: &Config, token: Option<String>) -> Result<Self> {
        let mut builder = Client::builder();
        if let Some(timeout) = config.timeout() {
            builder = builder.timeout(timeout);
        }
        let client = builder.build()?;
        Self::with_client(client, &config.api_base_url, token)
    }

    fn endpoint(&self, segments: &[&str]) -> Url {
        let mut url = self.base_url.clone();
        if let Ok(mut path) = url.path_segments_mut() {
            path.pop_if_empty().extend(segments);
        }
        url
    }

    fn authorize(&self, request: RequestBuilder) -> RequestBuilder {
        match &self.token {
            Some(token) => request.bearer_auth(token),
            None => request,
        }
    }

    async fn get(&self, url: Url) -> Result<reqwest::Response> {
        debug!(%url, "GET");
        let response = self.authorize(self.client.get(url.clone())).send().await?;

        let status = response.status();
        if !status.is_success() {
            return Err(ReportsError::HttpStatus {
                status: status.as_u16(),
                url: url.to_string(),
            });
        }
        Ok(response)
    }
}

#[async_trait]
impl ReportsApi for HttpReportsApi {
    async fn list_reports(&self, email: &str) -> Result<ListingResponse> {
        let mut url = self.endpoint(&["reports"]);
        url.query_pairs_mut().append_pair("email", email);

        let listing: ListingResponse = self.get(url).await?.json().await?;
        if !listing.success {
            let message = listing
                .error
                .or(listing.message)
                .unwrap_or_else(|| "レポート一覧の取得に失敗しました".to_string());
            return Err(ReportsError::Api(message));
        }
        Ok(listing)
    }

    async fn fetch_document(&self, report_id: &str) -> Result<Vec<u8>> {
        let url = self.endpoint(&["reports", report_id, "pdf"]);
        let bytes = self.get(url).await?.bytes().await?;
        if bytes.is_empty() {
            return Err(ReportsError::Api(format!("空のドキュメント: {}", report_id)));
        }
        Ok(bytes.to_vec())
    }
}
