//! 利用者特定モジュール
//!
//! 操作者のメールアドレスを、順序付きのリゾルバ列から解決する。
//! 最初に空でない値を返したリゾルバが採用される。
//!
//! ## 既定の順序
//! 1. 保存済みプロフィール（`user`）
//! 2. 旧形式の認証情報（`authUser`）
//! 3. トークンの `email` クレーム
//! 4. トークンの `user_email` クレーム

use crate::storage::{LEGACY_AUTH_KEY, PROFILE_KEY, TOKEN_KEY};
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use erasure_reports_common::types::non_empty;
use erasure_reports_common::KeyValueStorage;
use serde_json::{Map, Value};
use std::sync::Arc;
use tracing::debug;

/// メールアドレスの取得元
pub trait IdentityResolver {
    /// ログ表示用の名前
    fn name(&self) -> &str;

    fn resolve(&self) -> Option<String>;
}

/// 解決結果
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedIdentity {
    pub email: String,
    pub source: String,
}

/// ストレージに保存されたJSONオブジェクトからメールアドレスを読む
pub struct StoredEmailResolver<S> {
    storage: Arc<S>,
    key: &'static str,
}

impl<S: KeyValueStorage> StoredEmailResolver<S> {
    pub fn new(storage: Arc<S>, key: &'static str) -> Self {
        Self { storage, key }
    }

    /// 保存済みプロフィール
    pub fn profile(storage: Arc<S>) -> Self {
        Self::new(storage, PROFILE_KEY)
    }

    /// 旧形式の認証情報
    pub fn legacy_auth(storage: Arc<S>) -> Self {
        Self::new(storage, LEGACY_AUTH_KEY)
    }
}

impl<S: KeyValueStorage> IdentityResolver for StoredEmailResolver<S> {
    fn name(&self) -> &str {
        self.key
    }

    fn resolve(&self) -> Option<String> {
        let text = self.storage.get_item(self.key)?;
        let value: Value = serde_json::from_str(&text).ok()?;

        // {"email": ...} と {"user": {"email": ...}} の両方を受け付ける
        let email = value
            .get("email")
            .and_then(Value::as_str)
            .or_else(|| value.pointer("/user/email").and_then(Value::as_str));

        non_empty(email).map(str::to_string)
    }
}

/// トークンのクレームからメールアドレスを読む
pub struct TokenClaimResolver {
    token: Option<String>,
    claim: &'static str,
    name: String,
}

impl TokenClaimResolver {
    pub fn new(token: Option<String>, claim: &'static str) -> Self {
        Self {
            token,
            claim,
            name: format!("token:{}", claim),
        }
    }
}

impl IdentityResolver for TokenClaimResolver {
    fn name(&self) -> &str {
        &self.name
    }

    fn resolve(&self) -> Option<String> {
        let claims = decode_token_claims(self.token.as_deref()?)?;
        let email = claims.get(self.claim).and_then(Value::as_str);
        non_empty(email).map(str::to_string)
    }
}

/// クロージャをリゾルバとして使う
pub struct FnResolver<F> {
    name: String,
    f: F,
}

impl<F: Fn() -> Option<String>> FnResolver<F> {
    pub fn new(name: impl Into<String>, f: F) -> Self {
        Self { name: name.into(), f }
    }
}

impl<F: Fn() -> Option<String>> IdentityResolver for FnResolver<F> {
    fn name(&self) -> &str {
        &self.name
    }

    fn resolve(&self) -> Option<String> {
        (self.f)()
    }
}

/// JWTのペイロード部分をデコードする（署名は検証しない）
pub fn decode_token_claims(token: &str) -> Option<Map<String, Value>> {
    let token = token.trim().trim_matches('"');
    let token = token.strip_prefix("Bearer ").unwrap_or(token);
    let payload = token.split('.').nth(1)?;
    let bytes = URL_SAFE_NO_PAD.decode(payload.trim_end_matches('=')).ok()?;

    match serde_json::from_slice(&bytes).ok()? {
        Value::Object(claims) => Some(claims),
        _ => None,
    }
}

/// 順序付きリゾルバ列
#[derive(Default)]
pub struct IdentityChain {
    resolvers: Vec<Box<dyn IdentityResolver>>,
}

impl IdentityChain {
    pub fn new() -> Self {
        Self::default()
    }

    /// 既定の4段フォールバックを構築する
    ///
    /// トークンは引数（環境変数由来）を優先し、なければストレージから読む。
    pub fn standard<S: KeyValueStorage + 'static>(storage: Arc<S>, token: Option<String>) -> Self {
        let token = token.or_else(|| storage.get_item(TOKEN_KEY));

        Self::new()
            .with(StoredEmailResolver::profile(storage.clone()))
            .with(StoredEmailResolver::legacy_auth(storage))
            .with(TokenClaimResolver::new(token.clone(), "email"))
            .with(TokenClaimResolver::new(token, "user_email"))
    }

    pub fn with<R: IdentityResolver + 'static>(mut self, resolver: R) -> Self {
        self.resolvers.push(Box::new(resolver));
        self
    }

    pub fn len(&self) -> usize {
        self.resolvers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.resolvers.is_empty()
    }

    /// 最初に解決できたメールアドレスを返す
    pub fn resolve(&self) -> Option<ResolvedIdentity> {
        self.resolvers.iter().find_map(|resolver| {
            let email = resolver.resolve()?;
            debug!(source = resolver.name(), "identity resolved");
            Some(ResolvedIdentity {
                email,
                source: resolver.name().to_string(),
            })
        })
    }
}
