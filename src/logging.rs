//! ログ初期化
//!
//! 診断ログは `tracing` で標準エラーに出力する。`RUST_LOG` が優先され、
//! 未設定なら `warn`（`--verbose` 指定時はこのクレートのみ `debug`）。

use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

fn default_directive(verbose: bool) -> &'static str {
    if verbose {
        "warn,erasure_reports=debug,erasure_reports_common=debug"
    } else {
        "warn"
    }
}

fn build_env_filter(verbose: bool) -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_directive(verbose)))
}

/// サブスクライバを登録する（2回目以降の呼び出しは無視）
pub fn init_logging(verbose: bool) {
    let _ = tracing_subscriber::registry()
        .with(build_env_filter(verbose))
        .with(
            fmt::layer()
                .with_writer(std::io::stderr)
                .with_target(false)
                .with_thread_ids(false),
        )
        .try_init();
}
