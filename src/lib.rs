//! erasure-reports
//!
//! データ消去監査レポートの一覧取得・絞り込み・一括エクスポート

pub mod api;
pub mod app;
pub mod cli;
pub mod config;
pub mod error;
pub mod export;
pub mod identity;
pub mod loader;
pub mod logging;
pub mod output;
pub mod storage;
