//! Erasure Reports Common Library
//!
//! CLIと将来のWebフロントエンドで共有される型と、I/Oを持たないパイプライン処理
//! （正規化・キャッシュ・絞り込み・選択）

pub mod types;
pub mod error;
pub mod normalizer;
pub mod cache;
pub mod query;
pub mod selection;

pub use types::{ListingData, ListingResponse, NormalizedReportRow, RawReportRecord, ReportDetails};
pub use error::{Error, Result};
pub use normalizer::{normalize_record, normalize_record_on, normalize_records, parse_details, DetailsParse};
pub use cache::{CacheStore, Clock, KeyValueStorage, ManualClock, MemoryStorage, SystemClock, DEFAULT_CACHE_TTL};
pub use query::{
    apply_query, distinct_values, filter_rows, is_valid_date_format, total_pages, DeviceBucket, QueryPage, ReportQuery,
    RowField, SortDirection, SortKey, DEFAULT_PAGE_SIZE,
};
pub use selection::SelectionSet;
