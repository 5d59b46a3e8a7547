use anyhow::{Context, Result};
use chrono::Local;
use clap::Parser;
use erasure_reports::{app, cli, config, error, export, identity, loader, logging, output};
use app::{App, CliLoader};
use cli::{Cli, Commands};
use config::Config;
use erasure_reports_common::{apply_query, NormalizedReportRow};
use error::ReportsError;
use indicatif::{ProgressBar, ProgressStyle};
use loader::{LoadOutcome, REPORTS_CACHE_KEY};
use std::path::PathBuf;
use std::sync::Arc;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    logging::init_logging(cli.verbose);

    let config = Config::load().context("設定の読み込みに失敗しました")?;
    let app = App::open(config).context("ローカルストレージを開けません")?;
    let page_size = app.config().page_size;

    match cli.command {
        Commands::List { filters, page, json } => {
            let loader = app.loader()?;
            let Some(rows) = load_rows(&loader).await? else {
                return Ok(());
            };

            let result = apply_query(&rows, &filters.to_query(page, page_size));
            if json {
                println!("{}", output::render_page_json(&result)?);
            } else if result.filtered_count == 0 {
                println!("{}", output::render_filter_hints(&rows));
            } else {
                println!("{}", output::render_table(&result, &app.load_selection()));
            }
        }

        Commands::Select { ids, page_visible, filters, page, clear, show } => {
            let mut selection = app.load_selection();

            if clear {
                selection.clear();
                println!("✔ 選択をすべて解除しました");
            }

            for id in &ids {
                if selection.toggle_one(id) {
                    println!("✔ 選択: {}", id);
                } else {
                    println!("- 解除: {}", id);
                }
            }

            if page_visible {
                let loader = app.loader()?;
                if let Some(rows) = load_rows(&loader).await? {
                    let visible = apply_query(&rows, &filters.to_query(page, page_size)).visible_ids();
                    if visible.is_empty() {
                        println!("表示中のレポートがありません");
                    } else if selection.toggle_all_visible(&visible) {
                        println!("✔ 表示中の{}件を選択しました", visible.len());
                    } else {
                        println!("- 表示中の{}件の選択を解除しました", visible.len());
                    }
                }
            }

            app.save_selection(&selection)?;

            if show || (ids.is_empty() && !page_visible && !clear) {
                println!("選択中: {}件", selection.len());
                for id in selection.ids() {
                    println!("  {}", id);
                }
            }
        }

        Commands::Export { id, output } => {
            let loader = app.loader()?;
            let rows = load_rows(&loader).await?.unwrap_or_default();
            let row = rows
                .iter()
                .find(|row| row.id == id)
                .ok_or_else(|| ReportsError::RowNotFound(id.clone()))?;

            let output_dir = output.unwrap_or_else(|| PathBuf::from("."));
            let path = export::download_one(loader.api(), row, &output_dir)
                .await
                .with_context(|| format!("レポート {} のダウンロードに失敗しました", id))?;
            println!("✔ 保存しました: {}", path.display());
        }

        Commands::ExportSelected { output } => {
            let mut selection = app.load_selection();
            if selection.is_empty() {
                return Err(ReportsError::EmptySelection.into());
            }

            let loader = app.loader()?;
            let rows = load_rows(&loader).await?.unwrap_or_default();

            let dangling: Vec<String> = selection.dangling(&rows).into_iter().map(str::to_string).collect();
            if !dangling.is_empty() {
                println!("⚠ 一覧にない{}件は対象外です: {}", dangling.len(), dangling.join(", "));
            }

            let progress = ProgressBar::new(selection.len() as u64);
            if let Ok(style) = ProgressStyle::with_template("{bar:30.cyan/blue} {pos}/{len} {msg}") {
                progress.set_style(style);
            }
            progress.set_message("ダウンロード中");

            let options = export::BulkExportOptions {
                concurrency: app.config().bulk_concurrency,
                date: Local::now().date_naive(),
            };
            let output_dir = output.unwrap_or_else(|| PathBuf::from("."));
            let tally = export::download_selected(loader.api(), &rows, &mut selection, &output_dir, &options, &progress)
                .await?;
            app.save_selection(&selection)?;

            println!("✔ {}", tally);
            println!("  保存先: {}", tally.archive_path.display());
            for (row_id, reason) in &tally.failures {
                println!("  ✗ {}: {}", row_id, reason);
            }
        }

        Commands::Cache { clear, info } => {
            let cache = app.cache();

            if info || !clear {
                match cache.info(REPORTS_CACHE_KEY) {
                    Some(entry) => {
                        println!("キャッシュ情報:");
                        println!("  パス: {}", app.storage().path().display());
                        println!("  経過: {}", output::format_age(entry.age));
                        println!("  状態: {}", if entry.expired { "期限切れ" } else { "有効" });
                        println!("  サイズ: {} bytes", entry.size_bytes);
                    }
                    None => println!("キャッシュがありません"),
                }
            }

            if clear {
                cache.remove(REPORTS_CACHE_KEY);
                println!("✔ キャッシュを削除しました");
            }
        }

        Commands::Config { show, set_api_url, set_email, set_token } => {
            let mut config = app.config().clone();

            if let Some(url) = set_api_url {
                config.set_api_base_url(url)?;
                println!("✔ APIのURLを設定しました");
            }

            if let Some(email) = set_email {
                app.save_email(&email)?;
                println!("✔ メールアドレスを保存しました");
            }

            if let Some(token) = set_token {
                app.save_token(&token)?;
                println!("✔ トークンを保存しました");
            }

            if show {
                let resolved = identity::IdentityChain::standard(app.storage().clone(), app.token()).resolve();
                println!("設定:");
                println!("  API: {}", config.api_base_url);
                println!(
                    "  タイムアウト: {}",
                    config
                        .timeout_seconds
                        .map(|secs| format!("{}秒", secs))
                        .unwrap_or_else(|| "なし".into())
                );
                println!("  キャッシュ有効期間: {}秒", config.cache_ttl_seconds);
                println!("  1ページの件数: {}", config.page_size);
                println!("  同時取得数: {}", config.bulk_concurrency);
                match resolved {
                    Some(identity) => println!("  利用者: {} ({})", identity.email, identity.source),
                    None => println!("  利用者: 未設定"),
                }
            }
        }
    }

    Ok(())
}

/// 一覧を読み込む。キャッシュがあれば先にその旨を表示する。0件なら案内を出して `None`
async fn load_rows(loader: &CliLoader) -> Result<Option<Arc<Vec<NormalizedReportRow>>>> {
    let outcome = app::load_with_preview(loader, |snapshot| {
        println!("キャッシュの{}件を表示中（更新中...）", snapshot.rows.len());
    })
    .await?;

    match outcome {
        LoadOutcome::Empty { notice } => {
            println!("{}", notice);
            Ok(None)
        }
        LoadOutcome::Loaded { .. } => Ok(Some(loader.rows())),
    }
}
