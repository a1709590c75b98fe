//! Index statistics.
//!
//! `dossier stats` summarizes what the last import produced: people, files,
//! the per-category breakdown, and when the scan ran.

use anyhow::Result;
use dossier_core::taxonomy::cjk_numeral;
use dossier_core::Taxonomy;

use crate::config::Config;
use crate::sqlite_index::SqliteIndex;

pub async fn run_stats(config: &Config) -> Result<()> {
    let index = SqliteIndex::connect(config).await?;
    let pool = index.pool();

    let persons: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM persons")
        .fetch_one(pool)
        .await?;
    let files: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM archive_files")
        .fetch_one(pool)
        .await?;
    let db_size = std::fs::metadata(&config.db.path)
        .map(|m| m.len())
        .unwrap_or(0);

    println!("Dossier: Index Stats");
    println!("====================");
    println!();
    println!("  Database:    {}", config.db.path.display());
    println!("  Size:        {}", format_bytes(db_size));
    println!();
    println!("  Persons:     {}", persons);
    println!("  Files:       {}", files);

    match index.last_scan().await? {
        Some(scan) => {
            println!("  Import root: {}", scan.root.display());
            println!("  Last import: {}", format_ts_relative(scan.scanned_at));
            println!("  Warnings:    {}", scan.warning_count);
        }
        None => println!("  Last import: never"),
    }

    let counts = index.files_per_main_code().await?;
    if files > 0 {
        let taxonomy = Taxonomy::builtin();
        println!();
        println!("  By category:");
        println!("  {:<4} {:>6}   {}", "CODE", "FILES", "CATEGORY");
        println!("  {}", "-".repeat(60));
        for root in taxonomy.roots() {
            let n = counts
                .iter()
                .find(|(main, _)| *main == root.main_code)
                .map(|(_, n)| *n)
                .unwrap_or(0);
            println!(
                "  {:<4} {:>6}   {}、{}",
                root.code(),
                n,
                cjk_numeral(root.main_code).unwrap_or(""),
                root.label
            );
        }
        let unclassified = counts.iter().find(|(main, _)| *main == 0).map(|(_, n)| *n);
        if let Some(n) = unclassified.filter(|n| *n > 0) {
            println!("  {:<4} {:>6}   (unrecognized code)", "-", n);
        }
    }

    println!();
    index.close().await;
    Ok(())
}

/// Format a byte count as a human-readable string.
fn format_bytes(bytes: u64) -> String {
    if bytes < 1024 {
        format!("{} B", bytes)
    } else if bytes < 1024 * 1024 {
        format!("{:.1} KB", bytes as f64 / 1024.0)
    } else if bytes < 1024 * 1024 * 1024 {
        format!("{:.1} MB", bytes as f64 / (1024.0 * 1024.0))
    } else {
        format!("{:.2} GB", bytes as f64 / (1024.0 * 1024.0 * 1024.0))
    }
}

/// "3 hours ago" for recent timestamps, a date otherwise.
fn format_ts_relative(ts: i64) -> String {
    let delta = chrono::Utc::now().timestamp() - ts;
    if delta < 0 {
        return format_ts_iso(ts);
    }

    if delta < 60 {
        "just now".to_string()
    } else if delta < 3600 {
        let mins = delta / 60;
        format!("{} min{} ago", mins, if mins == 1 { "" } else { "s" })
    } else if delta < 86400 {
        let hours = delta / 3600;
        format!("{} hour{} ago", hours, if hours == 1 { "" } else { "s" })
    } else if delta < 86400 * 30 {
        let days = delta / 86400;
        format!("{} day{} ago", days, if days == 1 { "" } else { "s" })
    } else {
        format_ts_iso(ts)
    }
}

fn format_ts_iso(ts: i64) -> String {
    chrono::DateTime::from_timestamp(ts, 0)
        .map(|dt| dt.format("%Y-%m-%d %H:%M").to_string())
        .unwrap_or_else(|| ts.to_string())
}
