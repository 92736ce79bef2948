// ==========================================
// 食品批次质控核心 - 命令行入口
// ==========================================
// 用法: food-batch-qc [DB_PATH] [AS_OF(YYYY-MM-DD)]
// 输出: 库存健康度报告 (JSON)
// ==========================================

use anyhow::{Context, Result};
use chrono::{NaiveDate, Utc};
use food_batch_qc::app::{get_default_db_path, AppState};
use food_batch_qc::logging;

fn main() -> Result<()> {
    logging::init();

    tracing::info!("==================================================");
    tracing::info!("{}", food_batch_qc::APP_NAME);
    tracing::info!("系统版本: {}", food_batch_qc::VERSION);
    tracing::info!("==================================================");

    let mut args = std::env::args().skip(1);
    let db_path = args.next().unwrap_or_else(get_default_db_path);
    let as_of = match args.next() {
        Some(raw) => NaiveDate::parse_from_str(&raw, "%Y-%m-%d")
            .with_context(|| format!("无法解析日期: {}", raw))?,
        None => Utc::now().date_naive(),
    };
    tracing::info!("使用数据库: {}, as_of={}", db_path, as_of);

    let state = AppState::new(db_path).map_err(anyhow::Error::msg)?;
    let report = state
        .inventory_api
        .stock_health_report(as_of)
        .context("库存健康度报告生成失败")?;

    tracing::info!(
        "近效期批次={}, 已过期批次={}, 补货预警={}",
        report.near_expiry.len(),
        report.expired.len(),
        report.reorder_alerts.len()
    );
    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(())
}
