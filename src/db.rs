// ==========================================
// 食品批次质控核心 - SQLite 连接初始化
// ==========================================
// 目标:
// - 统一所有 Connection::open 的 PRAGMA 行为
// - 统一 busy_timeout,减少并发写入时的偶发 busy 错误
// - 建表幂等 (CREATE TABLE IF NOT EXISTS)
// ==========================================

use rusqlite::Connection;
use rusqlite::OptionalExtension;
use std::time::Duration;

/// 默认 busy_timeout(毫秒)
pub const DEFAULT_BUSY_TIMEOUT_MS: u64 = 5_000;

/// 当前代码所期望的 schema_version
pub const CURRENT_SCHEMA_VERSION: i64 = 1;

/// 配置 SQLite 连接的统一 PRAGMA
///
/// 说明:
/// - foreign_keys 需要"每个连接"单独开启
/// - busy_timeout 需要"每个连接"单独配置
pub fn configure_sqlite_connection(conn: &Connection) -> rusqlite::Result<()> {
    conn.execute_batch("PRAGMA foreign_keys = ON;")?;
    conn.busy_timeout(Duration::from_millis(DEFAULT_BUSY_TIMEOUT_MS))?;
    Ok(())
}

/// 打开 SQLite 连接并应用统一配置
pub fn open_sqlite_connection(db_path: &str) -> rusqlite::Result<Connection> {
    let conn = Connection::open(db_path)?;
    configure_sqlite_connection(&conn)?;
    Ok(conn)
}

/// 初始化 schema (幂等)
///
/// # 表
/// - config_kv: 全局配置
/// - item: 物料主数据
/// - lot: 批次台账 (分配热点,关系表 + 索引)
/// - aggregate_doc: 聚合根文档 (JSON + revision 乐观锁)
pub fn init_schema(conn: &Connection) -> rusqlite::Result<()> {
    conn.execute_batch(
        r#"
        CREATE TABLE IF NOT EXISTS schema_version (
            version INTEGER PRIMARY KEY,
            applied_at TEXT NOT NULL DEFAULT (datetime('now'))
        );

        CREATE TABLE IF NOT EXISTS config_kv (
            scope_id TEXT NOT NULL,
            key TEXT NOT NULL,
            value TEXT NOT NULL,
            updated_at TEXT NOT NULL DEFAULT (datetime('now')),
            PRIMARY KEY (scope_id, key)
        );

        CREATE TABLE IF NOT EXISTS item (
            item_id TEXT PRIMARY KEY,
            item_name TEXT NOT NULL,
            uom TEXT NOT NULL,
            has_batch INTEGER NOT NULL DEFAULT 1,
            has_expiry INTEGER NOT NULL DEFAULT 0,
            requires_qc INTEGER NOT NULL DEFAULT 0,
            qc_template_id TEXT,
            min_stock REAL NOT NULL DEFAULT 0,
            max_stock REAL,
            reorder_point REAL NOT NULL DEFAULT 0,
            shelf_life_days INTEGER
        );

        CREATE TABLE IF NOT EXISTS lot (
            lot_id TEXT PRIMARY KEY,
            item_id TEXT NOT NULL,
            warehouse_id TEXT NOT NULL,
            lot_number TEXT NOT NULL,
            qty REAL NOT NULL CHECK (qty >= 0),
            mfg_date TEXT,
            exp_date TEXT,
            status TEXT NOT NULL,
            source_ref TEXT,
            received_at TEXT NOT NULL,
            updated_at TEXT NOT NULL
        );

        CREATE INDEX IF NOT EXISTS idx_lot_item_wh ON lot(item_id, warehouse_id, status);

        CREATE TABLE IF NOT EXISTS aggregate_doc (
            kind TEXT NOT NULL,
            id TEXT NOT NULL,
            revision INTEGER NOT NULL,
            body_json TEXT NOT NULL,
            updated_at TEXT NOT NULL,
            PRIMARY KEY (kind, id)
        );
        "#,
    )?;

    conn.execute(
        "INSERT OR IGNORE INTO schema_version (version) VALUES (?1)",
        [CURRENT_SCHEMA_VERSION],
    )?;
    Ok(())
}

/// 读取 schema_version(若表不存在则返回 None)
pub fn read_schema_version(conn: &Connection) -> rusqlite::Result<Option<i64>> {
    let has_table: bool = conn
        .query_row(
            "SELECT 1 FROM sqlite_master WHERE type='table' AND name='schema_version' LIMIT 1",
            [],
            |_row| Ok(true),
        )
        .optional()?
        .unwrap_or(false);

    if !has_table {
        return Ok(None);
    }

    let v: Option<i64> = conn.query_row("SELECT MAX(version) FROM schema_version", [], |row| row.get(0))?;
    Ok(v)
}
