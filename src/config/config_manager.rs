// ==========================================
// 食品批次质控核心 - 配置管理器
// ==========================================
// 职责: 配置加载、查询、覆写
// 存储: config_kv 表 (key-value + scope)
// ==========================================

use crate::config::core_config_trait::{default_cold_chain_range, CoreConfigReader};
use crate::db::open_sqlite_connection;
use crate::domain::ColdChainRange;
use rusqlite::{params, Connection};
use std::collections::HashMap;
use std::error::Error;
use std::sync::{Arc, Mutex};

type ConfigResult<T> = Result<T, Box<dyn Error + Send + Sync>>;

// ==========================================
// 配置键
// ==========================================
pub mod config_keys {
    pub const ALLOCATION_MAX_RETRIES: &str = "allocation.max_retries";
    pub const NEAR_EXPIRY_DAYS: &str = "stock.near_expiry_days";
    /// 完整键为 `cold_chain.range/{CATEGORY}`,值为 JSON: {"min_c":0,"max_c":5}
    pub const COLD_CHAIN_RANGE_PREFIX: &str = "cold_chain.range/";
}

// ==========================================
// ConfigManager - 配置管理器
// ==========================================
pub struct ConfigManager {
    conn: Arc<Mutex<Connection>>,
}

impl ConfigManager {
    /// 创建新的 ConfigManager 实例
    ///
    /// # 参数
    /// - db_path: 数据库文件路径
    pub fn new(db_path: &str) -> ConfigResult<Self> {
        let conn = open_sqlite_connection(db_path)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// 从已有连接创建 ConfigManager
    ///
    /// 说明:为保证连接行为一致,会对传入连接再次应用统一 PRAGMA(幂等)。
    pub fn from_connection(conn: Arc<Mutex<Connection>>) -> ConfigResult<Self> {
        {
            let conn_guard = conn.lock().map_err(|e| format!("锁获取失败: {}", e))?;
            crate::db::configure_sqlite_connection(&conn_guard)?;
        }

        Ok(Self { conn })
    }

    /// 从 config_kv 表读取配置值(scope_id='global')
    fn get_config_value(&self, key: &str) -> ConfigResult<Option<String>> {
        let conn = self.conn.lock().map_err(|e| format!("锁获取失败: {}", e))?;

        let result = conn.query_row(
            "SELECT value FROM config_kv WHERE scope_id = 'global' AND key = ?1",
            params![key],
            |row| row.get::<_, String>(0),
        );

        match result {
            Ok(value) => Ok(Some(value)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(Box::new(e)),
        }
    }

    /// 读取 global scope 的配置值(公开方法,供其他模块复用)
    pub fn get_global_config_value(&self, key: &str) -> ConfigResult<Option<String>> {
        self.get_config_value(key)
    }

    /// 写入 global scope 的配置值 (UPSERT)
    pub fn set_global_config_value(&self, key: &str, value: &str) -> ConfigResult<()> {
        let conn = self.conn.lock().map_err(|e| format!("锁获取失败: {}", e))?;
        conn.execute(
            "INSERT INTO config_kv (scope_id, key, value) VALUES ('global', ?1, ?2)
             ON CONFLICT(scope_id, key) DO UPDATE SET value = ?2, updated_at = datetime('now')",
            params![key, value],
        )?;
        Ok(())
    }

    /// 设置品类温控区间
    pub fn set_cold_chain_range(&self, category: &str, range: ColdChainRange) -> ConfigResult<()> {
        let key = format!(
            "{}{}",
            config_keys::COLD_CHAIN_RANGE_PREFIX,
            category.to_uppercase()
        );
        self.set_global_config_value(&key, &serde_json::to_string(&range)?)
    }

    /// 获取所有 global 配置的快照
    pub fn get_config_snapshot(&self) -> ConfigResult<HashMap<String, String>> {
        let conn = self.conn.lock().map_err(|e| format!("锁获取失败: {}", e))?;
        let mut stmt =
            conn.prepare("SELECT key, value FROM config_kv WHERE scope_id = 'global' ORDER BY key")?;

        let rows = stmt.query_map([], |row| Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?)))?;

        let mut config_map = HashMap::new();
        for row in rows {
            let (key, value) = row?;
            config_map.insert(key, value);
        }
        Ok(config_map)
    }
}

impl CoreConfigReader for ConfigManager {
    fn allocation_max_retries(&self) -> ConfigResult<u32> {
        match self.get_config_value(config_keys::ALLOCATION_MAX_RETRIES)? {
            Some(v) => Ok(v.trim().parse::<u32>()?),
            None => Ok(3),
        }
    }

    fn near_expiry_days(&self) -> ConfigResult<i64> {
        match self.get_config_value(config_keys::NEAR_EXPIRY_DAYS)? {
            Some(v) => Ok(v.trim().parse::<i64>()?),
            None => Ok(7),
        }
    }

    fn cold_chain_range(&self, category: &str) -> ConfigResult<Option<ColdChainRange>> {
        let key = format!(
            "{}{}",
            config_keys::COLD_CHAIN_RANGE_PREFIX,
            category.to_uppercase()
        );
        match self.get_config_value(&key)? {
            Some(raw) => Ok(Some(serde_json::from_str::<ColdChainRange>(&raw)?)),
            None => Ok(default_cold_chain_range(category)),
        }
    }
}
