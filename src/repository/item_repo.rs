// ==========================================
// 食品批次质控核心 - 物料主数据仓储 (SQLite)
// ==========================================

use crate::db::open_sqlite_connection;
use crate::domain::Item;
use crate::repository::error::{RepositoryError, RepositoryResult};
use crate::repository::traits::ItemCatalog;
use rusqlite::{params, Connection, Row};
use std::sync::{Arc, Mutex};

const ITEM_COLUMNS: &str = "item_id, item_name, uom, has_batch, has_expiry, requires_qc, \
                            qc_template_id, min_stock, max_stock, reorder_point, shelf_life_days";

pub struct SqliteItemRepository {
    conn: Arc<Mutex<Connection>>,
}

impl SqliteItemRepository {
    pub fn new(db_path: &str) -> RepositoryResult<Self> {
        let conn = open_sqlite_connection(db_path)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// 从已有连接创建仓储实例
    pub fn from_connection(conn: Arc<Mutex<Connection>>) -> Self {
        Self { conn }
    }

    fn get_conn(&self) -> RepositoryResult<std::sync::MutexGuard<Connection>> {
        self.conn
            .lock()
            .map_err(|e| RepositoryError::LockError(e.to_string()))
    }

    fn map_row(row: &Row<'_>) -> rusqlite::Result<Item> {
        Ok(Item {
            item_id: row.get(0)?,
            item_name: row.get(1)?,
            uom: row.get(2)?,
            has_batch: row.get(3)?,
            has_expiry: row.get(4)?,
            requires_qc: row.get(5)?,
            qc_template_id: row.get(6)?,
            min_stock: row.get(7)?,
            max_stock: row.get(8)?,
            reorder_point: row.get(9)?,
            shelf_life_days: row.get(10)?,
        })
    }
}

impl ItemCatalog for SqliteItemRepository {
    /// INSERT ... ON CONFLICT DO UPDATE 实现 upsert 语义
    fn upsert_item(&self, item: &Item) -> RepositoryResult<()> {
        if let Some(days) = item.shelf_life_days.filter(|d| *d < 0) {
            return Err(RepositoryError::FieldValueError {
                field: "shelf_life_days".to_string(),
                message: format!("保质期天数不能为负: {}", days),
            });
        }
        let conn = self.get_conn()?;
        conn.execute(
            &format!(
                r#"INSERT INTO item ({}) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)
                   ON CONFLICT(item_id) DO UPDATE SET
                       item_name = excluded.item_name,
                       uom = excluded.uom,
                       has_batch = excluded.has_batch,
                       has_expiry = excluded.has_expiry,
                       requires_qc = excluded.requires_qc,
                       qc_template_id = excluded.qc_template_id,
                       min_stock = excluded.min_stock,
                       max_stock = excluded.max_stock,
                       reorder_point = excluded.reorder_point,
                       shelf_life_days = excluded.shelf_life_days"#,
                ITEM_COLUMNS
            ),
            params![
                item.item_id,
                item.item_name,
                item.uom,
                item.has_batch,
                item.has_expiry,
                item.requires_qc,
                item.qc_template_id,
                item.min_stock,
                item.max_stock,
                item.reorder_point,
                item.shelf_life_days,
            ],
        )?;
        Ok(())
    }

    fn find_item(&self, item_id: &str) -> RepositoryResult<Option<Item>> {
        let conn = self.get_conn()?;
        match conn.query_row(
            &format!("SELECT {} FROM item WHERE item_id = ?1", ITEM_COLUMNS),
            params![item_id],
            Self::map_row,
        ) {
            Ok(item) => Ok(Some(item)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    fn list_items(&self) -> RepositoryResult<Vec<Item>> {
        let conn = self.get_conn()?;
        let mut stmt = conn.prepare(&format!("SELECT {} FROM item ORDER BY item_id", ITEM_COLUMNS))?;
        let items = stmt
            .query_map([], Self::map_row)?
            .collect::<Result<Vec<Item>, _>>()?;
        Ok(items)
    }
}
