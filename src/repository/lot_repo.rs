// ==========================================
// 食品批次质控核心 - 批次台账仓储 (SQLite)
// ==========================================
// 红线: Repository 不含业务逻辑 (FEFO 排序/选批由引擎完成)
// 并发: 扣减使用 IMMEDIATE 事务 + 条件 UPDATE (qty >= draw) 做比较交换,
//       跨进程共享同一库文件时同样成立
// ==========================================

use crate::db::open_sqlite_connection;
use crate::domain::{CommitOutcome, Lot, LotDraw, LotStatus, QTY_EPSILON};
use crate::repository::error::{RepositoryError, RepositoryResult};
use crate::repository::traits::LotLedger;
use chrono::{DateTime, NaiveDate, Utc};
use rusqlite::{params, params_from_iter, Connection, Row, TransactionBehavior};
use std::sync::{Arc, Mutex};

const LOT_COLUMNS: &str = "lot_id, item_id, warehouse_id, lot_number, qty, mfg_date, exp_date, \
                           status, source_ref, received_at, updated_at";

// ==========================================
// SqliteLotRepository - 批次台账仓储
// ==========================================
pub struct SqliteLotRepository {
    conn: Arc<Mutex<Connection>>,
}

impl SqliteLotRepository {
    /// 创建新的 SqliteLotRepository 实例
    ///
    /// # 参数
    /// - db_path: 数据库文件路径
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

    /// 获取数据库连接
    fn get_conn(&self) -> RepositoryResult<std::sync::MutexGuard<Connection>> {
        self.conn
            .lock()
            .map_err(|e| RepositoryError::LockError(e.to_string()))
    }

    fn map_row(row: &Row<'_>) -> rusqlite::Result<Lot> {
        let status_raw: String = row.get(7)?;
        let status = LotStatus::from_db_str(&status_raw).ok_or_else(|| {
            rusqlite::Error::FromSqlConversionFailure(
                7,
                rusqlite::types::Type::Text,
                format!("未知批次状态: {}", status_raw).into(),
            )
        })?;

        Ok(Lot {
            lot_id: row.get(0)?,
            item_id: row.get(1)?,
            warehouse_id: row.get(2)?,
            lot_number: row.get(3)?,
            qty: row.get(4)?,
            mfg_date: parse_date(5, row.get(5)?)?,
            exp_date: parse_date(6, row.get(6)?)?,
            status,
            source_ref: row.get(8)?,
            received_at: parse_timestamp(9, &row.get::<_, String>(9)?)?,
            updated_at: parse_timestamp(10, &row.get::<_, String>(10)?)?,
        })
    }
}

// 损坏的日期列作为转换错误上抛,不做静默替换
fn conversion_failure<E>(column: usize, err: E) -> rusqlite::Error
where
    E: std::error::Error + Send + Sync + 'static,
{
    rusqlite::Error::FromSqlConversionFailure(column, rusqlite::types::Type::Text, Box::new(err))
}

fn parse_date(column: usize, raw: Option<String>) -> rusqlite::Result<Option<NaiveDate>> {
    raw.map(|s| NaiveDate::parse_from_str(&s, "%Y-%m-%d").map_err(|e| conversion_failure(column, e)))
        .transpose()
}

fn parse_timestamp(column: usize, raw: &str) -> rusqlite::Result<DateTime<Utc>> {
    raw.parse::<DateTime<Utc>>()
        .map_err(|e| conversion_failure(column, e))
}

impl LotLedger for SqliteLotRepository {
    fn insert_lot(&self, lot: &Lot) -> RepositoryResult<()> {
        if lot.qty < 0.0 || !lot.qty.is_finite() {
            return Err(RepositoryError::FieldValueError {
                field: "qty".to_string(),
                message: format!("批次数量必须为非负有限值: {}", lot.qty),
            });
        }

        let conn = self.get_conn()?;
        let result = conn.execute(
            &format!(
                "INSERT INTO lot ({}) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)",
                LOT_COLUMNS
            ),
            params![
                lot.lot_id,
                lot.item_id,
                lot.warehouse_id,
                lot.lot_number,
                lot.qty,
                lot.mfg_date.map(|d| d.to_string()),
                lot.exp_date.map(|d| d.to_string()),
                lot.status.to_db_str(),
                lot.source_ref,
                lot.received_at.to_rfc3339(),
                lot.updated_at.to_rfc3339(),
            ],
        );

        match result {
            Ok(_) => Ok(()),
            Err(e) => match RepositoryError::from(e) {
                RepositoryError::UniqueConstraintViolation(_) => Err(RepositoryError::AlreadyExists {
                    entity: "Lot".to_string(),
                    id: lot.lot_id.clone(),
                }),
                other => Err(other),
            },
        }
    }

    fn find_lot(&self, lot_id: &str) -> RepositoryResult<Option<Lot>> {
        let conn = self.get_conn()?;
        let result = conn.query_row(
            &format!("SELECT {} FROM lot WHERE lot_id = ?1", LOT_COLUMNS),
            params![lot_id],
            Self::map_row,
        );

        match result {
            Ok(lot) => Ok(Some(lot)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    fn list_lots(&self, item_id: &str, warehouse_id: &str) -> RepositoryResult<Vec<Lot>> {
        let conn = self.get_conn()?;
        let mut stmt = conn.prepare(&format!(
            "SELECT {} FROM lot WHERE item_id = ?1 AND warehouse_id = ?2 ORDER BY lot_id",
            LOT_COLUMNS
        ))?;
        let lots = stmt
            .query_map(params![item_id, warehouse_id], Self::map_row)?
            .collect::<Result<Vec<Lot>, _>>()?;
        Ok(lots)
    }

    fn list_all_lots(&self) -> RepositoryResult<Vec<Lot>> {
        let conn = self.get_conn()?;
        let mut stmt = conn.prepare(&format!(
            "SELECT {} FROM lot ORDER BY item_id, warehouse_id, lot_id",
            LOT_COLUMNS
        ))?;
        let lots = stmt
            .query_map([], Self::map_row)?
            .collect::<Result<Vec<Lot>, _>>()?;
        Ok(lots)
    }

    fn update_status(&self, lot_id: &str, status: LotStatus) -> RepositoryResult<()> {
        let conn = self.get_conn()?;
        let affected = conn.execute(
            "UPDATE lot SET status = ?1, updated_at = ?2 WHERE lot_id = ?3",
            params![status.to_db_str(), Utc::now().to_rfc3339(), lot_id],
        )?;

        if affected == 0 {
            return Err(RepositoryError::NotFound {
                entity: "Lot".to_string(),
                id: lot_id.to_string(),
            });
        }
        Ok(())
    }

    /// 单条 UPDATE ... WHERE status IN (...) 完成检查与写入
    fn transition_status(&self, lot_id: &str, allowed_from: &[LotStatus], to: LotStatus) -> RepositoryResult<bool> {
        let conn = self.get_conn()?;
        let affected = if allowed_from.is_empty() {
            0
        } else {
            let placeholders: Vec<String> = (0..allowed_from.len()).map(|i| format!("?{}", i + 4)).collect();
            let mut values: Vec<String> = vec![
                to.to_db_str().to_string(),
                Utc::now().to_rfc3339(),
                lot_id.to_string(),
            ];
            values.extend(allowed_from.iter().map(|s| s.to_db_str().to_string()));
            conn.execute(
                &format!(
                    "UPDATE lot SET status = ?1, updated_at = ?2 WHERE lot_id = ?3 AND status IN ({})",
                    placeholders.join(", ")
                ),
                params_from_iter(values.iter()),
            )?
        };
        if affected > 0 {
            return Ok(true);
        }

        let exists = conn.query_row("SELECT 1 FROM lot WHERE lot_id = ?1", params![lot_id], |_| Ok(()));
        match exists {
            Ok(()) => Ok(false),
            Err(rusqlite::Error::QueryReturnedNoRows) => Err(RepositoryError::NotFound {
                entity: "Lot".to_string(),
                id: lot_id.to_string(),
            }),
            Err(e) => Err(e.into()),
        }
    }

    /// 原子提交一组扣减
    ///
    /// # 说明
    /// - IMMEDIATE 事务在开始时即持有写锁,其他写者在 busy_timeout 内等待
    /// - 每条 UPDATE 自带 "status = AVAILABLE AND qty >= draw" 条件,
    ///   影响行数为 0 即视为竞争失败,整组回滚
    fn commit_draws(&self, draws: &[LotDraw]) -> RepositoryResult<CommitOutcome> {
        let mut conn = self.get_conn()?;
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
        let now = Utc::now().to_rfc3339();

        for draw in draws {
            let affected = tx.execute(
                r#"UPDATE lot
                   SET qty = MAX(qty - ?1, 0), updated_at = ?2
                   WHERE lot_id = ?3 AND status = 'AVAILABLE' AND qty + ?4 >= ?1"#,
                params![draw.qty, now, draw.lot_id, QTY_EPSILON],
            )?;

            if affected == 0 {
                tx.rollback()?;
                tracing::debug!("批次扣减冲突,整组回滚: lot_id={}", draw.lot_id);
                return Ok(CommitOutcome::Conflict {
                    lot_id: draw.lot_id.clone(),
                });
            }
        }

        tx.commit()?;
        Ok(CommitOutcome::Committed)
    }
}
