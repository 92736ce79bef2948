// ==========================================
// 食品批次质控核心 - 聚合根文档仓储 (SQLite)
// ==========================================
// 存储: aggregate_doc(kind, id, revision, body_json)
// 并发: 乐观锁 (revision 字段) 防止并发更新冲突
// ==========================================

use crate::db::open_sqlite_connection;
use crate::domain::Aggregate;
use crate::repository::error::{RepositoryError, RepositoryResult};
use crate::repository::traits::AggregateStore;
use chrono::Utc;
use rusqlite::{params, Connection};
use std::marker::PhantomData;
use std::sync::{Arc, Mutex};

// ==========================================
// SqliteAggregateStore - 按 T::KIND 分区的文档存储
// ==========================================
pub struct SqliteAggregateStore<T> {
    conn: Arc<Mutex<Connection>>,
    _marker: PhantomData<fn() -> T>,
}

impl<T: Aggregate> SqliteAggregateStore<T> {
    pub fn new(db_path: &str) -> RepositoryResult<Self> {
        let conn = open_sqlite_connection(db_path)?;
        Ok(Self::from_connection(Arc::new(Mutex::new(conn))))
    }

    /// 从已有连接创建仓储实例
    pub fn from_connection(conn: Arc<Mutex<Connection>>) -> Self {
        Self {
            conn,
            _marker: PhantomData,
        }
    }

    fn get_conn(&self) -> RepositoryResult<std::sync::MutexGuard<Connection>> {
        self.conn
            .lock()
            .map_err(|e| RepositoryError::LockError(e.to_string()))
    }
}

impl<T: Aggregate> AggregateStore<T> for SqliteAggregateStore<T> {
    fn insert(&self, aggregate: &T) -> RepositoryResult<T> {
        let mut stored = aggregate.clone();
        stored.set_revision(1);
        let body = serde_json::to_string(&stored)?;

        let conn = self.get_conn()?;
        let result = conn.execute(
            r#"INSERT INTO aggregate_doc (kind, id, revision, body_json, updated_at)
               VALUES (?1, ?2, ?3, ?4, ?5)"#,
            params![
                T::KIND,
                stored.aggregate_id(),
                stored.revision(),
                body,
                Utc::now().to_rfc3339(),
            ],
        );

        match result {
            Ok(_) => Ok(stored),
            Err(e) => match RepositoryError::from(e) {
                RepositoryError::UniqueConstraintViolation(_) => Err(RepositoryError::AlreadyExists {
                    entity: T::KIND.to_string(),
                    id: stored.aggregate_id().to_string(),
                }),
                other => Err(other),
            },
        }
    }

    fn find(&self, id: &str) -> RepositoryResult<Option<T>> {
        let conn = self.get_conn()?;
        let result = conn.query_row(
            "SELECT revision, body_json FROM aggregate_doc WHERE kind = ?1 AND id = ?2",
            params![T::KIND, id],
            |row| Ok((row.get::<_, i64>(0)?, row.get::<_, String>(1)?)),
        );

        match result {
            Ok((revision, body)) => {
                let mut aggregate: T = serde_json::from_str(&body)?;
                // 以列值为准,文档内 revision 仅为冗余
                aggregate.set_revision(revision);
                Ok(Some(aggregate))
            }
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    fn list(&self) -> RepositoryResult<Vec<T>> {
        let conn = self.get_conn()?;
        let mut stmt =
            conn.prepare("SELECT revision, body_json FROM aggregate_doc WHERE kind = ?1 ORDER BY id")?;
        let rows = stmt
            .query_map(params![T::KIND], |row| {
                Ok((row.get::<_, i64>(0)?, row.get::<_, String>(1)?))
            })?
            .collect::<Result<Vec<_>, _>>()?;

        let mut aggregates = Vec::with_capacity(rows.len());
        for (revision, body) in rows {
            let mut aggregate: T = serde_json::from_str(&body)?;
            aggregate.set_revision(revision);
            aggregates.push(aggregate);
        }
        Ok(aggregates)
    }

    /// 比较交换保存
    ///
    /// # 错误
    /// - `RepositoryError::OptimisticLockFailure`: revision 不匹配 (其他请求已更新)
    /// - `RepositoryError::NotFound`: 记录不存在
    fn save(&self, aggregate: &T) -> RepositoryResult<T> {
        let expected = aggregate.revision();
        let mut stored = aggregate.clone();
        stored.set_revision(expected + 1);
        let body = serde_json::to_string(&stored)?;

        let conn = self.get_conn()?;
        let affected = conn.execute(
            r#"UPDATE aggregate_doc
               SET revision = ?1, body_json = ?2, updated_at = ?3
               WHERE kind = ?4 AND id = ?5 AND revision = ?6"#,
            params![
                stored.revision(),
                body,
                Utc::now().to_rfc3339(),
                T::KIND,
                stored.aggregate_id(),
                expected,
            ],
        )?;

        if affected == 0 {
            // 判断是记录不存在还是 revision 冲突
            let actual = conn.query_row(
                "SELECT revision FROM aggregate_doc WHERE kind = ?1 AND id = ?2",
                params![T::KIND, stored.aggregate_id()],
                |row| row.get::<_, i64>(0),
            );
            return match actual {
                Ok(actual) => Err(RepositoryError::OptimisticLockFailure {
                    entity: T::KIND.to_string(),
                    id: stored.aggregate_id().to_string(),
                    expected,
                    actual,
                }),
                Err(rusqlite::Error::QueryReturnedNoRows) => Err(RepositoryError::NotFound {
                    entity: T::KIND.to_string(),
                    id: stored.aggregate_id().to_string(),
                }),
                Err(e) => Err(e.into()),
            };
        }

        Ok(stored)
    }
}
