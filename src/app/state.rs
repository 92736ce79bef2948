// ==========================================
// 食品批次质控核心 - 应用状态
// ==========================================
// 职责: 管理应用级别的共享状态和 API 实例
// 说明: 所有仓储共享同一个 SQLite 连接
// ==========================================

use std::sync::{Arc, Mutex};

use crate::api::inventory_api::max_retries_from;
use crate::api::{InventoryApi, LifecycleApi, QualityApi};
use crate::config::{ConfigManager, CoreConfigReader};
use crate::db::{init_schema, open_sqlite_connection};
use crate::engine::events::{OptionalEventPublisher, QualityEventPublisher};
use crate::engine::fefo_allocator::FefoAllocator;
use crate::engine::QualityRepositories;
use crate::repository::LotLedger;

/// 应用状态
///
/// 包含所有API实例和共享资源
pub struct AppState {
    /// 数据库路径
    pub db_path: String,

    /// 库存API (批次、分配、库存健康度)
    pub inventory_api: Arc<InventoryApi>,

    /// 质检API
    pub quality_api: Arc<QualityApi>,

    /// 生命周期API (工单/工序卡/收货/发货)
    pub lifecycle_api: Arc<LifecycleApi>,

    /// 配置管理器
    pub config_manager: Arc<ConfigManager>,

    /// 仓储集合 (供宿主做只读查询)
    pub repositories: QualityRepositories,
}

impl AppState {
    /// 创建新的AppState实例 (不发布质量事件)
    ///
    /// # 参数
    /// - db_path: 数据库文件路径
    ///
    /// # 返回
    /// - Ok(AppState): 应用状态实例
    /// - Err(String): 初始化错误
    pub fn new(db_path: String) -> Result<Self, String> {
        Self::with_publisher(db_path, None)
    }

    /// 创建AppState实例并挂接质量事件发布者
    ///
    /// # 说明
    /// 该方法会：
    /// 1. 打开数据库并初始化表结构(幂等)
    /// 2. 初始化所有Repository
    /// 3. 初始化分配引擎
    /// 4. 创建所有API实例
    pub fn with_publisher(
        db_path: String,
        publisher: Option<Arc<dyn QualityEventPublisher>>,
    ) -> Result<Self, String> {
        tracing::info!("初始化AppState,数据库路径: {}", db_path);

        let conn = open_sqlite_connection(&db_path).map_err(|e| format!("无法打开数据库: {}", e))?;
        init_schema(&conn).map_err(|e| format!("数据库表结构初始化失败: {}", e))?;
        let conn = Arc::new(Mutex::new(conn));

        // ==========================================
        // 初始化Repository层
        // ==========================================
        let repositories = QualityRepositories::sqlite(conn.clone());

        // 配置管理器
        let config_manager = Arc::new(
            ConfigManager::from_connection(conn).map_err(|e| format!("无法创建ConfigManager: {}", e))?,
        );
        let config: Arc<dyn CoreConfigReader> = config_manager.clone();

        // ==========================================
        // 初始化Engine层
        // ==========================================
        let max_retries = max_retries_from(config.as_ref());
        let allocator: Arc<FefoAllocator<dyn LotLedger>> =
            Arc::new(FefoAllocator::new(repositories.lots.clone()).with_max_retries(max_retries));

        let publisher = match publisher {
            Some(p) => OptionalEventPublisher::with_publisher(p),
            None => OptionalEventPublisher::none(),
        };

        // ==========================================
        // 创建API实例
        // ==========================================
        let inventory_api = Arc::new(InventoryApi::new(
            repositories.clone(),
            allocator.clone(),
            config.clone(),
        ));
        let quality_api = Arc::new(QualityApi::new(repositories.clone(), publisher.clone()));
        let lifecycle_api = Arc::new(LifecycleApi::new(
            repositories.clone(),
            allocator,
            config,
            publisher,
        ));

        tracing::info!("AppState初始化完成: allocation.max_retries={}", max_retries);

        Ok(Self {
            db_path,
            inventory_api,
            quality_api,
            lifecycle_api,
            config_manager,
            repositories,
        })
    }
}

/// 获取默认数据库路径
///
/// # 优先级
/// 1. 环境变量 FOOD_BATCH_QC_DB_PATH
/// 2. 用户数据目录下的 food-batch-qc/food_batch_qc.db
/// 3. 当前目录 ./food_batch_qc.db
pub fn get_default_db_path() -> String {
    use std::path::PathBuf;

    if let Ok(path) = std::env::var("FOOD_BATCH_QC_DB_PATH") {
        let trimmed = path.trim();
        if !trimmed.is_empty() {
            return trimmed.to_string();
        }
    }

    let mut path = PathBuf::from("./food_batch_qc.db");
    if let Some(data_dir) = dirs::data_dir() {
        let dir = data_dir.join("food-batch-qc");
        // 目录创建失败时退回当前目录
        if std::fs::create_dir_all(&dir).is_ok() {
            path = dir.join("food_batch_qc.db");
        }
    }

    path.to_string_lossy().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_get_default_db_path() {
        let path = get_default_db_path();
        assert!(path.ends_with(".db"));
    }

    #[test]
    fn test_app_state_initializes_schema() {
        let dir = tempfile::tempdir().unwrap();
        let db_path = dir.path().join("qc.db").to_string_lossy().to_string();

        let state = AppState::new(db_path.clone()).unwrap();
        assert_eq!(state.db_path, db_path);
        assert!(state.repositories.items.list_items().unwrap().is_empty());

        // 再次打开同一数据库
        assert!(AppState::new(db_path).is_ok());
    }
}
