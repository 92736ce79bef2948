// ==========================================
// Mock 配置与事件发布者 - 用于集成测试
// ==========================================

use food_batch_qc::config::{default_cold_chain_range, CoreConfigReader};
use food_batch_qc::domain::ColdChainRange;
use food_batch_qc::engine::{QualityEvent, QualityEventPublisher};
use std::collections::HashMap;
use std::error::Error;
use std::sync::Mutex;

/// Mock 配置结构
#[derive(Debug, Clone)]
pub struct MockConfig {
    pub max_retries: u32,
    pub near_expiry_days: i64,
    pub ranges: HashMap<String, ColdChainRange>,
}

impl MockConfig {
    /// 创建默认配置 (与 ConfigManager 内置默认值一致)
    pub fn default() -> Self {
        Self {
            max_retries: 3,
            near_expiry_days: 7,
            ranges: HashMap::new(),
        }
    }

    /// 创建自定义重试次数配置
    pub fn with_max_retries(max_retries: u32) -> Self {
        let mut config = Self::default();
        config.max_retries = max_retries;
        config
    }

    /// 覆写品类温控区间
    pub fn with_range(mut self, category: &str, range: ColdChainRange) -> Self {
        self.ranges.insert(category.to_uppercase(), range);
        self
    }
}

impl CoreConfigReader for MockConfig {
    fn allocation_max_retries(&self) -> Result<u32, Box<dyn Error + Send + Sync>> {
        Ok(self.max_retries)
    }

    fn near_expiry_days(&self) -> Result<i64, Box<dyn Error + Send + Sync>> {
        Ok(self.near_expiry_days)
    }

    fn cold_chain_range(&self, category: &str) -> Result<Option<ColdChainRange>, Box<dyn Error + Send + Sync>> {
        match self.ranges.get(&category.to_uppercase()) {
            Some(range) => Ok(Some(*range)),
            None => Ok(default_cold_chain_range(category)),
        }
    }
}

/// 记录型事件发布者
#[derive(Default)]
pub struct RecordingPublisher {
    events: Mutex<Vec<QualityEvent>>,
}

impl RecordingPublisher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<QualityEvent> {
        self.events.lock().expect("事件锁中毒").clone()
    }

    pub fn count_of(&self, event_type: &str) -> usize {
        self.events()
            .iter()
            .filter(|e| e.as_str() == event_type)
            .count()
    }
}

impl QualityEventPublisher for RecordingPublisher {
    fn publish(&self, event: QualityEvent) -> Result<String, Box<dyn Error + Send + Sync>> {
        let mut events = self.events.lock().map_err(|e| format!("锁获取失败: {}", e))?;
        events.push(event);
        Ok(format!("evt-{}", events.len()))
    }
}
