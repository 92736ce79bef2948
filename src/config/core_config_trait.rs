// ==========================================
// 食品批次质控核心 - 配置读取 Trait
// ==========================================
// 职责: 定义引擎/API 所需的配置读取接口(不包含实现)
// 红线: 不包含配置写入、不包含业务逻辑
// 说明: 同步接口,核心逻辑不做任何等待
// ==========================================

use crate::domain::ColdChainRange;
use std::error::Error;

// ==========================================
// CoreConfigReader Trait
// ==========================================
// 实现者: ConfigManager(从 config_kv 表读取) / 测试 Mock
pub trait CoreConfigReader: Send + Sync {
    /// 分配竞争失败后的最大重试次数
    ///
    /// # 默认值
    /// - 3
    fn allocation_max_retries(&self) -> Result<u32, Box<dyn Error + Send + Sync>>;

    /// 临期预警天数
    ///
    /// # 默认值
    /// - 7
    fn near_expiry_days(&self) -> Result<i64, Box<dyn Error + Send + Sync>>;

    /// 品类冷链温控区间
    ///
    /// # 返回
    /// - Some(range): 已配置或内置默认 (CHILLED/FROZEN/AMBIENT)
    /// - None: 未知品类
    fn cold_chain_range(&self, category: &str) -> Result<Option<ColdChainRange>, Box<dyn Error + Send + Sync>>;
}

/// 内置品类温控区间
pub fn default_cold_chain_range(category: &str) -> Option<ColdChainRange> {
    match category.to_uppercase().as_str() {
        "CHILLED" => Some(ColdChainRange { min_c: 0.0, max_c: 5.0 }),
        "FROZEN" => Some(ColdChainRange { min_c: -25.0, max_c: -18.0 }),
        "AMBIENT" => Some(ColdChainRange { min_c: 10.0, max_c: 25.0 }),
        _ => None,
    }
}
