// ==========================================
// 食品批次质控核心 - 聚合根版本约定
// ==========================================
// 职责: 为乐观并发 (revision 比较交换) 提供统一抽象
// 说明: 存储实现只依赖此 trait,不关心具体聚合类型
// ==========================================

use serde::de::DeserializeOwned;
use serde::Serialize;

/// 带版本号的聚合根
///
/// 保存时以调用方持有的 `revision` 作为期望值做比较交换,
/// 成功后版本号 +1;期望值不匹配即为过期状态 (StaleState)。
pub trait Aggregate: Clone + Serialize + DeserializeOwned + Send + Sync + 'static {
    /// 聚合类别 (存储分区键)
    const KIND: &'static str;

    fn aggregate_id(&self) -> &str;

    fn revision(&self) -> i64;

    fn set_revision(&mut self, revision: i64);
}
