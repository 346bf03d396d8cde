// ==========================================
// 美业沙龙客群营销引擎 - 核心库
// ==========================================
// 技术栈: Rust + Tokio + SQLite
// 系统定位: 客户分群 + 群发活动调度 (多渠道派发)
// ==========================================

// 初始化国际化系统
rust_i18n::i18n!("locales", fallback = "zh-CN");

// ==========================================
// 模块声明
// ==========================================

// 领域层 - 实体与类型
pub mod domain;

// 数据仓储层 - 数据访问
pub mod repository;

// 引擎层 - 业务规则
pub mod engine;

// 派发层 - 队列调度与渠道适配
pub mod queue;
pub mod channel;

// 配置层 - 系统配置
pub mod config;

// 数据库基础设施（连接初始化/PRAGMA 统一）
pub mod db;

// 日志系统
pub mod logging;

// 国际化
pub mod i18n;

// SQL 性能探针
pub mod perf;

// API 层 - 业务接口
pub mod api;

// 应用层 - 进程装配
pub mod app;

// ==========================================
// 重导出核心类型
// ==========================================

// 领域类型
pub use domain::types::{
    CampaignStatus, ChannelKind, ChurnRiskLevel, DeliveryStatus, Gender, JobStatus, Season,
    TimeOfDay,
};

// 领域实体
pub use domain::{
    AbVariant, Campaign, Customer, CustomerProfile, DeliveryEvent, DispatchJob, JobKind,
    RfmScore, Segment, SegmentCriteria, VisitRecord,
};

// 引擎
pub use engine::{
    AnalyticsAggregator, CampaignScheduler, EngineRepositories, ScoringEngine, SegmentResolver,
    Templater,
};

// 派发
pub use channel::{ChannelSender, SendError, SendOutcome};
pub use queue::Dispatcher;

// API
pub use api::{AnalyticsApi, CampaignApi, SegmentApi};

// ==========================================
// 常量定义
// ==========================================

// 系统版本
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

// 系统名称
pub const APP_NAME: &str = "美业沙龙客群营销引擎";

// 数据库版本
pub const DB_VERSION: &str = "v0.1";

// ==========================================
// 预编译检查
// ==========================================

// 确保编译时所有模块可见
#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_version() {
        assert!(!VERSION.is_empty());
    }
}
