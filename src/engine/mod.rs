// ==========================================
// 美业沙龙客群营销引擎 - 引擎层
// ==========================================
// 职责: 实现业务规则引擎（评分、解析、渲染、调度、聚合）
// 红线: 评分与渲染为纯函数；筛选 SQL 的拼装收敛在仓储层
// ==========================================

pub mod analytics;
pub mod repositories;
pub mod scheduler;
pub mod scoring;
pub mod segmenting;
pub mod templating;

// 重导出核心引擎
pub use analytics::{AnalyticsAggregator, CampaignAnalytics};
pub use repositories::EngineRepositories;
pub use scheduler::{CampaignScheduler, SchedulerSettings};
pub use scoring::ScoringEngine;
pub use segmenting::SegmentResolver;
pub use templating::{TemplateContext, Templater};
