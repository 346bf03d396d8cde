// ==========================================
// 美业沙龙客群营销引擎 - 数据仓储层
// ==========================================
// 红线: Repository 不含业务逻辑
// 职责: 提供数据访问接口,屏蔽数据库细节
// 约束: 所有查询使用参数化,防止 SQL 注入
// ==========================================

pub mod campaign_repo;
pub mod customer_repo;
pub mod db_utils;
pub mod delivery_event_repo;
pub mod dispatch_job_repo;
pub mod error;
pub mod segment_repo;

// 重导出核心仓储
pub use campaign_repo::{CampaignRepository, FanoutOutcome};
pub use customer_repo::{CustomerQuery, CustomerRepository, RfmInput};
pub use delivery_event_repo::{DailyDeliveryPoint, DeliveryCounts, DeliveryEventRepository};
pub use dispatch_job_repo::{DispatchJobRepository, QueueStats};
pub use error::{RepositoryError, RepositoryResult};
pub use segment_repo::SegmentRepository;
