// ==========================================
// 美业沙龙客群营销引擎 - 领域模型层
// ==========================================
// 职责: 定义领域实体、类型、业务规则接口
// 红线: 不含数据访问逻辑,不含引擎逻辑
// ==========================================

pub mod campaign;
pub mod customer;
pub mod dispatch;
pub mod segment;
pub mod types;

// 重导出核心类型
pub use campaign::{AbVariant, Campaign};
pub use customer::{Customer, CustomerProfile, RfmScore, VisitRecord};
pub use dispatch::{DeliveryEvent, DispatchJob, JobKind};
pub use segment::{AmountRange, CountRange, RecencyRange, Segment, SegmentCriteria};
pub use types::{
    CampaignStatus, ChannelKind, ChurnRiskLevel, DeliveryStatus, Gender, JobStatus, Season,
    TimeOfDay,
};
