// ==========================================
// 美业沙龙客群营销引擎 - API 层
// ==========================================
// 职责: 提供业务 API 门面，供宿主程序/前端调用
// ==========================================

pub mod error;
pub mod analytics_api;
pub mod campaign_api;
pub mod segment_api;
pub mod validator;

// 重导出核心类型
pub use error::{ApiError, ApiResult, ApiWarning, ValidationViolation};
pub use analytics_api::AnalyticsApi;
pub use campaign_api::{CampaignApi, CreateCampaignRequest};
pub use segment_api::{CreateSegmentRequest, CreateSegmentResponse, SegmentApi};
