// ==========================================
// 美业沙龙客群营销引擎 - 引擎层仓储聚合
// ==========================================
// 职责: 聚合活动调度与派发所需的全部 Repository
// 目标: 减少引擎构造函数参数数量
// ==========================================

use std::sync::Arc;

use crate::repository::{
    CampaignRepository, CustomerRepository, DeliveryEventRepository, DispatchJobRepository,
    SegmentRepository,
};

/// 营销引擎仓储集合
///
/// 聚合活动调度、派发执行、分析聚合所需的全部 Repository，简化依赖注入。
///
/// # 包含的仓储
/// - `customer_repo`: 客户主档 + 消费记录
/// - `segment_repo`: 已保存客群
/// - `campaign_repo`: 活动与计数器
/// - `dispatch_job_repo`: 派发任务队列
/// - `delivery_event_repo`: 送达事件
#[derive(Clone)]
pub struct EngineRepositories {
    pub customer_repo: Arc<CustomerRepository>,
    pub segment_repo: Arc<SegmentRepository>,
    pub campaign_repo: Arc<CampaignRepository>,
    pub dispatch_job_repo: Arc<DispatchJobRepository>,
    pub delivery_event_repo: Arc<DeliveryEventRepository>,
}

impl EngineRepositories {
    /// 创建新的仓储集合
    pub fn new(
        customer_repo: Arc<CustomerRepository>,
        segment_repo: Arc<SegmentRepository>,
        campaign_repo: Arc<CampaignRepository>,
        dispatch_job_repo: Arc<DispatchJobRepository>,
        delivery_event_repo: Arc<DeliveryEventRepository>,
    ) -> Self {
        Self {
            customer_repo,
            segment_repo,
            campaign_repo,
            dispatch_job_repo,
            delivery_event_repo,
        }
    }
}
