// ==========================================
// 美业沙龙客群营销引擎 - 效果分析 API
// ==========================================
// 职责: 活动送达效果查询门面
// ==========================================

use crate::api::error::ApiResult;
use crate::engine::analytics::{AnalyticsAggregator, CampaignAnalytics};
use crate::engine::repositories::EngineRepositories;

// ==========================================
// AnalyticsApi - 效果分析 API
// ==========================================
pub struct AnalyticsApi {
    aggregator: AnalyticsAggregator,
}

impl AnalyticsApi {
    /// 创建新的AnalyticsApi实例
    pub fn new(repos: EngineRepositories) -> Self {
        Self {
            aggregator: AnalyticsAggregator::new(repos),
        }
    }

    /// 查询活动送达效果
    ///
    /// # 返回
    /// - Ok(CampaignAnalytics): 总量 + 送达率 + 按天时间序列
    ///   （活动尚无任何事件时各项为 0，不是错误）
    /// - Err(ApiError::NotFound): 活动不存在
    pub fn get_campaign_analytics(&self, campaign_id: &str) -> ApiResult<CampaignAnalytics> {
        let _perf = crate::perf::PerfGuard::new("api.get_campaign_analytics");
        Ok(self.aggregator.campaign_analytics(campaign_id)?)
    }
}
