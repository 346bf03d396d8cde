// ==========================================
// 美业沙龙客群营销引擎 - 送达分析聚合
// ==========================================
// 职责: 按活动聚合送达事实（总量 + 按日序列）
// 红线: 无事件返回全零聚合，不是错误
// ==========================================

use crate::domain::types::CampaignStatus;
use crate::engine::repositories::EngineRepositories;
use crate::repository::delivery_event_repo::DailyDeliveryPoint;
use crate::repository::error::{RepositoryError, RepositoryResult};
use serde::Serialize;
use tracing::instrument;

// ==========================================
// CampaignAnalytics - 活动送达聚合
// ==========================================
#[derive(Debug, Clone, Serialize)]
pub struct CampaignAnalytics {
    pub campaign_id: String,
    pub campaign_name: String,
    pub status: CampaignStatus,

    // ===== 总量 =====
    pub recipient_count: i64,
    /// 预期任务总数 = 收件人数 × 渠道数
    pub expected_total: i64,
    pub sent_count: i64,
    pub failed_count: i64,
    /// 送达率 = sent / expected_total（预期总数为 0 时为 0.0）
    pub delivery_rate: f64,

    // ===== 按日序列 =====
    pub daily_series: Vec<DailyDeliveryPoint>,
}

// ==========================================
// AnalyticsAggregator - 分析聚合器
// ==========================================
pub struct AnalyticsAggregator {
    repos: EngineRepositories,
}

impl AnalyticsAggregator {
    /// 创建新的分析聚合器
    pub fn new(repos: EngineRepositories) -> Self {
        Self { repos }
    }

    /// 聚合某活动的送达数据
    ///
    /// 成功/失败计数以送达事件表为准（与按日序列同源），
    /// 收件人数与预期总数来自活动行。
    #[instrument(skip(self), fields(campaign_id = campaign_id))]
    pub fn campaign_analytics(&self, campaign_id: &str) -> RepositoryResult<CampaignAnalytics> {
        let campaign = self
            .repos
            .campaign_repo
            .find_by_id(campaign_id)?
            .ok_or_else(|| RepositoryError::NotFound {
                entity: "Campaign".to_string(),
                id: campaign_id.to_string(),
            })?;

        let counts = self.repos.delivery_event_repo.count_by_campaign(campaign_id)?;
        let daily_series = self.repos.delivery_event_repo.daily_series(campaign_id)?;

        let expected_total = campaign.expected_total();
        Ok(CampaignAnalytics {
            campaign_id: campaign.campaign_id.clone(),
            campaign_name: campaign.name.clone(),
            status: campaign.status,
            recipient_count: campaign.recipient_count,
            expected_total,
            sent_count: counts.sent_count,
            failed_count: counts.failed_count,
            delivery_rate: delivery_rate(counts.sent_count, expected_total),
            daily_series,
        })
    }
}

/// 送达率，预期总数为 0 时返回 0.0
fn delivery_rate(sent: i64, expected_total: i64) -> f64 {
    if expected_total <= 0 {
        0.0
    } else {
        sent as f64 / expected_total as f64
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_delivery_rate_zero_expected_is_zero() {
        assert_eq!(delivery_rate(0, 0), 0.0);
        assert_eq!(delivery_rate(5, 0), 0.0);
    }

    #[test]
    fn test_delivery_rate_ratio() {
        assert!((delivery_rate(3, 4) - 0.75).abs() < f64::EPSILON);
        assert!((delivery_rate(4, 4) - 1.0).abs() < f64::EPSILON);
    }
}
