// ==========================================
// 美业沙龙客群营销引擎 - 活动领域模型
// ==========================================
// 职责: 群发活动实体 + A/B 变体
// 红线: 计数器只能由 SQL 原子自增维护，禁止读-改-写
// ==========================================

use crate::domain::segment::SegmentCriteria;
use crate::domain::types::{CampaignStatus, ChannelKind};
use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

// ==========================================
// AbVariant - A/B 测试变体
// ==========================================
// percentage 为期望占比（0-100），允许总和有轻微漂移
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AbVariant {
    pub name: String,       // 变体名，如 "A" / "B"
    pub template: String,   // 该变体的模板文案
    pub percentage: f64,    // 期望占比（百分数）
}

// ==========================================
// Campaign - 群发活动
// ==========================================
// 对齐: schema campaign 表
// 状态机: DRAFT -> SCHEDULED -> SENDING -> COMPLETED / FAILED
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Campaign {
    // ===== 主键 =====
    pub campaign_id: String,

    // ===== 基础信息 =====
    pub name: String,
    pub template: String, // 默认模板（无 A/B 或变体未命中时使用）

    // ===== 目标与渠道 =====
    pub criteria: Vec<SegmentCriteria>, // 多组条件取并集
    pub channels: Vec<ChannelKind>,     // 派发渠道（去重后）

    // ===== 排期 =====
    pub scheduled_at: Option<NaiveDateTime>, // None = 立即发送

    // ===== A/B 测试 =====
    pub ab_variants: Option<Vec<AbVariant>>,

    // ===== 状态与计数器 =====
    pub status: CampaignStatus,
    pub recipient_count: i64, // 展开时确定的收件人数
    pub sent_count: i64,      // 成功送达任务数
    pub failed_count: i64,    // 终态失败任务数

    // ===== 时间戳 =====
    pub created_at: NaiveDateTime,
    pub updated_at: NaiveDateTime,
}

impl Campaign {
    /// 创建草稿活动
    pub fn new_draft(
        name: String,
        template: String,
        criteria: Vec<SegmentCriteria>,
        channels: Vec<ChannelKind>,
        scheduled_at: Option<NaiveDateTime>,
        ab_variants: Option<Vec<AbVariant>>,
        now: NaiveDateTime,
    ) -> Self {
        Self {
            campaign_id: Uuid::new_v4().to_string(),
            name,
            template,
            criteria,
            channels,
            scheduled_at,
            ab_variants,
            status: CampaignStatus::Draft,
            recipient_count: 0,
            sent_count: 0,
            failed_count: 0,
            created_at: now,
            updated_at: now,
        }
    }

    /// 预期任务总数 = 收件人数 × 渠道数
    pub fn expected_total(&self) -> i64 {
        self.recipient_count * self.channels.len() as i64
    }

    /// 计数器是否已覆盖全部任务（完成判定依据，仅在 SENDING 态有意义）
    ///
    /// 展开时命中 0 个客户的活动预期总数为 0，立即视为覆盖完毕
    pub fn counters_exhausted(&self) -> bool {
        self.sent_count + self.failed_count >= self.expected_total()
    }

    /// 取指定名称的变体模板；无 A/B 或未命中时回落默认模板
    pub fn template_for_variant(&self, variant_name: Option<&str>) -> &str {
        if let (Some(variants), Some(name)) = (self.ab_variants.as_ref(), variant_name) {
            if let Some(v) = variants.iter().find(|v| v.name == name) {
                return &v.template;
            }
        }
        &self.template
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn now() -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2025, 6, 1)
            .unwrap()
            .and_hms_opt(10, 0, 0)
            .unwrap()
    }

    #[test]
    fn test_expected_total_cross_product() {
        let mut c = Campaign::new_draft(
            "夏季回访".to_string(),
            "hi".to_string(),
            vec![SegmentCriteria::default()],
            vec![ChannelKind::Line, ChannelKind::Instagram],
            None,
            None,
            now(),
        );
        c.recipient_count = 3;
        assert_eq!(c.expected_total(), 6);

        c.sent_count = 4;
        c.failed_count = 1;
        assert!(!c.counters_exhausted());

        c.failed_count = 2;
        assert!(c.counters_exhausted());
    }

    #[test]
    fn test_zero_recipient_counters_exhausted_immediately() {
        let c = Campaign::new_draft(
            "空客群".to_string(),
            "hi".to_string(),
            vec![SegmentCriteria::default()],
            vec![ChannelKind::Line],
            None,
            None,
            now(),
        );
        assert_eq!(c.expected_total(), 0);
        assert!(c.counters_exhausted());
    }

    #[test]
    fn test_variant_template_fallback() {
        let mut c = Campaign::new_draft(
            "AB".to_string(),
            "默认文案".to_string(),
            vec![],
            vec![ChannelKind::Line],
            None,
            None,
            now(),
        );
        c.ab_variants = Some(vec![
            AbVariant {
                name: "A".to_string(),
                template: "文案A".to_string(),
                percentage: 50.0,
            },
            AbVariant {
                name: "B".to_string(),
                template: "文案B".to_string(),
                percentage: 50.0,
            },
        ]);

        assert_eq!(c.template_for_variant(Some("A")), "文案A");
        assert_eq!(c.template_for_variant(Some("C")), "默认文案");
        assert_eq!(c.template_for_variant(None), "默认文案");
    }
}
