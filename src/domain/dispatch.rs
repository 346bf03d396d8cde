// ==========================================
// 美业沙龙客群营销引擎 - 派发领域模型
// ==========================================
// 职责: 派发任务（持久化队列条目）+ 送达事件
// 红线: 任务载荷为带判别式的枚举，处理端必须穷尽匹配
// 红线: 重试是同一逻辑任务的新尝试，不产生新任务行
// ==========================================

use crate::domain::types::{ChannelKind, DeliveryStatus, JobStatus};
use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

// ==========================================
// JobKind - 任务载荷
// ==========================================
// FIRE_CAMPAIGN: 排期到点后触发活动展开（每个排期活动恰好一条）
// SEND_MESSAGE:  单个 (客户, 渠道) 的发送任务
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum JobKind {
    FireCampaign {
        campaign_id: String,
    },
    SendMessage {
        campaign_id: String,
        customer_id: String,
        channel: ChannelKind,
        variant_name: Option<String>,
    },
}

impl JobKind {
    /// 所属活动ID
    pub fn campaign_id(&self) -> &str {
        match self {
            JobKind::FireCampaign { campaign_id } => campaign_id,
            JobKind::SendMessage { campaign_id, .. } => campaign_id,
        }
    }

    /// 数据库 kind 列取值
    pub fn to_db_str(&self) -> &'static str {
        match self {
            JobKind::FireCampaign { .. } => "FIRE_CAMPAIGN",
            JobKind::SendMessage { .. } => "SEND_MESSAGE",
        }
    }
}

// ==========================================
// DispatchJob - 派发任务
// ==========================================
// 对齐: schema dispatch_job 表
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DispatchJob {
    // ===== 主键 =====
    pub job_id: String,

    // ===== 载荷 =====
    pub kind: JobKind,

    // ===== 队列状态 =====
    pub status: JobStatus,
    pub attempt_count: i64,          // 已尝试次数
    pub max_attempts: i64,           // 尝试上限（含首次）
    pub next_attempt_at: NaiveDateTime, // 下次可领取时间
    pub last_error: Option<String>,
    pub message_id: Option<String>,  // 渠道侧消息ID（成功后写入）

    // ===== 时间戳 =====
    pub created_at: NaiveDateTime,
    pub started_at: Option<NaiveDateTime>,
    pub completed_at: Option<NaiveDateTime>,
}

impl DispatchJob {
    /// 创建排队任务
    ///
    /// # 参数
    /// - `next_attempt_at`: 首次可领取时间（含随机抖动或排期时间）
    pub fn new(
        kind: JobKind,
        max_attempts: i64,
        next_attempt_at: NaiveDateTime,
        now: NaiveDateTime,
    ) -> Self {
        Self {
            job_id: Uuid::new_v4().to_string(),
            kind,
            status: JobStatus::Pending,
            attempt_count: 0,
            max_attempts,
            next_attempt_at,
            last_error: None,
            message_id: None,
            created_at: now,
            started_at: None,
            completed_at: None,
        }
    }

    /// 失败后是否还有重试额度
    ///
    /// # 返回
    /// - `true`: attempt_count < max_attempts，可回到 PENDING
    /// - `false`: 额度耗尽，转入终态 FAILED
    pub fn can_retry(&self) -> bool {
        self.attempt_count < self.max_attempts
    }

    /// 所属活动ID
    pub fn campaign_id(&self) -> &str {
        self.kind.campaign_id()
    }
}

// ==========================================
// DeliveryEvent - 送达事件
// ==========================================
// 对齐: schema delivery_event 表（只追加，分析聚合的事实来源）
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeliveryEvent {
    pub event_id: String,
    pub campaign_id: String,
    pub customer_id: String,
    pub channel: ChannelKind,
    pub variant_name: Option<String>,
    pub status: DeliveryStatus,
    pub message_id: Option<String>,
    pub error_message: Option<String>,
    pub occurred_at: NaiveDateTime,
}

impl DeliveryEvent {
    /// 成功送达事件
    pub fn sent(
        campaign_id: &str,
        customer_id: &str,
        channel: ChannelKind,
        variant_name: Option<String>,
        message_id: String,
        occurred_at: NaiveDateTime,
    ) -> Self {
        Self {
            event_id: Uuid::new_v4().to_string(),
            campaign_id: campaign_id.to_string(),
            customer_id: customer_id.to_string(),
            channel,
            variant_name,
            status: DeliveryStatus::Sent,
            message_id: Some(message_id),
            error_message: None,
            occurred_at,
        }
    }

    /// 终态失败事件
    pub fn failed(
        campaign_id: &str,
        customer_id: &str,
        channel: ChannelKind,
        variant_name: Option<String>,
        error_message: String,
        occurred_at: NaiveDateTime,
    ) -> Self {
        Self {
            event_id: Uuid::new_v4().to_string(),
            campaign_id: campaign_id.to_string(),
            customer_id: customer_id.to_string(),
            channel,
            variant_name,
            status: DeliveryStatus::Failed,
            message_id: None,
            error_message: Some(error_message),
            occurred_at,
        }
    }
}
