// ==========================================
// 美业沙龙客群营销引擎 - 领域类型定义
// ==========================================
// 职责: 状态机枚举与基础值类型
// 红线: 序列化格式 SCREAMING_SNAKE_CASE (与数据库一致)
// ==========================================

use serde::{Deserialize, Serialize};
use std::fmt;

// ==========================================
// 派发渠道 (Channel Kind)
// ==========================================
// 每个渠道对应客户主档上的一个外部账号字段
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ChannelKind {
    Line,      // LINE 推送
    Instagram, // Instagram 私信
}

impl fmt::Display for ChannelKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ChannelKind::Line => write!(f, "LINE"),
            ChannelKind::Instagram => write!(f, "INSTAGRAM"),
        }
    }
}

impl ChannelKind {
    /// 从字符串解析渠道
    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_uppercase().as_str() {
            "LINE" => Some(ChannelKind::Line),
            "INSTAGRAM" => Some(ChannelKind::Instagram),
            _ => None,
        }
    }

    /// 转换为数据库存储的字符串
    pub fn to_db_str(&self) -> &'static str {
        match self {
            ChannelKind::Line => "LINE",
            ChannelKind::Instagram => "INSTAGRAM",
        }
    }
}

// ==========================================
// 活动状态 (Campaign Status)
// ==========================================
// 状态机: DRAFT -> SCHEDULED -> SENDING -> COMPLETED
//         SENDING -> FAILED (批次级不可恢复错误)
// 红线: SENDING 只能进入一次（以活动ID为幂等键）
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CampaignStatus {
    Draft,     // 草稿
    Scheduled, // 已排期（延迟发送）
    Sending,   // 派发中
    Completed, // 已完成
    Failed,    // 批次失败
}

impl fmt::Display for CampaignStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CampaignStatus::Draft => write!(f, "DRAFT"),
            CampaignStatus::Scheduled => write!(f, "SCHEDULED"),
            CampaignStatus::Sending => write!(f, "SENDING"),
            CampaignStatus::Completed => write!(f, "COMPLETED"),
            CampaignStatus::Failed => write!(f, "FAILED"),
        }
    }
}

impl CampaignStatus {
    /// 从字符串解析状态
    pub fn from_str(s: &str) -> Self {
        match s.to_uppercase().as_str() {
            "SCHEDULED" => CampaignStatus::Scheduled,
            "SENDING" => CampaignStatus::Sending,
            "COMPLETED" => CampaignStatus::Completed,
            "FAILED" => CampaignStatus::Failed,
            _ => CampaignStatus::Draft, // 默认值
        }
    }

    /// 转换为数据库存储的字符串
    pub fn to_db_str(&self) -> &'static str {
        match self {
            CampaignStatus::Draft => "DRAFT",
            CampaignStatus::Scheduled => "SCHEDULED",
            CampaignStatus::Sending => "SENDING",
            CampaignStatus::Completed => "COMPLETED",
            CampaignStatus::Failed => "FAILED",
        }
    }

    /// 是否允许进入 SENDING（展开收件人、生成派发任务）
    pub fn can_enter_sending(&self) -> bool {
        matches!(self, CampaignStatus::Draft | CampaignStatus::Scheduled)
    }

    /// 是否终态
    pub fn is_terminal(&self) -> bool {
        matches!(self, CampaignStatus::Completed | CampaignStatus::Failed)
    }
}

// ==========================================
// 派发任务状态 (Job Status)
// ==========================================
// PENDING -> RUNNING -> COMPLETED
//                    -> PENDING (可重试失败, 退避后)
//                    -> FAILED  (重试耗尽 / 永久失败)
// PENDING -> CANCELLED (仅排队中可取消)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum JobStatus {
    Pending,   // 排队中
    Running,   // 执行中
    Completed, // 已完成
    Failed,    // 已失败（终态）
    Cancelled, // 已取消
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            JobStatus::Pending => write!(f, "PENDING"),
            JobStatus::Running => write!(f, "RUNNING"),
            JobStatus::Completed => write!(f, "COMPLETED"),
            JobStatus::Failed => write!(f, "FAILED"),
            JobStatus::Cancelled => write!(f, "CANCELLED"),
        }
    }
}

impl JobStatus {
    /// 从字符串解析状态
    pub fn from_str(s: &str) -> Self {
        match s.to_uppercase().as_str() {
            "RUNNING" => JobStatus::Running,
            "COMPLETED" => JobStatus::Completed,
            "FAILED" => JobStatus::Failed,
            "CANCELLED" => JobStatus::Cancelled,
            _ => JobStatus::Pending, // 默认值
        }
    }

    /// 转换为数据库存储的字符串
    pub fn to_db_str(&self) -> &'static str {
        match self {
            JobStatus::Pending => "PENDING",
            JobStatus::Running => "RUNNING",
            JobStatus::Completed => "COMPLETED",
            JobStatus::Failed => "FAILED",
            JobStatus::Cancelled => "CANCELLED",
        }
    }
}

// ==========================================
// 送达事件状态 (Delivery Status)
// ==========================================
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DeliveryStatus {
    Sent,   // 发送成功
    Failed, // 终态失败
}

impl fmt::Display for DeliveryStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DeliveryStatus::Sent => write!(f, "SENT"),
            DeliveryStatus::Failed => write!(f, "FAILED"),
        }
    }
}

impl DeliveryStatus {
    /// 从字符串解析状态
    pub fn from_str(s: &str) -> Self {
        match s.to_uppercase().as_str() {
            "SENT" => DeliveryStatus::Sent,
            _ => DeliveryStatus::Failed,
        }
    }

    /// 转换为数据库存储的字符串
    pub fn to_db_str(&self) -> &'static str {
        match self {
            DeliveryStatus::Sent => "SENT",
            DeliveryStatus::Failed => "FAILED",
        }
    }
}

// ==========================================
// 性别 (Gender)
// ==========================================
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Gender {
    Female, // 女
    Male,   // 男
    Other,  // 其他/未填写
}

impl fmt::Display for Gender {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Gender::Female => write!(f, "FEMALE"),
            Gender::Male => write!(f, "MALE"),
            Gender::Other => write!(f, "OTHER"),
        }
    }
}

impl Gender {
    /// 从字符串解析性别
    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_uppercase().as_str() {
            "FEMALE" => Some(Gender::Female),
            "MALE" => Some(Gender::Male),
            "OTHER" => Some(Gender::Other),
            _ => None,
        }
    }

    /// 转换为数据库存储的字符串
    pub fn to_db_str(&self) -> &'static str {
        match self {
            Gender::Female => "FEMALE",
            Gender::Male => "MALE",
            Gender::Other => "OTHER",
        }
    }
}

// ==========================================
// 流失风险等级 (Churn Risk Level)
// ==========================================
// 由门店端根据到店间隔维护，本引擎只作为筛选条件使用
// 顺序: Low < Medium < High
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ChurnRiskLevel {
    Low,    // 正常
    Medium, // 关注
    High,   // 高流失风险
}

impl fmt::Display for ChurnRiskLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ChurnRiskLevel::Low => write!(f, "LOW"),
            ChurnRiskLevel::Medium => write!(f, "MEDIUM"),
            ChurnRiskLevel::High => write!(f, "HIGH"),
        }
    }
}

impl ChurnRiskLevel {
    /// 从字符串解析风险等级
    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_uppercase().as_str() {
            "LOW" => Some(ChurnRiskLevel::Low),
            "MEDIUM" => Some(ChurnRiskLevel::Medium),
            "HIGH" => Some(ChurnRiskLevel::High),
            _ => None,
        }
    }

    /// 转换为数据库存储的字符串
    pub fn to_db_str(&self) -> &'static str {
        match self {
            ChurnRiskLevel::Low => "LOW",
            ChurnRiskLevel::Medium => "MEDIUM",
            ChurnRiskLevel::High => "HIGH",
        }
    }
}

// ==========================================
// 季节 (Season)
// ==========================================
// 用于模板问候语，按月份划分
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Season {
    Spring, // 3-5 月
    Summer, // 6-8 月
    Autumn, // 9-11 月
    Winter, // 12-2 月
}

impl fmt::Display for Season {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Season::Spring => write!(f, "SPRING"),
            Season::Summer => write!(f, "SUMMER"),
            Season::Autumn => write!(f, "AUTUMN"),
            Season::Winter => write!(f, "WINTER"),
        }
    }
}

impl Season {
    /// 按月份判断季节
    pub fn from_month(month: u32) -> Self {
        match month {
            3..=5 => Season::Spring,
            6..=8 => Season::Summer,
            9..=11 => Season::Autumn,
            _ => Season::Winter,
        }
    }
}

// ==========================================
// 时段 (Time Of Day)
// ==========================================
// 用于模板问候语，按小时划分
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TimeOfDay {
    Morning,   // 5-11 时
    Afternoon, // 11-17 时
    Evening,   // 17 时以后/凌晨
}

impl fmt::Display for TimeOfDay {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TimeOfDay::Morning => write!(f, "MORNING"),
            TimeOfDay::Afternoon => write!(f, "AFTERNOON"),
            TimeOfDay::Evening => write!(f, "EVENING"),
        }
    }
}

impl TimeOfDay {
    /// 按小时判断时段
    pub fn from_hour(hour: u32) -> Self {
        match hour {
            5..=10 => TimeOfDay::Morning,
            11..=16 => TimeOfDay::Afternoon,
            _ => TimeOfDay::Evening,
        }
    }
}
