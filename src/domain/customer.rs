// ==========================================
// 美业沙龙客群营销引擎 - 客户领域模型
// ==========================================
// 职责: 客户主档 + 消费记录 + RFM 评分值对象
// 红线: 客户主档由门店端维护，本引擎只读
// ==========================================

use crate::domain::types::{ChannelKind, ChurnRiskLevel, Gender};
use chrono::{Datelike, NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};

// ==========================================
// Customer - 客户主档
// ==========================================
// 对齐: schema customer 表
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Customer {
    // ===== 主键 =====
    pub customer_id: String,

    // ===== 基础资料 =====
    pub name: String,                 // 姓名
    pub gender: Option<Gender>,       // 性别
    pub birth_date: Option<NaiveDate>, // 出生日期
    pub phone: Option<String>,        // 手机号

    // ===== 渠道外部账号 =====
    pub line_user_id: Option<String>,      // LINE userId
    pub instagram_user_id: Option<String>, // Instagram 账号ID

    // ===== 流失风险列（门店端维护）=====
    pub visit_interval_days: Option<i64>,       // 平均到店间隔（天）
    pub churn_risk_level: Option<ChurnRiskLevel>, // 流失风险等级

    // ===== 时间戳 =====
    pub registered_at: NaiveDateTime,
    pub updated_at: NaiveDateTime,
}

impl Customer {
    /// 取指定渠道的外部账号ID
    ///
    /// # 返回
    /// - `Some(id)`: 客户绑定了该渠道
    /// - `None`: 未绑定（派发时视为永久失败）
    pub fn external_id_for(&self, channel: ChannelKind) -> Option<&str> {
        match channel {
            ChannelKind::Line => self.line_user_id.as_deref(),
            ChannelKind::Instagram => self.instagram_user_id.as_deref(),
        }
    }

    /// 计算某一天的周岁年龄
    ///
    /// # 参数
    /// - `today`: 计算基准日
    ///
    /// # 返回
    /// - `Some(age)`: 有出生日期
    /// - `None`: 出生日期未填写
    pub fn age_on(&self, today: NaiveDate) -> Option<i32> {
        let birth = self.birth_date?;
        let mut age = today.year() - birth.year();
        if (today.month(), today.day()) < (birth.month(), birth.day()) {
            age -= 1;
        }
        Some(age)
    }
}

// ==========================================
// VisitRecord - 消费记录
// ==========================================
// 对齐: schema customer_transaction 表
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VisitRecord {
    pub transaction_id: String,
    pub customer_id: String,
    pub visited_at: NaiveDateTime, // 到店时间
    pub amount: f64,               // 消费金额
    pub menu_name: Option<String>, // 项目名称
    pub staff_name: Option<String>, // 服务人员
}

// ==========================================
// CustomerProfile - 模板渲染上下文快照
// ==========================================
// 一次性从仓储取出，渲染过程不再触库
#[derive(Debug, Clone)]
pub struct CustomerProfile {
    pub customer: Customer,
    pub tags: Vec<String>,
    /// 最近若干次到店（按时间倒序）
    pub recent_visits: Vec<VisitRecord>,
}

impl CustomerProfile {
    /// 最近一次到店记录
    pub fn last_visit(&self) -> Option<&VisitRecord> {
        self.recent_visits.first()
    }

    /// 最近一次消费的项目名称
    pub fn last_menu_name(&self) -> Option<&str> {
        self.recent_visits
            .iter()
            .find_map(|v| v.menu_name.as_deref())
    }
}

// ==========================================
// RfmScore - RFM 评分值对象
// ==========================================
// 派生数据，不落库；每次评分基于当前消费记录重算
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RfmScore {
    pub customer_id: String,

    // ===== 原始指标 =====
    pub recency_days: i64, // 距最近一次消费的天数
    pub frequency: u32,    // 统计窗口内消费次数
    pub monetary: f64,     // 统计窗口内消费总额

    // ===== 1-5 分档 =====
    pub r_score: u8,
    pub f_score: u8,
    pub m_score: u8,

    // ===== 组合结果 =====
    pub code: String,         // 三位评分码，如 "545"
    pub segment_name: String, // 命名客群，如 "Champions"
}

impl RfmScore {
    /// 三位评分码
    pub fn make_code(r: u8, f: u8, m: u8) -> String {
        format!("{}{}{}", r, f, m)
    }
}
