// ==========================================
// 美业沙龙客群营销引擎 - 客群领域模型
// ==========================================
// 职责: 声明式筛选条件 + 客群快照实体
// 红线: 条件一经挂到客群/活动即不可变
// 红线: 空条件视为"不命中任何客户"（fail-closed）
// ==========================================

use crate::domain::types::{ChurnRiskLevel, Gender};
use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

// ==========================================
// 数值区间
// ==========================================
// min/max 均为闭区间端点，单边可省略
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct CountRange {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub min: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max: Option<u32>,
}

impl CountRange {
    pub fn at_least(min: u32) -> Self {
        Self {
            min: Some(min),
            max: None,
        }
    }

    pub fn between(min: u32, max: u32) -> Self {
        Self {
            min: Some(min),
            max: Some(max),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct AmountRange {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub min: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max: Option<f64>,
}

// ==========================================
// 最近到店区间
// ==========================================
// within_days: 最近 N 天内来过
// over_days:   已超过 N 天没来
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct RecencyRange {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub within_days: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub over_days: Option<u32>,
}

// ==========================================
// SegmentCriteria - 声明式筛选条件
// ==========================================
// 所有子条件之间为 AND 关系；多组条件在活动层做并集
// 年龄区间在解析时换算为出生日期上下界（以解析当天为基准）
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SegmentCriteria {
    // ===== 人口属性 =====
    #[serde(skip_serializing_if = "Option::is_none")]
    pub gender: Option<Gender>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub age: Option<CountRange>, // 周岁区间

    // ===== 行为属性 =====
    #[serde(skip_serializing_if = "Option::is_none")]
    pub frequency: Option<CountRange>, // 消费次数区间
    #[serde(skip_serializing_if = "Option::is_none")]
    pub monetary: Option<AmountRange>, // 消费总额区间
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_visit: Option<RecencyRange>, // 最近到店

    // ===== 标签 =====
    // 客户需同时具备列表中的全部标签
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tags_all: Option<Vec<String>>,

    // ===== 流失风险（门店端维护列）=====
    #[serde(skip_serializing_if = "Option::is_none")]
    pub visit_interval_days: Option<CountRange>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub churn_risk: Option<ChurnRiskLevel>,

    // ===== RFM 命名客群 =====
    // 按评分引擎的命名客群做二次过滤，如 "Champions"
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rfm_segment: Option<String>,
}

impl SegmentCriteria {
    /// 是否为空条件
    ///
    /// # 返回
    /// - `true`: 未指定任何子条件，解析时不命中任何客户
    pub fn is_empty(&self) -> bool {
        self.gender.is_none()
            && self.age.is_none()
            && self.frequency.is_none()
            && self.monetary.is_none()
            && self.last_visit.is_none()
            && self.tags_all.as_ref().map_or(true, |t| t.is_empty())
            && self.visit_interval_days.is_none()
            && self.churn_risk.is_none()
            && self.rfm_segment.is_none()
    }
}

// ==========================================
// Segment - 已保存的客群
// ==========================================
// 对齐: schema segment 表（条件以 JSON 快照存储）
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Segment {
    pub segment_id: String,
    pub name: String,
    pub criteria: SegmentCriteria,
    pub created_at: NaiveDateTime,
    pub updated_at: NaiveDateTime,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_criteria_detection() {
        // 全空条件
        let c = SegmentCriteria::default();
        assert!(c.is_empty());

        // 空标签列表仍视为空条件
        let c = SegmentCriteria {
            tags_all: Some(vec![]),
            ..Default::default()
        };
        assert!(c.is_empty());

        // 任一子条件存在即非空
        let c = SegmentCriteria {
            frequency: Some(CountRange::at_least(10)),
            ..Default::default()
        };
        assert!(!c.is_empty());
    }

    #[test]
    fn test_criteria_json_roundtrip() {
        let c = SegmentCriteria {
            gender: Some(Gender::Female),
            age: Some(CountRange::between(20, 39)),
            frequency: Some(CountRange::at_least(3)),
            tags_all: Some(vec!["染发".to_string()]),
            ..Default::default()
        };
        let json = serde_json::to_string(&c).unwrap();
        // 省略字段不应出现在 JSON 中
        assert!(!json.contains("monetary"));
        let back: SegmentCriteria = serde_json::from_str(&json).unwrap();
        assert_eq!(back, c);
    }
}
