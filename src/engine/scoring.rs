// ==========================================
// 美业沙龙客群营销引擎 - RFM 评分引擎
// ==========================================
// 红线: 阈值是固定常量，不随人群分布变化（跨批次、跨门店可比）
// 红线: 单个客户评分失败不中断批量，零消费客户直接排除
// ==========================================
// 职责: 计算 R/F/M 指标 + 1-5 分档 + 命名客群
// 输入: 统计窗口内的消费汇总（RfmInput）
// 输出: RfmScore 列表（派生数据，不落库）
// ==========================================

use crate::domain::customer::RfmScore;
use crate::repository::customer_repo::RfmInput;
use chrono::NaiveDateTime;
use tracing::instrument;

// ==========================================
// 固定分档阈值
// ==========================================
// R: 距最近一次消费天数，越小越好
//    <=30 -> 5, <=60 -> 4, <=90 -> 3, <=180 -> 2, 其他 -> 1
// F: 窗口内消费次数，越多越好
//    >=20 -> 5, >=10 -> 4, >=5 -> 3, >=2 -> 2, 其他 -> 1
// M: 窗口内消费总额（日元），越高越好
//    >=100000 -> 5, >=50000 -> 4, >=20000 -> 3, >=5000 -> 2, 其他 -> 1
const RECENCY_DAYS_STEPS: [i64; 4] = [30, 60, 90, 180];
const FREQUENCY_STEPS: [u32; 4] = [20, 10, 5, 2];
const MONETARY_STEPS: [f64; 4] = [100_000.0, 50_000.0, 20_000.0, 5_000.0];

/// 未命中任何客群规则时的兜底名称
pub const UNCATEGORIZED_SEGMENT: &str = "Uncategorized";

// ==========================================
// 客群规则表
// ==========================================
// 按声明顺序匹配，命中即返回（表内存在有意保留的重叠区，
// 例如 code 555 同时落在 Champions 与 Loyal，先声明者生效）
#[derive(Debug, Clone, Copy)]
pub struct SegmentRule {
    pub name: &'static str,
    /// R 分数闭区间
    pub r: (u8, u8),
    /// F 分数闭区间
    pub f: (u8, u8),
    /// M 分数闭区间
    pub m: (u8, u8),
}

impl SegmentRule {
    fn matches(&self, r: u8, f: u8, m: u8) -> bool {
        self.r.0 <= r && r <= self.r.1
            && self.f.0 <= f && f <= self.f.1
            && self.m.0 <= m && m <= self.m.1
    }
}

pub const SEGMENT_RULES: &[SegmentRule] = &[
    SegmentRule { name: "Champions",           r: (4, 5), f: (4, 5), m: (4, 5) },
    SegmentRule { name: "Loyal",               r: (3, 5), f: (4, 5), m: (1, 5) },
    SegmentRule { name: "Big Spenders",        r: (3, 5), f: (1, 5), m: (4, 5) },
    SegmentRule { name: "Potential Loyalists", r: (4, 5), f: (2, 3), m: (1, 5) },
    SegmentRule { name: "New Customers",       r: (4, 5), f: (1, 1), m: (1, 5) },
    SegmentRule { name: "Promising",           r: (3, 3), f: (1, 2), m: (1, 5) },
    SegmentRule { name: "Need Attention",      r: (3, 3), f: (3, 5), m: (1, 5) },
    SegmentRule { name: "About To Sleep",      r: (2, 3), f: (1, 2), m: (1, 5) },
    SegmentRule { name: "Can't Lose Them",     r: (1, 2), f: (4, 5), m: (4, 5) },
    SegmentRule { name: "At Risk",             r: (1, 2), f: (3, 5), m: (1, 5) },
    SegmentRule { name: "Hibernating",         r: (1, 2), f: (2, 3), m: (1, 3) },
    SegmentRule { name: "Lost",                r: (1, 1), f: (1, 1), m: (1, 5) },
];

// ==========================================
// ScoringEngine - RFM 评分引擎
// ==========================================
pub struct ScoringEngine;

impl ScoringEngine {
    /// 创建新的 RFM 评分引擎
    pub fn new() -> Self {
        Self
    }

    // ==========================================
    // 核心方法
    // ==========================================

    /// 批量评分（推荐使用）
    ///
    /// 输入已按"窗口内至少一次消费"预过滤（frequency = 0 的行在此再兜底排除）。
    ///
    /// # 参数
    /// - `now`: 评分基准时间
    /// - `assumed_ticket`: 无金额历史时的客单价假定值（monetary 替代 = frequency × assumed_ticket）
    #[instrument(skip(self, inputs), fields(count = inputs.len()))]
    pub fn evaluate_batch(
        &self,
        inputs: &[RfmInput],
        now: NaiveDateTime,
        assumed_ticket: f64,
    ) -> Vec<RfmScore> {
        inputs
            .iter()
            .filter(|input| input.frequency > 0)
            .map(|input| self.evaluate_single(input, now, assumed_ticket))
            .collect()
    }

    /// 单个客户评分
    pub fn evaluate_single(
        &self,
        input: &RfmInput,
        now: NaiveDateTime,
        assumed_ticket: f64,
    ) -> RfmScore {
        // 最近一次消费在基准时间之后时按 0 天处理（时钟偏差容忍）
        let recency_days = (now - input.last_visit_at).num_days().max(0);

        // 无金额历史 -> 按假定客单价估算
        let monetary = if input.monetary > 0.0 {
            input.monetary
        } else {
            input.frequency as f64 * assumed_ticket
        };

        let r_score = Self::score_recency(recency_days);
        let f_score = Self::score_frequency(input.frequency);
        let m_score = Self::score_monetary(monetary);

        let code = RfmScore::make_code(r_score, f_score, m_score);
        let segment_name = Self::lookup_segment(r_score, f_score, m_score).to_string();

        RfmScore {
            customer_id: input.customer_id.clone(),
            recency_days,
            frequency: input.frequency,
            monetary,
            r_score,
            f_score,
            m_score,
            code,
            segment_name,
        }
    }

    // ==========================================
    // 分档函数
    // ==========================================

    /// R 分档（天数越小分越高）
    pub fn score_recency(recency_days: i64) -> u8 {
        if recency_days <= RECENCY_DAYS_STEPS[0] {
            5
        } else if recency_days <= RECENCY_DAYS_STEPS[1] {
            4
        } else if recency_days <= RECENCY_DAYS_STEPS[2] {
            3
        } else if recency_days <= RECENCY_DAYS_STEPS[3] {
            2
        } else {
            1
        }
    }

    /// F 分档（次数越多分越高）
    pub fn score_frequency(frequency: u32) -> u8 {
        if frequency >= FREQUENCY_STEPS[0] {
            5
        } else if frequency >= FREQUENCY_STEPS[1] {
            4
        } else if frequency >= FREQUENCY_STEPS[2] {
            3
        } else if frequency >= FREQUENCY_STEPS[3] {
            2
        } else {
            1
        }
    }

    /// M 分档（金额越高分越高）
    pub fn score_monetary(monetary: f64) -> u8 {
        if monetary >= MONETARY_STEPS[0] {
            5
        } else if monetary >= MONETARY_STEPS[1] {
            4
        } else if monetary >= MONETARY_STEPS[2] {
            3
        } else if monetary >= MONETARY_STEPS[3] {
            2
        } else {
            1
        }
    }

    /// 按声明顺序查客群规则表，未命中返回 Uncategorized
    pub fn lookup_segment(r: u8, f: u8, m: u8) -> &'static str {
        SEGMENT_RULES
            .iter()
            .find(|rule| rule.matches(r, f, m))
            .map(|rule| rule.name)
            .unwrap_or(UNCATEGORIZED_SEGMENT)
    }
}

impl Default for ScoringEngine {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn base_now() -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2025, 6, 1)
            .unwrap()
            .and_hms_opt(12, 0, 0)
            .unwrap()
    }

    fn make_input(id: &str, days_ago: i64, frequency: u32, monetary: f64) -> RfmInput {
        RfmInput {
            customer_id: id.to_string(),
            last_visit_at: base_now() - chrono::Duration::days(days_ago),
            frequency,
            monetary,
        }
    }

    // ==========================================
    // 场景1: 分档边界
    // ==========================================
    #[test]
    fn test_recency_score_boundaries() {
        assert_eq!(ScoringEngine::score_recency(0), 5);
        assert_eq!(ScoringEngine::score_recency(30), 5);
        assert_eq!(ScoringEngine::score_recency(31), 4);
        assert_eq!(ScoringEngine::score_recency(60), 4);
        assert_eq!(ScoringEngine::score_recency(90), 3);
        assert_eq!(ScoringEngine::score_recency(180), 2);
        assert_eq!(ScoringEngine::score_recency(181), 1);
        assert_eq!(ScoringEngine::score_recency(365), 1);
    }

    #[test]
    fn test_frequency_score_boundaries() {
        assert_eq!(ScoringEngine::score_frequency(1), 1);
        assert_eq!(ScoringEngine::score_frequency(2), 2);
        assert_eq!(ScoringEngine::score_frequency(4), 2);
        assert_eq!(ScoringEngine::score_frequency(5), 3);
        assert_eq!(ScoringEngine::score_frequency(10), 4);
        assert_eq!(ScoringEngine::score_frequency(19), 4);
        assert_eq!(ScoringEngine::score_frequency(20), 5);
    }

    #[test]
    fn test_monetary_score_boundaries() {
        assert_eq!(ScoringEngine::score_monetary(0.0), 1);
        assert_eq!(ScoringEngine::score_monetary(4_999.0), 1);
        assert_eq!(ScoringEngine::score_monetary(5_000.0), 2);
        assert_eq!(ScoringEngine::score_monetary(20_000.0), 3);
        assert_eq!(ScoringEngine::score_monetary(50_000.0), 4);
        assert_eq!(ScoringEngine::score_monetary(100_000.0), 5);
        assert_eq!(ScoringEngine::score_monetary(250_000.0), 5);
    }

    // ==========================================
    // 场景2: 评分范围与排除规则
    // ==========================================
    #[test]
    fn test_scores_always_in_range() {
        let engine = ScoringEngine::new();
        let inputs = vec![
            make_input("c1", 0, 1, 500.0),
            make_input("c2", 45, 8, 32_000.0),
            make_input("c3", 400, 30, 480_000.0),
        ];

        let scores = engine.evaluate_batch(&inputs, base_now(), 8_000.0);
        assert_eq!(scores.len(), 3);
        for s in &scores {
            assert!((1..=5).contains(&s.r_score), "r_score 越界: {:?}", s);
            assert!((1..=5).contains(&s.f_score), "f_score 越界: {:?}", s);
            assert!((1..=5).contains(&s.m_score), "m_score 越界: {:?}", s);
            assert_eq!(s.code.len(), 3);
        }
    }

    #[test]
    fn test_zero_transaction_customer_excluded() {
        let engine = ScoringEngine::new();
        let inputs = vec![make_input("c1", 10, 0, 0.0), make_input("c2", 10, 3, 9_000.0)];

        let scores = engine.evaluate_batch(&inputs, base_now(), 8_000.0);
        assert_eq!(scores.len(), 1);
        assert_eq!(scores[0].customer_id, "c2");
    }

    #[test]
    fn test_future_visit_clamped_to_zero_days() {
        let engine = ScoringEngine::new();
        let input = make_input("c1", -3, 2, 12_000.0);

        let score = engine.evaluate_single(&input, base_now(), 8_000.0);
        assert_eq!(score.recency_days, 0);
        assert_eq!(score.r_score, 5);
    }

    // ==========================================
    // 场景3: 无金额历史的替代估算
    // ==========================================
    #[test]
    fn test_assumed_ticket_substitution() {
        let engine = ScoringEngine::new();
        let input = make_input("c1", 10, 3, 0.0);

        let score = engine.evaluate_single(&input, base_now(), 8_000.0);
        assert_eq!(score.monetary, 24_000.0);
        assert_eq!(score.m_score, 3);
    }

    // ==========================================
    // 场景4: 客群规则表
    // ==========================================
    #[test]
    fn test_segment_lookup_basic() {
        assert_eq!(ScoringEngine::lookup_segment(5, 5, 5), "Champions");
        assert_eq!(ScoringEngine::lookup_segment(5, 1, 2), "New Customers");
        assert_eq!(ScoringEngine::lookup_segment(1, 4, 2), "At Risk");
        assert_eq!(ScoringEngine::lookup_segment(1, 1, 1), "Lost");
    }

    // 规则表的重叠是有意保留的：code 555 同时满足 Champions 与 Loyal，
    // 按声明顺序取先命中的 Champions。此用例固定该优先级，改表序会在这里暴露。
    #[test]
    fn test_overlapping_rules_resolved_by_declaration_order() {
        let champions = &SEGMENT_RULES[0];
        let loyal = &SEGMENT_RULES[1];
        assert!(champions.matches(5, 5, 5));
        assert!(loyal.matches(5, 5, 5));

        assert_eq!(ScoringEngine::lookup_segment(5, 5, 5), "Champions");
        // 只落在 Loyal 区间的码仍归 Loyal
        assert_eq!(ScoringEngine::lookup_segment(3, 5, 2), "Loyal");
    }

    #[test]
    fn test_unmatched_code_falls_back_to_uncategorized() {
        // r1 f2 m4 不在任何规则区间内（Hibernating 的 M 上限为 3）
        assert_eq!(ScoringEngine::lookup_segment(1, 2, 4), UNCATEGORIZED_SEGMENT);
    }

    #[test]
    fn test_full_pipeline_champion() {
        let engine = ScoringEngine::new();
        // 7 天前到店，年内 24 次，累计 30 万
        let input = make_input("c1", 7, 24, 300_000.0);

        let score = engine.evaluate_single(&input, base_now(), 8_000.0);
        assert_eq!(score.code, "555");
        assert_eq!(score.segment_name, "Champions");
    }
}
