// ==========================================
// 美业沙龙客群营销引擎 - 客群解析引擎
// ==========================================
// 红线: 空条件解析为空集（fail-closed），绝不解析为全量客户
// 红线: 多组条件独立解析后按客户ID并集去重
// ==========================================
// 职责: 声明式条件 -> 仓储筛选谓词 -> 去重客户ID集合
// 年龄区间在此换算为出生日期上下界（以解析时刻为基准）
// ==========================================

use crate::domain::segment::SegmentCriteria;
use crate::engine::scoring::ScoringEngine;
use crate::repository::customer_repo::{CustomerQuery, CustomerRepository};
use crate::repository::error::RepositoryResult;
use chrono::{Datelike, Duration, NaiveDate, NaiveDateTime};
use std::collections::{BTreeSet, HashSet};
use std::sync::Arc;
use tracing::instrument;

// ==========================================
// SegmentResolver - 客群解析引擎
// ==========================================
pub struct SegmentResolver {
    customer_repo: Arc<CustomerRepository>,
    scoring: ScoringEngine,
}

impl SegmentResolver {
    /// 创建新的客群解析引擎
    pub fn new(customer_repo: Arc<CustomerRepository>) -> Self {
        Self {
            customer_repo,
            scoring: ScoringEngine::new(),
        }
    }

    // ==========================================
    // 核心方法
    // ==========================================

    /// 解析单组条件
    ///
    /// # 参数
    /// - `now`: 解析基准时间（年龄、最近到店、RFM 窗口都以此换算）
    /// - `rfm_window_days`: RFM 统计窗口天数
    /// - `assumed_ticket`: 无金额历史时的客单价假定值
    ///
    /// # 返回
    /// 命中的客户ID（去重、按ID排序）；空条件返回空集
    #[instrument(skip(self, criteria))]
    pub fn resolve(
        &self,
        criteria: &SegmentCriteria,
        now: NaiveDateTime,
        rfm_window_days: i64,
        assumed_ticket: f64,
    ) -> RepositoryResult<Vec<String>> {
        if criteria.is_empty() {
            tracing::warn!("空的客群条件，按不命中任何客户处理");
            return Ok(Vec::new());
        }

        let query = Self::build_query(criteria, now);
        let mut ids = self.customer_repo.query_ids(&query)?;

        // RFM 命名客群作为二次过滤：先评分再按客群名收窄
        if let Some(segment_name) = &criteria.rfm_segment {
            let since = now - Duration::days(rfm_window_days);
            let inputs = self.customer_repo.load_rfm_inputs(Some(since))?;
            let scores = self.scoring.evaluate_batch(&inputs, now, assumed_ticket);

            let matched: HashSet<&str> = scores
                .iter()
                .filter(|s| s.segment_name == *segment_name)
                .map(|s| s.customer_id.as_str())
                .collect();
            ids.retain(|id| matched.contains(id.as_str()));
        }

        tracing::debug!("客群条件解析完成: matched={}", ids.len());
        Ok(ids)
    }

    /// 解析多组条件并做并集去重
    ///
    /// 每组条件独立解析；同一客户命中多组条件只计一次
    #[instrument(skip(self, criteria_list), fields(groups = criteria_list.len()))]
    pub fn resolve_union(
        &self,
        criteria_list: &[SegmentCriteria],
        now: NaiveDateTime,
        rfm_window_days: i64,
        assumed_ticket: f64,
    ) -> RepositoryResult<Vec<String>> {
        let mut union: BTreeSet<String> = BTreeSet::new();
        for criteria in criteria_list {
            let ids = self.resolve(criteria, now, rfm_window_days, assumed_ticket)?;
            union.extend(ids);
        }
        Ok(union.into_iter().collect())
    }

    // ==========================================
    // 条件 -> 谓词 翻译
    // ==========================================

    /// 声明式条件翻译为仓储筛选谓词
    ///
    /// rfm_segment 不在此处理（需要评分，见 resolve 的二次过滤）
    pub fn build_query(criteria: &SegmentCriteria, now: NaiveDateTime) -> CustomerQuery {
        let today = now.date();
        let mut query = CustomerQuery {
            gender: criteria.gender,
            churn_risk: criteria.churn_risk,
            ..Default::default()
        };

        // 年龄 -> 出生日期换算
        // 年龄下限 -> 出生日期上界；年龄上限 -> 出生日期下界
        if let Some(age) = &criteria.age {
            if let Some(min_age) = age.min {
                query.birth_date_max = Some(years_before(today, min_age));
            }
            if let Some(max_age) = age.max {
                // 恰好满 max+1 周岁的人排除在外
                query.birth_date_min = Some(years_before(today, max_age + 1) + Duration::days(1));
            }
        }

        if let Some(freq) = &criteria.frequency {
            query.min_visits = freq.min;
            query.max_visits = freq.max;
        }
        if let Some(amount) = &criteria.monetary {
            query.min_spend = amount.min;
            query.max_spend = amount.max;
        }
        if let Some(recency) = &criteria.last_visit {
            if let Some(within) = recency.within_days {
                query.last_visit_after = Some(now - Duration::days(within as i64));
            }
            if let Some(over) = recency.over_days {
                query.last_visit_before = Some(now - Duration::days(over as i64));
            }
        }
        if let Some(tags) = &criteria.tags_all {
            query.tags_all = tags.clone();
        }
        if let Some(interval) = &criteria.visit_interval_days {
            query.visit_interval_min = interval.min;
            query.visit_interval_max = interval.max;
        }

        query
    }
}

/// 基准日往前推 N 年
///
/// 闰日（2月29日）在平年回退到 3月1日
fn years_before(date: NaiveDate, years: u32) -> NaiveDate {
    let target_year = date.year() - years as i32;
    NaiveDate::from_ymd_opt(target_year, date.month(), date.day())
        .or_else(|| NaiveDate::from_ymd_opt(target_year, 3, 1))
        .unwrap_or(date)
}
