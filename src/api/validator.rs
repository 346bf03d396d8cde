// ==========================================
// 美业沙龙客群营销引擎 - 创建入参校验器
// ==========================================
// 职责: 客群/活动创建入参的同步校验
// 红线: 输入错误必须在创建时同步拒绝，不允许流入派发队列
// ==========================================
// 校验口径:
// - 模板占位符按 TEMPLATE_VARIABLES 白名单拦截
// - A/B 占比允许总和漂移（加权抽取自行归一化），但单项必须为正
// ==========================================

use std::collections::HashSet;

use crate::api::error::{ApiError, ApiResult, ValidationViolation};
use crate::domain::campaign::AbVariant;
use crate::domain::segment::SegmentCriteria;
use crate::domain::types::ChannelKind;
use crate::engine::scoring::{SEGMENT_RULES, UNCATEGORIZED_SEGMENT};
use crate::engine::templating::unknown_placeholders;

/// 启用 A/B 测试时的变体数下限
const MIN_AB_VARIANTS: usize = 2;

/// 校验活动创建入参
///
/// # 返回
/// - Ok(()): 校验通过
/// - Err(ApiError::CampaignValidationError): 含逐字段违规明细
pub fn validate_create_campaign(
    name: &str,
    template: &str,
    criteria: &[SegmentCriteria],
    channels: &[ChannelKind],
    ab_variants: Option<&[AbVariant]>,
) -> ApiResult<()> {
    let mut violations = Vec::new();

    if name.trim().is_empty() {
        violations.push(violation("name", "活动名称不能为空"));
    }

    validate_template_into("template", template, &mut violations);
    validate_channels_into(channels, &mut violations);
    validate_criteria_into(criteria, &mut violations);

    if let Some(variants) = ab_variants {
        validate_ab_variants_into(variants, &mut violations);
    }

    finish(violations)
}

/// 校验客群创建入参
pub fn validate_create_segment(name: &str, criteria: &SegmentCriteria) -> ApiResult<()> {
    let mut violations = Vec::new();

    if name.trim().is_empty() {
        violations.push(violation("name", "客群名称不能为空"));
    }
    if criteria.is_empty() {
        violations.push(violation("criteria", "筛选条件不能为空"));
    }
    validate_rfm_segment_into(criteria, &mut violations);

    finish(violations)
}

// ==========================================
// 单项校验
// ==========================================

fn validate_template_into(field: &str, template: &str, violations: &mut Vec<ValidationViolation>) {
    if template.trim().is_empty() {
        violations.push(violation(field, "消息模板不能为空"));
        return;
    }
    for unknown in unknown_placeholders(template) {
        violations.push(violation(
            field,
            &format!("未知模板变量: {{{}}}", unknown),
        ));
    }
}

fn validate_channels_into(channels: &[ChannelKind], violations: &mut Vec<ValidationViolation>) {
    if channels.is_empty() {
        violations.push(violation("channels", "至少选择一个发送渠道"));
        return;
    }
    let mut seen = HashSet::new();
    for channel in channels {
        if !seen.insert(channel.to_db_str()) {
            violations.push(violation("channels", &format!("渠道重复: {}", channel)));
        }
    }
}

fn validate_criteria_into(criteria: &[SegmentCriteria], violations: &mut Vec<ValidationViolation>) {
    if criteria.is_empty() {
        violations.push(violation("criteria", "至少需要一组筛选条件"));
        return;
    }
    for (idx, criterion) in criteria.iter().enumerate() {
        if criterion.is_empty() {
            violations.push(violation(
                "criteria",
                &format!("第{}组筛选条件为空", idx + 1),
            ));
        }
        validate_rfm_segment_into(criterion, violations);
    }
}

fn validate_rfm_segment_into(criterion: &SegmentCriteria, violations: &mut Vec<ValidationViolation>) {
    if let Some(segment) = criterion.rfm_segment.as_deref() {
        let known = segment == UNCATEGORIZED_SEGMENT
            || SEGMENT_RULES.iter().any(|rule| rule.name == segment);
        if !known {
            violations.push(violation(
                "criteria",
                &format!("未知的RFM分层名称: {}", segment),
            ));
        }
    }
}

fn validate_ab_variants_into(variants: &[AbVariant], violations: &mut Vec<ValidationViolation>) {
    if variants.len() < MIN_AB_VARIANTS {
        violations.push(violation(
            "ab_variants",
            &format!("A/B 测试至少需要{}个变体", MIN_AB_VARIANTS),
        ));
    }

    let mut seen = HashSet::new();
    for variant in variants {
        if variant.name.trim().is_empty() {
            violations.push(violation("ab_variants", "变体名称不能为空"));
        } else if !seen.insert(variant.name.as_str()) {
            violations.push(violation(
                "ab_variants",
                &format!("变体名称重复: {}", variant.name),
            ));
        }

        if variant.percentage <= 0.0 {
            violations.push(violation(
                "ab_variants",
                &format!("变体{}占比必须为正数", variant.name),
            ));
        }

        validate_template_into("ab_variants", &variant.template, violations);
    }
}

// ==========================================
// 辅助
// ==========================================

fn violation(field: &str, reason: &str) -> ValidationViolation {
    ValidationViolation {
        field: field.to_string(),
        reason: reason.to_string(),
    }
}

fn finish(violations: Vec<ValidationViolation>) -> ApiResult<()> {
    if violations.is_empty() {
        Ok(())
    } else {
        Err(ApiError::CampaignValidationError {
            reason: format!("共{}项校验未通过", violations.len()),
            violations,
        })
    }
}
