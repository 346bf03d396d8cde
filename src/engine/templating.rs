// ==========================================
// 美业沙龙客群营销引擎 - 消息模板引擎
// ==========================================
// 红线: 渲染纯函数、无副作用，同一上下文快照多次渲染结果一致
// 红线: 变量缺失按空串或文档化默认值降级，绝不抛错阻断发送
// ==========================================
// 职责: 命名占位符模板 -> 个性化消息文本
// 上下文: 客户快照 + 门店信息 + 渲染时刻（季节/时段问候由此推导）
// ==========================================

use crate::domain::customer::CustomerProfile;
use crate::domain::types::{Season, TimeOfDay};
use crate::i18n::t;
use chrono::{Datelike, NaiveDateTime, Timelike};

// ==========================================
// 支持的模板变量
// ==========================================
// 写法: {customer_name} 这样的花括号占位符
// 校验层据此白名单拒绝未知变量；渲染层遇到未知占位符原样保留
pub const TEMPLATE_VARIABLES: &[&str] = &[
    "customer_name",   // 客户姓名，缺失时用通用敬称
    "last_visit_date", // 最近一次到店日期，无记录为空串
    "last_menu",       // 最近一次消费项目，无记录为空串
    "salon_name",      // 门店名称
    "date",            // 渲染当天日期
    "season_greeting", // 季节问候
    "time_greeting",   // 时段问候
];

// ==========================================
// TemplateContext - 渲染上下文快照
// ==========================================
// 一次性取齐，渲染过程不再触库
#[derive(Debug, Clone)]
pub struct TemplateContext<'a> {
    pub profile: &'a CustomerProfile,
    pub salon_name: &'a str,
    /// 渲染基准时间（日期、季节、时段问候由此推导）
    pub now: NaiveDateTime,
}

// ==========================================
// Templater - 消息模板引擎
// ==========================================
#[derive(Clone, Copy)]
pub struct Templater;

impl Templater {
    /// 创建新的消息模板引擎
    pub fn new() -> Self {
        Self
    }

    /// 渲染模板
    ///
    /// # 降级规则
    /// - 客户姓名缺失 -> 通用敬称（templater.honorific_default）
    /// - 到店/消费记录缺失 -> 空串
    /// - 未知占位符 -> 原样保留（创建时已被校验层拦截）
    pub fn render(&self, template: &str, ctx: &TemplateContext<'_>) -> String {
        let mut output = template.to_string();
        for name in TEMPLATE_VARIABLES {
            let placeholder = format!("{{{}}}", name);
            if output.contains(&placeholder) {
                output = output.replace(&placeholder, &self.variable_value(name, ctx));
            }
        }
        output
    }

    fn variable_value(&self, name: &str, ctx: &TemplateContext<'_>) -> String {
        match name {
            "customer_name" => {
                let n = ctx.profile.customer.name.trim();
                if n.is_empty() {
                    t("templater.honorific_default")
                } else {
                    n.to_string()
                }
            }
            "last_visit_date" => ctx
                .profile
                .last_visit()
                .map(|v| v.visited_at.format("%Y-%m-%d").to_string())
                .unwrap_or_default(),
            "last_menu" => ctx
                .profile
                .last_menu_name()
                .map(|m| m.to_string())
                .unwrap_or_else(|| t("templater.no_recent_menu")),
            "salon_name" => ctx.salon_name.to_string(),
            "date" => ctx.now.format("%Y-%m-%d").to_string(),
            "season_greeting" => match Season::from_month(ctx.now.month()) {
                Season::Spring => t("templater.season_spring"),
                Season::Summer => t("templater.season_summer"),
                Season::Autumn => t("templater.season_autumn"),
                Season::Winter => t("templater.season_winter"),
            },
            "time_greeting" => match TimeOfDay::from_hour(ctx.now.hour()) {
                TimeOfDay::Morning => t("templater.greeting_morning"),
                TimeOfDay::Afternoon => t("templater.greeting_afternoon"),
                TimeOfDay::Evening => t("templater.greeting_evening"),
            },
            _ => String::new(),
        }
    }
}

impl Default for Templater {
    fn default() -> Self {
        Self::new()
    }
}

/// 扫描模板中不在白名单内的占位符（创建校验用）
///
/// # 返回
/// 按出现顺序去重后的未知变量名（不含花括号）。
/// 含空白或嵌套花括号的片段不视为占位符。
pub fn unknown_placeholders(template: &str) -> Vec<String> {
    let mut unknown: Vec<String> = Vec::new();
    let mut rest = template;
    while let Some(open) = rest.find('{') {
        let after = &rest[open + 1..];
        let close = match after.find('}') {
            Some(c) => c,
            None => break,
        };
        let name = &after[..close];
        if !name.is_empty()
            && !name.contains('{')
            && !name.contains(char::is_whitespace)
            && !TEMPLATE_VARIABLES.contains(&name)
            && !unknown.iter().any(|u| u == name)
        {
            unknown.push(name.to_string());
        }
        rest = &after[close + 1..];
    }
    unknown
}
