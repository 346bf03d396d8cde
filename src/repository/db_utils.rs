// ==========================================
// 美业沙龙客群营销引擎 - 数据库工具模块
// ==========================================
// 职责: 提供仓储层共用的 SQL 片段与时间格式转换
// ==========================================

use chrono::{NaiveDate, NaiveDateTime};

/// 数据库统一时间格式（与 SQLite datetime('now') 输出一致，可做字典序比较）
pub const DB_DATETIME_FMT: &str = "%Y-%m-%d %H:%M:%S";

/// 数据库日期格式
pub const DB_DATE_FMT: &str = "%Y-%m-%d";

/// 格式化时间为数据库字符串
pub fn fmt_datetime(dt: NaiveDateTime) -> String {
    dt.format(DB_DATETIME_FMT).to_string()
}

/// 解析数据库时间字符串
///
/// 兼容 "YYYY-MM-DD HH:MM:SS" 与 ISO8601 "YYYY-MM-DDTHH:MM:SS" 两种写法
pub fn parse_datetime(s: &str) -> Option<NaiveDateTime> {
    NaiveDateTime::parse_from_str(s, DB_DATETIME_FMT)
        .or_else(|_| NaiveDateTime::parse_from_str(s, "%Y-%m-%dT%H:%M:%S%.f"))
        .ok()
}

/// 格式化日期为数据库字符串
pub fn fmt_date(d: NaiveDate) -> String {
    d.format(DB_DATE_FMT).to_string()
}

/// 解析数据库日期字符串
pub fn parse_date(s: &str) -> Option<NaiveDate> {
    NaiveDate::parse_from_str(s, DB_DATE_FMT).ok()
}

/// 构建 IN 子句的 SQL 片段
///
/// # 返回
/// - 生成的 IN 子句片段，例如: "tag IN (?, ?, ?)"
/// - 空列表返回永假条件 "1 = 0"，确保 SQL 语法正确
pub fn build_in_clause<T: AsRef<str>>(column_name: &str, values: &[T]) -> String {
    if values.is_empty() {
        return "1 = 0".to_string();
    }

    let placeholders = values.iter().map(|_| "?").collect::<Vec<_>>().join(", ");
    format!("{} IN ({})", column_name, placeholders)
}

// ==========================================
// 单元测试
// ==========================================
