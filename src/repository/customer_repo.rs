// ==========================================
// 美业沙龙客群营销引擎 - 客户仓储
// ==========================================
// 职责: customer / customer_tag / customer_transaction 三表的数据访问
// 红线: 不含业务逻辑，只负责数据访问；筛选谓词由客群解析引擎构造
// ==========================================

use crate::db::open_sqlite_connection;
use crate::domain::customer::{Customer, CustomerProfile, VisitRecord};
use crate::domain::types::{ChurnRiskLevel, Gender};
use crate::repository::db_utils::{
    build_in_clause, fmt_date, fmt_datetime, parse_date, parse_datetime,
};
use crate::repository::error::{RepositoryError, RepositoryResult};
use chrono::{NaiveDate, NaiveDateTime};
use rusqlite::{params, Connection, Result as SqliteResult};
use std::sync::{Arc, Mutex};

// ==========================================
// CustomerQuery - 筛选谓词
// ==========================================
// 由客群解析引擎从声明式条件翻译而来；各谓词之间为 AND 关系
// 年龄区间已在引擎侧换算为出生日期上下界
#[derive(Debug, Clone, Default)]
pub struct CustomerQuery {
    // ===== 标量谓词（WHERE）=====
    pub gender: Option<Gender>,
    pub birth_date_min: Option<NaiveDate>, // 出生日期下界（对应年龄上限）
    pub birth_date_max: Option<NaiveDate>, // 出生日期上界（对应年龄下限）
    pub tags_all: Vec<String>,             // 需同时具备的标签
    pub visit_interval_min: Option<u32>,
    pub visit_interval_max: Option<u32>,
    pub churn_risk: Option<ChurnRiskLevel>,

    // ===== 聚合谓词（HAVING）=====
    pub min_visits: Option<u32>,
    pub max_visits: Option<u32>,
    pub min_spend: Option<f64>,
    pub max_spend: Option<f64>,
    pub last_visit_after: Option<NaiveDateTime>,  // 最近 N 天内来过
    pub last_visit_before: Option<NaiveDateTime>, // 超过 N 天没来（含从未到店）
}

// ==========================================
// RfmInput - 评分引擎输入行
// ==========================================
// 仅包含至少有一笔消费记录的客户
#[derive(Debug, Clone)]
pub struct RfmInput {
    pub customer_id: String,
    pub last_visit_at: NaiveDateTime,
    pub frequency: u32,
    pub monetary: f64,
}

// ==========================================
// CustomerRepository - 客户仓储
// ==========================================
pub struct CustomerRepository {
    conn: Arc<Mutex<Connection>>,
}

impl CustomerRepository {
    /// 创建新的 CustomerRepository 实例
    ///
    /// # 参数
    /// - db_path: 数据库文件路径
    pub fn new(db_path: &str) -> RepositoryResult<Self> {
        let conn = open_sqlite_connection(db_path)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// 从已有连接创建仓储实例
    pub fn from_connection(conn: Arc<Mutex<Connection>>) -> Self {
        Self { conn }
    }

    /// 获取数据库连接
    fn get_conn(&self) -> RepositoryResult<std::sync::MutexGuard<Connection>> {
        self.conn
            .lock()
            .map_err(|e| RepositoryError::LockError(e.to_string()))
    }

    // ==========================================
    // 写入（门店端同步 / 种子数据）
    // ==========================================

    /// 批量插入客户主档（INSERT OR REPLACE，事务内）
    pub fn batch_insert_customers(&self, customers: &[Customer]) -> RepositoryResult<usize> {
        let conn = self.get_conn()?;
        let tx = conn.unchecked_transaction()?;

        let mut count = 0;
        for c in customers {
            tx.execute(
                r#"
                INSERT OR REPLACE INTO customer (
                    customer_id, name, gender, birth_date, phone,
                    line_user_id, instagram_user_id,
                    visit_interval_days, churn_risk_level,
                    registered_at, updated_at
                ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)
                "#,
                params![
                    c.customer_id,
                    c.name,
                    c.gender.map(|g| g.to_db_str()),
                    c.birth_date.map(fmt_date),
                    c.phone,
                    c.line_user_id,
                    c.instagram_user_id,
                    c.visit_interval_days,
                    c.churn_risk_level.map(|r| r.to_db_str()),
                    fmt_datetime(c.registered_at),
                    fmt_datetime(c.updated_at),
                ],
            )?;
            count += 1;
        }

        tx.commit()?;
        Ok(count)
    }

    /// 为客户打标签（已存在则忽略）
    pub fn add_tags(&self, customer_id: &str, tags: &[String]) -> RepositoryResult<usize> {
        let conn = self.get_conn()?;
        let tx = conn.unchecked_transaction()?;

        let mut count = 0;
        for tag in tags {
            count += tx.execute(
                "INSERT OR IGNORE INTO customer_tag (customer_id, tag) VALUES (?1, ?2)",
                params![customer_id, tag],
            )?;
        }

        tx.commit()?;
        Ok(count)
    }

    /// 批量插入消费记录（事务内）
    pub fn batch_insert_visits(&self, visits: &[VisitRecord]) -> RepositoryResult<usize> {
        let conn = self.get_conn()?;
        let tx = conn.unchecked_transaction()?;

        let mut count = 0;
        for v in visits {
            tx.execute(
                r#"
                INSERT OR REPLACE INTO customer_transaction (
                    transaction_id, customer_id, visited_at, amount, menu_name, staff_name
                ) VALUES (?1, ?2, ?3, ?4, ?5, ?6)
                "#,
                params![
                    v.transaction_id,
                    v.customer_id,
                    fmt_datetime(v.visited_at),
                    v.amount,
                    v.menu_name,
                    v.staff_name,
                ],
            )?;
            count += 1;
        }

        tx.commit()?;
        Ok(count)
    }

    // ==========================================
    // 读取
    // ==========================================

    /// 按 customer_id 查询客户主档
    ///
    /// # 返回
    /// - Ok(Some(Customer)): 找到记录
    /// - Ok(None): 未找到记录
    pub fn find_by_id(&self, customer_id: &str) -> RepositoryResult<Option<Customer>> {
        let conn = self.get_conn()?;
        let mut stmt = conn.prepare(
            r#"
            SELECT
                customer_id, name, gender, birth_date, phone,
                line_user_id, instagram_user_id,
                visit_interval_days, churn_risk_level,
                registered_at, updated_at
            FROM customer
            WHERE customer_id = ?1
            "#,
        )?;

        let result = stmt.query_row(params![customer_id], Self::map_customer_row);

        match result {
            Ok(c) => Ok(Some(c)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    /// 取模板渲染用的客户上下文快照
    ///
    /// # 参数
    /// - customer_id: 客户ID
    /// - recent_limit: 最近消费记录条数上限
    ///
    /// # 返回
    /// - Ok(Some(CustomerProfile)): 主档 + 标签 + 最近消费（按时间倒序）
    /// - Ok(None): 客户不存在
    pub fn get_profile(
        &self,
        customer_id: &str,
        recent_limit: u32,
    ) -> RepositoryResult<Option<CustomerProfile>> {
        let customer = match self.find_by_id(customer_id)? {
            Some(c) => c,
            None => return Ok(None),
        };

        let conn = self.get_conn()?;

        let mut tag_stmt =
            conn.prepare("SELECT tag FROM customer_tag WHERE customer_id = ?1 ORDER BY tag")?;
        let tags = tag_stmt
            .query_map(params![customer_id], |row| row.get::<_, String>(0))?
            .collect::<SqliteResult<Vec<String>>>()?;

        let mut visit_stmt = conn.prepare(
            r#"
            SELECT transaction_id, customer_id, visited_at, amount, menu_name, staff_name
            FROM customer_transaction
            WHERE customer_id = ?1
            ORDER BY visited_at DESC
            LIMIT ?2
            "#,
        )?;
        let recent_visits = visit_stmt
            .query_map(params![customer_id, recent_limit], Self::map_visit_row)?
            .collect::<SqliteResult<Vec<VisitRecord>>>()?;

        Ok(Some(CustomerProfile {
            customer,
            tags,
            recent_visits,
        }))
    }

    /// 按筛选谓词查询命中的客户ID（去重、按ID排序）
    ///
    /// # 说明
    /// - 标量谓词走 WHERE，聚合谓词走 HAVING
    /// - 标签条件要求客户同时具备全部标签（COUNT(DISTINCT tag) 校验）
    /// - "超过 N 天没来" 包含从未到店的客户
    pub fn query_ids(&self, query: &CustomerQuery) -> RepositoryResult<Vec<String>> {
        let mut where_clauses: Vec<String> = Vec::new();
        let mut having_clauses: Vec<String> = Vec::new();
        let mut params_vec: Vec<Box<dyn rusqlite::ToSql>> = Vec::new();

        // ===== 标量谓词 =====
        if let Some(gender) = query.gender {
            where_clauses.push("c.gender = ?".to_string());
            params_vec.push(Box::new(gender.to_db_str().to_string()));
        }
        if let Some(min) = query.birth_date_min {
            where_clauses.push("c.birth_date >= ?".to_string());
            params_vec.push(Box::new(fmt_date(min)));
        }
        if let Some(max) = query.birth_date_max {
            where_clauses.push("c.birth_date <= ?".to_string());
            params_vec.push(Box::new(fmt_date(max)));
        }
        if !query.tags_all.is_empty() {
            let in_clause = build_in_clause("tag", &query.tags_all);
            where_clauses.push(format!(
                "c.customer_id IN (SELECT customer_id FROM customer_tag WHERE {} \
                 GROUP BY customer_id HAVING COUNT(DISTINCT tag) = ?)",
                in_clause
            ));
            for tag in &query.tags_all {
                params_vec.push(Box::new(tag.clone()));
            }
            params_vec.push(Box::new(query.tags_all.len() as i64));
        }
        if let Some(min) = query.visit_interval_min {
            where_clauses.push("c.visit_interval_days >= ?".to_string());
            params_vec.push(Box::new(min as i64));
        }
        if let Some(max) = query.visit_interval_max {
            where_clauses.push("c.visit_interval_days <= ?".to_string());
            params_vec.push(Box::new(max as i64));
        }
        if let Some(risk) = query.churn_risk {
            where_clauses.push("c.churn_risk_level = ?".to_string());
            params_vec.push(Box::new(risk.to_db_str().to_string()));
        }

        // ===== 聚合谓词 =====
        if let Some(min) = query.min_visits {
            having_clauses.push("COUNT(t.transaction_id) >= ?".to_string());
            params_vec.push(Box::new(min as i64));
        }
        if let Some(max) = query.max_visits {
            having_clauses.push("COUNT(t.transaction_id) <= ?".to_string());
            params_vec.push(Box::new(max as i64));
        }
        if let Some(min) = query.min_spend {
            having_clauses.push("COALESCE(SUM(t.amount), 0.0) >= ?".to_string());
            params_vec.push(Box::new(min));
        }
        if let Some(max) = query.max_spend {
            having_clauses.push("COALESCE(SUM(t.amount), 0.0) <= ?".to_string());
            params_vec.push(Box::new(max));
        }
        if let Some(after) = query.last_visit_after {
            having_clauses.push("MAX(t.visited_at) >= ?".to_string());
            params_vec.push(Box::new(fmt_datetime(after)));
        }
        if let Some(before) = query.last_visit_before {
            having_clauses
                .push("(MAX(t.visited_at) IS NULL OR MAX(t.visited_at) <= ?)".to_string());
            params_vec.push(Box::new(fmt_datetime(before)));
        }

        let where_sql = if where_clauses.is_empty() {
            String::new()
        } else {
            format!("WHERE {}", where_clauses.join(" AND "))
        };
        let having_sql = if having_clauses.is_empty() {
            String::new()
        } else {
            format!("HAVING {}", having_clauses.join(" AND "))
        };

        let sql = format!(
            r#"
            SELECT c.customer_id
            FROM customer c
            LEFT JOIN customer_transaction t ON t.customer_id = c.customer_id
            {}
            GROUP BY c.customer_id
            {}
            ORDER BY c.customer_id
            "#,
            where_sql, having_sql
        );

        let conn = self.get_conn()?;
        let mut stmt = conn.prepare(&sql)?;
        let ids = stmt
            .query_map(rusqlite::params_from_iter(params_vec), |row| {
                row.get::<_, String>(0)
            })?
            .collect::<SqliteResult<Vec<String>>>()?;

        Ok(ids)
    }

    /// 取评分引擎输入（窗口内至少一笔消费的客户聚合）
    ///
    /// # 参数
    /// - since: 统计窗口起点（None 表示不限窗口）
    pub fn load_rfm_inputs(&self, since: Option<NaiveDateTime>) -> RepositoryResult<Vec<RfmInput>> {
        let conn = self.get_conn()?;

        let (sql, since_param) = match since {
            Some(s) => (
                r#"
                SELECT t.customer_id,
                       MAX(t.visited_at)            AS last_visit_at,
                       COUNT(t.transaction_id)      AS frequency,
                       COALESCE(SUM(t.amount), 0.0) AS monetary
                FROM customer_transaction t
                WHERE t.visited_at >= ?1
                GROUP BY t.customer_id
                ORDER BY t.customer_id
                "#,
                Some(fmt_datetime(s)),
            ),
            None => (
                r#"
                SELECT t.customer_id,
                       MAX(t.visited_at)            AS last_visit_at,
                       COUNT(t.transaction_id)      AS frequency,
                       COALESCE(SUM(t.amount), 0.0) AS monetary
                FROM customer_transaction t
                GROUP BY t.customer_id
                ORDER BY t.customer_id
                "#,
                None,
            ),
        };

        let mut stmt = conn.prepare(sql)?;
        let map_row = |row: &rusqlite::Row<'_>| {
            let last_visit_raw: String = row.get(1)?;
            Ok(RfmInput {
                customer_id: row.get(0)?,
                last_visit_at: parse_datetime(&last_visit_raw).unwrap_or_default(),
                frequency: row.get::<_, i64>(2)? as u32,
                monetary: row.get(3)?,
            })
        };

        let inputs = match since_param {
            Some(p) => stmt
                .query_map(params![p], map_row)?
                .collect::<SqliteResult<Vec<RfmInput>>>()?,
            None => stmt
                .query_map([], map_row)?
                .collect::<SqliteResult<Vec<RfmInput>>>()?,
        };

        Ok(inputs)
    }

    /// 客户总数
    pub fn count_all(&self) -> RepositoryResult<i64> {
        let conn = self.get_conn()?;
        let count: i64 = conn.query_row("SELECT COUNT(*) FROM customer", [], |row| row.get(0))?;
        Ok(count)
    }

    /// 标签是否存在于任何客户（客群条件的软提醒用）
    pub fn tag_exists(&self, tag: &str) -> RepositoryResult<bool> {
        let conn = self.get_conn()?;
        let count: i64 = conn.query_row(
            "SELECT COUNT(*) FROM customer_tag WHERE tag = ?1",
            params![tag],
            |row| row.get(0),
        )?;
        Ok(count > 0)
    }

    // ==========================================
    // 行映射
    // ==========================================

    fn map_customer_row(row: &rusqlite::Row<'_>) -> SqliteResult<Customer> {
        Ok(Customer {
            customer_id: row.get(0)?,
            name: row.get(1)?,
            gender: row
                .get::<_, Option<String>>(2)?
                .and_then(|s| Gender::from_str(&s)),
            birth_date: row
                .get::<_, Option<String>>(3)?
                .and_then(|s| parse_date(&s)),
            phone: row.get(4)?,
            line_user_id: row.get(5)?,
            instagram_user_id: row.get(6)?,
            visit_interval_days: row.get(7)?,
            churn_risk_level: row
                .get::<_, Option<String>>(8)?
                .and_then(|s| ChurnRiskLevel::from_str(&s)),
            registered_at: parse_datetime(&row.get::<_, String>(9)?).unwrap_or_default(),
            updated_at: parse_datetime(&row.get::<_, String>(10)?).unwrap_or_default(),
        })
    }

    fn map_visit_row(row: &rusqlite::Row<'_>) -> SqliteResult<VisitRecord> {
        Ok(VisitRecord {
            transaction_id: row.get(0)?,
            customer_id: row.get(1)?,
            visited_at: parse_datetime(&row.get::<_, String>(2)?).unwrap_or_default(),
            amount: row.get(3)?,
            menu_name: row.get(4)?,
            staff_name: row.get(5)?,
        })
    }
}
