// ==========================================
// 美业沙龙客群营销引擎 - 派发任务仓储
// ==========================================
// 职责: dispatch_job 表的数据访问（持久化队列）
// 红线: 领取 = 查询 + 置 RUNNING + 尝试次数+1，同一把锁内完成
// 红线: 时间比较走字符串（格式见 db_utils），领取条件 next_attempt_at <= now
// ==========================================

use crate::db::open_sqlite_connection;
use crate::domain::dispatch::{DispatchJob, JobKind};
use crate::domain::types::{ChannelKind, JobStatus};
use crate::repository::db_utils::{fmt_datetime, parse_datetime};
use crate::repository::error::{RepositoryError, RepositoryResult};
use chrono::NaiveDateTime;
use rusqlite::{params, Connection, OptionalExtension, Result as SqliteResult};
use serde::Serialize;
use std::sync::{Arc, Mutex};

const JOB_COLUMNS: &str = r#"
    job_id, kind, campaign_id, customer_id, channel, variant_name,
    status, attempt_count, max_attempts, next_attempt_at,
    last_error, message_id, created_at, started_at, completed_at
"#;

/// 插入一行派发任务
///
/// 供本仓储与活动展开事务共用，保证两条路径的列写法一致
pub(crate) fn insert_row(conn: &Connection, job: &DispatchJob) -> RepositoryResult<()> {
    let (customer_id, channel, variant_name) = match &job.kind {
        JobKind::FireCampaign { .. } => (None, None, None),
        JobKind::SendMessage {
            customer_id,
            channel,
            variant_name,
            ..
        } => (
            Some(customer_id.as_str()),
            Some(channel.to_db_str()),
            variant_name.as_deref(),
        ),
    };

    conn.execute(
        r#"
        INSERT INTO dispatch_job (
            job_id, kind, campaign_id, customer_id, channel, variant_name,
            status, attempt_count, max_attempts, next_attempt_at,
            last_error, message_id, created_at, started_at, completed_at
        ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15)
        "#,
        params![
            job.job_id,
            job.kind.to_db_str(),
            job.kind.campaign_id(),
            customer_id,
            channel,
            variant_name,
            job.status.to_db_str(),
            job.attempt_count,
            job.max_attempts,
            fmt_datetime(job.next_attempt_at),
            job.last_error,
            job.message_id,
            fmt_datetime(job.created_at),
            job.started_at.map(fmt_datetime),
            job.completed_at.map(fmt_datetime),
        ],
    )?;
    Ok(())
}

pub struct DispatchJobRepository {
    conn: Arc<Mutex<Connection>>,
}

impl DispatchJobRepository {
    /// 创建新的 DispatchJobRepository 实例
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

    fn get_conn(&self) -> RepositoryResult<std::sync::MutexGuard<Connection>> {
        self.conn
            .lock()
            .map_err(|e| RepositoryError::LockError(e.to_string()))
    }

    /// 提交任务到队列
    pub fn enqueue(&self, job: &DispatchJob) -> RepositoryResult<()> {
        let conn = self.get_conn()?;
        insert_row(&conn, job)?;
        tracing::info!(
            "派发任务已加入队列: job_id={}, kind={}, next_attempt_at={}",
            job.job_id,
            job.kind.to_db_str(),
            fmt_datetime(job.next_attempt_at)
        );
        Ok(())
    }

    /// 领取下一个到期任务
    ///
    /// 查找最早到期的 PENDING 任务并置为 RUNNING，两步在同一把锁内完成。
    /// 每次领取记一次尝试（attempt_count + 1）。
    ///
    /// # 返回
    /// - Ok(Some(job)): 领取成功，返回领取后的任务（RUNNING 状态）
    /// - Ok(None): 当前没有到期任务
    pub fn claim_next(&self, now: NaiveDateTime) -> RepositoryResult<Option<DispatchJob>> {
        let conn = self.get_conn()?;
        let now_str = fmt_datetime(now);

        let sql = format!(
            r#"
            SELECT {JOB_COLUMNS}
            FROM dispatch_job
            WHERE status = 'PENDING' AND next_attempt_at <= ?1
            ORDER BY next_attempt_at ASC, created_at ASC
            LIMIT 1
            "#
        );
        let job_opt = conn
            .query_row(&sql, params![now_str], Self::map_row)
            .optional()?;

        if let Some(mut job) = job_opt {
            conn.execute(
                r#"
                UPDATE dispatch_job
                SET status = 'RUNNING', attempt_count = attempt_count + 1, started_at = ?1
                WHERE job_id = ?2
                "#,
                params![now_str, job.job_id],
            )?;
            job.status = JobStatus::Running;
            job.attempt_count += 1;
            job.started_at = Some(now);
            Ok(Some(job))
        } else {
            Ok(None)
        }
    }

    /// 任务执行成功，置为 COMPLETED
    pub fn mark_completed(
        &self,
        job_id: &str,
        message_id: Option<&str>,
        now: NaiveDateTime,
    ) -> RepositoryResult<()> {
        let conn = self.get_conn()?;
        conn.execute(
            r#"
            UPDATE dispatch_job
            SET status = 'COMPLETED', message_id = ?1, completed_at = ?2
            WHERE job_id = ?3
            "#,
            params![message_id, fmt_datetime(now), job_id],
        )?;
        Ok(())
    }

    /// 可重试失败，回到 PENDING 并推迟下次领取时间
    pub fn mark_retry(
        &self,
        job_id: &str,
        error: &str,
        next_attempt_at: NaiveDateTime,
    ) -> RepositoryResult<()> {
        let conn = self.get_conn()?;
        conn.execute(
            r#"
            UPDATE dispatch_job
            SET status = 'PENDING', last_error = ?1, next_attempt_at = ?2
            WHERE job_id = ?3
            "#,
            params![error, fmt_datetime(next_attempt_at), job_id],
        )?;
        Ok(())
    }

    /// 终态失败（重试耗尽或永久性错误）
    pub fn mark_failed(&self, job_id: &str, error: &str, now: NaiveDateTime) -> RepositoryResult<()> {
        let conn = self.get_conn()?;
        conn.execute(
            r#"
            UPDATE dispatch_job
            SET status = 'FAILED', last_error = ?1, completed_at = ?2
            WHERE job_id = ?3
            "#,
            params![error, fmt_datetime(now), job_id],
        )?;
        Ok(())
    }

    /// 取消某活动下所有排队中的任务（仅 PENDING 可取消）
    ///
    /// # 返回
    /// 被取消的任务数
    pub fn cancel_pending_by_campaign(
        &self,
        campaign_id: &str,
        now: NaiveDateTime,
    ) -> RepositoryResult<usize> {
        let conn = self.get_conn()?;
        let affected = conn.execute(
            r#"
            UPDATE dispatch_job
            SET status = 'CANCELLED', completed_at = ?1
            WHERE campaign_id = ?2 AND status = 'PENDING'
            "#,
            params![fmt_datetime(now), campaign_id],
        )?;
        Ok(affected)
    }

    /// 按 job_id 查询任务
    pub fn find_by_id(&self, job_id: &str) -> RepositoryResult<Option<DispatchJob>> {
        let conn = self.get_conn()?;
        let sql = format!("SELECT {JOB_COLUMNS} FROM dispatch_job WHERE job_id = ?1");
        let job_opt = conn
            .query_row(&sql, params![job_id], Self::map_row)
            .optional()?;
        Ok(job_opt)
    }

    /// 查询某活动下全部任务（按创建时间升序）
    pub fn list_by_campaign(&self, campaign_id: &str) -> RepositoryResult<Vec<DispatchJob>> {
        let conn = self.get_conn()?;
        let sql = format!(
            "SELECT {JOB_COLUMNS} FROM dispatch_job \
             WHERE campaign_id = ?1 ORDER BY created_at ASC, job_id ASC"
        );
        let mut stmt = conn.prepare(&sql)?;
        let jobs = stmt
            .query_map(params![campaign_id], Self::map_row)?
            .collect::<SqliteResult<Vec<DispatchJob>>>()?;
        Ok(jobs)
    }

    /// 获取队列统计信息
    pub fn get_queue_stats(&self) -> RepositoryResult<QueueStats> {
        let conn = self.get_conn()?;

        let count_by = |status: &str| -> RepositoryResult<i64> {
            let n: i64 = conn.query_row(
                "SELECT COUNT(*) FROM dispatch_job WHERE status = ?1",
                params![status],
                |row| row.get(0),
            )?;
            Ok(n)
        };

        Ok(QueueStats {
            pending_count: count_by("PENDING")? as u32,
            running_count: count_by("RUNNING")? as u32,
            completed_count: count_by("COMPLETED")? as u32,
            failed_count: count_by("FAILED")? as u32,
            cancelled_count: count_by("CANCELLED")? as u32,
        })
    }

    // ==========================================
    // 行映射
    // ==========================================

    fn map_row(row: &rusqlite::Row<'_>) -> SqliteResult<DispatchJob> {
        let kind_str: String = row.get(1)?;
        let campaign_id: String = row.get(2)?;
        let customer_id: Option<String> = row.get(3)?;
        let channel_str: Option<String> = row.get(4)?;
        let variant_name: Option<String> = row.get(5)?;

        let kind = match kind_str.as_str() {
            "SEND_MESSAGE" => JobKind::SendMessage {
                campaign_id,
                customer_id: customer_id.unwrap_or_default(),
                channel: channel_str
                    .as_deref()
                    .and_then(ChannelKind::from_str)
                    .unwrap_or(ChannelKind::Line),
                variant_name,
            },
            _ => JobKind::FireCampaign { campaign_id },
        };

        Ok(DispatchJob {
            job_id: row.get(0)?,
            kind,
            status: JobStatus::from_str(&row.get::<_, String>(6)?),
            attempt_count: row.get(7)?,
            max_attempts: row.get(8)?,
            next_attempt_at: parse_datetime(&row.get::<_, String>(9)?).unwrap_or_default(),
            last_error: row.get(10)?,
            message_id: row.get(11)?,
            created_at: parse_datetime(&row.get::<_, String>(12)?).unwrap_or_default(),
            started_at: row
                .get::<_, Option<String>>(13)?
                .and_then(|s| parse_datetime(&s)),
            completed_at: row
                .get::<_, Option<String>>(14)?
                .and_then(|s| parse_datetime(&s)),
        })
    }
}

// ==========================================
// QueueStats - 队列统计信息
// ==========================================
#[derive(Debug, Clone, Serialize)]
pub struct QueueStats {
    pub pending_count: u32,
    pub running_count: u32,
    pub completed_count: u32,
    pub failed_count: u32,
    pub cancelled_count: u32,
}
