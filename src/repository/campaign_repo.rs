// ==========================================
// 美业沙龙客群营销引擎 - 活动仓储
// ==========================================
// 职责: campaign 表的数据访问 + 进入 SENDING 的单事务展开
// 红线: SENDING 只能进入一次；状态复查 + 任务落库 + CAS 更新在同一事务内
// 红线: 计数器只走 SQL 原子自增
// ==========================================

use crate::db::open_sqlite_connection;
use crate::domain::campaign::{AbVariant, Campaign};
use crate::domain::dispatch::DispatchJob;
use crate::domain::segment::SegmentCriteria;
use crate::domain::types::{CampaignStatus, ChannelKind};
use crate::repository::db_utils::{fmt_datetime, parse_datetime};
use crate::repository::dispatch_job_repo;
use crate::repository::error::{RepositoryError, RepositoryResult};
use chrono::NaiveDateTime;
use rusqlite::{params, Connection, Result as SqliteResult};
use std::sync::{Arc, Mutex};

// ==========================================
// FanoutOutcome - 展开结果
// ==========================================
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FanoutOutcome {
    /// 本次调用完成展开，活动已进入 SENDING
    Started { job_count: usize },
    /// 活动已被其他调用展开过（幂等：不重复生成任务）
    AlreadyStarted,
}

pub struct CampaignRepository {
    conn: Arc<Mutex<Connection>>,
}

impl CampaignRepository {
    /// 创建新的 CampaignRepository 实例
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

    // ==========================================
    // 基础 CRUD
    // ==========================================

    /// 保存活动（草稿或已排期）
    pub fn insert(&self, campaign: &Campaign) -> RepositoryResult<()> {
        let criteria_json = serde_json::to_string(&campaign.criteria)?;
        let channels_json = serde_json::to_string(&campaign.channels)?;
        let ab_variants_json = campaign
            .ab_variants
            .as_ref()
            .map(serde_json::to_string)
            .transpose()?;

        let conn = self.get_conn()?;
        conn.execute(
            r#"
            INSERT INTO campaign (
                campaign_id, name, template, criteria_json, channels_json,
                scheduled_at, ab_variants_json, status,
                recipient_count, sent_count, failed_count,
                created_at, updated_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13)
            "#,
            params![
                campaign.campaign_id,
                campaign.name,
                campaign.template,
                criteria_json,
                channels_json,
                campaign.scheduled_at.map(fmt_datetime),
                ab_variants_json,
                campaign.status.to_db_str(),
                campaign.recipient_count,
                campaign.sent_count,
                campaign.failed_count,
                fmt_datetime(campaign.created_at),
                fmt_datetime(campaign.updated_at),
            ],
        )?;
        Ok(())
    }

    /// 按 campaign_id 查询活动
    pub fn find_by_id(&self, campaign_id: &str) -> RepositoryResult<Option<Campaign>> {
        let conn = self.get_conn()?;
        let mut stmt = conn.prepare(
            r#"
            SELECT
                campaign_id, name, template, criteria_json, channels_json,
                scheduled_at, ab_variants_json, status,
                recipient_count, sent_count, failed_count,
                created_at, updated_at
            FROM campaign
            WHERE campaign_id = ?1
            "#,
        )?;

        let result = stmt.query_row(params![campaign_id], Self::map_row);
        match result {
            Ok(c) => Ok(Some(c)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    /// 查询全部活动（按创建时间倒序）
    pub fn list_all(&self) -> RepositoryResult<Vec<Campaign>> {
        let conn = self.get_conn()?;
        let mut stmt = conn.prepare(
            r#"
            SELECT
                campaign_id, name, template, criteria_json, channels_json,
                scheduled_at, ab_variants_json, status,
                recipient_count, sent_count, failed_count,
                created_at, updated_at
            FROM campaign
            ORDER BY created_at DESC
            "#,
        )?;

        let campaigns = stmt
            .query_map([], Self::map_row)?
            .collect::<SqliteResult<Vec<Campaign>>>()?;
        Ok(campaigns)
    }

    // ==========================================
    // 状态迁移
    // ==========================================

    /// CAS 状态更新
    ///
    /// # 参数
    /// - from: 允许的当前状态集合
    /// - to: 目标状态
    ///
    /// # 返回
    /// - Ok(true): 更新成功
    /// - Ok(false): 当前状态不在允许集合内（未更新）
    pub fn set_status(
        &self,
        campaign_id: &str,
        from: &[CampaignStatus],
        to: CampaignStatus,
        now: NaiveDateTime,
    ) -> RepositoryResult<bool> {
        if from.is_empty() {
            return Ok(false);
        }
        let placeholders = from.iter().map(|_| "?").collect::<Vec<_>>().join(", ");
        let sql = format!(
            "UPDATE campaign SET status = ?, updated_at = ? \
             WHERE campaign_id = ? AND status IN ({})",
            placeholders
        );

        let mut params_vec: Vec<Box<dyn rusqlite::ToSql>> = vec![
            Box::new(to.to_db_str().to_string()),
            Box::new(fmt_datetime(now)),
            Box::new(campaign_id.to_string()),
        ];
        for s in from {
            params_vec.push(Box::new(s.to_db_str().to_string()));
        }

        let conn = self.get_conn()?;
        let affected = conn.execute(&sql, rusqlite::params_from_iter(params_vec))?;
        Ok(affected > 0)
    }

    /// 进入 SENDING 并落库派发任务（单事务）
    ///
    /// # 流程（同一事务内）
    /// 1. 复查活动状态，仅 DRAFT / SCHEDULED 可展开
    /// 2. 批量插入派发任务
    /// 3. CAS 更新 status=SENDING + recipient_count
    ///
    /// # 返回
    /// - Ok(Started): 本次完成展开
    /// - Ok(AlreadyStarted): 已展开过，幂等跳过
    /// - Err: 任一步失败，事务回滚，活动停留在可恢复状态
    pub fn begin_sending_fanout(
        &self,
        campaign_id: &str,
        recipient_count: i64,
        jobs: &[DispatchJob],
        now: NaiveDateTime,
    ) -> RepositoryResult<FanoutOutcome> {
        let conn = self.get_conn()?;
        let tx = conn.unchecked_transaction()?;

        // 1. 状态复查
        let status: String = tx
            .query_row(
                "SELECT status FROM campaign WHERE campaign_id = ?1",
                params![campaign_id],
                |row| row.get(0),
            )
            .map_err(|e| match e {
                rusqlite::Error::QueryReturnedNoRows => RepositoryError::NotFound {
                    entity: "Campaign".to_string(),
                    id: campaign_id.to_string(),
                },
                other => other.into(),
            })?;

        if !CampaignStatus::from_str(&status).can_enter_sending() {
            // 已在 SENDING 或终态，不重复展开
            return Ok(FanoutOutcome::AlreadyStarted);
        }

        // 2. 批量插入派发任务
        for job in jobs {
            dispatch_job_repo::insert_row(&tx, job)?;
        }

        // 3. CAS 更新活动状态与收件人数
        let affected = tx.execute(
            r#"
            UPDATE campaign
            SET status = 'SENDING', recipient_count = ?1, updated_at = ?2
            WHERE campaign_id = ?3 AND status IN ('DRAFT', 'SCHEDULED')
            "#,
            params![recipient_count, fmt_datetime(now), campaign_id],
        )?;

        if affected == 0 {
            // 状态在复查后被并发修改，放弃本次展开（事务随 drop 回滚）
            return Ok(FanoutOutcome::AlreadyStarted);
        }

        tx.commit()?;
        Ok(FanoutOutcome::Started {
            job_count: jobs.len(),
        })
    }

    // ==========================================
    // 计数器（SQL 原子自增）
    // ==========================================

    /// 成功计数 +1
    pub fn increment_sent(&self, campaign_id: &str, now: NaiveDateTime) -> RepositoryResult<()> {
        let conn = self.get_conn()?;
        conn.execute(
            "UPDATE campaign SET sent_count = sent_count + 1, updated_at = ?1 \
             WHERE campaign_id = ?2",
            params![fmt_datetime(now), campaign_id],
        )?;
        Ok(())
    }

    /// 终态失败计数 +1
    pub fn increment_failed(&self, campaign_id: &str, now: NaiveDateTime) -> RepositoryResult<()> {
        let conn = self.get_conn()?;
        conn.execute(
            "UPDATE campaign SET failed_count = failed_count + 1, updated_at = ?1 \
             WHERE campaign_id = ?2",
            params![fmt_datetime(now), campaign_id],
        )?;
        Ok(())
    }

    /// 计数器覆盖全部任务后，推进 SENDING -> COMPLETED
    ///
    /// # 返回
    /// - Ok(true): 本次调用完成了推进
    /// - Ok(false): 条件未满足或已不在 SENDING
    pub fn try_mark_completed(
        &self,
        campaign_id: &str,
        now: NaiveDateTime,
    ) -> RepositoryResult<bool> {
        let campaign = match self.find_by_id(campaign_id)? {
            Some(c) => c,
            None => return Ok(false),
        };

        if campaign.status != CampaignStatus::Sending || !campaign.counters_exhausted() {
            return Ok(false);
        }

        // 计数器只增不减，复查通过后 CAS 推进即安全
        self.set_status(
            campaign_id,
            &[CampaignStatus::Sending],
            CampaignStatus::Completed,
            now,
        )
    }

    // ==========================================
    // 行映射
    // ==========================================

    fn map_row(row: &rusqlite::Row<'_>) -> SqliteResult<Campaign> {
        let criteria_json: String = row.get(3)?;
        let channels_json: String = row.get(4)?;
        let ab_variants_json: Option<String> = row.get(6)?;

        let criteria: Vec<SegmentCriteria> =
            serde_json::from_str(&criteria_json).unwrap_or_default();
        let channels: Vec<ChannelKind> = serde_json::from_str(&channels_json).unwrap_or_default();
        let ab_variants: Option<Vec<AbVariant>> =
            ab_variants_json.and_then(|s| serde_json::from_str(&s).ok());

        Ok(Campaign {
            campaign_id: row.get(0)?,
            name: row.get(1)?,
            template: row.get(2)?,
            criteria,
            channels,
            scheduled_at: row
                .get::<_, Option<String>>(5)?
                .and_then(|s| parse_datetime(&s)),
            ab_variants,
            status: CampaignStatus::from_str(&row.get::<_, String>(7)?),
            recipient_count: row.get(8)?,
            sent_count: row.get(9)?,
            failed_count: row.get(10)?,
            created_at: parse_datetime(&row.get::<_, String>(11)?).unwrap_or_default(),
            updated_at: parse_datetime(&row.get::<_, String>(12)?).unwrap_or_default(),
        })
    }
}
