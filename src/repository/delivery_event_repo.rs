// ==========================================
// 美业沙龙客群营销引擎 - 送达事件仓储
// ==========================================
// 职责: delivery_event 表的数据访问（只追加 + 聚合查询）
// 红线: 事件只追加，不更新不删除，是分析聚合的事实来源
// ==========================================

use crate::db::open_sqlite_connection;
use crate::domain::dispatch::DeliveryEvent;
use crate::domain::types::{ChannelKind, DeliveryStatus};
use crate::repository::db_utils::{fmt_datetime, parse_datetime};
use crate::repository::error::{RepositoryError, RepositoryResult};
use rusqlite::{params, Connection, Result as SqliteResult};
use serde::Serialize;
use std::sync::{Arc, Mutex};

// ==========================================
// 聚合行
// ==========================================

/// 某活动的送达计数
#[derive(Debug, Clone, Default, Serialize)]
pub struct DeliveryCounts {
    pub sent_count: i64,
    pub failed_count: i64,
}

/// 按自然日聚合的送达序列点
#[derive(Debug, Clone, Serialize)]
pub struct DailyDeliveryPoint {
    /// 日期（YYYY-MM-DD）
    pub day: String,
    pub sent_count: i64,
    pub failed_count: i64,
}

pub struct DeliveryEventRepository {
    conn: Arc<Mutex<Connection>>,
}

impl DeliveryEventRepository {
    /// 创建新的 DeliveryEventRepository 实例
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

    /// 追加一条送达事件
    pub fn append(&self, event: &DeliveryEvent) -> RepositoryResult<()> {
        let conn = self.get_conn()?;
        conn.execute(
            r#"
            INSERT INTO delivery_event (
                event_id, campaign_id, customer_id, channel, variant_name,
                status, message_id, error_message, occurred_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)
            "#,
            params![
                event.event_id,
                event.campaign_id,
                event.customer_id,
                event.channel.to_db_str(),
                event.variant_name,
                event.status.to_db_str(),
                event.message_id,
                event.error_message,
                fmt_datetime(event.occurred_at),
            ],
        )?;
        Ok(())
    }

    /// 某活动的成功/失败计数
    ///
    /// 无事件时返回全零计数
    pub fn count_by_campaign(&self, campaign_id: &str) -> RepositoryResult<DeliveryCounts> {
        let conn = self.get_conn()?;
        let counts = conn.query_row(
            r#"
            SELECT
                COALESCE(SUM(CASE WHEN status = 'SENT' THEN 1 ELSE 0 END), 0),
                COALESCE(SUM(CASE WHEN status = 'FAILED' THEN 1 ELSE 0 END), 0)
            FROM delivery_event
            WHERE campaign_id = ?1
            "#,
            params![campaign_id],
            |row| {
                Ok(DeliveryCounts {
                    sent_count: row.get(0)?,
                    failed_count: row.get(1)?,
                })
            },
        )?;
        Ok(counts)
    }

    /// 某活动按自然日聚合的送达序列（按日期升序）
    pub fn daily_series(&self, campaign_id: &str) -> RepositoryResult<Vec<DailyDeliveryPoint>> {
        let conn = self.get_conn()?;
        let mut stmt = conn.prepare(
            r#"
            SELECT
                date(occurred_at) AS day,
                SUM(CASE WHEN status = 'SENT' THEN 1 ELSE 0 END) AS sent_count,
                SUM(CASE WHEN status = 'FAILED' THEN 1 ELSE 0 END) AS failed_count
            FROM delivery_event
            WHERE campaign_id = ?1
            GROUP BY date(occurred_at)
            ORDER BY day ASC
            "#,
        )?;

        let points = stmt
            .query_map(params![campaign_id], |row| {
                Ok(DailyDeliveryPoint {
                    day: row.get(0)?,
                    sent_count: row.get(1)?,
                    failed_count: row.get(2)?,
                })
            })?
            .collect::<SqliteResult<Vec<DailyDeliveryPoint>>>()?;
        Ok(points)
    }

    /// 某活动的全部事件（按发生时间升序）
    pub fn list_by_campaign(&self, campaign_id: &str) -> RepositoryResult<Vec<DeliveryEvent>> {
        let conn = self.get_conn()?;
        let mut stmt = conn.prepare(
            r#"
            SELECT
                event_id, campaign_id, customer_id, channel, variant_name,
                status, message_id, error_message, occurred_at
            FROM delivery_event
            WHERE campaign_id = ?1
            ORDER BY occurred_at ASC, event_id ASC
            "#,
        )?;

        let events = stmt
            .query_map(params![campaign_id], Self::map_row)?
            .collect::<SqliteResult<Vec<DeliveryEvent>>>()?;
        Ok(events)
    }

    fn map_row(row: &rusqlite::Row<'_>) -> SqliteResult<DeliveryEvent> {
        Ok(DeliveryEvent {
            event_id: row.get(0)?,
            campaign_id: row.get(1)?,
            customer_id: row.get(2)?,
            channel: ChannelKind::from_str(&row.get::<_, String>(3)?)
                .unwrap_or(ChannelKind::Line),
            variant_name: row.get(4)?,
            status: DeliveryStatus::from_str(&row.get::<_, String>(5)?),
            message_id: row.get(6)?,
            error_message: row.get(7)?,
            occurred_at: parse_datetime(&row.get::<_, String>(8)?).unwrap_or_default(),
        })
    }
}
