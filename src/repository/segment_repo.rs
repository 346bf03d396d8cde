// ==========================================
// 美业沙龙客群营销引擎 - 客群仓储
// ==========================================
// 职责: segment 表的数据访问（条件以 JSON 快照落库）
// ==========================================

use crate::db::open_sqlite_connection;
use crate::domain::segment::{Segment, SegmentCriteria};
use crate::repository::db_utils::{fmt_datetime, parse_datetime};
use crate::repository::error::{RepositoryError, RepositoryResult};
use rusqlite::{params, Connection, Result as SqliteResult};
use std::sync::{Arc, Mutex};

pub struct SegmentRepository {
    conn: Arc<Mutex<Connection>>,
}

impl SegmentRepository {
    /// 创建新的 SegmentRepository 实例
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

    /// 保存客群
    pub fn insert(&self, segment: &Segment) -> RepositoryResult<()> {
        let criteria_json = serde_json::to_string(&segment.criteria)?;
        let conn = self.get_conn()?;
        conn.execute(
            r#"
            INSERT INTO segment (segment_id, name, criteria_json, created_at, updated_at)
            VALUES (?1, ?2, ?3, ?4, ?5)
            "#,
            params![
                segment.segment_id,
                segment.name,
                criteria_json,
                fmt_datetime(segment.created_at),
                fmt_datetime(segment.updated_at),
            ],
        )?;
        Ok(())
    }

    /// 按 segment_id 查询客群
    pub fn find_by_id(&self, segment_id: &str) -> RepositoryResult<Option<Segment>> {
        let conn = self.get_conn()?;
        let mut stmt = conn.prepare(
            "SELECT segment_id, name, criteria_json, created_at, updated_at \
             FROM segment WHERE segment_id = ?1",
        )?;

        let result = stmt.query_row(params![segment_id], Self::map_row);
        match result {
            Ok(s) => Ok(Some(s)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    /// 按名称查询同名客群（用于重名软失败检测）
    ///
    /// # 返回
    /// - Ok(Vec<Segment>): 同名客群列表（可能为空）
    pub fn find_by_name(&self, name: &str) -> RepositoryResult<Vec<Segment>> {
        let conn = self.get_conn()?;
        let mut stmt = conn.prepare(
            "SELECT segment_id, name, criteria_json, created_at, updated_at \
             FROM segment WHERE name = ?1 ORDER BY created_at",
        )?;

        let segments = stmt
            .query_map(params![name], Self::map_row)?
            .collect::<SqliteResult<Vec<Segment>>>()?;
        Ok(segments)
    }

    /// 查询全部客群（按创建时间排序）
    pub fn list_all(&self) -> RepositoryResult<Vec<Segment>> {
        let conn = self.get_conn()?;
        let mut stmt = conn.prepare(
            "SELECT segment_id, name, criteria_json, created_at, updated_at \
             FROM segment ORDER BY created_at",
        )?;

        let segments = stmt
            .query_map([], Self::map_row)?
            .collect::<SqliteResult<Vec<Segment>>>()?;
        Ok(segments)
    }

    fn map_row(row: &rusqlite::Row<'_>) -> SqliteResult<Segment> {
        let criteria_json: String = row.get(2)?;
        // JSON 损坏视为空条件（fail-closed，不命中任何客户）
        let criteria: SegmentCriteria = serde_json::from_str(&criteria_json).unwrap_or_default();
        Ok(Segment {
            segment_id: row.get(0)?,
            name: row.get(1)?,
            criteria,
            created_at: parse_datetime(&row.get::<_, String>(3)?).unwrap_or_default(),
            updated_at: parse_datetime(&row.get::<_, String>(4)?).unwrap_or_default(),
        })
    }
}
