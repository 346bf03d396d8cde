// ==========================================
// 美业沙龙客群营销引擎 - 配置管理器
// ==========================================
// 职责: 配置加载、查询、覆写管理
// 存储: config_kv 表 (key-value + scope)
// ==========================================
// 约定: 引擎层不直接读本模块，由装配层解析为
//       SchedulerSettings / DispatcherSettings 后注入
// ==========================================

use crate::db::open_sqlite_connection;
use crate::engine::scheduler::SchedulerSettings;
use crate::queue::dispatcher::DispatcherSettings;
use rusqlite::{params, Connection};
use serde_json::json;
use std::collections::HashMap;
use std::error::Error;
use std::sync::{Arc, Mutex};

// ==========================================
// ConfigManager - 配置管理器
// ==========================================
pub struct ConfigManager {
    conn: Arc<Mutex<Connection>>,
}

impl ConfigManager {
    /// 创建新的 ConfigManager 实例
    ///
    /// # 参数
    /// - db_path: 数据库文件路径
    pub fn new(db_path: &str) -> Result<Self, Box<dyn Error>> {
        let conn = open_sqlite_connection(db_path)?;

        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// 从已有连接创建 ConfigManager
    ///
    /// 说明：为保证连接行为一致，会对传入连接再次应用统一 PRAGMA（幂等）。
    pub fn from_connection(conn: Arc<Mutex<Connection>>) -> Result<Self, Box<dyn Error>> {
        {
            let conn_guard = conn.lock().map_err(|e| format!("锁获取失败: {}", e))?;
            crate::db::configure_sqlite_connection(&conn_guard)?;
        }

        Ok(Self { conn })
    }

    /// 从 config_kv 表读取配置值（scope_id='global'）
    ///
    /// # 返回
    /// - Some(String): 配置值
    /// - None: 配置不存在
    fn get_config_value(&self, key: &str) -> Result<Option<String>, Box<dyn Error>> {
        let conn = self.conn.lock().map_err(|e| format!("锁获取失败: {}", e))?;

        let result = conn.query_row(
            "SELECT value FROM config_kv WHERE scope_id = 'global' AND key = ?1",
            params![key],
            |row| row.get::<_, String>(0),
        );

        match result {
            Ok(value) => Ok(Some(value)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(Box::new(e)),
        }
    }

    /// 读取 global scope 的配置值（公开方法，供其他模块复用）
    pub fn get_global_config_value(&self, key: &str) -> Result<Option<String>, Box<dyn Error>> {
        self.get_config_value(key)
    }

    /// 写入 global scope 的配置值（UPSERT）
    pub fn set_global_config_value(&self, key: &str, value: &str) -> Result<(), Box<dyn Error>> {
        let conn = self.conn.lock().map_err(|e| format!("锁获取失败: {}", e))?;

        conn.execute(
            "INSERT INTO config_kv (scope_id, key, value) VALUES ('global', ?1, ?2)
             ON CONFLICT(scope_id, key) DO UPDATE SET value = ?2, updated_at = datetime('now')",
            params![key, value],
        )?;
        Ok(())
    }

    /// 从 config_kv 表读取配置值，带默认值
    fn get_config_or_default(&self, key: &str, default: &str) -> Result<String, Box<dyn Error>> {
        Ok(self.get_config_value(key)?.unwrap_or_else(|| default.to_string()))
    }

    /// 获取所有配置的快照（JSON格式）
    ///
    /// # 用途
    /// - 导出当前门店配置（支持工单排查、搬店迁移）
    pub fn get_config_snapshot(&self) -> Result<String, Box<dyn Error>> {
        let conn = self.conn.lock().map_err(|e| format!("锁获取失败: {}", e))?;

        let mut stmt = conn.prepare(
            "SELECT key, value FROM config_kv WHERE scope_id = 'global' ORDER BY key"
        )?;

        let mut config_map: HashMap<String, String> = HashMap::new();
        let rows = stmt.query_map([], |row| {
            Ok((
                row.get::<_, String>(0)?,
                row.get::<_, String>(1)?,
            ))
        })?;

        for row in rows {
            let (key, value) = row?;
            config_map.insert(key, value);
        }

        let json_value = json!(config_map);
        Ok(serde_json::to_string(&json_value)?)
    }

    /// 从配置快照恢复配置
    ///
    /// # 返回
    /// - Ok(usize): 恢复的配置项数量
    ///
    /// # 注意
    /// - 此方法会覆盖现有的global配置
    pub fn restore_config_from_snapshot(&self, snapshot_json: &str) -> Result<usize, Box<dyn Error>> {
        let config_map: HashMap<String, String> = serde_json::from_str(snapshot_json)?;

        let conn = self.conn.lock().map_err(|e| format!("锁获取失败: {}", e))?;

        conn.execute("BEGIN TRANSACTION", [])?;

        let mut count = 0;
        for (key, value) in config_map.iter() {
            // 使用UPSERT语法（SQLite 3.24.0+）
            let affected = conn.execute(
                "INSERT INTO config_kv (scope_id, key, value) VALUES ('global', ?1, ?2)
                 ON CONFLICT(scope_id, key) DO UPDATE SET value = ?2",
                params![key, value],
            )?;
            count += affected;
        }

        conn.execute("COMMIT", [])?;

        Ok(count)
    }

    // ===== 派发配置 =====

    /// 工作线程数
    pub fn get_worker_concurrency(&self) -> Result<usize, Box<dyn Error>> {
        let value = self.get_config_or_default(config_keys::WORKER_CONCURRENCY, "4")?;
        Ok(value.parse::<usize>().unwrap_or(4))
    }

    /// 任务尝试上限（含首次）
    pub fn get_max_attempts(&self) -> Result<i64, Box<dyn Error>> {
        let value = self.get_config_or_default(config_keys::MAX_ATTEMPTS, "3")?;
        Ok(value.parse::<i64>().unwrap_or(3))
    }

    /// 退避基数（毫秒）
    pub fn get_backoff_base_ms(&self) -> Result<i64, Box<dyn Error>> {
        let value = self.get_config_or_default(config_keys::BACKOFF_BASE_MS, "1000")?;
        Ok(value.parse::<i64>().unwrap_or(1_000))
    }

    /// 任务初始随机延迟上限（毫秒）
    pub fn get_initial_delay_max_ms(&self) -> Result<u64, Box<dyn Error>> {
        let value = self.get_config_or_default(config_keys::INITIAL_DELAY_MAX_MS, "5000")?;
        Ok(value.parse::<u64>().unwrap_or(5_000))
    }

    /// 队列空转轮询间隔（毫秒）
    pub fn get_poll_interval_ms(&self) -> Result<u64, Box<dyn Error>> {
        let value = self.get_config_or_default(config_keys::POLL_INTERVAL_MS, "200")?;
        Ok(value.parse::<u64>().unwrap_or(200))
    }

    // ===== RFM 配置 =====

    /// RFM 统计窗口天数
    pub fn get_rfm_window_days(&self) -> Result<i64, Box<dyn Error>> {
        let value = self.get_config_or_default(config_keys::RFM_WINDOW_DAYS, "365")?;
        Ok(value.parse::<i64>().unwrap_or(365))
    }

    /// 无金额历史时的客单价假定值（日元）
    pub fn get_assumed_ticket_price(&self) -> Result<f64, Box<dyn Error>> {
        let value = self.get_config_or_default(config_keys::ASSUMED_TICKET_PRICE, "8000")?;
        Ok(value.parse::<f64>().unwrap_or(8_000.0))
    }

    // ===== 门店配置 =====

    /// 店铺名称（模板 {salon_name} 占位符）
    pub fn get_salon_name(&self) -> Result<String, Box<dyn Error>> {
        self.get_config_or_default(config_keys::SALON_NAME, "示例沙龙")
    }

    /// 界面语言（"zh-CN" 或 "en"）
    pub fn get_salon_locale(&self) -> Result<String, Box<dyn Error>> {
        self.get_config_or_default(config_keys::SALON_LOCALE, "zh-CN")
    }

    // ===== 引擎参数装配 =====

    /// 解析调度引擎参数
    pub fn scheduler_settings(&self) -> Result<SchedulerSettings, Box<dyn Error>> {
        Ok(SchedulerSettings {
            max_attempts: self.get_max_attempts()?,
            initial_delay_max_ms: self.get_initial_delay_max_ms()?,
            rfm_window_days: self.get_rfm_window_days()?,
            assumed_ticket: self.get_assumed_ticket_price()?,
        })
    }

    /// 解析派发执行器参数
    pub fn dispatcher_settings(&self) -> Result<DispatcherSettings, Box<dyn Error>> {
        Ok(DispatcherSettings {
            worker_concurrency: self.get_worker_concurrency()?,
            poll_interval_ms: self.get_poll_interval_ms()?,
            backoff_base_ms: self.get_backoff_base_ms()?,
            salon_name: self.get_salon_name()?,
        })
    }
}

// ==========================================
// 配置键常量
// ==========================================
pub mod config_keys {
    // 派发队列
    pub const WORKER_CONCURRENCY: &str = "dispatch/worker_concurrency";
    pub const MAX_ATTEMPTS: &str = "dispatch/max_attempts";
    pub const BACKOFF_BASE_MS: &str = "dispatch/backoff_base_ms";
    pub const INITIAL_DELAY_MAX_MS: &str = "dispatch/initial_delay_max_ms";
    pub const POLL_INTERVAL_MS: &str = "dispatch/poll_interval_ms";

    // RFM 评分
    pub const RFM_WINDOW_DAYS: &str = "rfm/window_days";
    pub const ASSUMED_TICKET_PRICE: &str = "rfm/assumed_ticket_price";

    // 门店信息
    pub const SALON_NAME: &str = "salon/name";
    pub const SALON_LOCALE: &str = "salon/locale";
}
