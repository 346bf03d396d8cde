// ==========================================
// 美业沙龙客群营销引擎 - 应用状态
// ==========================================
// 职责: 管理应用级别的共享状态和API实例
// ==========================================

use std::sync::{Arc, Mutex};

use crate::api::{AnalyticsApi, CampaignApi, SegmentApi};
use crate::channel::ChannelSender;
use crate::config::config_manager::ConfigManager;
use crate::engine::repositories::EngineRepositories;
use crate::engine::scheduler::CampaignScheduler;
use crate::queue::dispatcher::Dispatcher;
use crate::repository::{
    CampaignRepository, CustomerRepository, DeliveryEventRepository, DispatchJobRepository,
    SegmentRepository,
};

/// 应用状态
///
/// 包含所有API实例和共享资源。
/// 宿主程序（无头服务 / 桌面壳 / 集成测试）各创建一份。
pub struct AppState {
    /// 数据库路径
    pub db_path: String,

    /// 配置管理器
    pub config_manager: Arc<ConfigManager>,

    /// 客群API
    pub segment_api: Arc<SegmentApi>,

    /// 群发活动API
    pub campaign_api: Arc<CampaignApi>,

    /// 效果分析API
    pub analytics_api: Arc<AnalyticsApi>,

    /// 派发执行器（start() 后开始消费队列）
    pub dispatcher: Arc<Dispatcher>,
}

impl AppState {
    /// 创建新的AppState实例
    ///
    /// # 参数
    /// - db_path: 数据库文件路径
    /// - sender: 渠道发送器实现（生产为真实渠道，联调用控制台发送器）
    ///
    /// # 说明
    /// 该方法会：
    /// 1. 打开共享连接并初始化 schema（幂等）
    /// 2. 初始化所有Repository与引擎
    /// 3. 按配置装配调度与派发参数，创建所有API实例
    pub fn new(db_path: String, sender: Arc<dyn ChannelSender>) -> Result<Self, String> {
        tracing::info!("初始化AppState，数据库路径: {}", db_path);

        // 创建数据库连接（共享连接）
        let conn = crate::db::open_sqlite_connection(&db_path)
            .map_err(|e| format!("无法打开数据库: {}", e))?;
        crate::db::init_schema(&conn).map_err(|e| format!("schema 初始化失败: {}", e))?;

        // schema 版本不一致只告警，不阻塞启动（不做自动迁移）
        match crate::db::read_schema_version(&conn) {
            Ok(Some(v)) if v != crate::db::CURRENT_SCHEMA_VERSION => {
                tracing::warn!(
                    "schema_version 不一致: db={}, expected={}",
                    v,
                    crate::db::CURRENT_SCHEMA_VERSION
                );
            }
            Ok(_) => {}
            Err(e) => {
                tracing::warn!("schema_version 读取失败(将继续启动): {}", e);
            }
        }

        let conn = Arc::new(Mutex::new(conn));

        // ==========================================
        // 初始化Repository层
        // ==========================================
        let repos = EngineRepositories::new(
            Arc::new(CustomerRepository::from_connection(conn.clone())),
            Arc::new(SegmentRepository::from_connection(conn.clone())),
            Arc::new(CampaignRepository::from_connection(conn.clone())),
            Arc::new(DispatchJobRepository::from_connection(conn.clone())),
            Arc::new(DeliveryEventRepository::from_connection(conn.clone())),
        );

        // ==========================================
        // 配置与引擎装配
        // ==========================================
        let config_manager = Arc::new(
            ConfigManager::from_connection(conn.clone())
                .map_err(|e| format!("无法创建ConfigManager: {}", e))?,
        );

        match config_manager.get_salon_locale() {
            Ok(locale) => crate::i18n::set_locale(&locale),
            Err(e) => tracing::warn!("读取界面语言失败，沿用默认语言: {}", e),
        }

        let scheduler_settings = config_manager
            .scheduler_settings()
            .map_err(|e| format!("调度参数解析失败: {}", e))?;
        let dispatcher_settings = config_manager
            .dispatcher_settings()
            .map_err(|e| format!("派发参数解析失败: {}", e))?;

        let scheduler = Arc::new(CampaignScheduler::new(
            repos.clone(),
            scheduler_settings.clone(),
        ));

        let dispatcher = Arc::new(Dispatcher::new(
            repos.clone(),
            scheduler.clone(),
            sender,
            dispatcher_settings,
        ));

        // ==========================================
        // 初始化API层
        // ==========================================
        let segment_api = Arc::new(SegmentApi::new(repos.clone(), scheduler_settings));
        let campaign_api = Arc::new(CampaignApi::new(repos.clone(), scheduler.clone()));
        let analytics_api = Arc::new(AnalyticsApi::new(repos));

        tracing::info!("AppState初始化完成");

        Ok(Self {
            db_path,
            config_manager,
            segment_api,
            campaign_api,
            analytics_api,
            dispatcher,
        })
    }

    /// 获取数据库路径
    pub fn get_db_path(&self) -> &str {
        &self.db_path
    }
}

// ==========================================
// 默认数据库路径辅助函数
// ==========================================

/// 获取默认数据库路径
///
/// # 返回
/// - 开发环境: 用户数据目录/salon-campaign-engine-dev/salon_campaign.db
/// - 生产环境: 用户数据目录/salon-campaign-engine/salon_campaign.db
pub fn get_default_db_path() -> String {
    use std::path::PathBuf;

    // 允许通过环境变量显式指定 DB 路径（便于调试/测试/CI）
    if let Ok(path) = std::env::var("SALON_CAMPAIGN_DB_PATH") {
        let trimmed = path.trim();
        if !trimmed.is_empty() {
            return trimmed.to_string();
        }
    }

    // 先给一个默认回退值，后续如果能拿到 data_dir 再覆盖
    let mut path = PathBuf::from("./salon_campaign.db");

    if let Some(data_dir) = dirs::data_dir() {
        // 开发环境使用独立目录，避免污染生产数据
        #[cfg(debug_assertions)]
        {
            path = data_dir.join("salon-campaign-engine-dev");
        }

        #[cfg(not(debug_assertions))]
        {
            path = data_dir.join("salon-campaign-engine");
        }

        // 确保目录存在
        std::fs::create_dir_all(&path).ok();
        path = path.join("salon_campaign.db");
    }

    path.to_string_lossy().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_get_default_db_path() {
        let path = get_default_db_path();
        assert!(!path.is_empty());
        assert!(path.ends_with(".db"));
    }

    // 注意：AppState::new() 的测试需要真实的数据库文件
    // 这些测试应该在集成测试中进行
}
