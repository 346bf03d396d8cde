// ==========================================
// 美业沙龙客群营销引擎 - 服务主入口
// ==========================================
// 技术栈: Rust + Tokio + SQLite
// 系统定位: 客户分群 + 群发活动调度
// ==========================================

use std::sync::Arc;

use salon_campaign_engine::app::{get_default_db_path, AppState};
use salon_campaign_engine::channel::ConsoleChannelSender;

#[tokio::main]
async fn main() {
    // 初始化日志系统
    salon_campaign_engine::logging::init();

    tracing::info!("==================================================");
    tracing::info!("{}", salon_campaign_engine::APP_NAME);
    tracing::info!("系统版本: {}", salon_campaign_engine::VERSION);
    tracing::info!("==================================================");

    // 获取数据库路径
    let db_path = get_default_db_path();
    tracing::info!("使用数据库: {}", db_path);

    // 创建AppState
    // 默认装配控制台发送器，真实渠道由部署方以库模式注入
    tracing::info!("正在初始化AppState...");
    let app_state = match AppState::new(db_path, Arc::new(ConsoleChannelSender::new())) {
        Ok(state) => state,
        Err(e) => {
            tracing::error!("无法初始化AppState: {}", e);
            std::process::exit(1);
        }
    };

    tracing::info!("AppState初始化成功");

    // 启动派发工作循环
    app_state.dispatcher.start();
    tracing::info!("派发执行器已启动，等待队列任务...");

    // 等待退出信号
    match tokio::signal::ctrl_c().await {
        Ok(()) => {
            tracing::info!("收到退出信号，开始优雅停机...");
        }
        Err(e) => {
            tracing::error!("退出信号监听失败: {}", e);
        }
    }

    app_state.dispatcher.shutdown().await;
    tracing::info!("派发执行器已停止，进程退出");
}
