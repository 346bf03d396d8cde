// ==========================================
// 美业沙龙客群营销引擎 - 渠道发送端口
// ==========================================
// 职责: 定义派发执行器依赖的渠道发送接口
// 红线: 引擎不关心渠道协议细节，只区分临时/永久两类失败
// ==========================================

pub mod console;

pub use console::ConsoleChannelSender;

use crate::domain::types::ChannelKind;
use async_trait::async_trait;
use thiserror::Error;

// ==========================================
// SendError - 发送失败分类
// ==========================================
// 临时失败进入退避重试，永久失败直接终态
#[derive(Error, Debug, Clone)]
pub enum SendError {
    /// 可重试失败（网络抖动、渠道限流等）
    #[error("渠道临时错误: {0}")]
    Transient(String),

    /// 不可重试失败（账号不存在、客户拉黑等）
    #[error("渠道永久错误: {0}")]
    Permanent(String),
}

// ==========================================
// SendOutcome - 发送成功结果
// ==========================================
#[derive(Debug, Clone)]
pub struct SendOutcome {
    /// 渠道侧返回的消息ID
    pub message_id: String,
}

// ==========================================
// ChannelSender - 渠道发送端口
// ==========================================
// 实现方负责具体渠道（LINE / Instagram）的协议对接
#[async_trait]
pub trait ChannelSender: Send + Sync {
    /// 向指定渠道的外部账号发送消息
    ///
    /// # 参数
    /// - recipient: 该渠道下的客户外部账号ID
    /// - content: 渲染完成的消息文本
    async fn send(
        &self,
        channel: ChannelKind,
        recipient: &str,
        content: &str,
    ) -> Result<SendOutcome, SendError>;
}
