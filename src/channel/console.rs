// ==========================================
// 美业沙龙客群营销引擎 - 控制台渠道发送器
// ==========================================
// 职责: 把消息写入日志的演示/开发用发送器
// ==========================================

use crate::channel::{ChannelSender, SendError, SendOutcome};
use crate::domain::types::ChannelKind;
use async_trait::async_trait;
use tracing::info;
use uuid::Uuid;

/// 控制台发送器
///
/// 不对接任何真实渠道，把消息内容打到日志并返回本地生成的消息ID。
/// 用于无渠道凭证环境下的端到端联调。
pub struct ConsoleChannelSender;

impl ConsoleChannelSender {
    pub fn new() -> Self {
        Self
    }
}

impl Default for ConsoleChannelSender {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ChannelSender for ConsoleChannelSender {
    async fn send(
        &self,
        channel: ChannelKind,
        recipient: &str,
        content: &str,
    ) -> Result<SendOutcome, SendError> {
        let message_id = format!("console-{}", Uuid::new_v4());
        info!(
            "[控制台渠道] channel={}, recipient={}, message_id={}, 内容: {}",
            channel.to_db_str(),
            recipient,
            message_id,
            content
        );
        Ok(SendOutcome { message_id })
    }
}
