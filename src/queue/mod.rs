// ==========================================
// 美业沙龙客群营销引擎 - 派发队列执行层
// ==========================================
// 职责: 后台工作线程池，消费 dispatch_job 表
// ==========================================

pub mod dispatcher;

pub use dispatcher::{Dispatcher, DispatcherSettings};
