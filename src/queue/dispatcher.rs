// ==========================================
// 美业沙龙客群营销引擎 - 派发执行器
// ==========================================
// 红线: 同一任务同一时刻至多一个处理者（领取即 CAS 置 RUNNING）
// 红线: 单条任务的失败不波及其他任务，仓储错误只中断当前一轮
// 红线: 送达语义为至少一次（标记完成前进程崩溃会导致重发）
// ==========================================
// 职责: 工作线程池轮询领取到期任务并执行
// - SEND_MESSAGE: 渲染模板 -> 渠道发送 -> 计数与送达事件落库
// - FIRE_CAMPAIGN: 到点触发活动展开
// 失败分流: 临时失败按指数退避重试，永久失败与额度耗尽转终态
// ==========================================

use crate::channel::{ChannelSender, SendError, SendOutcome};
use crate::domain::dispatch::{DeliveryEvent, DispatchJob, JobKind};
use crate::domain::types::ChannelKind;
use crate::engine::repositories::EngineRepositories;
use crate::engine::scheduler::CampaignScheduler;
use crate::engine::templating::{TemplateContext, Templater};
use crate::repository::error::{RepositoryError, RepositoryResult};
use chrono::{Duration, Local, NaiveDateTime};
use std::sync::{Arc, Mutex};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{error, info, instrument, warn};

/// 渲染上下文携带的最近消费记录条数
const PROFILE_RECENT_VISITS: u32 = 5;

// ==========================================
// DispatcherSettings - 执行器参数
// ==========================================
// 由配置层解析后注入
#[derive(Debug, Clone)]
pub struct DispatcherSettings {
    /// 工作线程数
    pub worker_concurrency: usize,
    /// 队列空转时的轮询间隔（毫秒）
    pub poll_interval_ms: u64,
    /// 退避基数（毫秒），第 n 次失败后延迟 base * 2^(n-1)
    pub backoff_base_ms: i64,
    /// 店铺名称（模板 {salon_name} 占位符）
    pub salon_name: String,
}

impl Default for DispatcherSettings {
    fn default() -> Self {
        Self {
            worker_concurrency: 4,
            poll_interval_ms: 200,
            backoff_base_ms: 1_000,
            salon_name: "示例沙龙".to_string(),
        }
    }
}

// ==========================================
// Dispatcher - 派发执行器
// ==========================================
// 进程内唯一，由装配层创建后注入各 API 门面
pub struct Dispatcher {
    runner: JobRunner,
    shutdown_tx: watch::Sender<bool>,
    workers: Mutex<Vec<JoinHandle<()>>>,
}

impl Dispatcher {
    /// 创建新的派发执行器（不启动工作线程）
    pub fn new(
        repos: EngineRepositories,
        scheduler: Arc<CampaignScheduler>,
        sender: Arc<dyn ChannelSender>,
        settings: DispatcherSettings,
    ) -> Self {
        let (shutdown_tx, _shutdown_rx) = watch::channel(false);
        Self {
            runner: JobRunner {
                repos,
                scheduler,
                sender,
                templater: Templater::new(),
                settings: Arc::new(settings),
            },
            shutdown_tx,
            workers: Mutex::new(Vec::new()),
        }
    }

    /// 启动工作线程池（幂等，重复调用忽略）
    pub fn start(&self) {
        let mut workers = self.workers.lock().unwrap_or_else(|e| e.into_inner());
        if !workers.is_empty() {
            warn!("派发工作线程池已在运行，忽略重复启动");
            return;
        }

        let count = self.runner.settings.worker_concurrency.max(1);
        for worker_id in 0..count {
            let runner = self.runner.clone();
            let shutdown_rx = self.shutdown_tx.subscribe();
            workers.push(tokio::spawn(worker_loop(runner, shutdown_rx, worker_id)));
        }
        info!("派发工作线程池已启动: workers={}", count);
    }

    /// 通知所有工作线程退出并等待收尾
    ///
    /// 正在执行中的任务会先跑完当前一条再退出
    pub async fn shutdown(&self) {
        let _ = self.shutdown_tx.send(true);

        let handles: Vec<JoinHandle<()>> = {
            let mut workers = self.workers.lock().unwrap_or_else(|e| e.into_inner());
            workers.drain(..).collect()
        };
        if handles.is_empty() {
            return;
        }

        let _ = futures::future::join_all(handles).await;
        info!("派发工作线程池已退出");
    }

    /// 领取并执行一条到期任务
    ///
    /// # 返回
    /// - Ok(true): 执行了一条任务（无论成败）
    /// - Ok(false): 当前没有到期任务
    pub async fn process_next(&self, now: NaiveDateTime) -> RepositoryResult<bool> {
        self.runner.process_next(now).await
    }

    /// 以固定时点处理完所有到期任务
    ///
    /// 退避重试产生的未来任务不会在本轮被领取，循环必然终止。
    /// 供脚本与联调使用，线上场景走工作线程池。
    pub async fn drain(&self, now: NaiveDateTime) -> RepositoryResult<usize> {
        let mut processed = 0;
        while self.runner.process_next(now).await? {
            processed += 1;
        }
        Ok(processed)
    }
}

// ==========================================
// 工作线程循环
// ==========================================

async fn worker_loop(runner: JobRunner, mut shutdown_rx: watch::Receiver<bool>, worker_id: usize) {
    info!("派发工作线程启动: worker_id={}", worker_id);
    let poll_interval = std::time::Duration::from_millis(runner.settings.poll_interval_ms.max(10));

    loop {
        if *shutdown_rx.borrow() {
            break;
        }

        let now = Local::now().naive_local();
        let processed = match runner.process_next(now).await {
            Ok(processed) => processed,
            Err(e) => {
                error!("派发循环出错: worker_id={}, error={}", worker_id, e);
                false
            }
        };

        // 队列空转或出错时退避一个轮询间隔，同时监听退出信号
        if !processed {
            tokio::select! {
                _ = tokio::time::sleep(poll_interval) => {}
                _ = shutdown_rx.changed() => {}
            }
        }
    }
    info!("派发工作线程退出: worker_id={}", worker_id);
}

// ==========================================
// JobRunner - 单条任务执行逻辑
// ==========================================
// 工作线程各持一份克隆（内部全是 Arc 共享）
#[derive(Clone)]
struct JobRunner {
    repos: EngineRepositories,
    scheduler: Arc<CampaignScheduler>,
    sender: Arc<dyn ChannelSender>,
    templater: Templater,
    settings: Arc<DispatcherSettings>,
}

impl JobRunner {
    async fn process_next(&self, now: NaiveDateTime) -> RepositoryResult<bool> {
        let job = match self.repos.dispatch_job_repo.claim_next(now)? {
            Some(job) => job,
            None => return Ok(false),
        };

        self.execute(&job, now).await?;
        Ok(true)
    }

    #[instrument(skip(self, job), fields(job_id = %job.job_id, kind = job.kind.to_db_str()))]
    async fn execute(&self, job: &DispatchJob, now: NaiveDateTime) -> RepositoryResult<()> {
        match &job.kind {
            JobKind::FireCampaign { campaign_id } => self.execute_fire(job, campaign_id, now),
            JobKind::SendMessage {
                campaign_id,
                customer_id,
                channel,
                variant_name,
            } => {
                self.execute_send(
                    job,
                    campaign_id,
                    customer_id,
                    *channel,
                    variant_name.as_deref(),
                    now,
                )
                .await
            }
        }
    }

    /// 到点触发活动展开
    ///
    /// 展开内部已幂等（重复触发按跳过处理），这里只处理触发本身的成败：
    /// - 活动不存在 -> 永久失败
    /// - 其他错误 -> 按退避重试，额度耗尽后任务转 FAILED，活动停留在 SCHEDULED
    fn execute_fire(
        &self,
        job: &DispatchJob,
        campaign_id: &str,
        now: NaiveDateTime,
    ) -> RepositoryResult<()> {
        match self.scheduler.handle_fire_job(campaign_id, now) {
            Ok(()) => {
                self.repos
                    .dispatch_job_repo
                    .mark_completed(&job.job_id, None, now)?;
            }
            Err(RepositoryError::NotFound { .. }) => {
                let reason = format!("活动不存在: {}", campaign_id);
                self.repos
                    .dispatch_job_repo
                    .mark_failed(&job.job_id, &reason, now)?;
                warn!("到点触发任务终态失败: job_id={}, {}", job.job_id, reason);
            }
            Err(e) => {
                let reason = e.to_string();
                if job.can_retry() {
                    let next = now + backoff_delay(self.settings.backoff_base_ms, job.attempt_count);
                    self.repos
                        .dispatch_job_repo
                        .mark_retry(&job.job_id, &reason, next)?;
                    warn!(
                        "活动展开失败，进入退避重试: campaign_id={}, attempt={}/{}, reason={}",
                        campaign_id, job.attempt_count, job.max_attempts, reason
                    );
                } else {
                    self.repos
                        .dispatch_job_repo
                        .mark_failed(&job.job_id, &reason, now)?;
                    error!(
                        "活动展开重试额度耗尽，活动停留在原状态等待人工处理: campaign_id={}, reason={}",
                        campaign_id, reason
                    );
                }
            }
        }
        Ok(())
    }

    /// 单个 (客户, 渠道) 的发送任务
    async fn execute_send(
        &self,
        job: &DispatchJob,
        campaign_id: &str,
        customer_id: &str,
        channel: ChannelKind,
        variant_name: Option<&str>,
        now: NaiveDateTime,
    ) -> RepositoryResult<()> {
        let send_result = self
            .render_and_send(campaign_id, customer_id, channel, variant_name, now)
            .await?;

        match send_result {
            Ok(outcome) => {
                self.repos.dispatch_job_repo.mark_completed(
                    &job.job_id,
                    Some(&outcome.message_id),
                    now,
                )?;
                self.repos.campaign_repo.increment_sent(campaign_id, now)?;
                self.repos.delivery_event_repo.append(&DeliveryEvent::sent(
                    campaign_id,
                    customer_id,
                    channel,
                    variant_name.map(str::to_string),
                    outcome.message_id,
                    now,
                ))?;
                self.repos.campaign_repo.try_mark_completed(campaign_id, now)?;
            }
            Err(SendError::Transient(reason)) if job.can_retry() => {
                let next = now + backoff_delay(self.settings.backoff_base_ms, job.attempt_count);
                self.repos
                    .dispatch_job_repo
                    .mark_retry(&job.job_id, &reason, next)?;
                warn!(
                    "发送临时失败，进入退避重试: job_id={}, attempt={}/{}, next_attempt_at={}, reason={}",
                    job.job_id, job.attempt_count, job.max_attempts, next, reason
                );
            }
            Err(err) => {
                // 永久失败，或临时失败但额度耗尽
                let reason = err.to_string();
                self.repos
                    .dispatch_job_repo
                    .mark_failed(&job.job_id, &reason, now)?;
                self.repos.campaign_repo.increment_failed(campaign_id, now)?;
                self.repos
                    .delivery_event_repo
                    .append(&DeliveryEvent::failed(
                        campaign_id,
                        customer_id,
                        channel,
                        variant_name.map(str::to_string),
                        reason.clone(),
                        now,
                    ))?;
                self.repos.campaign_repo.try_mark_completed(campaign_id, now)?;
                warn!("发送终态失败: job_id={}, reason={}", job.job_id, reason);
            }
        }
        Ok(())
    }

    /// 组装渲染上下文并调用渠道发送
    ///
    /// # 返回
    /// 外层为仓储错误（抛给工作循环记录），内层为发送结果。
    /// 活动/客户缺失、渠道未绑定都归为永久失败，不消耗渠道调用。
    async fn render_and_send(
        &self,
        campaign_id: &str,
        customer_id: &str,
        channel: ChannelKind,
        variant_name: Option<&str>,
        now: NaiveDateTime,
    ) -> RepositoryResult<Result<SendOutcome, SendError>> {
        let campaign = match self.repos.campaign_repo.find_by_id(campaign_id)? {
            Some(c) => c,
            None => {
                return Ok(Err(SendError::Permanent(format!(
                    "活动不存在: {}",
                    campaign_id
                ))))
            }
        };

        let profile = match self
            .repos
            .customer_repo
            .get_profile(customer_id, PROFILE_RECENT_VISITS)?
        {
            Some(p) => p,
            None => {
                return Ok(Err(SendError::Permanent(format!(
                    "客户不存在: {}",
                    customer_id
                ))))
            }
        };

        let recipient = match profile.customer.external_id_for(channel) {
            Some(id) => id.to_string(),
            None => {
                return Ok(Err(SendError::Permanent(format!(
                    "客户未绑定渠道: customer_id={}, channel={}",
                    customer_id, channel
                ))))
            }
        };

        let template = campaign.template_for_variant(variant_name);
        let content = self.templater.render(
            template,
            &TemplateContext {
                profile: &profile,
                salon_name: &self.settings.salon_name,
                now,
            },
        );

        Ok(self.sender.send(channel, &recipient, &content).await)
    }
}

// ==========================================
// 退避计算
// ==========================================

/// 指数退避延迟
///
/// # 参数
/// - attempt: 已尝试次数（领取时已计入本次），首次失败传 1
///
/// # 返回
/// base * 2^(attempt-1)，指数截断防溢出
fn backoff_delay(base_ms: i64, attempt: i64) -> Duration {
    let exp = (attempt - 1).clamp(0, 16) as u32;
    Duration::milliseconds(base_ms.saturating_mul(1_i64 << exp))
}
