// ==========================================
// 美业沙龙客群营销引擎 - 活动调度引擎
// ==========================================
// 红线: SENDING 只能进入一次，幂等键为活动ID
// 红线: 排期活动在到点展开时重新解析客群，不用创建时的快照
// 红线: 展开失败时活动停留在 DRAFT / SCHEDULED，可再次触发
// ==========================================
// 职责: 活动生命周期 DRAFT -> SCHEDULED -> SENDING -> COMPLETED / FAILED
// 展开: 解析收件人 -> 按 (客户, 渠道) 生成派发任务 -> 单事务落库
// ==========================================

use crate::domain::campaign::{AbVariant, Campaign};
use crate::domain::dispatch::{DispatchJob, JobKind};
use crate::domain::types::CampaignStatus;
use crate::engine::repositories::EngineRepositories;
use crate::engine::segmenting::SegmentResolver;
use crate::repository::campaign_repo::FanoutOutcome;
use crate::repository::error::{RepositoryError, RepositoryResult};
use chrono::{Duration, NaiveDateTime};
use rand::Rng;
use tracing::instrument;

// ==========================================
// SchedulerSettings - 调度参数
// ==========================================
// 由配置层解析后注入（引擎不直接读配置表）
#[derive(Debug, Clone)]
pub struct SchedulerSettings {
    /// 派发任务尝试上限（含首次）
    pub max_attempts: i64,
    /// 任务初始随机延迟上限（毫秒，落库按秒粒度生效）
    pub initial_delay_max_ms: u64,
    /// RFM 统计窗口天数
    pub rfm_window_days: i64,
    /// 无金额历史时的客单价假定值
    pub assumed_ticket: f64,
}

impl Default for SchedulerSettings {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_delay_max_ms: 5_000,
            rfm_window_days: 365,
            assumed_ticket: 8_000.0,
        }
    }
}

// ==========================================
// CampaignScheduler - 活动调度引擎
// ==========================================
pub struct CampaignScheduler {
    repos: EngineRepositories,
    resolver: SegmentResolver,
    settings: SchedulerSettings,
}

impl CampaignScheduler {
    /// 创建新的活动调度引擎
    pub fn new(repos: EngineRepositories, settings: SchedulerSettings) -> Self {
        let resolver = SegmentResolver::new(repos.customer_repo.clone());
        Self {
            repos,
            resolver,
            settings,
        }
    }

    // ==========================================
    // 核心方法
    // ==========================================

    /// 激活刚落库的草稿活动
    ///
    /// - 无排期或排期已过 -> 立即展开（直接进入 SENDING）
    /// - 排期在未来 -> 置为 SCHEDULED，并登记一条到点触发任务
    ///
    /// # 返回
    /// 激活后的活动（重新读库，含最新状态与计数）
    #[instrument(skip(self, campaign), fields(campaign_id = %campaign.campaign_id))]
    pub fn activate(&self, campaign: &Campaign, now: NaiveDateTime) -> RepositoryResult<Campaign> {
        match campaign.scheduled_at {
            Some(fire_at) if fire_at > now => {
                let moved = self.repos.campaign_repo.set_status(
                    &campaign.campaign_id,
                    &[CampaignStatus::Draft],
                    CampaignStatus::Scheduled,
                    now,
                )?;
                if !moved {
                    return Err(RepositoryError::InvalidStateTransition {
                        from: campaign.status.to_db_str().to_string(),
                        to: CampaignStatus::Scheduled.to_db_str().to_string(),
                    });
                }

                // 到点触发任务：next_attempt_at 即排期时间，每个排期活动恰好一条
                let job = DispatchJob::new(
                    JobKind::FireCampaign {
                        campaign_id: campaign.campaign_id.clone(),
                    },
                    self.settings.max_attempts,
                    fire_at,
                    now,
                );
                self.repos.dispatch_job_repo.enqueue(&job)?;

                tracing::info!(
                    "活动已排期: campaign_id={}, fire_at={}",
                    campaign.campaign_id,
                    fire_at
                );
            }
            _ => {
                self.fire(&campaign.campaign_id, now)?;
            }
        }

        self.repos
            .campaign_repo
            .find_by_id(&campaign.campaign_id)?
            .ok_or_else(|| RepositoryError::NotFound {
                entity: "Campaign".to_string(),
                id: campaign.campaign_id.to_string(),
            })
    }

    /// 展开活动：解析收件人并生成派发任务（幂等）
    ///
    /// # 流程
    /// 1. 状态预检，仅 DRAFT / SCHEDULED 可展开
    /// 2. 以当前时点重新解析客群并集
    /// 3. 按 (客户, 渠道) 生成任务，A/B 变体在此按权重固定到任务上
    /// 4. 单事务落库并 CAS 进入 SENDING
    ///
    /// 任一步出错时事务回滚，活动停留在原状态，可再次触发。
    #[instrument(skip(self), fields(campaign_id = campaign_id))]
    pub fn fire(&self, campaign_id: &str, now: NaiveDateTime) -> RepositoryResult<FanoutOutcome> {
        let campaign = self
            .repos
            .campaign_repo
            .find_by_id(campaign_id)?
            .ok_or_else(|| RepositoryError::NotFound {
                entity: "Campaign".to_string(),
                id: campaign_id.to_string(),
            })?;

        if !campaign.status.can_enter_sending() {
            tracing::info!(
                "活动已展开过，跳过: campaign_id={}, status={}",
                campaign_id,
                campaign.status
            );
            return Ok(FanoutOutcome::AlreadyStarted);
        }

        // 发送时点重新解析：排期期间加入/退出客群的客户以此刻为准
        let recipient_ids = self.resolver.resolve_union(
            &campaign.criteria,
            now,
            self.settings.rfm_window_days,
            self.settings.assumed_ticket,
        )?;

        let mut rng = rand::thread_rng();
        let mut jobs = Vec::with_capacity(recipient_ids.len() * campaign.channels.len());
        for customer_id in &recipient_ids {
            for channel in &campaign.channels {
                let variant_name = campaign
                    .ab_variants
                    .as_deref()
                    .and_then(|vs| draw_variant(vs, &mut rng))
                    .map(|name| name.to_string());

                let delay_ms = rng.gen_range(0..=self.settings.initial_delay_max_ms) as i64;
                jobs.push(DispatchJob::new(
                    JobKind::SendMessage {
                        campaign_id: campaign.campaign_id.clone(),
                        customer_id: customer_id.clone(),
                        channel: *channel,
                        variant_name,
                    },
                    self.settings.max_attempts,
                    now + Duration::milliseconds(delay_ms),
                    now,
                ));
            }
        }

        let outcome = self.repos.campaign_repo.begin_sending_fanout(
            campaign_id,
            recipient_ids.len() as i64,
            &jobs,
            now,
        )?;

        match &outcome {
            FanoutOutcome::Started { job_count } => {
                tracing::info!(
                    "活动展开完成: campaign_id={}, recipients={}, jobs={}",
                    campaign_id,
                    recipient_ids.len(),
                    job_count
                );
                // 命中 0 个客户的活动没有任务驱动完成判定，在此直接收口
                if *job_count == 0 {
                    self.repos.campaign_repo.try_mark_completed(campaign_id, now)?;
                }
            }
            FanoutOutcome::AlreadyStarted => {
                tracing::info!("活动已被并发展开，跳过: campaign_id={}", campaign_id);
            }
        }

        Ok(outcome)
    }

    /// 排期任务到点触发（派发工作线程调用）
    ///
    /// 重复触发与并发触发都按幂等跳过处理
    pub fn handle_fire_job(&self, campaign_id: &str, now: NaiveDateTime) -> RepositoryResult<()> {
        self.fire(campaign_id, now)?;
        Ok(())
    }

    /// 取消排期中的活动，回到草稿态并清除到点触发任务
    ///
    /// # 返回
    /// - Ok(true): 取消成功
    /// - Ok(false): 活动不在 SCHEDULED 态，未做任何修改
    pub fn cancel_scheduled(
        &self,
        campaign_id: &str,
        now: NaiveDateTime,
    ) -> RepositoryResult<bool> {
        let reverted = self.repos.campaign_repo.set_status(
            campaign_id,
            &[CampaignStatus::Scheduled],
            CampaignStatus::Draft,
            now,
        )?;

        if reverted {
            let cancelled = self
                .repos
                .dispatch_job_repo
                .cancel_pending_by_campaign(campaign_id, now)?;
            tracing::info!(
                "排期活动已取消: campaign_id={}, cancelled_jobs={}",
                campaign_id,
                cancelled
            );
        }

        Ok(reverted)
    }

    /// 批次级不可恢复错误，SENDING -> FAILED
    pub fn mark_batch_failed(
        &self,
        campaign_id: &str,
        reason: &str,
        now: NaiveDateTime,
    ) -> RepositoryResult<bool> {
        let moved = self.repos.campaign_repo.set_status(
            campaign_id,
            &[CampaignStatus::Sending],
            CampaignStatus::Failed,
            now,
        )?;
        if moved {
            tracing::error!(
                "活动批次失败: campaign_id={}, reason={}",
                campaign_id,
                reason
            );
        }
        Ok(moved)
    }
}

// ==========================================
// A/B 变体抽取
// ==========================================

/// 按权重抽取变体名
///
/// 占比总和不要求恰好 100（容忍漂移），按各变体权重归一化抽取。
/// 空列表或总权重为 0 时返回 None（回落默认模板）。
pub fn draw_variant<'a, R: Rng>(variants: &'a [AbVariant], rng: &mut R) -> Option<&'a str> {
    let total: f64 = variants.iter().map(|v| v.percentage.max(0.0)).sum();
    if variants.is_empty() || total <= 0.0 {
        return None;
    }

    let mut remaining = rng.gen_range(0.0..total);
    for v in variants {
        let weight = v.percentage.max(0.0);
        if remaining < weight {
            return Some(v.name.as_str());
        }
        remaining -= weight;
    }
    // 浮点累计误差兜底
    variants.last().map(|v| v.name.as_str())
}
