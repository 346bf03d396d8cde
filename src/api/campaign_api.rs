// ==========================================
// 美业沙龙客群营销引擎 - 群发活动 API
// ==========================================
// 职责: 活动创建 / 查询 / 取消 / 队列观测门面
// 红线: 输入错误同步拒绝；展开失败时活动停留在可恢复状态并原样抛给调用方
// ==========================================

use std::sync::Arc;

use chrono::{Local, NaiveDateTime};
use serde::{Deserialize, Serialize};

use crate::api::error::{ApiError, ApiResult};
use crate::api::validator;
use crate::domain::campaign::{AbVariant, Campaign};
use crate::domain::dispatch::DispatchJob;
use crate::domain::segment::SegmentCriteria;
use crate::domain::types::{CampaignStatus, ChannelKind};
use crate::engine::repositories::EngineRepositories;
use crate::engine::scheduler::CampaignScheduler;
use crate::repository::dispatch_job_repo::QueueStats;

// ==========================================
// 请求 DTO
// ==========================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateCampaignRequest {
    pub name: String,
    /// 默认模板（无 A/B 或变体未命中时使用）
    pub template: String,
    /// 多组筛选条件，解析时取并集
    pub criteria: Vec<SegmentCriteria>,
    pub channels: Vec<ChannelKind>,
    /// None = 立即发送
    #[serde(skip_serializing_if = "Option::is_none")]
    pub scheduled_at: Option<NaiveDateTime>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ab_variants: Option<Vec<AbVariant>>,
}

// ==========================================
// CampaignApi - 群发活动 API
// ==========================================
pub struct CampaignApi {
    repos: EngineRepositories,
    scheduler: Arc<CampaignScheduler>,
}

impl CampaignApi {
    /// 创建新的CampaignApi实例
    pub fn new(repos: EngineRepositories, scheduler: Arc<CampaignScheduler>) -> Self {
        Self { repos, scheduler }
    }

    /// 创建并激活群发活动
    ///
    /// # 流程
    /// 1. 同步校验入参（失败即拒绝，不产生任何落库）
    /// 2. 落库 DRAFT 草稿
    /// 3. 交给调度引擎激活：立即展开或登记排期
    ///
    /// # 返回
    /// 激活后的活动。无排期的活动返回时已处于 SENDING（或 0 收件人时 COMPLETED）。
    ///
    /// # 错误
    /// 展开阶段出错时活动停留在 DRAFT / SCHEDULED，可修正后重建或等待人工触发。
    pub fn create_campaign(&self, request: CreateCampaignRequest) -> ApiResult<Campaign> {
        let _perf = crate::perf::PerfGuard::new("api.create_campaign");

        validator::validate_create_campaign(
            &request.name,
            &request.template,
            &request.criteria,
            &request.channels,
            request.ab_variants.as_deref(),
        )?;

        let now = Local::now().naive_local();
        let draft = Campaign::new_draft(
            request.name.trim().to_string(),
            request.template,
            request.criteria,
            request.channels,
            request.scheduled_at,
            request.ab_variants,
            now,
        );
        self.repos.campaign_repo.insert(&draft)?;

        let activated = self.scheduler.activate(&draft, now)?;
        tracing::info!(
            "活动已创建: campaign_id={}, name={}, status={}",
            activated.campaign_id,
            activated.name,
            activated.status
        );
        Ok(activated)
    }

    /// 查询单个活动
    pub fn get_campaign(&self, campaign_id: &str) -> ApiResult<Campaign> {
        self.repos
            .campaign_repo
            .find_by_id(campaign_id)?
            .ok_or_else(|| ApiError::NotFound(format!("活动(id={})不存在", campaign_id)))
    }

    /// 查询全部活动（按创建时间倒序）
    pub fn list_campaigns(&self) -> ApiResult<Vec<Campaign>> {
        Ok(self.repos.campaign_repo.list_all()?)
    }

    /// 取消排期中的活动
    ///
    /// 仅 SCHEDULED 态可取消：活动回到 DRAFT，到点触发任务同步作废。
    /// 已进入 SENDING 的活动不可取消（任务已展开）。
    pub fn cancel_campaign(&self, campaign_id: &str) -> ApiResult<Campaign> {
        let _perf = crate::perf::PerfGuard::new("api.cancel_campaign");

        let now = Local::now().naive_local();
        let cancelled = self.scheduler.cancel_scheduled(campaign_id, now)?;
        if !cancelled {
            let current = self.get_campaign(campaign_id)?;
            return Err(ApiError::InvalidStateTransition {
                from: current.status.to_db_str().to_string(),
                to: CampaignStatus::Draft.to_db_str().to_string(),
            });
        }

        self.get_campaign(campaign_id)
    }

    /// 查询活动的派发任务明细（运营排查用）
    pub fn list_campaign_jobs(&self, campaign_id: &str) -> ApiResult<Vec<DispatchJob>> {
        // 先确认活动存在，避免把"无任务"与"无活动"混为一谈
        self.get_campaign(campaign_id)?;
        Ok(self.repos.dispatch_job_repo.list_by_campaign(campaign_id)?)
    }

    /// 派发队列全局统计
    pub fn get_queue_stats(&self) -> ApiResult<QueueStats> {
        Ok(self.repos.dispatch_job_repo.get_queue_stats()?)
    }
}
