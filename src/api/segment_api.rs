// ==========================================
// 美业沙龙客群营销引擎 - 客群 API
// ==========================================
// 职责: 客群的创建与查询门面
// 红线: 重名只作软提醒，不阻断创建（运营可复用同名做迭代）
// ==========================================

use std::sync::Arc;

use chrono::{Local, NaiveDateTime};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::api::error::{ApiError, ApiResult, ApiWarning};
use crate::api::validator;
use crate::domain::segment::{Segment, SegmentCriteria};
use crate::engine::repositories::EngineRepositories;
use crate::engine::scheduler::SchedulerSettings;
use crate::engine::segmenting::SegmentResolver;

// ==========================================
// 请求 / 响应 DTO
// ==========================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateSegmentRequest {
    pub name: String,
    pub criteria: SegmentCriteria,
}

#[derive(Debug, Clone, Serialize)]
pub struct CreateSegmentResponse {
    pub segment_id: String,
    /// 以当前时点解析出的命中客户数
    pub matched_count: usize,
    /// 软提醒（重名、标签未命中等），操作已成功
    pub warnings: Vec<ApiWarning>,
}

// ==========================================
// SegmentApi - 客群 API
// ==========================================
pub struct SegmentApi {
    repos: EngineRepositories,
    resolver: SegmentResolver,
    settings: SchedulerSettings,
}

impl SegmentApi {
    /// 创建新的SegmentApi实例
    pub fn new(repos: EngineRepositories, settings: SchedulerSettings) -> Self {
        let resolver = SegmentResolver::new(repos.customer_repo.clone());
        Self {
            repos,
            resolver,
            settings,
        }
    }

    /// 创建客群
    ///
    /// # 流程
    /// 1. 同步校验入参（空名称 / 空条件 / 未知RFM分层即拒绝）
    /// 2. 收集软提醒（重名、标签未命中任何客户）
    /// 3. 以当前时点解析命中数并落库
    ///
    /// # 返回
    /// - Ok(CreateSegmentResponse): 新客群ID + 命中数 + 软提醒
    pub fn create_segment(&self, request: CreateSegmentRequest) -> ApiResult<CreateSegmentResponse> {
        let _perf = crate::perf::PerfGuard::new("api.create_segment");

        validator::validate_create_segment(&request.name, &request.criteria)?;

        let mut warnings = Vec::new();
        if !self.repos.segment_repo.find_by_name(&request.name)?.is_empty() {
            warnings.push(ApiWarning::duplicate_name("客群", &request.name));
        }
        if let Some(tags) = request.criteria.tags_all.as_ref() {
            for tag in tags {
                if !self.repos.customer_repo.tag_exists(tag)? {
                    warnings.push(ApiWarning::unknown_tag(tag));
                }
            }
        }

        let now = Local::now().naive_local();
        let matched = self.resolve_criteria(&request.criteria, now)?;

        let segment = Segment {
            segment_id: Uuid::new_v4().to_string(),
            name: request.name.trim().to_string(),
            criteria: request.criteria,
            created_at: now,
            updated_at: now,
        };
        self.repos.segment_repo.insert(&segment)?;

        tracing::info!(
            "客群已创建: segment_id={}, name={}, matched={}, warnings={}",
            segment.segment_id,
            segment.name,
            matched.len(),
            warnings.len()
        );

        Ok(CreateSegmentResponse {
            segment_id: segment.segment_id,
            matched_count: matched.len(),
            warnings,
        })
    }

    /// 查询单个客群
    pub fn get_segment(&self, segment_id: &str) -> ApiResult<Segment> {
        self.repos
            .segment_repo
            .find_by_id(segment_id)?
            .ok_or_else(|| ApiError::NotFound(format!("客群(id={})不存在", segment_id)))
    }

    /// 查询全部客群
    pub fn list_segments(&self) -> ApiResult<Vec<Segment>> {
        Ok(self.repos.segment_repo.list_all()?)
    }

    /// 以当前时点预览客群命中的客户ID
    ///
    /// 创建前的"试算"入口，条件不落库
    pub fn preview_segment(&self, criteria: &SegmentCriteria) -> ApiResult<Vec<String>> {
        let _perf = crate::perf::PerfGuard::new("api.preview_segment");
        let now = Local::now().naive_local();
        self.resolve_criteria(criteria, now)
    }

    fn resolve_criteria(
        &self,
        criteria: &SegmentCriteria,
        now: NaiveDateTime,
    ) -> ApiResult<Vec<String>> {
        Ok(self.resolver.resolve(
            criteria,
            now,
            self.settings.rfm_window_days,
            self.settings.assumed_ticket,
        )?)
    }
}
