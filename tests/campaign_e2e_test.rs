// ==========================================
// API 层端到端测试
// ==========================================
// 职责: 验证 客群创建 -> 活动创建 -> 派发 -> 效果分析 的完整链路
// 说明: API 门面内部取墙钟时间，派发时以未来时点 drain 保证确定性
// ==========================================


use std::sync::{Arc, Mutex};

use chrono::{Duration, Local, NaiveDateTime};
use salon_campaign_engine::api::analytics_api::AnalyticsApi;
use salon_campaign_engine::api::campaign_api::{CampaignApi, CreateCampaignRequest};
use salon_campaign_engine::api::error::ApiError;
use salon_campaign_engine::api::segment_api::{CreateSegmentRequest, SegmentApi};
use salon_campaign_engine::channel::SendError;
use salon_campaign_engine::domain::campaign::AbVariant;
use salon_campaign_engine::domain::segment::{CountRange, SegmentCriteria};
use salon_campaign_engine::domain::types::{CampaignStatus, ChannelKind};
use salon_campaign_engine::engine::scheduler::{CampaignScheduler, SchedulerSettings};
use salon_campaign_engine::queue::dispatcher::{Dispatcher, DispatcherSettings};
use tempfile::NamedTempFile;
use test_helpers::{
    build_repos, create_test_db, make_customer, make_visit, open_test_connection,
    MockChannelSender,
};

struct TestApp {
    _temp_file: NamedTempFile,
    sender: Arc<MockChannelSender>,
    dispatcher: Dispatcher,
    segment_api: SegmentApi,
    campaign_api: CampaignApi,
    analytics_api: AnalyticsApi,
}

/// 按装配层的方式组装全套门面
///
/// 随机初始延迟设为 0：任务在创建时点即到期，drain 可确定性消化
fn build_app(sender: Arc<MockChannelSender>, visiting_customers: usize) -> TestApp {
    let (temp_file, db_path) = create_test_db().expect("Failed to create test db");
    let conn = Arc::new(Mutex::new(
        open_test_connection(&db_path).expect("Failed to open db"),
    ));
    let repos = build_repos(conn);

    // API 门面内部取墙钟，客户画像也要以墙钟为基准铺设
    let now = Local::now().naive_local();
    let mut customers = Vec::new();
    let mut visits = Vec::new();
    for i in 0..visiting_customers {
        let customer_id = format!("C{:03}", i + 1);
        customers.push(make_customer(&customer_id, "客户", now));
        visits.push(make_visit(
            &customer_id,
            &format!("T{:03}", i + 1),
            now - Duration::days(10 + i as i64),
            8_000.0,
        ));
    }
    // 追加一个从未到店的客户，频次条件应将其排除
    customers.push(make_customer("C900", "新客", now));
    repos
        .customer_repo
        .batch_insert_customers(&customers)
        .expect("Failed to insert customers");
    repos
        .customer_repo
        .batch_insert_visits(&visits)
        .expect("Failed to insert visits");

    let settings = SchedulerSettings {
        max_attempts: 3,
        initial_delay_max_ms: 0,
        rfm_window_days: 365,
        assumed_ticket: 8_000.0,
    };
    let scheduler = Arc::new(CampaignScheduler::new(repos.clone(), settings.clone()));
    let dispatcher = Dispatcher::new(
        repos.clone(),
        scheduler.clone(),
        sender.clone(),
        DispatcherSettings {
            worker_concurrency: 1,
            poll_interval_ms: 10,
            backoff_base_ms: 1_000,
            salon_name: "茉莉沙龙".to_string(),
        },
    );

    TestApp {
        segment_api: SegmentApi::new(repos.clone(), settings),
        campaign_api: CampaignApi::new(repos.clone(), scheduler),
        analytics_api: AnalyticsApi::new(repos),
        _temp_file: temp_file,
        sender,
        dispatcher,
    }
}

fn visitors_criteria() -> SegmentCriteria {
    SegmentCriteria {
        frequency: Some(CountRange::at_least(1)),
        ..Default::default()
    }
}

/// 派发基准时点: 墙钟加一段余量，覆盖 API 调用间的时钟前进
fn drain_at() -> NaiveDateTime {
    Local::now().naive_local() + Duration::seconds(30)
}

// ==========================================
// 测试1: 立即发送全链路
// ==========================================
#[tokio::test]
async fn test_immediate_campaign_full_flow() {
    let sender = Arc::new(MockChannelSender::always_ok());
    let app = build_app(sender.clone(), 2);

    // 1. 创建客群: 2 个到店客户命中，从未到店的 C900 被排除
    let segment = app
        .segment_api
        .create_segment(CreateSegmentRequest {
            name: "到店客户".to_string(),
            criteria: visitors_criteria(),
        })
        .expect("Failed to create segment");
    assert_eq!(segment.matched_count, 2);
    assert!(segment.warnings.is_empty());

    // 重名创建只产生软提醒，不阻断
    let duplicate = app
        .segment_api
        .create_segment(CreateSegmentRequest {
            name: "到店客户".to_string(),
            criteria: visitors_criteria(),
        })
        .expect("Failed to create duplicate-name segment");
    assert_eq!(duplicate.warnings.len(), 1);
    assert_eq!(duplicate.warnings[0].code, "DUPLICATE_NAME");

    // 2. 以客群条件创建立即发送的活动
    let stored = app
        .segment_api
        .get_segment(&segment.segment_id)
        .expect("Failed to load segment");
    let campaign = app
        .campaign_api
        .create_campaign(CreateCampaignRequest {
            name: "六月感谢祭".to_string(),
            template: "{customer_name}，{salon_name}想念您".to_string(),
            criteria: vec![stored.criteria],
            channels: vec![ChannelKind::Line],
            scheduled_at: None,
            ab_variants: None,
        })
        .expect("Failed to create campaign");
    assert_eq!(campaign.status, CampaignStatus::Sending);
    assert_eq!(campaign.recipient_count, 2);

    let jobs = app
        .campaign_api
        .list_campaign_jobs(&campaign.campaign_id)
        .expect("Failed to list jobs");
    assert_eq!(jobs.len(), 2);

    // 3. 派发
    let drained = app
        .dispatcher
        .drain(drain_at())
        .await
        .expect("Failed to drain");
    assert_eq!(drained, 2);
    assert_eq!(app.sender.call_count(), 2);

    let completed = app
        .campaign_api
        .get_campaign(&campaign.campaign_id)
        .expect("Failed to reload campaign");
    assert_eq!(completed.status, CampaignStatus::Completed);
    assert_eq!(completed.sent_count, 2);
    assert_eq!(completed.failed_count, 0);

    // 4. 效果分析
    let analytics = app
        .analytics_api
        .get_campaign_analytics(&campaign.campaign_id)
        .expect("Failed to load analytics");
    assert_eq!(analytics.sent_count, 2);
    assert_eq!(analytics.expected_total, 2);
    assert!((analytics.delivery_rate - 1.0).abs() < f64::EPSILON);
    assert_eq!(analytics.daily_series.len(), 1);

    let stats = app
        .campaign_api
        .get_queue_stats()
        .expect("Failed to load queue stats");
    assert_eq!(stats.completed_count, 2);
    assert_eq!(stats.pending_count, 0);
}

// ==========================================
// 测试2: 排期与取消
// ==========================================
#[tokio::test]
async fn test_scheduled_campaign_cancel_flow() {
    let sender = Arc::new(MockChannelSender::always_ok());
    let app = build_app(sender.clone(), 1);

    let fire_at = Local::now().naive_local() + Duration::hours(2);
    let campaign = app
        .campaign_api
        .create_campaign(CreateCampaignRequest {
            name: "周末预约提醒".to_string(),
            template: "{customer_name}，您好".to_string(),
            criteria: vec![visitors_criteria()],
            channels: vec![ChannelKind::Line],
            scheduled_at: Some(fire_at),
            ab_variants: None,
        })
        .expect("Failed to create campaign");
    assert_eq!(campaign.status, CampaignStatus::Scheduled);

    // 取消: 回到草稿态
    let cancelled = app
        .campaign_api
        .cancel_campaign(&campaign.campaign_id)
        .expect("Failed to cancel campaign");
    assert_eq!(cancelled.status, CampaignStatus::Draft);

    // 重复取消被拒绝
    let err = app
        .campaign_api
        .cancel_campaign(&campaign.campaign_id)
        .expect_err("Second cancel must be rejected");
    match err {
        ApiError::InvalidStateTransition { from, to } => {
            assert_eq!(from, "DRAFT");
            assert_eq!(to, "DRAFT");
        }
        other => panic!("Expected InvalidStateTransition, got {:?}", other),
    }

    // 到点触发任务已作废，即便时间推进也不会发出任何消息
    let drained = app
        .dispatcher
        .drain(fire_at + Duration::seconds(30))
        .await
        .expect("Failed to drain");
    assert_eq!(drained, 0);
    assert_eq!(app.sender.call_count(), 0);
}

// ==========================================
// 测试3: 临时失败经 API 链路重试后成功
// ==========================================
#[tokio::test]
async fn test_transient_failure_recovers_through_api_flow() {
    let sender = Arc::new(MockChannelSender::with_script(vec![Err(
        SendError::Transient("渠道限流".to_string()),
    )]));
    let app = build_app(sender.clone(), 1);

    let campaign = app
        .campaign_api
        .create_campaign(CreateCampaignRequest {
            name: "回访关怀".to_string(),
            template: "{customer_name}，您好".to_string(),
            criteria: vec![visitors_criteria()],
            channels: vec![ChannelKind::Line],
            scheduled_at: None,
            ab_variants: None,
        })
        .expect("Failed to create campaign");
    assert_eq!(campaign.recipient_count, 1);

    // 第一轮: 发送失败进入退避，活动仍在派发中
    let first_round = app
        .dispatcher
        .drain(drain_at())
        .await
        .expect("Failed to drain");
    assert_eq!(first_round, 1);
    let mid = app
        .campaign_api
        .get_campaign(&campaign.campaign_id)
        .expect("Failed to reload campaign");
    assert_eq!(mid.status, CampaignStatus::Sending);
    assert_eq!(mid.sent_count, 0);

    // 第二轮: 退避到期后重试成功
    let second_round = app
        .dispatcher
        .drain(drain_at() + Duration::seconds(60))
        .await
        .expect("Failed to drain");
    assert_eq!(second_round, 1);
    assert_eq!(app.sender.call_count(), 2);

    let completed = app
        .campaign_api
        .get_campaign(&campaign.campaign_id)
        .expect("Failed to reload campaign");
    assert_eq!(completed.status, CampaignStatus::Completed);
    assert_eq!(completed.sent_count, 1);
}

// ==========================================
// 测试4: A/B 变体经 API 链路固定到任务
// ==========================================
#[tokio::test]
async fn test_ab_campaign_assigns_variants() {
    let sender = Arc::new(MockChannelSender::always_ok());
    let app = build_app(sender.clone(), 4);

    let campaign = app
        .campaign_api
        .create_campaign(CreateCampaignRequest {
            name: "文案对照实验".to_string(),
            template: "{customer_name}，您好".to_string(),
            criteria: vec![visitors_criteria()],
            channels: vec![ChannelKind::Line],
            scheduled_at: None,
            ab_variants: Some(vec![
                AbVariant {
                    name: "A".to_string(),
                    template: "文案A {customer_name}".to_string(),
                    percentage: 50.0,
                },
                AbVariant {
                    name: "B".to_string(),
                    template: "文案B {customer_name}".to_string(),
                    percentage: 50.0,
                },
            ]),
        })
        .expect("Failed to create campaign");
    assert_eq!(campaign.recipient_count, 4);

    let jobs = app
        .campaign_api
        .list_campaign_jobs(&campaign.campaign_id)
        .expect("Failed to list jobs");
    assert_eq!(jobs.len(), 4);
    for job in &jobs {
        match &job.kind {
            salon_campaign_engine::domain::dispatch::JobKind::SendMessage { variant_name, .. } => {
                let name = variant_name.as_deref().expect("Variant must be assigned");
                assert!(name == "A" || name == "B");
            }
            other => panic!("Expected SEND_MESSAGE job, got {:?}", other),
        }
    }

    // 派发后发出的内容来自任务绑定的变体模板
    let drained = app
        .dispatcher
        .drain(drain_at())
        .await
        .expect("Failed to drain");
    assert_eq!(drained, 4);
    for call in app.sender.recorded_calls() {
        assert!(
            call.content.starts_with("文案A") || call.content.starts_with("文案B"),
            "Unexpected content: {}",
            call.content
        );
    }
}

// ==========================================
// 测试5: 入参校验同步拒绝
// ==========================================
#[test]
fn test_create_campaign_validation_rejections() {
    let sender = Arc::new(MockChannelSender::always_ok());
    let app = build_app(sender, 1);

    let base = CreateCampaignRequest {
        name: "校验样例".to_string(),
        template: "{customer_name}，您好".to_string(),
        criteria: vec![visitors_criteria()],
        channels: vec![ChannelKind::Line],
        scheduled_at: None,
        ab_variants: None,
    };

    // 空名称
    let err = app
        .campaign_api
        .create_campaign(CreateCampaignRequest {
            name: "  ".to_string(),
            ..base.clone()
        })
        .expect_err("Blank name must be rejected");
    assert!(matches!(err, ApiError::CampaignValidationError { .. }));

    // 未知占位符
    let err = app
        .campaign_api
        .create_campaign(CreateCampaignRequest {
            template: "{coupon_code}已到账".to_string(),
            ..base.clone()
        })
        .expect_err("Unknown placeholder must be rejected");
    assert!(matches!(err, ApiError::CampaignValidationError { .. }));

    // 空渠道
    let err = app
        .campaign_api
        .create_campaign(CreateCampaignRequest {
            channels: Vec::new(),
            ..base.clone()
        })
        .expect_err("Empty channels must be rejected");
    assert!(matches!(err, ApiError::CampaignValidationError { .. }));

    // A/B 变体不足两个
    let err = app
        .campaign_api
        .create_campaign(CreateCampaignRequest {
            ab_variants: Some(vec![AbVariant {
                name: "A".to_string(),
                template: "文案A".to_string(),
                percentage: 100.0,
            }]),
            ..base.clone()
        })
        .expect_err("Single A/B variant must be rejected");
    assert!(matches!(err, ApiError::CampaignValidationError { .. }));

    // 校验失败不落库
    let campaigns = app
        .campaign_api
        .list_campaigns()
        .expect("Failed to list campaigns");
    assert!(campaigns.is_empty());

    // 客群侧: 空条件拒绝
    let err = app
        .segment_api
        .create_segment(CreateSegmentRequest {
            name: "空条件".to_string(),
            criteria: SegmentCriteria::default(),
        })
        .expect_err("Empty criteria must be rejected");
    assert!(matches!(err, ApiError::CampaignValidationError { .. }));
}
