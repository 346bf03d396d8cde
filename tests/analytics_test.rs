// ==========================================
// 送达分析聚合集成测试
// ==========================================
// 职责: 验证活动级送达聚合与按日序列
// 红线覆盖: 计数以送达事件为准 / 无事件返回全零而非错误
// ==========================================


use std::sync::{Arc, Mutex};

use chrono::Duration;
use salon_campaign_engine::channel::{SendError, SendOutcome};
use salon_campaign_engine::domain::campaign::Campaign;
use salon_campaign_engine::domain::segment::{CountRange, SegmentCriteria};
use salon_campaign_engine::domain::types::{CampaignStatus, ChannelKind};
use salon_campaign_engine::engine::analytics::AnalyticsAggregator;
use salon_campaign_engine::engine::repositories::EngineRepositories;
use salon_campaign_engine::engine::scheduler::{CampaignScheduler, SchedulerSettings};
use salon_campaign_engine::queue::dispatcher::{Dispatcher, DispatcherSettings};
use salon_campaign_engine::repository::error::RepositoryError;
use tempfile::NamedTempFile;
use test_helpers::{
    build_repos, create_test_db, fixed_now, make_customer, make_visit, open_test_connection,
    MockChannelSender,
};

/// 搭建分析测试环境: 2 个绑定 LINE 的客户
fn setup_env() -> (NamedTempFile, EngineRepositories, Arc<CampaignScheduler>) {
    let (temp_file, db_path) = create_test_db().expect("Failed to create test db");
    let conn = Arc::new(Mutex::new(
        open_test_connection(&db_path).expect("Failed to open db"),
    ));
    let repos = build_repos(conn);
    let now = fixed_now();

    repos
        .customer_repo
        .batch_insert_customers(&[
            make_customer("C001", "樱井", now),
            make_customer("C002", "田中", now),
        ])
        .expect("Failed to insert customers");
    repos
        .customer_repo
        .batch_insert_visits(&[
            make_visit("C001", "T001", now - Duration::days(10), 8_000.0),
            make_visit("C002", "T002", now - Duration::days(20), 6_000.0),
        ])
        .expect("Failed to insert visits");

    let scheduler = Arc::new(CampaignScheduler::new(
        repos.clone(),
        SchedulerSettings {
            max_attempts: 3,
            initial_delay_max_ms: 0,
            rfm_window_days: 365,
            assumed_ticket: 8_000.0,
        },
    ));
    (temp_file, repos, scheduler)
}

fn insert_draft(repos: &EngineRepositories) -> Campaign {
    let draft = Campaign::new_draft(
        "六月感谢祭".to_string(),
        "{customer_name}，您好".to_string(),
        vec![SegmentCriteria {
            frequency: Some(CountRange::at_least(1)),
            ..Default::default()
        }],
        vec![ChannelKind::Line],
        None,
        None,
        fixed_now(),
    );
    repos
        .campaign_repo
        .insert(&draft)
        .expect("Failed to insert draft campaign");
    draft
}

// ==========================================
// 测试1: 未知活动报 NotFound
// ==========================================
#[test]
fn test_unknown_campaign_is_not_found() {
    let (_tmp, repos, _scheduler) = setup_env();
    let aggregator = AnalyticsAggregator::new(repos);

    let err = aggregator
        .campaign_analytics("CMP-MISSING")
        .expect_err("Missing campaign must be an error");
    assert!(matches!(err, RepositoryError::NotFound { .. }));
}

// ==========================================
// 测试2: 未展开的草稿活动聚合为全零
// ==========================================
#[test]
fn test_draft_campaign_aggregates_to_zero() {
    let (_tmp, repos, _scheduler) = setup_env();
    let draft = insert_draft(&repos);
    let aggregator = AnalyticsAggregator::new(repos);

    let analytics = aggregator
        .campaign_analytics(&draft.campaign_id)
        .expect("Failed to aggregate");
    assert_eq!(analytics.campaign_name, "六月感谢祭");
    assert_eq!(analytics.status, CampaignStatus::Draft);
    assert_eq!(analytics.recipient_count, 0);
    assert_eq!(analytics.expected_total, 0);
    assert_eq!(analytics.sent_count, 0);
    assert_eq!(analytics.failed_count, 0);
    assert_eq!(analytics.delivery_rate, 0.0);
    assert!(analytics.daily_series.is_empty());
}

// ==========================================
// 测试3: 成败混合计数与按日序列
// ==========================================
#[tokio::test]
async fn test_mixed_outcomes_aggregate_counts_and_series() {
    let (_tmp, repos, scheduler) = setup_env();
    let t0 = fixed_now();
    let sender = Arc::new(MockChannelSender::with_script(vec![
        Ok(SendOutcome {
            message_id: "line-msg-001".to_string(),
        }),
        Err(SendError::Permanent("客户已拉黑".to_string())),
    ]));
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

    let draft = insert_draft(&repos);
    let activated = scheduler.activate(&draft, t0).expect("Failed to activate");
    assert_eq!(activated.recipient_count, 2);

    // 两条任务分两天处理，事件落在不同日期
    assert!(dispatcher.process_next(t0).await.expect("Failed to process"));
    assert!(dispatcher
        .process_next(t0 + Duration::days(1))
        .await
        .expect("Failed to process"));

    let aggregator = AnalyticsAggregator::new(repos);
    let analytics = aggregator
        .campaign_analytics(&draft.campaign_id)
        .expect("Failed to aggregate");

    assert_eq!(analytics.status, CampaignStatus::Completed);
    assert_eq!(analytics.recipient_count, 2);
    assert_eq!(analytics.expected_total, 2);
    assert_eq!(analytics.sent_count, 1);
    assert_eq!(analytics.failed_count, 1);
    assert!((analytics.delivery_rate - 0.5).abs() < f64::EPSILON);

    // 按日升序，一天一成一败
    assert_eq!(analytics.daily_series.len(), 2);
    assert_eq!(analytics.daily_series[0].day, "2025-06-01");
    assert_eq!(analytics.daily_series[0].sent_count, 1);
    assert_eq!(analytics.daily_series[0].failed_count, 0);
    assert_eq!(analytics.daily_series[1].day, "2025-06-02");
    assert_eq!(analytics.daily_series[1].sent_count, 0);
    assert_eq!(analytics.daily_series[1].failed_count, 1);
}
