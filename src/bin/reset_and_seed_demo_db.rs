use chrono::{Duration, Local, NaiveDate, NaiveDateTime};
use std::error::Error;
use std::fs;
use std::path::Path;
use std::sync::{Arc, Mutex};
use uuid::Uuid;

use salon_campaign_engine::api::{
    CampaignApi, CreateCampaignRequest, CreateSegmentRequest, SegmentApi,
};
use salon_campaign_engine::app::get_default_db_path;
use salon_campaign_engine::config::{config_keys, ConfigManager};
use salon_campaign_engine::db::{init_schema, open_sqlite_connection};
use salon_campaign_engine::domain::customer::{Customer, VisitRecord};
use salon_campaign_engine::domain::segment::{CountRange, RecencyRange, SegmentCriteria};
use salon_campaign_engine::domain::types::{ChannelKind, ChurnRiskLevel, Gender};
use salon_campaign_engine::engine::repositories::EngineRepositories;
use salon_campaign_engine::engine::scheduler::CampaignScheduler;
use salon_campaign_engine::repository::{
    CampaignRepository, CustomerRepository, DeliveryEventRepository, DispatchJobRepository,
    SegmentRepository,
};

const DEFAULT_CUSTOMER_COUNT: i32 = 200;

// 客户画像按编号分段，保证重复执行得到同一份数据
const VIP_RANGE: std::ops::RangeInclusive<i32> = 1..=20;
const REGULAR_RANGE: std::ops::RangeInclusive<i32> = 21..=100;
const LAPSED_RANGE: std::ops::RangeInclusive<i32> = 101..=140;
const NEWCOMER_RANGE: std::ops::RangeInclusive<i32> = 141..=160;

fn main() -> Result<(), Box<dyn Error>> {
    let db_path = std::env::args().nth(1).unwrap_or_else(get_default_db_path);

    let customer_count = std::env::args()
        .nth(2)
        .and_then(|s| s.parse::<i32>().ok())
        .unwrap_or(DEFAULT_CUSTOMER_COUNT)
        .max(50);

    backup_and_reset_db(&db_path)?;

    let conn = open_sqlite_connection(&db_path)?;
    init_schema(&conn)?;

    let conn = Arc::new(Mutex::new(conn));

    let repos = EngineRepositories::new(
        Arc::new(CustomerRepository::from_connection(conn.clone())),
        Arc::new(SegmentRepository::from_connection(conn.clone())),
        Arc::new(CampaignRepository::from_connection(conn.clone())),
        Arc::new(DispatchJobRepository::from_connection(conn.clone())),
        Arc::new(DeliveryEventRepository::from_connection(conn.clone())),
    );

    let config = ConfigManager::from_connection(conn.clone())?;
    seed_config(&config)?;

    let now = Local::now().naive_local();
    seed_customers(&repos, customer_count, now)?;
    seed_demo_segment_and_campaign(&repos, &config, now)?;

    print_quick_counts(conn)?;

    Ok(())
}

fn backup_and_reset_db(db_path: &str) -> Result<(), Box<dyn Error>> {
    let path = Path::new(db_path);
    if !path.exists() {
        return Ok(());
    }

    let ts = Local::now().format("%Y%m%d_%H%M%S").to_string();
    let backup_path = format!("{}.bak.{}", db_path, ts);
    fs::copy(path, &backup_path)?;
    fs::remove_file(path)?;

    eprintln!("Backed up {} -> {}", db_path, backup_path);
    Ok(())
}

fn seed_config(config: &ConfigManager) -> Result<(), Box<dyn Error>> {
    let defaults = [
        (config_keys::WORKER_CONCURRENCY, "4"),
        (config_keys::MAX_ATTEMPTS, "3"),
        (config_keys::BACKOFF_BASE_MS, "1000"),
        (config_keys::INITIAL_DELAY_MAX_MS, "5000"),
        (config_keys::POLL_INTERVAL_MS, "200"),
        (config_keys::RFM_WINDOW_DAYS, "365"),
        (config_keys::ASSUMED_TICKET_PRICE, "8000"),
        (config_keys::SALON_NAME, "示例沙龙"),
        (config_keys::SALON_LOCALE, "zh-CN"),
    ];

    for (key, value) in defaults {
        config.set_global_config_value(key, value)?;
    }
    Ok(())
}

fn seed_customers(
    repos: &EngineRepositories,
    customer_count: i32,
    now: NaiveDateTime,
) -> Result<(), Box<dyn Error>> {
    let mut customers: Vec<Customer> = Vec::new();
    let mut visits: Vec<VisitRecord> = Vec::new();

    for i in 1..=customer_count {
        let customer_id = format!("CUST{:04}", i);

        // 约 1/7 的客户未绑定 LINE，用于演示"渠道未绑定=永久失败"
        let line_user_id = if i % 7 == 0 {
            None
        } else {
            Some(format!("line-u{:04}", i))
        };
        let instagram_user_id = if i % 3 == 0 {
            Some(format!("ig-u{:04}", i))
        } else {
            None
        };

        let gender = match i % 4 {
            0 => Some(Gender::Male),
            3 if i % 12 == 3 => Some(Gender::Other),
            _ => Some(Gender::Female),
        };

        let birth_year = 1970 + (i % 40);
        let birth_date = NaiveDate::from_ymd_opt(birth_year, ((i % 12) + 1) as u32, ((i % 28) + 1) as u32);

        let churn_risk_level = if LAPSED_RANGE.contains(&i) {
            Some(ChurnRiskLevel::High)
        } else if i % 5 == 0 {
            Some(ChurnRiskLevel::Medium)
        } else {
            Some(ChurnRiskLevel::Low)
        };

        customers.push(Customer {
            customer_id: customer_id.clone(),
            name: format!("顾客{:04}", i),
            gender,
            birth_date,
            phone: Some(format!("090-{:04}-{:04}", 1000 + i, 2000 + i)),
            line_user_id,
            instagram_user_id,
            visit_interval_days: if i % 13 == 0 { None } else { Some((20 + i % 40) as i64) },
            churn_risk_level,
            registered_at: now - Duration::days(365 + i as i64),
            updated_at: now,
        });

        // 消费记录按画像铺开：VIP 高频高客单 / 常客中频 / 流失客全部在 200 天前 /
        // 新客一笔 / 其余从未到店（"超过 N 天没来" 识别从未到店用）
        let visit_plan: Vec<(i64, f64)> = if VIP_RANGE.contains(&i) {
            (0..10)
                .map(|j| (3 + j * 30, 12_000.0 + ((i % 5) as f64) * 2_000.0))
                .collect()
        } else if REGULAR_RANGE.contains(&i) {
            (0..4)
                .map(|j| (10 + j * 60, 6_000.0 + ((i % 10) as f64) * 500.0))
                .collect()
        } else if LAPSED_RANGE.contains(&i) {
            (0..3).map(|j| (200 + j * 45, 7_000.0)).collect()
        } else if NEWCOMER_RANGE.contains(&i) {
            vec![((i % 14) as i64, 5_000.0)]
        } else {
            Vec::new()
        };

        for (days_ago, amount) in visit_plan {
            let menu_name = match days_ago % 4 {
                0 => "カット＋カラー",
                1 => "パーマ",
                2 => "トリートメント",
                _ => "ヘッドスパ",
            };
            visits.push(VisitRecord {
                transaction_id: Uuid::new_v4().to_string(),
                customer_id: customer_id.clone(),
                visited_at: now - Duration::days(days_ago),
                amount,
                menu_name: Some(menu_name.to_string()),
                staff_name: Some(format!("担当{}", (i % 6) + 1)),
            });
        }
    }

    let inserted = repos.customer_repo.batch_insert_customers(&customers)?;
    eprintln!("Seeded {} customers", inserted);

    let inserted = repos.customer_repo.batch_insert_visits(&visits)?;
    eprintln!("Seeded {} visit records", inserted);

    for i in 1..=customer_count {
        let customer_id = format!("CUST{:04}", i);
        let mut tags: Vec<String> = Vec::new();
        if i % 2 == 0 {
            tags.push("会员".to_string());
        }
        if i % 4 == 0 {
            tags.push("染发".to_string());
        }
        if i % 5 == 0 {
            tags.push("烫发".to_string());
        }
        if NEWCOMER_RANGE.contains(&i) {
            tags.push("新客".to_string());
        }
        if !tags.is_empty() {
            repos.customer_repo.add_tags(&customer_id, &tags)?;
        }
    }

    Ok(())
}

fn seed_demo_segment_and_campaign(
    repos: &EngineRepositories,
    config: &ConfigManager,
    now: NaiveDateTime,
) -> Result<(), Box<dyn Error>> {
    let scheduler_settings = config.scheduler_settings()?;

    let segment_api = SegmentApi::new(repos.clone(), scheduler_settings.clone());
    let segment = segment_api.create_segment(CreateSegmentRequest {
        name: "挚爱回头客".to_string(),
        criteria: SegmentCriteria {
            frequency: Some(CountRange::at_least(3)),
            ..Default::default()
        },
    })?;
    eprintln!(
        "Seeded segment {} (matched {})",
        segment.segment_id, segment.matched_count
    );

    let scheduler = Arc::new(CampaignScheduler::new(repos.clone(), scheduler_settings));
    let campaign_api = CampaignApi::new(repos.clone(), scheduler);

    // 定时在 1 小时后展开，种子库里因此带有一条待触发的队列任务
    let campaign = campaign_api.create_campaign(CreateCampaignRequest {
        name: "回访唤醒活动".to_string(),
        template: "{customer_name}，{salon_name}提醒您：距离上次光临已有一段时间了，{season_greeting}"
            .to_string(),
        criteria: vec![SegmentCriteria {
            last_visit: Some(RecencyRange {
                within_days: None,
                over_days: Some(90),
            }),
            ..Default::default()
        }],
        channels: vec![ChannelKind::Line],
        scheduled_at: Some(now + Duration::hours(1)),
        ab_variants: None,
    })?;
    eprintln!(
        "Seeded campaign {} status={}",
        campaign.campaign_id, campaign.status
    );

    Ok(())
}

fn print_quick_counts(
    conn: Arc<Mutex<rusqlite::Connection>>,
) -> Result<(), Box<dyn Error>> {
    let conn = conn.lock().map_err(|e| format!("锁获取失败: {}", e))?;
    let tables = [
        "customer",
        "customer_tag",
        "customer_transaction",
        "segment",
        "campaign",
        "dispatch_job",
        "delivery_event",
        "config_kv",
    ];

    eprintln!("Row counts:");
    for t in tables {
        let sql = format!("SELECT COUNT(*) FROM {}", t);
        let c: i64 = conn.query_row(&sql, [], |row| row.get(0))?;
        eprintln!("  {:<22} {}", t, c);
    }
    Ok(())
}
