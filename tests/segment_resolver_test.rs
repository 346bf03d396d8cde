// ==========================================
// 客群解析引擎集成测试
// ==========================================
// 职责: 验证声明式筛选条件到 SQL 查询的翻译与 RFM 二次过滤
// 场景: 固定 4 个客户画像，覆盖高频熟客/普通回头客/沉睡客/从未到店
// ==========================================


use std::sync::{Arc, Mutex};

use chrono::Duration;
use salon_campaign_engine::domain::segment::{AmountRange, CountRange, RecencyRange, SegmentCriteria};
use salon_campaign_engine::domain::types::{ChurnRiskLevel, Gender};
use salon_campaign_engine::engine::repositories::EngineRepositories;
use salon_campaign_engine::engine::segmenting::SegmentResolver;
use tempfile::NamedTempFile;
use test_helpers::{create_test_db, fixed_now, make_customer, make_visit, open_test_connection};

const RFM_WINDOW_DAYS: i64 = 365;
const ASSUMED_TICKET: f64 = 8_000.0;

/// 搭建标准客户画像
///
/// - C001 樱井: 12 次消费(最近5天前, 每次1万) + 标签[会员, 染发] -> RFM Champions
/// - C002 田中: 男性, 3 次消费(最近40天前, 每次6千) + 标签[会员]
/// - C003 佐藤: 高流失风险, 1 次消费(200天前, 7千) -> RFM Lost
/// - C004 铃木: 高流失风险, 从未到店
fn setup_resolver() -> (NamedTempFile, EngineRepositories, SegmentResolver) {
    let (temp_file, db_path) = create_test_db().expect("Failed to create test db");
    let conn = Arc::new(Mutex::new(
        open_test_connection(&db_path).expect("Failed to open db"),
    ));
    let repos = test_helpers::build_repos(conn);
    let now = fixed_now();

    let mut c002 = make_customer("C002", "田中", now);
    c002.gender = Some(Gender::Male);
    let mut c003 = make_customer("C003", "佐藤", now);
    c003.churn_risk_level = Some(ChurnRiskLevel::High);
    let mut c004 = make_customer("C004", "铃木", now);
    c004.churn_risk_level = Some(ChurnRiskLevel::High);

    let customers = vec![make_customer("C001", "樱井", now), c002, c003, c004];
    repos
        .customer_repo
        .batch_insert_customers(&customers)
        .expect("Failed to insert customers");

    let mut visits = Vec::new();
    for j in 0..12 {
        visits.push(make_visit(
            "C001",
            &format!("T001-{:02}", j),
            now - Duration::days(5 + 10 * j),
            10_000.0,
        ));
    }
    for j in 0..3 {
        visits.push(make_visit(
            "C002",
            &format!("T002-{:02}", j),
            now - Duration::days(40 + 60 * j),
            6_000.0,
        ));
    }
    visits.push(make_visit("C003", "T003-00", now - Duration::days(200), 7_000.0));
    repos
        .customer_repo
        .batch_insert_visits(&visits)
        .expect("Failed to insert visits");

    repos
        .customer_repo
        .add_tags("C001", &["会员".to_string(), "染发".to_string()])
        .expect("Failed to tag C001");
    repos
        .customer_repo
        .add_tags("C002", &["会员".to_string()])
        .expect("Failed to tag C002");

    let resolver = SegmentResolver::new(repos.customer_repo.clone());
    (temp_file, repos, resolver)
}

fn resolve_sorted(resolver: &SegmentResolver, criteria: &SegmentCriteria) -> Vec<String> {
    let mut ids = resolver
        .resolve(criteria, fixed_now(), RFM_WINDOW_DAYS, ASSUMED_TICKET)
        .expect("Failed to resolve criteria");
    ids.sort();
    ids
}

// ==========================================
// 测试1: 消费次数区间
// ==========================================
#[test]
fn test_frequency_range_filters_by_visit_count() {
    let (_tmp, _repos, resolver) = setup_resolver();

    let heavy = SegmentCriteria {
        frequency: Some(CountRange::at_least(10)),
        ..Default::default()
    };
    assert_eq!(resolve_sorted(&resolver, &heavy), vec!["C001"]);

    let moderate = SegmentCriteria {
        frequency: Some(CountRange::between(2, 5)),
        ..Default::default()
    };
    assert_eq!(resolve_sorted(&resolver, &moderate), vec!["C002"]);
}

// ==========================================
// 测试2: 消费总额区间
// ==========================================
#[test]
fn test_monetary_range_filters_by_total_spend() {
    let (_tmp, _repos, resolver) = setup_resolver();

    let big_spender = SegmentCriteria {
        monetary: Some(AmountRange {
            min: Some(100_000.0),
            max: None,
        }),
        ..Default::default()
    };
    assert_eq!(resolve_sorted(&resolver, &big_spender), vec!["C001"]);
}

// ==========================================
// 测试3: 最近到店区间
// ==========================================
#[test]
fn test_last_visit_within_days() {
    let (_tmp, _repos, resolver) = setup_resolver();

    let recent = SegmentCriteria {
        last_visit: Some(RecencyRange {
            within_days: Some(30),
            over_days: None,
        }),
        ..Default::default()
    };
    assert_eq!(resolve_sorted(&resolver, &recent), vec!["C001"]);

    let wider = SegmentCriteria {
        last_visit: Some(RecencyRange {
            within_days: Some(60),
            over_days: None,
        }),
        ..Default::default()
    };
    assert_eq!(resolve_sorted(&resolver, &wider), vec!["C001", "C002"]);
}

#[test]
fn test_last_visit_over_days_includes_never_visited() {
    let (_tmp, _repos, resolver) = setup_resolver();

    // 超过 90 天没来: 沉睡客命中，从未到店的客户同样命中
    let dormant = SegmentCriteria {
        last_visit: Some(RecencyRange {
            within_days: None,
            over_days: Some(90),
        }),
        ..Default::default()
    };
    assert_eq!(resolve_sorted(&resolver, &dormant), vec!["C003", "C004"]);
}

// ==========================================
// 测试4: 空条件 fail-closed
// ==========================================
#[test]
fn test_empty_criteria_resolves_to_no_one() {
    let (_tmp, _repos, resolver) = setup_resolver();

    let ids = resolve_sorted(&resolver, &SegmentCriteria::default());
    assert!(ids.is_empty(), "Empty criteria must match no customers");
}

// ==========================================
// 测试5: 多组条件并集去重
// ==========================================
#[test]
fn test_union_dedupes_overlapping_criteria() {
    let (_tmp, _repos, resolver) = setup_resolver();

    // 第一组命中 C001，第二组命中 C001 + C002，并集应去重
    let criteria_list = vec![
        SegmentCriteria {
            frequency: Some(CountRange::at_least(10)),
            ..Default::default()
        },
        SegmentCriteria {
            last_visit: Some(RecencyRange {
                within_days: Some(60),
                over_days: None,
            }),
            ..Default::default()
        },
    ];

    let ids = resolver
        .resolve_union(&criteria_list, fixed_now(), RFM_WINDOW_DAYS, ASSUMED_TICKET)
        .expect("Failed to resolve union");
    assert_eq!(ids, vec!["C001", "C002"]);
}

// ==========================================
// 测试6: 标签与画像列
// ==========================================
#[test]
fn test_tags_all_requires_every_tag() {
    let (_tmp, _repos, resolver) = setup_resolver();

    let members = SegmentCriteria {
        tags_all: Some(vec!["会员".to_string()]),
        ..Default::default()
    };
    assert_eq!(resolve_sorted(&resolver, &members), vec!["C001", "C002"]);

    // 要求同时具备两个标签
    let colored_members = SegmentCriteria {
        tags_all: Some(vec!["会员".to_string(), "染发".to_string()]),
        ..Default::default()
    };
    assert_eq!(resolve_sorted(&resolver, &colored_members), vec!["C001"]);
}

#[test]
fn test_gender_and_churn_risk_filters() {
    let (_tmp, _repos, resolver) = setup_resolver();

    let male = SegmentCriteria {
        gender: Some(Gender::Male),
        ..Default::default()
    };
    assert_eq!(resolve_sorted(&resolver, &male), vec!["C002"]);

    let high_risk = SegmentCriteria {
        churn_risk: Some(ChurnRiskLevel::High),
        ..Default::default()
    };
    assert_eq!(resolve_sorted(&resolver, &high_risk), vec!["C003", "C004"]);
}

#[test]
fn test_age_range_translates_to_birth_bounds() {
    let (_tmp, _repos, resolver) = setup_resolver();

    // 所有客户生日 1990-04-01，基准日 2025-06-01 时 35 周岁
    let mid_thirties = SegmentCriteria {
        age: Some(CountRange::between(30, 39)),
        ..Default::default()
    };
    assert_eq!(
        resolve_sorted(&resolver, &mid_thirties),
        vec!["C001", "C002", "C003", "C004"]
    );

    let forties = SegmentCriteria {
        age: Some(CountRange::between(40, 49)),
        ..Default::default()
    };
    assert!(resolve_sorted(&resolver, &forties).is_empty());
}

// ==========================================
// 测试7: RFM 命名客群二次过滤
// ==========================================
#[test]
fn test_rfm_segment_second_pass_filter() {
    let (_tmp, _repos, resolver) = setup_resolver();

    // C001: 5天前/12次/12万 -> R5 F4 M5 -> Champions
    let champions = SegmentCriteria {
        rfm_segment: Some("Champions".to_string()),
        ..Default::default()
    };
    assert_eq!(resolve_sorted(&resolver, &champions), vec!["C001"]);

    // C003: 200天前/1次/7千 -> R1 F1 M2 -> Lost；C004 无消费记录不参与评分
    let lost = SegmentCriteria {
        rfm_segment: Some("Lost".to_string()),
        ..Default::default()
    };
    assert_eq!(resolve_sorted(&resolver, &lost), vec!["C003"]);
}

// ==========================================
// 测试8: RFM 过滤与行为条件组合
// ==========================================
#[test]
fn test_rfm_segment_combined_with_scalar_filter() {
    let (_tmp, _repos, resolver) = setup_resolver();

    // 标签先缩小候选集，再按 RFM 分层过滤
    let member_champions = SegmentCriteria {
        tags_all: Some(vec!["会员".to_string()]),
        rfm_segment: Some("Champions".to_string()),
        ..Default::default()
    };
    assert_eq!(resolve_sorted(&resolver, &member_champions), vec!["C001"]);

    // 标签命中 C002 但其 RFM 分层不是 Champions
    let conflicting = SegmentCriteria {
        gender: Some(Gender::Male),
        rfm_segment: Some("Champions".to_string()),
        ..Default::default()
    };
    assert!(resolve_sorted(&resolver, &conflicting).is_empty());
}

// ==========================================
// 测试9: 消费次数下限精确切分
// ==========================================
#[test]
fn test_frequency_floor_splits_population_exactly() {
    // 独立样本: 三个客户消费次数分别为 3 / 12 / 25
    let (_tmp, db_path) = create_test_db().expect("Failed to create test db");
    let conn = Arc::new(Mutex::new(
        open_test_connection(&db_path).expect("Failed to open db"),
    ));
    let repos = test_helpers::build_repos(conn);
    let now = fixed_now();

    let customers = vec![
        make_customer("C101", "山本", now),
        make_customer("C102", "高桥", now),
        make_customer("C103", "中村", now),
    ];
    repos
        .customer_repo
        .batch_insert_customers(&customers)
        .expect("Failed to insert customers");

    let mut visits = Vec::new();
    for (customer_id, count) in [("C101", 3), ("C102", 12), ("C103", 25)] {
        for j in 0..count {
            visits.push(make_visit(
                customer_id,
                &format!("{}-{:02}", customer_id, j),
                now - Duration::days(3 + 7 * j),
                5_000.0,
            ));
        }
    }
    repos
        .customer_repo
        .batch_insert_visits(&visits)
        .expect("Failed to insert visits");

    let resolver = SegmentResolver::new(repos.customer_repo.clone());
    let ten_plus = SegmentCriteria {
        frequency: Some(CountRange::at_least(10)),
        ..Default::default()
    };
    let mut ids = resolver
        .resolve(&ten_plus, now, RFM_WINDOW_DAYS, ASSUMED_TICKET)
        .expect("Failed to resolve criteria");
    ids.sort();
    assert_eq!(
        ids,
        vec!["C102", "C103"],
        "Only the 12 and 25 visit customers may pass the floor of 10"
    );
}

// ==========================================
// 测试10: 条件不变时解析结果可重复
// ==========================================
#[test]
fn test_resolution_repeatable_without_data_changes() {
    let (_tmp, _repos, resolver) = setup_resolver();

    // 同时走 SQL 谓词与 RFM 二次过滤的最复杂路径
    let criteria = SegmentCriteria {
        tags_all: Some(vec!["会员".to_string()]),
        rfm_segment: Some("Champions".to_string()),
        ..Default::default()
    };
    let first = resolve_sorted(&resolver, &criteria);
    let second = resolve_sorted(&resolver, &criteria);
    assert_eq!(first, second, "Unchanged data must resolve to the same id set");
    assert_eq!(first, vec!["C001"]);
}
