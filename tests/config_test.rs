// ==========================================
// 配置管理器集成测试
// ==========================================
// 职责: 验证配置读写、默认值回退与引擎参数装配
// ==========================================


use std::sync::{Arc, Mutex};

use salon_campaign_engine::config::config_manager::{config_keys, ConfigManager};
use test_helpers::{create_test_db, insert_test_config, open_test_connection};

// ==========================================
// 测试1: 管理器创建
// ==========================================
#[test]
fn test_config_manager_creation() {
    let (_temp_file, db_path) = create_test_db().expect("Failed to create test db");
    let manager = ConfigManager::new(&db_path);
    assert!(manager.is_ok(), "ConfigManager should be created successfully");
}

// ==========================================
// 测试2: 未配置时落回默认值
// ==========================================
#[test]
fn test_defaults_when_unset() {
    let (_temp_file, db_path) = create_test_db().expect("Failed to create test db");
    let manager = ConfigManager::new(&db_path).expect("Failed to create manager");

    assert_eq!(
        manager
            .get_global_config_value(config_keys::MAX_ATTEMPTS)
            .expect("Failed to read raw value"),
        None,
        "Fresh db must not carry any global config"
    );

    assert_eq!(manager.get_worker_concurrency().expect("Failed to get"), 4);
    assert_eq!(manager.get_max_attempts().expect("Failed to get"), 3);
    assert_eq!(manager.get_backoff_base_ms().expect("Failed to get"), 1_000);
    assert_eq!(manager.get_initial_delay_max_ms().expect("Failed to get"), 5_000);
    assert_eq!(manager.get_poll_interval_ms().expect("Failed to get"), 200);
    assert_eq!(manager.get_rfm_window_days().expect("Failed to get"), 365);
    assert_eq!(manager.get_assumed_ticket_price().expect("Failed to get"), 8_000.0);
    assert_eq!(manager.get_salon_name().expect("Failed to get"), "示例沙龙");
    assert_eq!(manager.get_salon_locale().expect("Failed to get"), "zh-CN");
}

// ==========================================
// 测试3: 写入后读回（UPSERT 覆盖）
// ==========================================
#[test]
fn test_set_and_get_roundtrip() {
    let (_temp_file, db_path) = create_test_db().expect("Failed to create test db");
    let manager = ConfigManager::new(&db_path).expect("Failed to create manager");

    manager
        .set_global_config_value(config_keys::MAX_ATTEMPTS, "5")
        .expect("Failed to set value");
    assert_eq!(
        manager
            .get_global_config_value(config_keys::MAX_ATTEMPTS)
            .expect("Failed to read raw value"),
        Some("5".to_string())
    );
    assert_eq!(manager.get_max_attempts().expect("Failed to get"), 5);

    // 同键再写为覆盖
    manager
        .set_global_config_value(config_keys::MAX_ATTEMPTS, "7")
        .expect("Failed to overwrite value");
    assert_eq!(manager.get_max_attempts().expect("Failed to get"), 7);

    manager
        .set_global_config_value(config_keys::SALON_LOCALE, "en")
        .expect("Failed to set locale");
    assert_eq!(manager.get_salon_locale().expect("Failed to get"), "en");
}

// ==========================================
// 测试4: 非法值落回默认值（不报错）
// ==========================================
#[test]
fn test_invalid_value_falls_back_to_default() {
    let (_temp_file, db_path) = create_test_db().expect("Failed to create test db");
    let manager = ConfigManager::new(&db_path).expect("Failed to create manager");

    manager
        .set_global_config_value(config_keys::MAX_ATTEMPTS, "abc")
        .expect("Failed to set value");
    assert_eq!(
        manager.get_max_attempts().expect("Failed to get"),
        3,
        "Unparseable value should fall back to default"
    );

    manager
        .set_global_config_value(config_keys::ASSUMED_TICKET_PRICE, "many-yen")
        .expect("Failed to set value");
    assert_eq!(manager.get_assumed_ticket_price().expect("Failed to get"), 8_000.0);

    manager
        .set_global_config_value(config_keys::WORKER_CONCURRENCY, "-2")
        .expect("Failed to set value");
    assert_eq!(
        manager.get_worker_concurrency().expect("Failed to get"),
        4,
        "Negative worker count is unparseable as usize and falls back"
    );
}

// ==========================================
// 测试5: 引擎参数装配
// ==========================================
#[test]
fn test_settings_assembly_from_seeded_config() {
    let (_temp_file, db_path) = create_test_db().expect("Failed to create test db");
    let conn = open_test_connection(&db_path).expect("Failed to open db");
    insert_test_config(&conn).expect("Failed to seed config");
    let manager = ConfigManager::from_connection(Arc::new(Mutex::new(conn)))
        .expect("Failed to create manager");

    let scheduler = manager.scheduler_settings().expect("Failed to assemble");
    assert_eq!(scheduler.max_attempts, 5);
    assert_eq!(scheduler.initial_delay_max_ms, 0);
    assert_eq!(scheduler.rfm_window_days, 180);
    assert_eq!(scheduler.assumed_ticket, 6_500.0);

    let dispatcher = manager.dispatcher_settings().expect("Failed to assemble");
    assert_eq!(dispatcher.worker_concurrency, 2);
    assert_eq!(dispatcher.poll_interval_ms, 50);
    assert_eq!(dispatcher.backoff_base_ms, 250);
    assert_eq!(dispatcher.salon_name, "茉莉美容室");
}

// ==========================================
// 测试6: 快照导出与恢复
// ==========================================
#[test]
fn test_snapshot_restore_roundtrip() {
    let (_temp_src, src_path) = create_test_db().expect("Failed to create source db");
    let source = ConfigManager::new(&src_path).expect("Failed to create manager");
    source
        .set_global_config_value(config_keys::MAX_ATTEMPTS, "9")
        .expect("Failed to set value");
    source
        .set_global_config_value(config_keys::SALON_NAME, "小林美容室")
        .expect("Failed to set value");

    let snapshot = source.get_config_snapshot().expect("Failed to snapshot");
    assert!(snapshot.contains("dispatch/max_attempts"));

    // 恢复到另一门店的空库
    let (_temp_dst, dst_path) = create_test_db().expect("Failed to create target db");
    let target = ConfigManager::new(&dst_path).expect("Failed to create manager");
    let restored = target
        .restore_config_from_snapshot(&snapshot)
        .expect("Failed to restore");
    assert_eq!(restored, 2);
    assert_eq!(target.get_max_attempts().expect("Failed to get"), 9);
    assert_eq!(target.get_salon_name().expect("Failed to get"), "小林美容室");

    // 空快照恢复 0 项
    let restored_none = target
        .restore_config_from_snapshot("{}")
        .expect("Failed to restore empty snapshot");
    assert_eq!(restored_none, 0);
}
