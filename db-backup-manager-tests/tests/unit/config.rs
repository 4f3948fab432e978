//! Unit tests for configuration loading and validation
//!
//! These tests verify JSON/TOML parsing, defaults, aliases and validation.

use db_backup_manager::config::{
    load_config, ConfigError, EnvSecretsProvider, ManualTriggerPolicy, SecretsProvider,
};
use db_backup_manager::{Engine, ErrorKind};
use serial_test::serial;
use std::fs;
use test_utils::{ConfigBuilder, TestContext};

#[test]
fn test_config_loading_valid() {
    let ctx = TestContext::from_builder(
        ConfigBuilder::new()
            .add_database("shop", "mysql")
            .add_database("ledger", "postgresql"),
    );

    let loaded = load_config(ctx.config_path());
    assert!(loaded.is_ok(), "Config should load successfully: {:?}", loaded.err());

    let loaded = loaded.unwrap();
    assert_eq!(loaded.databases.len(), 2);
    assert_eq!(loaded.databases[1].engine, Engine::Postgresql);
}

#[test]
fn test_config_legacy_json_shape() {
    let ctx = TestContext::new();
    let path = ctx.create_file(
        "config.json",
        r#"{
  "backup-settings": { "daily_retention_days": 14, "schedule_time": "03:30", "compress": false },
  "databases": [
    { "name": "erp", "type": "mssql", "host": "sql01\\PROD", "port": 1433,
      "credentials": "MSSQL", "database": "ErpAppDb" }
  ]
}"#,
    );

    let config = load_config(&path).unwrap();

    assert_eq!(config.backup_settings.daily_retention_days, 14);
    assert_eq!(config.backup_settings.schedule_time.to_string(), "03:30");
    assert_eq!(config.backup_settings.manual_trigger, ManualTriggerPolicy::Coalesce);
    assert_eq!(config.databases[0].engine, Engine::Sqlserver);
    assert_eq!(config.databases[0].database_name(), "ErpAppDb");
    assert!(config.databases[0].enabled);
}

#[test]
fn test_config_toml() {
    let ctx = TestContext::new();
    let path = ctx.create_file(
        "config.toml",
        r#"
[backup_settings]
daily_retention_days = 30
schedule_time = "02:15"
manual_trigger = "queue"

[[databases]]
name = "shop"
engine = "mariadb"
port = 3306
credentials_ref = "SHOP"
"#,
    );

    let config = load_config(&path).unwrap();
    assert_eq!(config.backup_settings.manual_trigger, ManualTriggerPolicy::Queue);
    assert_eq!(config.databases[0].engine, Engine::Mysql);
    assert_eq!(config.databases[0].host, "localhost");
}

#[test]
fn test_config_invalid_schedule_time() {
    let ctx = TestContext::new();
    for bad in ["24:00", "7:00", "12:60", "noon"] {
        let path = ctx.create_file(
            "config.json",
            &format!(r#"{{ "backup_settings": {{ "schedule_time": "{}" }}, "databases": [] }}"#, bad),
        );
        assert!(load_config(&path).is_err(), "schedule {} should be rejected", bad);
    }
}

#[test]
fn test_config_duplicate_names() {
    let (_, temp_dir) = ConfigBuilder::new()
        .add_database("shop", "mysql")
        .add_database("shop", "postgres")
        .persist();

    let result = load_config(ConfigBuilder::config_path(&temp_dir));
    assert!(matches!(result, Err(ConfigError::DuplicateDatabase(ref n)) if n == "shop"));
}

#[test]
fn test_config_unknown_engine() {
    let (_, temp_dir) = ConfigBuilder::new().add_database("legacy", "oracle").persist();

    let result = load_config(ConfigBuilder::config_path(&temp_dir));
    assert!(matches!(result, Err(ConfigError::UnknownEngine { .. })));
}

#[test]
fn test_config_zero_retention_rejected() {
    let (_, temp_dir) = ConfigBuilder::minimal().with_retention(0).persist();
    assert!(load_config(ConfigBuilder::config_path(&temp_dir)).is_err());
}

#[test]
fn test_config_invalid_json() {
    let ctx = TestContext::new();
    let path = ctx.create_file("config.json", "{ invalid json");
    assert!(matches!(load_config(&path), Err(ConfigError::JsonError(_))));
}

#[test]
fn test_config_missing_file() {
    let ctx = TestContext::new();
    let result = load_config(ctx.temp_dir().join("absent.json"));
    assert!(matches!(result, Err(ConfigError::ReadError(_))));
}

#[test]
#[serial]
fn test_env_secrets_resolution() {
    std::env::set_var("UNIT_SHOP_DB_USER", "backup");
    std::env::set_var("UNIT_SHOP_DB_PASSWORD", "s3cret");

    let credentials = EnvSecretsProvider::new().resolve("unit-shop-db").unwrap();
    assert_eq!(credentials.user, "backup");
    assert_eq!(credentials.password, "s3cret");
    assert!(!format!("{:?}", credentials).contains("s3cret"));

    std::env::remove_var("UNIT_SHOP_DB_USER");
    std::env::remove_var("UNIT_SHOP_DB_PASSWORD");
}

#[test]
#[serial]
fn test_env_secrets_missing() {
    std::env::remove_var("UNIT_MISSING_USER");
    let err = EnvSecretsProvider::new().resolve("unit-missing").unwrap_err();
    assert_eq!(err.kind, ErrorKind::Auth);
}

#[test]
fn test_example_config_roundtrip() {
    let ctx = TestContext::new();
    let json = serde_json::to_string_pretty(&db_backup_manager::config::example_config()).unwrap();
    let path = ctx.create_file("config.json", &json);

    let config = load_config(&path).unwrap();
    assert_eq!(config.databases.len(), 3);
    assert!(fs::metadata(&path).unwrap().len() > 0);
}
