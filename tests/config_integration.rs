use recommendation_memory::config::{AppConfig, ConfigArgs, HistoryScope};
use serial_test::serial;
use std::env;
use std::io::Write;

// Helper to clear environment variables that might interfere with tests
fn clear_env_vars() {
    unsafe {
        env::remove_var("RECMEM_MEMORY__COOLDOWN_DAYS");
        env::remove_var("RECMEM_MEMORY__HISTORY_SCOPE");
        env::remove_var("RECMEM_BATCH__GROUP_SIZE");
        env::remove_var("RECMEM_EMBEDDING__BASE_URL");
        env::remove_var("RECMEM_PERSISTENCE__PROVIDER");
    }
}

// Memory is on by default, so the http embedder needs an endpoint
fn with_endpoint() {
    unsafe {
        env::set_var("RECMEM_EMBEDDING__BASE_URL", "http://localhost:8080");
    }
}

#[test]
#[serial]
fn test_default_config() {
    clear_env_vars();
    with_endpoint();

    let config = AppConfig::load(&ConfigArgs::default()).expect("Failed to load config");
    assert!(config.memory.enabled);
    assert!((config.memory.similarity_threshold - 0.85).abs() < f32::EPSILON);
    assert_eq!(config.memory.cooldown_days, 14);
    assert_eq!(config.memory.required_count, 3);
    assert_eq!(config.memory.history_scope, HistoryScope::PerTarget);
    assert_eq!(config.batch.group_size, 5);
    assert_eq!(config.batch.max_concurrent_groups, 20);
    assert_eq!(config.persistence.provider, "memory");

    clear_env_vars();
}

#[test]
#[serial]
fn test_env_override() {
    clear_env_vars();
    with_endpoint();
    unsafe {
        env::set_var("RECMEM_MEMORY__COOLDOWN_DAYS", "7");
        env::set_var("RECMEM_MEMORY__HISTORY_SCOPE", "subject");
        env::set_var("RECMEM_BATCH__GROUP_SIZE", "10");
    }

    let config = AppConfig::load(&ConfigArgs::default()).expect("Failed to load config");
    assert_eq!(config.memory.cooldown_days, 7);
    assert_eq!(config.memory.prefilter_days(), 7);
    assert_eq!(config.memory.history_scope, HistoryScope::Subject);
    assert_eq!(config.batch.group_size, 10);

    clear_env_vars();
}

#[test]
#[serial]
fn test_file_then_cli_precedence() {
    clear_env_vars();

    let mut file = tempfile::Builder::new()
        .suffix(".yaml")
        .tempfile()
        .expect("Failed to create temp config");
    write!(
        file,
        r#"
memory:
  cooldown_days: 21
  similarity_threshold: 0.9
embedding:
  base_url: "http://embeddings.local"
batch:
  parallel_enabled: false
"#
    )
    .expect("Failed to write temp config");

    let args = ConfigArgs {
        config: Some(file.path().to_string_lossy().into_owned()),
        cooldown_days: Some(3),
        ..ConfigArgs::default()
    };
    let config = AppConfig::load(&args).expect("Failed to load config from file");

    assert_eq!(config.memory.cooldown_days, 3);
    assert!((config.memory.similarity_threshold - 0.9).abs() < 1e-6);
    assert_eq!(
        config.embedding.base_url.as_deref(),
        Some("http://embeddings.local")
    );
    assert!(!config.batch.parallel_enabled);
}

#[test]
#[serial]
fn test_invalid_values_are_rejected() {
    clear_env_vars();
    with_endpoint();
    unsafe {
        env::set_var("RECMEM_BATCH__GROUP_SIZE", "0");
    }
    let err = AppConfig::load(&ConfigArgs::default()).unwrap_err();
    assert!(err.to_string().contains("batch.group_size"));

    clear_env_vars();
    with_endpoint();
    let args = ConfigArgs {
        similarity_threshold: Some(1.5),
        ..ConfigArgs::default()
    };
    assert!(AppConfig::load(&args).is_err());

    let args = ConfigArgs {
        store: Some("postgres".into()),
        ..ConfigArgs::default()
    };
    let err = AppConfig::load(&args).unwrap_err();
    assert!(err.to_string().contains("database_url"));

    clear_env_vars();
}

#[test]
#[serial]
fn test_missing_explicit_file_is_an_error() {
    clear_env_vars();
    with_endpoint();

    let args = ConfigArgs {
        config: Some("/nonexistent/recmem.yaml".into()),
        ..ConfigArgs::default()
    };
    assert!(AppConfig::load(&args).is_err());

    clear_env_vars();
}
