//! Settings files driving a full resolution.

use std::path::Path;
use strata_env::config::{ConfigLoader, ConfigPaths};
use strata_env::detect::Runtime;
use strata_env::error::{ErrorCode, ResolveError};
use strata_env::resolver::Resolver;
use strata_env::types::{SourceId, TypedValue};
use tempfile::TempDir;

fn no_env(_: &str) -> Option<String> {
    None
}

fn write(path: &Path, content: &str) {
    std::fs::write(path, content).unwrap();
}

#[tokio::test]
async fn test_settings_drive_resolution() {
    let dir = TempDir::new().unwrap();
    let root = dir.path();
    write(&root.join(".env"), "PORT=8080\nLOG_LEVEL=info\n");
    write(&root.join(".env.staging"), "PORT=8081\n");
    write(
        &root.join("vault.json"),
        r#"{"values": {"DB_PASSWORD": "from-vault-123"}, "metadata": {"DB_PASSWORD": {"ttl": 600}}}"#,
    );
    write(
        &root.join("policy.yaml"),
        "require: [DB_PASSWORD]\nsources:\n  DB_PASSWORD: cloud_provider\nttl:\n  DB_PASSWORD: 3600\n",
    );
    let settings_file = root.join("strata-env.yaml");
    write(
        &settings_file,
        &format!(
            r#"
env: staging
base_file: {root}/.env
secrets_dirs: []
env_prefix: STRATA_TEST_UNUSED_
policy: {root}/policy.yaml
schema:
  - name: port
    type: int
    required: true
  - name: log_level
    default: warn
providers:
  - name: vault
    path: {root}/vault.json
"#,
            root = root.display()
        ),
    );

    let settings = ConfigLoader::load_explicit(&settings_file, no_env)
        .unwrap()
        .into_settings();
    let resolution = Resolver::from_settings(&settings)
        .unwrap()
        .resolve()
        .await
        .unwrap();

    let snapshot = &resolution.snapshot;
    assert_eq!(snapshot.value("PORT"), Some(&TypedValue::Int(8081)));
    assert_eq!(snapshot.get("LOG_LEVEL").unwrap().origin.source, SourceId::BaseFile);
    let password = snapshot.get("DB_PASSWORD").unwrap();
    assert_eq!(password.origin.source, SourceId::CloudProvider);
    assert_eq!(password.origin.provider.as_deref(), Some("vault"));
    assert!(resolution.warnings.is_empty());
}

#[tokio::test]
async fn test_ci_override_skips_providers() {
    let dir = TempDir::new().unwrap();
    let root = dir.path();
    let settings_file = root.join("strata-env.yaml");
    write(
        &settings_file,
        &format!(
            "base_file: {root}/.env\nsecrets_dirs: []\nenv_prefix: STRATA_TEST_UNUSED_\nproviders:\n  - name: azure\n    path: {root}/missing.json\n",
            root = root.display()
        ),
    );

    // The azure provider file does not exist, so a non-CI run fails.
    let settings = ConfigLoader::load_explicit(&settings_file, no_env)
        .unwrap()
        .into_settings();
    let err = Resolver::from_settings(&settings)
        .unwrap()
        .resolve()
        .await
        .unwrap_err();
    assert_eq!(err.exit_code(), 2);

    let env = |key: &str| (key == "STRATA_ENV_CI").then(|| "1".to_string());
    let settings = ConfigLoader::load_explicit(&settings_file, env)
        .unwrap()
        .into_settings();
    assert!(settings.ci);
    let resolution = Resolver::from_settings(&settings)
        .unwrap()
        .resolve()
        .await
        .unwrap();
    assert!(resolution.snapshot.is_empty());
}

#[test]
fn test_missing_policy_file_is_config_error() {
    let dir = TempDir::new().unwrap();
    let project = dir.path().join("strata-env.yaml");
    write(&project, "policy: /nonexistent/policy.yaml\n");

    let settings = ConfigLoader::load_with_paths(ConfigPaths::with_files(Some(project), None), no_env)
        .unwrap()
        .into_settings();
    let err = Resolver::from_settings(&settings).unwrap_err();
    assert!(matches!(err, ResolveError::Policy(_)));
    assert_eq!(err.code(), ErrorCode::ConfigError);
    assert_eq!(err.exit_code(), 2);
}

#[test]
fn test_unknown_cipher_is_config_error() {
    let dir = TempDir::new().unwrap();
    let project = dir.path().join("strata-env.yaml");
    write(&project, "encryption:\n  tool: rot13\n");

    let settings = ConfigLoader::load_with_paths(ConfigPaths::with_files(Some(project), None), no_env)
        .unwrap()
        .into_settings();
    let err = Resolver::from_settings(&settings).unwrap_err();
    assert_eq!(err.code(), ErrorCode::ConfigError);
}

#[tokio::test]
async fn test_providers_follow_detected_platform() {
    let dir = TempDir::new().unwrap();
    let root = dir.path();
    write(&root.join("ssm.json"), r#"{"values": {"API_TOKEN": "from-ssm"}}"#);
    write(&root.join("keyvault.json"), r#"{"values": {"API_TOKEN": "from-keyvault"}}"#);
    let settings_file = root.join("strata-env.yaml");
    write(
        &settings_file,
        &format!(
            "base_file: {root}/.env\nsecrets_dirs: []\nenv_prefix: STRATA_TEST_UNUSED_\nproviders:\n  - name: ssm\n    path: {root}/ssm.json\n    when: aws\n  - name: keyvault\n    path: {root}/keyvault.json\n    when: azure\n",
            root = root.display()
        ),
    );
    let settings = ConfigLoader::load_explicit(&settings_file, no_env)
        .unwrap()
        .into_settings();

    let on_aws = Runtime {
        aws: true,
        ..Default::default()
    };
    let resolver = Resolver::from_settings_in(&settings, &on_aws).unwrap();
    let names: Vec<&str> = resolver.providers().iter().map(|p| p.name()).collect();
    assert_eq!(names, vec!["ssm"]);
    let resolution = resolver.resolve().await.unwrap();
    let token = resolution.snapshot.get("API_TOKEN").unwrap();
    assert_eq!(token.origin.provider.as_deref(), Some("ssm"));
    assert_eq!(resolution.metrics.providers.len(), 1);
    assert_eq!(resolution.metrics.provider_calls(), 1);

    let elsewhere = Resolver::from_settings_in(&settings, &Runtime::default()).unwrap();
    assert!(elsewhere.providers().is_empty());
}

#[tokio::test]
async fn test_detected_ci_skips_providers() {
    let dir = TempDir::new().unwrap();
    let root = dir.path();
    let settings_file = root.join("strata-env.yaml");
    write(
        &settings_file,
        &format!(
            "base_file: {root}/.env\nsecrets_dirs: []\nenv_prefix: STRATA_TEST_UNUSED_\nproviders:\n  - name: azure\n    path: {root}/missing.json\n",
            root = root.display()
        ),
    );
    let in_ci = Runtime {
        ci: true,
        ..Default::default()
    };

    // Detection alone does not switch CI mode on.
    let settings = ConfigLoader::load_explicit(&settings_file, no_env)
        .unwrap()
        .into_settings();
    let err = Resolver::from_settings_in(&settings, &in_ci)
        .unwrap()
        .resolve()
        .await
        .unwrap_err();
    assert_eq!(err.exit_code(), 2);

    let env = |key: &str| (key == "STRATA_ENV_DETECT_CI").then(|| "true".to_string());
    let settings = ConfigLoader::load_explicit(&settings_file, env)
        .unwrap()
        .into_settings();
    let resolution = Resolver::from_settings_in(&settings, &in_ci)
        .unwrap()
        .resolve()
        .await
        .unwrap();
    assert!(resolution.snapshot.is_empty());
    assert!(resolution.metrics.providers.is_empty());
}
