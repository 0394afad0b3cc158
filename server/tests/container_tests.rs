//! End-to-end container tests. They need Docker or Podman and a built
//! `college-api:latest` image, so they are ignored by default:
//!
//! ```text
//! college-api build --context .
//! cargo test -p server --test container_tests -- --ignored
//! ```

use image_builder::{ImageDescriptor, DEFAULT_TAG};
use server::container::{
    cleanup_container, detect_runtime, health_check_container, start_container,
    verify_image_exists, ContainerError, ContainerRuntime, RunConfig,
};
use server::health::probe;
use std::time::Duration;

const E2E_SECRET: &str = "e2e-signing-key-0123456789abcdef";

fn run_config(name: &str, host_port: u16) -> RunConfig {
    RunConfig::from_descriptor(&ImageDescriptor::default(), DEFAULT_TAG)
        .with_container_name(name)
        .with_host_port(host_port)
        .with_env("JWT_SECRET_KEY", E2E_SECRET)
        .with_env("ADMIN_PASSWORD", "e2e-password")
        .with_health_timeout(Duration::from_secs(60))
}

fn runtime_or_skip() -> Option<ContainerRuntime> {
    let runtime = detect_runtime();
    if !runtime.is_available() {
        println!("No container runtime available, skipping");
        return None;
    }
    match verify_image_exists(&runtime, DEFAULT_TAG) {
        Ok(true) => Some(runtime),
        _ => {
            println!("{} not built, skipping", DEFAULT_TAG);
            None
        }
    }
}

#[tokio::test]
#[ignore]
async fn test_container_serves_on_exposed_port() {
    let Some(runtime) = runtime_or_skip() else {
        return;
    };

    let config = run_config("college-api-e2e-port", 18080);
    let handle = start_container(&runtime, &config).unwrap();
    let report = health_check_container(&handle, &config).await.unwrap();
    assert!(report.unwrap().is_ok());

    let health = probe("http://127.0.0.1:18080/health", Duration::from_secs(5)).await;
    assert!(health.is_ok());

    cleanup_container(&handle).unwrap();
}

#[tokio::test]
#[ignore]
async fn test_container_without_secret_is_not_started() {
    let Some(runtime) = runtime_or_skip() else {
        return;
    };

    let mut config = RunConfig::from_descriptor(&ImageDescriptor::default(), DEFAULT_TAG)
        .with_container_name("college-api-e2e-nosecret")
        .with_host_port(18081);
    config.secrets = vec!["COLLEGE_E2E_UNSET_SECRET".to_string()];

    let result = start_container(&runtime, &config);
    assert!(matches!(result, Err(ContainerError::MissingSecret { .. })));
}

#[tokio::test]
#[ignore]
async fn test_instances_use_their_injected_secret() {
    let Some(runtime) = runtime_or_skip() else {
        return;
    };

    let first = run_config("college-api-e2e-a", 18082);
    let second = run_config("college-api-e2e-b", 18083).with_env(
        "JWT_SECRET_KEY",
        "a-different-signing-key-for-instance-b",
    );

    let a = start_container(&runtime, &first).unwrap();
    let b = start_container(&runtime, &second).unwrap();
    health_check_container(&a, &first).await.unwrap();
    health_check_container(&b, &second).await.unwrap();

    let client = reqwest::Client::new();
    let token: serde_json::Value = client
        .post("http://127.0.0.1:18082/token")
        .form(&[("username", "admin"), ("password", "e2e-password")])
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    let access_token = token["access_token"].as_str().unwrap();

    let on_a = client
        .get("http://127.0.0.1:18082/students")
        .bearer_auth(access_token)
        .send()
        .await
        .unwrap();
    assert_eq!(on_a.status().as_u16(), 200);

    let on_b = client
        .get("http://127.0.0.1:18083/students")
        .bearer_auth(access_token)
        .send()
        .await
        .unwrap();
    assert_eq!(on_b.status().as_u16(), 401);
}
