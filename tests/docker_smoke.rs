//! Smoke test against a real Docker daemon.
//!
//! Run with: cargo test --test docker_smoke -- --ignored

use secb_eval::execution::{ContainerConfig, CreateAttempt, DockerClient, SandboxRuntime};

const SMOKE_IMAGE: &str = "busybox:latest";

#[tokio::test]
#[ignore] // Requires a running Docker daemon and network access for the pull.
async fn test_container_lifecycle_reports_exit_code_and_logs() {
    let client = DockerClient::new().expect("Docker daemon should be reachable");
    let name = format!("secb-eval-smoke-{}", uuid::Uuid::new_v4().simple());
    let config = ContainerConfig::new(name, SMOKE_IMAGE).with_cmd(vec![
        "sh".to_string(),
        "-c".to_string(),
        "echo 'Step 3: Run PoC'; echo oops >&2; exit 3".to_string(),
    ]);

    let id = match client.create_container(&config).await {
        CreateAttempt::Resolved(id) => id,
        CreateAttempt::ImageNotFound => {
            client.pull_image(SMOKE_IMAGE).await.expect("pull should succeed");
            match client.create_container(&config).await {
                CreateAttempt::Resolved(id) => id,
                other => panic!("create after pull failed: {other:?}"),
            }
        }
        CreateAttempt::Failed(reason) => panic!("create failed: {reason}"),
    };

    client.start_container(&id).await.expect("start");
    let exit_code = client.wait_container(&id).await.expect("wait");
    let logs = client.get_logs(&id).await.expect("logs");
    client.remove_container(&id, true).await.expect("remove");

    assert_eq!(exit_code, 3);
    assert!(logs.contains("Step 3: Run PoC"));
    assert!(logs.contains("oops"));
}

#[tokio::test]
#[ignore]
async fn test_missing_image_is_reported_as_not_found() {
    let client = DockerClient::new().expect("Docker daemon should be reachable");
    let config = ContainerConfig::new(
        format!("secb-eval-smoke-{}", uuid::Uuid::new_v4().simple()),
        "secb-eval.local/does-not-exist:never",
    );

    assert_eq!(
        client.create_container(&config).await,
        CreateAttempt::ImageNotFound
    );
}
