use super::*;
use tempfile::TempDir;

#[tokio::test]
async fn test_success_captures_stdout() {
    let outcome = ShellExecutor::new().run("echo hi").await;
    assert_eq!(outcome.status, ExecutionStatus::Success);
    assert_eq!(outcome.stdout, "hi\n");
    assert!(outcome.stderr.is_empty());
    assert_eq!(outcome.exit_code, Some(0));
}

#[tokio::test]
async fn test_false_is_failed() {
    let outcome = ShellExecutor::new().run("false").await;
    assert_eq!(outcome.status, ExecutionStatus::Failed);
    assert_eq!(outcome.exit_code, Some(1));
}

#[tokio::test]
async fn test_nonzero_exit_keeps_output() {
    let outcome = ShellExecutor::new()
        .run("echo partial; echo broken >&2; exit 3")
        .await;
    assert_eq!(outcome.status, ExecutionStatus::Failed);
    assert_eq!(outcome.exit_code, Some(3));
    assert_eq!(outcome.stdout, "partial\n");
    assert_eq!(outcome.stderr, "broken\n");
}

#[tokio::test]
async fn test_launch_failure_diagnostic() {
    let executor = ShellExecutor::new().with_shell("/nonexistent/cronwarden-shell", "-c");
    let outcome = executor.run("echo hi").await;
    assert_eq!(outcome.status, ExecutionStatus::Failed);
    assert!(outcome.stdout.is_empty());
    assert!(outcome.stderr.starts_with("Failed to launch command:"));
    assert!(outcome.exit_code.is_none());
}

#[tokio::test]
async fn test_working_dir() {
    let temp_dir = TempDir::new().unwrap();
    std::fs::write(temp_dir.path().join("marker.txt"), "here").unwrap();

    let executor = ShellExecutor::new().with_working_dir(temp_dir.path());
    let outcome = executor.run("cat marker.txt").await;
    assert!(outcome.is_success());
    assert_eq!(outcome.stdout, "here");
}

#[tokio::test]
async fn test_timeout_kills_command() {
    let executor = ShellExecutor::new().with_timeout(Duration::from_millis(200));
    let outcome = executor.run("sleep 10").await;
    assert_eq!(outcome.status, ExecutionStatus::Failed);
    assert!(outcome.stderr.contains("timed out"));
}

#[tokio::test]
async fn test_started_at_is_stamped_before_launch() {
    let before = Utc::now();
    let outcome = ShellExecutor::new().run("sleep 0.2").await;
    let after = Utc::now();

    assert!(outcome.started_at >= before);
    assert!(after - outcome.started_at >= chrono::Duration::milliseconds(150));
}

#[tokio::test]
async fn test_non_utf8_output_is_lossy() {
    let outcome = ShellExecutor::new().run("printf '\\377ok'").await;
    assert!(outcome.is_success());
    assert!(outcome.stdout.ends_with("ok"));
}
