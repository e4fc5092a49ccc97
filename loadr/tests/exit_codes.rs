use std::io::Write as _;
use std::process::{Command, Output};

use anyhow::Context as _;
use loadr_testserver::TestServer;

fn status_code(out: &Output) -> i32 {
    out.status.code().unwrap_or(-1)
}

fn describe(out: &Output) -> String {
    format!(
        "exit {}\nstdout:\n{}\nstderr:\n{}",
        status_code(out),
        String::from_utf8_lossy(&out.stdout),
        String::from_utf8_lossy(&out.stderr)
    )
}

async fn run_loadr(args: Vec<String>) -> anyhow::Result<Output> {
    let exe = env!("CARGO_BIN_EXE_loadr");
    tokio::task::spawn_blocking(move || {
        Command::new(exe)
            .args(&args)
            .env_remove("API_URL")
            .env_remove("LOADR_LOG")
            .env_remove("RUST_LOG")
            .output()
    })
    .await
    .context("spawn_blocking join")?
    .context("run loadr binary")
}

/// Fast single-scenario run flags; thresholds come from the caller.
fn quick_run(base_url: &str, extra: &[&str]) -> Vec<String> {
    [
        "run",
        "--base-url",
        base_url,
        "--scenario",
        "health",
        "--pause",
        "0s",
        "--tick",
        "100ms",
        "--graceful-stop",
        "2s",
        "--output",
        "json",
        "--no-thresholds",
    ]
    .iter()
    .chain(extra)
    .map(|s| s.to_string())
    .collect()
}

fn summary_line(out: &Output) -> anyhow::Result<serde_json::Value> {
    let stdout = String::from_utf8_lossy(&out.stdout);
    let last = stdout
        .lines()
        .rev()
        .find(|l| !l.trim().is_empty())
        .context("no output lines")?;
    let v: serde_json::Value = serde_json::from_str(last).context("summary is not JSON")?;
    anyhow::ensure!(v["kind"] == "summary", "last line is not a summary: {last}");
    Ok(v)
}

#[tokio::test]
async fn invalid_flags_exit_30() -> anyhow::Result<()> {
    let out = run_loadr(vec!["run".into(), "--duration".into(), "10x".into()]).await?;
    anyhow::ensure!(status_code(&out) == 30, "{}", describe(&out));
    Ok(())
}

#[tokio::test]
async fn invalid_threshold_exit_30() -> anyhow::Result<()> {
    let args = quick_run(
        "http://127.0.0.1:9",
        &["--vus", "1", "--iterations", "1", "--threshold", "http_req_failed=bogus<1"],
    );
    let out = run_loadr(args).await?;
    anyhow::ensure!(status_code(&out) == 30, "{}", describe(&out));
    Ok(())
}

#[tokio::test]
async fn invalid_base_url_exit_30() -> anyhow::Result<()> {
    let args = quick_run("localhost:8080", &["--vus", "1", "--iterations", "1"]);
    let out = run_loadr(args).await?;
    anyhow::ensure!(status_code(&out) == 30, "{}", describe(&out));
    Ok(())
}

#[tokio::test]
async fn passing_run_exit_0() -> anyhow::Result<()> {
    let server = TestServer::start().await.context("start test server")?;
    let args = quick_run(
        server.base_url(),
        &[
            "--vus",
            "2",
            "--iterations",
            "3",
            "--threshold",
            "http_req_failed=rate<0.1",
            "--threshold",
            "checks=rate>0.5",
        ],
    );

    let out = run_loadr(args).await?;
    server.shutdown().await;

    anyhow::ensure!(status_code(&out) == 0, "{}", describe(&out));
    let summary = summary_line(&out)?;
    anyhow::ensure!(summary["verdict"] == "pass", "{summary}");
    anyhow::ensure!(
        summary.pointer("/metrics/iterations/count") == Some(&serde_json::json!(6)),
        "{summary}"
    );
    anyhow::ensure!(
        summary.pointer("/metrics/http_reqs/count") == Some(&serde_json::json!(12)),
        "{summary}"
    );
    Ok(())
}

#[tokio::test]
async fn thresholds_failed_exit_11() -> anyhow::Result<()> {
    let server = TestServer::start_failing(500)
        .await
        .context("start failing test server")?;
    let args = quick_run(
        server.base_url(),
        &[
            "--vus",
            "1",
            "--iterations",
            "2",
            "--threshold",
            "http_req_failed=rate<0.1",
        ],
    );

    let out = run_loadr(args).await?;
    server.shutdown().await;

    anyhow::ensure!(status_code(&out) == 11, "{}", describe(&out));
    let summary = summary_line(&out)?;
    anyhow::ensure!(summary["verdict"] == "fail", "{summary}");
    anyhow::ensure!(
        summary.pointer("/thresholds/0/passed") == Some(&serde_json::json!(false)),
        "{summary}"
    );
    Ok(())
}

#[tokio::test]
async fn abort_on_fail_exit_12() -> anyhow::Result<()> {
    let server = TestServer::start_failing(503)
        .await
        .context("start failing test server")?;

    let mut profile = tempfile::Builder::new()
        .suffix(".yaml")
        .tempfile()
        .context("create profile file")?;
    profile
        .write_all(
            b"vus: 1\nduration: 30s\nthinkTime: 10ms\nthresholds:\n  http_req_failed:\n    - threshold: rate<0.1\n      abortOnFail: true\n",
        )
        .context("write profile file")?;
    let path = profile.path().to_string_lossy().to_string();

    let mut args = quick_run(server.base_url(), &[]);
    args.retain(|a| a != "--no-thresholds");
    args.extend(["--config".to_string(), path]);

    let started = std::time::Instant::now();
    let out = run_loadr(args).await?;
    server.shutdown().await;

    anyhow::ensure!(status_code(&out) == 12, "{}", describe(&out));
    anyhow::ensure!(
        started.elapsed() < std::time::Duration::from_secs(20),
        "abort took {:?}",
        started.elapsed()
    );
    let summary = summary_line(&out)?;
    anyhow::ensure!(
        summary.pointer("/aborted_by/metric") == Some(&serde_json::json!("http_req_failed")),
        "{summary}"
    );
    Ok(())
}

#[tokio::test]
async fn profiles_listing_exit_0() -> anyhow::Result<()> {
    let out = run_loadr(vec!["profiles".into()]).await?;
    anyhow::ensure!(status_code(&out) == 0, "{}", describe(&out));

    let stdout = String::from_utf8_lossy(&out.stdout);
    for name in ["smoke:", "default:", "load:", "stress:"] {
        anyhow::ensure!(stdout.contains(name), "missing {name} in:\n{stdout}");
    }
    Ok(())
}
