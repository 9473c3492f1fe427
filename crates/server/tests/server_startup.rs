//! Starts the real binary and talks to it over TCP.

use std::io::Write;
use std::net::TcpListener;
use std::time::Duration;

use tempfile::NamedTempFile;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::time::sleep;

/// Find an available port
fn get_available_port() -> u16 {
    TcpListener::bind("127.0.0.1:0")
        .unwrap()
        .local_addr()
        .unwrap()
        .port()
}

/// Config pointing at a tool that does not exist, so the startup probe fails
/// fast and no real encode runs.
fn minimal_config(port: u16) -> String {
    format!(
        r#"
[server]
host = "127.0.0.1"
port = {}

[tool]
ffmpeg_path = "/nonexistent/ffmpeg"
ffprobe_path = "/nonexistent/ffprobe"
"#,
        port
    )
}

fn write_config(contents: &str) -> NamedTempFile {
    let mut file = NamedTempFile::new().unwrap();
    file.write_all(contents.as_bytes()).unwrap();
    file
}

async fn spawn_server(config_path: &std::path::Path) -> tokio::process::Child {
    tokio::process::Command::new(env!("CARGO_BIN_EXE_convertino"))
        .env("CONVERTINO_CONFIG", config_path)
        .env("RUST_LOG", "error")
        .kill_on_drop(true)
        .spawn()
        .expect("Failed to spawn server")
}

/// Minimal HTTP/1.1 GET returning the raw response.
async fn http_get(port: u16, path: &str) -> Option<String> {
    let mut stream = TcpStream::connect(("127.0.0.1", port)).await.ok()?;
    let request = format!(
        "GET {} HTTP/1.1\r\nHost: 127.0.0.1\r\nConnection: close\r\n\r\n",
        path
    );
    stream.write_all(request.as_bytes()).await.ok()?;
    let mut response = String::new();
    stream.read_to_string(&mut response).await.ok()?;
    Some(response)
}

async fn wait_for_server(port: u16, max_attempts: u32) -> Option<String> {
    for _ in 0..max_attempts {
        if let Some(response) = http_get(port, "/api/v1/health").await {
            return Some(response);
        }
        sleep(Duration::from_millis(50)).await;
    }
    None
}

#[tokio::test]
async fn test_server_starts_and_serves_health() {
    let port = get_available_port();
    let config = write_config(&minimal_config(port));
    let mut child = spawn_server(config.path()).await;

    let response = wait_for_server(port, 100)
        .await
        .expect("server did not come up");
    assert!(response.starts_with("HTTP/1.1 200"));
    assert!(response.contains(r#""status":"ok""#));

    child.kill().await.unwrap();
}

#[tokio::test]
async fn test_server_rejects_invalid_config() {
    let config = write_config("[server]\nport = \"not a number\"\n");
    let mut child = spawn_server(config.path()).await;

    let status = tokio::time::timeout(Duration::from_secs(10), child.wait())
        .await
        .expect("server should exit")
        .unwrap();
    assert!(!status.success());
}
