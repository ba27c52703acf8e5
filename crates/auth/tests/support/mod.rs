// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Shared fixtures for the integration tests: a scripted token endpoint and
//! provider construction helpers.

#![allow(dead_code)]

use std::net::SocketAddr;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

use axum::http::{HeaderMap, HeaderName, HeaderValue, StatusCode};
use axum::routing::post;
use axum::Router;
use parking_lot::Mutex;
use tokio::net::TcpListener;

use ledger_auth::token::epoch_secs;
use ledger_auth::{AccessTokenProvider, OAuthConfig, ProviderOptions, TokenSet, TokenStore};

/// One scripted reply from the mock token endpoint.
#[derive(Debug, Clone)]
pub struct Reply {
    pub status: u16,
    pub body: String,
    pub headers: Vec<(&'static str, String)>,
}

impl Reply {
    pub fn json(status: u16, body: serde_json::Value) -> Self {
        Self { status, body: body.to_string(), headers: Vec::new() }
    }

    pub fn tokens(access: &str, refresh: Option<&str>, expires_in: u64) -> Self {
        let mut body = serde_json::json!({
            "access_token": access,
            "token_type": "Bearer",
            "expires_in": expires_in,
        });
        if let Some(refresh) = refresh {
            body["refresh_token"] = serde_json::Value::from(refresh);
        }
        Self::json(200, body)
    }

    pub fn with_header(mut self, name: &'static str, value: &str) -> Self {
        self.headers.push((name, value.to_owned()));
        self
    }
}

/// Handle to a running mock token endpoint.
pub struct MockTokenServer {
    pub addr: SocketAddr,
    pub calls: Arc<AtomicU32>,
    pub bodies: Arc<Mutex<Vec<String>>>,
}

impl MockTokenServer {
    pub fn base_url(&self) -> String {
        format!("http://{}", self.addr)
    }

    pub fn call_count(&self) -> u32 {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn form(&self, idx: usize) -> Vec<(String, String)> {
        let bodies = self.bodies.lock();
        bodies
            .get(idx)
            .map(|body| {
                body.split('&')
                    .filter_map(|pair| pair.split_once('='))
                    .map(|(k, v)| (k.to_owned(), v.to_owned()))
                    .collect()
            })
            .unwrap_or_default()
    }
}

/// Start a token endpoint that answers with `replies` in order, repeating the
/// last one, after waiting `delay` on every request.
pub async fn mock_token_server(replies: Vec<Reply>, delay: Duration) -> anyhow::Result<MockTokenServer> {
    let calls = Arc::new(AtomicU32::new(0));
    let bodies = Arc::new(Mutex::new(Vec::new()));
    let replies = Arc::new(replies);

    let app = {
        let calls = Arc::clone(&calls);
        let bodies = Arc::clone(&bodies);
        Router::new().route(
            "/token",
            post(move |body: String| {
                let calls = Arc::clone(&calls);
                let bodies = Arc::clone(&bodies);
                let replies = Arc::clone(&replies);
                async move {
                    let idx = calls.fetch_add(1, Ordering::SeqCst) as usize;
                    bodies.lock().push(body);
                    tokio::time::sleep(delay).await;
                    let reply = replies
                        .get(idx)
                        .or_else(|| replies.last())
                        .cloned()
                        .unwrap_or_else(|| Reply::json(500, serde_json::json!({})));

                    let mut headers = HeaderMap::new();
                    headers.insert("content-type", HeaderValue::from_static("application/json"));
                    for (name, value) in &reply.headers {
                        if let Ok(value) = HeaderValue::from_str(value) {
                            headers.insert(HeaderName::from_static(*name), value);
                        }
                    }
                    let status =
                        StatusCode::from_u16(reply.status).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
                    (status, headers, reply.body)
                }
            }),
        )
    };

    let listener = TcpListener::bind("127.0.0.1:0").await?;
    let addr = listener.local_addr()?;
    tokio::spawn(async move {
        axum::serve(listener, app).await.ok();
    });

    Ok(MockTokenServer { addr, calls, bodies })
}

/// Start a token endpoint that answers every request with `status` and a
/// body cut short of its declared `Content-Length`.
pub async fn truncated_body_server(status: u16) -> anyhow::Result<SocketAddr> {
    use tokio::io::{AsyncReadExt, AsyncWriteExt};

    let listener = TcpListener::bind("127.0.0.1:0").await?;
    let addr = listener.local_addr()?;
    tokio::spawn(async move {
        while let Ok((mut socket, _)) = listener.accept().await {
            tokio::spawn(async move {
                let mut request = Vec::new();
                let mut buf = [0u8; 1024];
                // Drain the whole request so closing the socket does not reset it.
                loop {
                    let Ok(n) = socket.read(&mut buf).await else { return };
                    if n == 0 {
                        return;
                    }
                    request.extend_from_slice(&buf[..n]);
                    if request_complete(&request) {
                        break;
                    }
                }
                let head = format!(
                    "HTTP/1.1 {status} Error\r\ncontent-type: application/json\r\ncontent-length: 64\r\n\r\n{{"
                );
                let _ = socket.write_all(head.as_bytes()).await;
                let _ = socket.shutdown().await;
            });
        }
    });
    Ok(addr)
}

fn request_complete(request: &[u8]) -> bool {
    let Some(end) = request.windows(4).position(|w| w == b"\r\n\r\n") else {
        return false;
    };
    let head = String::from_utf8_lossy(&request[..end]).to_ascii_lowercase();
    let length = head
        .lines()
        .find_map(|line| line.strip_prefix("content-length:"))
        .and_then(|v| v.trim().parse::<usize>().ok())
        .unwrap_or(0);
    request.len() >= end + 4 + length
}

pub fn token_path(dir: &tempfile::TempDir) -> std::path::PathBuf {
    dir.path().join("auth").join("tokens.json")
}

pub fn provider(base_url: &str, dir: &tempfile::TempDir) -> anyhow::Result<AccessTokenProvider> {
    let config = OAuthConfig::new("client-id", "client-secret", "http://localhost:8765/callback", base_url);
    AccessTokenProvider::new(config, ProviderOptions::default(), TokenStore::new(token_path(dir)))
}

/// A token set issued `issued_ago` seconds ago with a one-hour lifetime.
pub fn tokens(access: &str, refresh: Option<&str>, issued_ago: u64) -> TokenSet {
    TokenSet {
        access_token: access.to_owned(),
        refresh_token: refresh.map(str::to_owned),
        token_type: "Bearer".into(),
        expires_in: 3600,
        issued_at: epoch_secs() - issued_ago,
        scope: None,
        tenant_id: None,
        correlation_id: None,
    }
}
