//! Shared utilities for integration testing.

#![allow(dead_code)]

use std::net::SocketAddr;
use std::time::Duration;

use gatekeeper::config::HandlerSettings;
use gatekeeper::{AppState, GatekeeperConfig, GatekeeperServer, Rule, Shutdown};
use serde_json::{json, Value};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;
use tokio::sync::mpsc;

/// A configuration with every built-in handler enabled.
pub fn config() -> GatekeeperConfig {
    let mut config = GatekeeperConfig::default();
    for id in ["anonymous", "noop", "unauthorized"] {
        config.authenticators.insert(id.into(), HandlerSettings::enabled());
    }
    for id in ["allow", "deny"] {
        config.authorizers.insert(id.into(), HandlerSettings::enabled());
    }
    for id in ["noop", "header"] {
        config.mutators.insert(id.into(), HandlerSettings::enabled());
    }
    config.errors.handlers.insert("www_authenticate".into(), HandlerSettings::enabled());
    config.errors.handlers.insert(
        "redirect".into(),
        HandlerSettings::enabled_with(json!({"to": "http://login.test/signin"})),
    );
    config
}

pub fn rule(value: Value) -> Rule {
    serde_json::from_value(value).unwrap()
}

/// `GET|POST /items/<id>` for the anonymous subject, with `X-User` and `X-Item` set.
pub fn items_rule(upstream: &str) -> Rule {
    rule(json!({
        "id": "items",
        "match": {"methods": ["GET", "POST"], "url": "/items/<[0-9]+>"},
        "authenticators": [{"handler": "anonymous"}],
        "authorizer": {"handler": "allow"},
        "mutators": [
            {"handler": "noop"},
            {"handler": "header", "config": {"headers": {"X-User": "{{ subject }}", "X-Item": "{{ match.captures[0] }}"}}}
        ],
        "upstream": {"url": upstream}
    }))
}

/// `GET|POST /<anything>` whose header mutator claims a `Content-Length` of 999.
pub fn content_length_rule(upstream: &str) -> Rule {
    rule(json!({
        "id": "content-length",
        "match": {"methods": ["GET", "POST"], "url": "/<.*>"},
        "authenticators": [{"handler": "noop"}],
        "authorizer": {"handler": "allow"},
        "mutators": [{"handler": "header", "config": {"headers": {"Content-Length": "999", "X-Seen": "yes"}}}],
        "upstream": {"url": upstream}
    }))
}

/// Start a backend that answers 200 with the raw request head as the body.
pub async fn start_echo_backend() -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    tokio::spawn(async move {
        loop {
            match listener.accept().await {
                Ok((mut socket, _)) => {
                    tokio::spawn(async move {
                        let mut head = Vec::new();
                        let mut buf = [0u8; 1024];
                        while !head.windows(4).any(|w| w == b"\r\n\r\n") {
                            match socket.read(&mut buf).await {
                                Ok(0) | Err(_) => break,
                                Ok(n) => head.extend_from_slice(&buf[..n]),
                            }
                        }
                        let body = String::from_utf8_lossy(&head).to_string();
                        let response = format!(
                            "HTTP/1.1 200 OK\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
                            body.len(),
                            body
                        );
                        let _ = socket.write_all(response.as_bytes()).await;
                        let _ = socket.shutdown().await;
                    });
                }
                Err(_) => break,
            }
        }
    });

    addr
}

/// Serve `state` on ephemeral ports. Returns the API and proxy addresses.
pub async fn spawn_gatekeeper(state: AppState) -> (SocketAddr, SocketAddr, Shutdown) {
    let api_listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let proxy_listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let api_addr = api_listener.local_addr().unwrap();
    let proxy_addr = proxy_listener.local_addr().unwrap();

    let shutdown = Shutdown::new();
    let server_shutdown = shutdown.clone();
    let (_, config_updates) = mpsc::unbounded_channel();
    tokio::spawn(async move {
        let _ = GatekeeperServer::new(state)
            .run(api_listener, proxy_listener, config_updates, &server_shutdown)
            .await;
    });

    tokio::time::sleep(Duration::from_millis(100)).await;
    (api_addr, proxy_addr, shutdown)
}

pub fn client() -> reqwest::Client {
    reqwest::Client::builder()
        .pool_max_idle_per_host(0)
        .no_proxy()
        .redirect(reqwest::redirect::Policy::none())
        .build()
        .unwrap()
}
