//! Tunnel supervisor daemon.
//!
//! Run with: cargo run -p tunnel-warden-daemon
//!
//! Then open http://localhost:3000 in your browser.

use std::{net::SocketAddr, time::Duration};

use anyhow::Context;
use axum::{
    Json, Router,
    extract::State,
    response::Html,
    routing::get,
};
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use tunnel_warden_supervisor::{Supervisor, SupervisorConfig, SupervisorHandle};
use tunnel_warden_transport::websocket::create_ws_router;

/// How long shutdown waits for the VPN client to exit after the interrupt.
const SHUTDOWN_GRACE: Duration = Duration::from_secs(3);

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer())
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .init();

    let config = SupervisorConfig::from_env();
    tracing::info!(
        config_dir = %config.config_dir.display(),
        log_file = %config.log_file.display(),
        binary = %config.binary.display(),
        "Loaded configuration"
    );
    if config.dns.domain.is_none() || config.dns.token.is_none() {
        tracing::warn!("DUCKDNS_DOMAIN or DUCKDNS_TOKEN is unset; connects will be refused");
    }

    let handle = Supervisor::new(config).spawn().await?;

    // Build router
    let app = Router::new()
        .route("/", get(index_handler))
        .route("/servers", get(servers_handler))
        .with_state(handle.clone())
        .merge(create_ws_router(handle.clone()))
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http());

    let addr = match std::env::var("TUNNEL_WARDEN_LISTEN") {
        Ok(value) => value
            .parse()
            .with_context(|| format!("invalid TUNNEL_WARDEN_LISTEN: {value}"))?,
        Err(_) => SocketAddr::from(([127, 0, 0, 1], 3000)),
    };
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind {addr}"))?;
    tracing::info!("Server listening on http://{addr}");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    handle.shutdown(SHUTDOWN_GRACE).await?;
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to listen for shutdown signal: {e}");
    }
    tracing::info!("Shutdown requested");
}

async fn index_handler() -> Html<&'static str> {
    Html(INDEX_HTML)
}

async fn servers_handler(State(handle): State<SupervisorHandle>) -> Json<Vec<String>> {
    Json(handle.get_servers().await)
}

const INDEX_HTML: &str = r#"<!DOCTYPE html>
<html>
<head>
    <title>Tunnel Warden</title>
    <style>
        body {
            margin: 0;
            padding: 20px;
            background: #1e1e1e;
            color: #d4d4d4;
            font-family: system-ui, sans-serif;
        }
        h1 { color: #fff; margin-bottom: 10px; }
        .controls { margin-bottom: 10px; }
        .status { color: #888; font-size: 14px; margin-bottom: 10px; }
        .connected { color: #4a4; }
        .disconnected { color: #a44; }
        #log {
            height: calc(100vh - 200px);
            overflow-y: auto;
            background: #111;
            padding: 8px;
            font-family: Menlo, Monaco, "Courier New", monospace;
            font-size: 13px;
            white-space: pre-wrap;
        }
        .warning { color: #db4; }
        .error { color: #e66; }
        .stderr { color: #c88; }
    </style>
</head>
<body>
    <h1>Tunnel Warden</h1>
    <div class="status" id="status">Connecting...</div>
    <div class="controls">
        <select id="servers"></select>
        <button id="connect">Connect</button>
        <button id="disconnect">Disconnect</button>
        <button id="sync">Update DNS</button>
    </div>
    <div id="log"></div>

    <script>
        const status = document.getElementById('status');
        const servers = document.getElementById('servers');
        const log = document.getElementById('log');
        let ws;

        function append(text, cls) {
            const line = document.createElement('div');
            line.textContent = text;
            if (cls) line.className = cls;
            log.appendChild(line);
            log.scrollTop = log.scrollHeight;
        }

        function send(msg) {
            if (ws && ws.readyState === WebSocket.OPEN) {
                ws.send(JSON.stringify(msg));
            }
        }

        function connect() {
            const protocol = window.location.protocol === 'https:' ? 'wss:' : 'ws:';
            ws = new WebSocket(`${protocol}//${window.location.host}/ws`);

            ws.onopen = () => {
                status.textContent = 'Connected';
                status.className = 'status connected';
                send({ type: 'get_servers' });
                send({ type: 'status' });
            };

            ws.onclose = () => {
                status.textContent = 'Disconnected - reconnecting...';
                status.className = 'status disconnected';
                setTimeout(connect, 2000);
            };

            ws.onmessage = (event) => {
                try {
                    const msg = JSON.parse(event.data);
                    if (msg.type === 'servers') {
                        servers.innerHTML = '';
                        for (const item of msg.items) {
                            const option = document.createElement('option');
                            option.value = option.textContent = item;
                            servers.appendChild(option);
                        }
                    } else if (msg.type === 'status') {
                        append(`[${msg.state || '-'}] ${msg.text}`, msg.level);
                    } else if (msg.type === 'log') {
                        append(msg.text.replace(/\n$/, ''), msg.stream);
                    } else if (msg.type === 'snapshot') {
                        const id = msg.current.session_id || 'none';
                        append(`[${msg.current.state}] session ${id}`);
                    } else if (msg.type === 'error') {
                        append(`Error: ${msg.message}`, 'error');
                    }
                } catch (e) {
                    console.error('Failed to parse message:', e);
                }
            };
        }

        document.getElementById('connect').onclick = () =>
            send({ type: 'connect', config_id: servers.value });
        document.getElementById('disconnect').onclick = () => send({ type: 'disconnect' });
        document.getElementById('sync').onclick = () => send({ type: 'sync_dns' });

        connect();
    </script>
</body>
</html>
"#;
