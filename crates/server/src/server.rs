// SPDX-License-Identifier: MIT

//! Listener task: accepts connections, upgrades WebSockets, and answers
//! `GET /schema` with the realm's schema document.

use crate::env;
use crate::identity::IdentityResolver;
use crate::session::{run_session, SessionCtx};
use land_engine::LandRealm;
use std::io;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::io::AsyncWriteExt;
use tokio::net::{TcpListener, TcpStream};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

const SCHEMA_REQUEST: &[u8] = b"GET /schema";

/// The WebSocket transport server for one realm.
pub struct Server {
    listener: TcpListener,
    ctx: Arc<SessionCtx>,
    shutdown: CancellationToken,
}

impl Server {
    /// Bind a listener for the realm on `addr`.
    pub async fn bind(
        addr: &str,
        realm: Arc<LandRealm>,
        identity: Arc<dyn IdentityResolver>,
    ) -> io::Result<Self> {
        let listener = TcpListener::bind(addr).await?;
        info!(addr = %listener.local_addr()?, "listening");
        Ok(Self {
            listener,
            ctx: Arc::new(SessionCtx { realm, identity, join_timeout: env::join_timeout() }),
            shutdown: CancellationToken::new(),
        })
    }

    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    /// Token that stops the accept loop when cancelled.
    pub fn shutdown_token(&self) -> CancellationToken {
        self.shutdown.clone()
    }

    /// Accept connections until shutdown, then stop every keeper.
    pub async fn serve(self) {
        loop {
            tokio::select! {
                () = self.shutdown.cancelled() => break,
                result = self.listener.accept() => match result {
                    Ok((stream, addr)) => {
                        debug!(%addr, "connection accepted");
                        let ctx = Arc::clone(&self.ctx);
                        tokio::spawn(async move {
                            handle_connection(stream, ctx).await;
                        });
                    }
                    Err(e) => error!(error = %e, "accept error"),
                },
            }
        }
        info!("listener stopped, shutting down lands");
        self.ctx.realm.shutdown().await;
    }
}

/// Dispatch one accepted stream: schema requests are plain HTTP, anything
/// else goes through the WebSocket upgrade.
async fn handle_connection(stream: TcpStream, ctx: Arc<SessionCtx>) {
    let mut probe = [0u8; SCHEMA_REQUEST.len()];
    // Peek does not consume, so the upgrade still sees the full request.
    // A slow client may need a few polls to show the whole request line.
    for _ in 0..100 {
        let n = match stream.peek(&mut probe).await {
            Ok(0) => return,
            Ok(n) => n,
            Err(e) => {
                debug!(error = %e, "peek failed");
                return;
            }
        };
        let shared = n.min(SCHEMA_REQUEST.len());
        if probe[..shared] != SCHEMA_REQUEST[..shared] {
            run_session(stream, ctx).await;
            return;
        }
        if n >= SCHEMA_REQUEST.len() {
            serve_schema(stream, &ctx).await;
            return;
        }
        tokio::time::sleep(std::time::Duration::from_millis(5)).await;
    }
    debug!("request line never completed");
}

/// Minimal HTTP answer for the schema document; the route registration a
/// real deployment would use stays outside the engine.
async fn serve_schema(mut stream: TcpStream, ctx: &SessionCtx) {
    let body = match serde_json::to_vec(&ctx.realm.schema_document()) {
        Ok(body) => body,
        Err(e) => {
            error!(error = %e, "schema document encode failed");
            return;
        }
    };
    let head = format!(
        "HTTP/1.1 200 OK\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n",
        body.len()
    );
    if stream.write_all(head.as_bytes()).await.is_err() {
        return;
    }
    let _ = stream.write_all(&body).await;
    let _ = stream.shutdown().await;
}
