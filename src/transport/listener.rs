//! Accept loop: one task per inbound connection, so independent RPCs are
//! processed concurrently (§4.2's "server side MUST process independent
//! operations concurrently").

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use tokio::net::TcpStream;
use tokio::task::JoinHandle;

use crate::error::TriageError;
use crate::pf_trace;
use crate::pf_warn;
use crate::transport::{RequestHandler, RpcRequest};
use crate::utils::{safe_tcp_read, safe_tcp_write, tcp_bind_with_retry};

pub struct TransportListener {
    local_addr: SocketAddr,
    accept_task: JoinHandle<()>,
}

impl TransportListener {
    /// Binds `addr` (retrying a few times, since a sibling process's old
    /// socket may still be draining) and starts accepting in the
    /// background, dispatching each connection to `handler`.
    pub async fn bind(
        addr: SocketAddr,
        handler: Arc<dyn RequestHandler>,
    ) -> Result<Self, TriageError> {
        let listener = tcp_bind_with_retry(addr, 5, Duration::from_millis(200)).await?;
        let local_addr = listener.local_addr()?;

        let accept_task = tokio::spawn(async move {
            loop {
                match listener.accept().await {
                    Ok((stream, _peer)) => {
                        let handler = Arc::clone(&handler);
                        tokio::spawn(Self::serve_one(stream, handler));
                    }
                    Err(e) => {
                        pf_warn!("transport accept error: {e}");
                    }
                }
            }
        });

        Ok(TransportListener {
            local_addr,
            accept_task,
        })
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    async fn serve_one(mut stream: TcpStream, handler: Arc<dyn RequestHandler>) {
        let req: RpcRequest = match safe_tcp_read(&mut stream).await {
            Ok(req) => req,
            Err(e) => {
                pf_warn!("failed to read request: {e}");
                return;
            }
        };
        pf_trace!("dispatching {req:?}");
        let resp = handler.handle(req).await;
        if let Err(e) = safe_tcp_write(&mut stream, &resp).await {
            pf_warn!("failed to write response: {e}");
        }
    }
}

impl Drop for TransportListener {
    fn drop(&mut self) {
        self.accept_task.abort();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::{RpcResponse, TransportClient};
    use async_trait::async_trait;

    struct Echo;

    #[async_trait]
    impl RequestHandler for Echo {
        async fn handle(&self, req: RpcRequest) -> RpcResponse {
            match req {
                RpcRequest::GetLeaderInfo => RpcResponse::LeaderInfo {
                    leader_address: None,
                    peers: vec![],
                },
                _ => RpcResponse::err("unexpected"),
            }
        }
    }

    #[tokio::test]
    async fn listener_dispatches_and_responds() {
        let listener = TransportListener::bind(
            "127.0.0.1:0".parse().unwrap(),
            Arc::new(Echo),
        )
        .await
        .unwrap();
        let addr = listener.local_addr();

        let resp = TransportClient::call(
            addr,
            RpcRequest::GetLeaderInfo,
            Duration::from_secs(1),
        )
        .await
        .unwrap();
        assert!(matches!(resp, RpcResponse::LeaderInfo { leader_address: None, .. }));
    }
}
