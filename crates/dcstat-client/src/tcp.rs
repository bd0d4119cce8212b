//! Plain TCP connector.
//!
//! Stands in for the protocol client when none is linked. A session is a
//! TCP connection to the target; a configuration fetch checks that the
//! peer has not closed the socket and answers from a static catalog.
//!
//! ```text
//! TcpConnector::connect()
//!   → TcpStream::connect(address or bootstrap address)
//! TcpSession::fetch_config()
//!   → poll_peek once (EOF = closed, pending = alive) → RemoteConfig { catalog }
//! ```

use std::future::{Future, poll_fn};
use std::pin::Pin;
use std::sync::Arc;
use std::task::Poll;

use tokio::io::{AsyncWriteExt, ReadBuf};
use tokio::net::TcpStream;
use tracing::debug;

use dcstat_core::{DcOption, EndpointAddress, RemoteConfig};

use crate::error::ClientError;
use crate::session::{ConfigFuture, ConnectFuture, ConnectOptions, Connector, Session, SessionToken};

/// A [`Connector`] that opens plain TCP connections.
#[derive(Debug, Clone)]
pub struct TcpConnector {
    bootstrap: Option<EndpointAddress>,
    catalog: Arc<RemoteConfig>,
}

impl TcpConnector {
    /// `bootstrap` is used when a connect request names no address; when it
    /// is `None` the first probeable catalog entry is used instead.
    pub fn new(bootstrap: Option<EndpointAddress>, catalog: Vec<DcOption>) -> Self {
        Self {
            bootstrap,
            catalog: Arc::new(RemoteConfig::new(catalog)),
        }
    }

    fn default_address(&self) -> Option<EndpointAddress> {
        self.bootstrap.clone().or_else(|| {
            self.catalog
                .dc_options
                .iter()
                .find(|dc| dc.is_probeable())
                .map(DcOption::address)
        })
    }
}

impl Connector for TcpConnector {
    fn connect<'a>(&'a self, options: &'a ConnectOptions) -> ConnectFuture<'a> {
        Box::pin(async move {
            let address = options
                .address
                .clone()
                .or_else(|| self.default_address())
                .ok_or_else(|| ClientError::Connect("no address to connect to".to_string()))?;

            let stream = TcpStream::connect(address.to_string())
                .await
                .map_err(|e| ClientError::Connect(format!("tcp connect {address}: {e}")))?;
            let _ = stream.set_nodelay(true);
            debug!(%address, endpoint = ?options.endpoint, "tcp session opened");

            Ok::<_, ClientError>(Box::new(TcpSession {
                stream,
                address,
                catalog: self.catalog.clone(),
            }) as Box<dyn Session>)
        })
    }
}

/// One TCP connection, as produced by [`TcpConnector`].
#[derive(Debug)]
pub struct TcpSession {
    stream: TcpStream,
    address: EndpointAddress,
    catalog: Arc<RemoteConfig>,
}

impl TcpSession {
    /// Checks the socket without waiting on it.
    async fn is_alive(&self) -> Result<(), ClientError> {
        let mut peek_buf = [0u8; 1];
        let peeked = poll_fn(|cx| {
            let mut buf = ReadBuf::new(&mut peek_buf);
            match self.stream.poll_peek(cx, &mut buf) {
                // Nothing to read yet: idle but open.
                Poll::Pending => Poll::Ready(Ok(None)),
                Poll::Ready(result) => Poll::Ready(result.map(Some)),
            }
        })
        .await;
        match peeked {
            Ok(Some(0)) => Err(ClientError::Closed),
            Ok(_) => Ok(()),
            Err(e) => Err(ClientError::Rpc(format!("tcp peek {}: {e}", self.address))),
        }
    }
}

impl Session for TcpSession {
    fn fetch_config(&mut self) -> ConfigFuture<'_> {
        Box::pin(async move {
            self.is_alive().await?;
            Ok::<_, ClientError>(self.catalog.as_ref().clone())
        })
    }

    fn session_token(&self) -> Option<SessionToken> {
        None
    }

    fn close(self: Box<Self>) -> Pin<Box<dyn Future<Output = ()> + Send>> {
        let mut stream = self.stream;
        Box::pin(async move {
            let _ = stream.shutdown().await;
        })
    }
}
