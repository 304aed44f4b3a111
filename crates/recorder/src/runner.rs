use mdrec_metadata::SessionConfig;
use std::time::Duration;
use tokio::time;
use tracing::info;

use crate::error::{ConnectorError, SessionError};
use crate::liveness::Liveness;
use crate::moldudp64::{self, MoldUdp64Client};
use crate::soupbintcp::{self, Receive, SoupBinTcpClient};
use crate::traits::{StatusListener, Writer};
use crate::transport::{self, Session};

/// Longest a SoupBinTCP iteration waits for data before doing keep-alive duty
pub const KEEP_ALIVE_WAIT: Duration = Duration::from_millis(1000);

/// Runner multiplexes the session's sockets on the current task until the
/// liveness flag is switched off or the server goes away.
pub struct Runner {
    liveness: Liveness,
    keep_alive_wait: Duration,
}

impl Runner {
    pub fn new(liveness: Liveness) -> Self {
        Self {
            liveness,
            keep_alive_wait: KEEP_ALIVE_WAIT,
        }
    }

    pub fn with_keep_alive_wait(mut self, wait: Duration) -> Self {
        self.keep_alive_wait = wait;
        self
    }

    /// Open the configured session over `writer` and receive until stopped.
    /// The session's sockets are closed before this returns, on every path.
    pub async fn record<W: Writer>(
        &self,
        config: &SessionConfig,
        writer: W,
    ) -> Result<(), ConnectorError> {
        let mut session = transport::open(config, writer, &self.liveness).await?;
        info!(transport = %session.kind(), "Session open, receiving");

        let result = self.run(&mut session).await;

        let metrics = session.metrics();
        info!(
            transport = %session.kind(),
            messages = metrics.messages(),
            bytes = metrics.bytes(),
            "Session closed"
        );
        result.map_err(ConnectorError::from)
    }

    pub async fn run<W: Writer>(&self, session: &mut Session<W>) -> Result<(), SessionError> {
        match session {
            Session::SoupBinTcp(client) => self.run_soupbintcp(client).await,
            Session::MoldUdp64(client) => self.run_moldudp64(client).await,
        }
    }

    /// Bounded waits so keep-alive runs even when the server is quiet.
    pub async fn run_soupbintcp<W, S>(
        &self,
        client: &mut SoupBinTcpClient<W, S>,
    ) -> Result<(), SessionError>
    where
        W: Writer,
        S: StatusListener<soupbintcp::Event>,
    {
        while self.liveness.is_receiving() {
            let ready = tokio::select! {
                biased;
                _ = self.liveness.stopped() => break,
                ready = time::timeout(self.keep_alive_wait, client.readable()) => ready,
            };

            if let Ok(ready) = ready {
                ready?;
                if client.receive().await? == Receive::EndOfStream {
                    info!("Server closed the connection");
                    self.liveness.stop();
                    break;
                }
            }

            client.keep_alive().await?;
        }
        Ok(())
    }

    /// Blocks until either socket is readable or the recorder is stopped.
    pub async fn run_moldudp64<W, S>(
        &self,
        client: &mut MoldUdp64Client<W, S>,
    ) -> Result<(), SessionError>
    where
        W: Writer,
        S: StatusListener<moldudp64::Event>,
    {
        while self.liveness.is_receiving() {
            let ready = tokio::select! {
                biased;
                _ = self.liveness.stopped() => break,
                ready = client.socket().readable() => ready,
                ready = client.request_socket().readable() => ready,
            };
            ready?;

            // Both are non-blocking; whichever socket is idle returns at once
            client.receive().await?;
            client.receive_response().await?;
        }
        Ok(())
    }
}
