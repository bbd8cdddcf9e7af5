//! UDP telemetry listener thread
//!
//! Owns the datagram socket for the lifetime of a navigation session. Each
//! datagram is decoded and published to the [`InputBus`](crate::state::InputBus);
//! the voice activation flag additionally stamps the activation window.

use std::io;
use std::net::{SocketAddr, UdpSocket};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use tokio_util::sync::CancellationToken;

use crate::config::TelemetryConfig;
use crate::state::SharedBus;
use crate::telemetry::{self, Tokens};

const RECV_BUFFER_SIZE: usize = 1024;

/// Datagram counters, readable while the listener runs
#[derive(Debug, Default)]
pub struct ListenerCounters {
    pub received: AtomicU64,
    pub rejected: AtomicU64,
}

pub struct TelemetryListener {
    socket: UdpSocket,
    tokens: Tokens,
    bus: SharedBus,
    token: CancellationToken,
    counters: Arc<ListenerCounters>,
}

impl TelemetryListener {
    /// Bind the socket and start the receive thread.
    ///
    /// Binding happens on the caller's thread so a port conflict is returned
    /// here rather than lost in the background.
    pub fn spawn(
        config: &TelemetryConfig,
        bus: SharedBus,
        token: CancellationToken,
    ) -> io::Result<ListenerHandle> {
        let socket = UdpSocket::bind((config.bind_address.as_str(), config.port))?;
        // zero would mean "block forever" and defeat cancellation
        let timeout = Duration::from_millis(config.recv_timeout_ms.max(1));
        socket.set_read_timeout(Some(timeout))?;
        let local_addr = socket.local_addr()?;

        let counters = Arc::new(ListenerCounters::default());
        let listener = TelemetryListener {
            socket,
            tokens: Tokens::from_config(config),
            bus,
            token: token.clone(),
            counters: counters.clone(),
        };

        let thread = thread::Builder::new()
            .name("telemetry".into())
            .spawn(move || listener.run())?;

        tracing::info!(addr = %local_addr, "telemetry listener started");

        Ok(ListenerHandle {
            token,
            thread: Some(thread),
            local_addr,
            counters,
        })
    }

    fn run(self) {
        let mut buf = [0u8; RECV_BUFFER_SIZE];

        while !self.token.is_cancelled() {
            match self.socket.recv_from(&mut buf) {
                Ok((len, peer)) => {
                    let text = String::from_utf8_lossy(&buf[..len]);
                    self.handle_datagram(text.trim(), peer);
                }
                Err(e) if is_timeout(&e) => continue,
                Err(e) => {
                    tracing::warn!(error = %e, "telemetry receive failed");
                }
            }
        }

        tracing::info!("telemetry listener stopped");
    }

    fn handle_datagram(&self, payload: &str, peer: SocketAddr) {
        self.counters.received.fetch_add(1, Ordering::Relaxed);

        match telemetry::decode_with(payload, &self.tokens) {
            Ok(snapshot) => {
                tracing::trace!(%peer, ?snapshot, "telemetry");
                self.bus.publish(&snapshot);
                if snapshot.voice_activation {
                    self.bus.mark_activation();
                }
            }
            Err(e) => {
                self.counters.rejected.fetch_add(1, Ordering::Relaxed);
                tracing::warn!(%peer, payload, error = %e, "discarding datagram");
                if telemetry::requests_voice(payload, &self.tokens) {
                    self.bus.mark_activation();
                }
            }
        }
    }
}

fn is_timeout(e: &io::Error) -> bool {
    matches!(e.kind(), io::ErrorKind::WouldBlock | io::ErrorKind::TimedOut)
}

pub struct ListenerHandle {
    token: CancellationToken,
    thread: Option<JoinHandle<()>>,
    local_addr: SocketAddr,
    counters: Arc<ListenerCounters>,
}

impl ListenerHandle {
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    pub fn counters(&self) -> &ListenerCounters {
        &self.counters
    }

    /// Cancel and wait for the thread; returns within one receive timeout
    pub fn shutdown(mut self) {
        self.stop();
    }

    /// Cancel without waiting. The thread exits after its current receive
    /// times out and keeps the port bound until then; join the returned
    /// handle before binding it again.
    pub fn detach(mut self) -> Option<JoinHandle<()>> {
        self.token.cancel();
        self.thread.take()
    }

    fn stop(&mut self) {
        self.token.cancel();
        if let Some(thread) = self.thread.take()
            && thread.join().is_err()
        {
            tracing::error!("telemetry listener thread panicked");
        }
    }
}

impl Drop for ListenerHandle {
    fn drop(&mut self) {
        self.stop();
    }
}
