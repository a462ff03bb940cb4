//! UDP listener for engine telemetry.

use std::net::SocketAddr;

use log::{debug, info, warn};
use tokio::net::UdpSocket;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;

use crate::error::{Error, Result};
use crate::status::{RunStatusMessage, TelemetryMessage};

/// Largest datagram the listener accepts in one read.
const MAX_DATAGRAM_SIZE: usize = 64 * 1024;

/// What the listener hands to its subscriber.
#[derive(Debug, Clone, PartialEq)]
pub enum ListenerEvent {
    Status(Box<RunStatusMessage>),
    /// The socket failed after it was bound; no further events follow.
    Failed(String),
}

/// Owns the telemetry socket for the duration of one run.
#[derive(Debug)]
pub struct StatusListener {
    address: String,
    local_address: Option<SocketAddr>,
    shutdown_tx: Option<watch::Sender<bool>>,
    task: Option<JoinHandle<()>>,
}

impl StatusListener {
    pub fn new(address: impl Into<String>) -> Self {
        Self {
            address: address.into(),
            local_address: None,
            shutdown_tx: None,
            task: None,
        }
    }

    /// The bound address, once started.
    pub fn local_address(&self) -> Option<SocketAddr> {
        self.local_address
    }

    pub fn is_running(&self) -> bool {
        self.task.is_some()
    }

    /// Binds the socket and starts dispatching decoded run-status messages.
    ///
    /// Returns the bound address once the socket is ready. Binding port 0
    /// picks a free port; the returned address carries the real one.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Listener`] if the address cannot be bound.
    pub async fn start(&mut self, events: mpsc::Sender<ListenerEvent>) -> Result<SocketAddr> {
        if let Some(local_address) = self.local_address.filter(|_| self.is_running()) {
            return Ok(local_address);
        }

        let socket = UdpSocket::bind(&self.address)
            .await
            .map_err(|e| Error::listener_error(self.address.clone(), e))?;
        let local_address = socket
            .local_addr()
            .map_err(|e| Error::listener_error(self.address.clone(), e))?;

        info!("Status listener bound to {local_address}");

        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        self.task = Some(tokio::spawn(receive_loop(socket, events, shutdown_rx)));
        self.shutdown_tx = Some(shutdown_tx);
        self.local_address = Some(local_address);

        Ok(local_address)
    }

    /// Closes the socket. Does nothing if the listener is not running.
    pub async fn stop(&mut self) {
        let Some(task) = self.task.take() else {
            return;
        };

        if let Some(shutdown_tx) = self.shutdown_tx.take() {
            let _ = shutdown_tx.send(true);
        }

        if let Err(e) = task.await {
            warn!("Status listener task ended abnormally: {e}");
        }

        info!("Status listener stopped");
    }
}

impl Drop for StatusListener {
    fn drop(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}

async fn receive_loop(
    socket: UdpSocket,
    events: mpsc::Sender<ListenerEvent>,
    mut shutdown_rx: watch::Receiver<bool>,
) {
    let mut buf = vec![0u8; MAX_DATAGRAM_SIZE];

    loop {
        let received = tokio::select! {
            biased;

            received = socket.recv_from(&mut buf) => received,
            _ = shutdown_rx.changed() => break,
        };

        let (len, peer) = match received {
            Ok(received) => received,
            Err(e) => {
                warn!("Status listener failed: {e}");
                let _ = events.send(ListenerEvent::Failed(e.to_string())).await;
                return;
            }
        };

        if !dispatch(&buf[..len], peer, &events).await {
            return;
        }
    }

    drain(socket, &mut buf, &events).await;
}

/// Dispatches whatever is already queued on the socket.
///
/// The reactor may not have seen the last datagrams yet, so this reads the
/// socket directly until it would block.
async fn drain(socket: UdpSocket, buf: &mut [u8], events: &mpsc::Sender<ListenerEvent>) {
    let socket = match socket.into_std() {
        Ok(socket) => socket,
        Err(e) => {
            debug!("Unable to drain status socket: {e}");
            return;
        }
    };

    while let Ok((len, peer)) = socket.recv_from(buf) {
        if !dispatch(&buf[..len], peer, events).await {
            return;
        }
    }
}

/// Returns false once nobody listens for events any more.
async fn dispatch(datagram: &[u8], peer: SocketAddr, events: &mpsc::Sender<ListenerEvent>) -> bool {
    match TelemetryMessage::decode(datagram) {
        Ok(TelemetryMessage::RunStatus(status)) => {
            if events.send(ListenerEvent::Status(status)).await.is_err() {
                debug!("Status subscriber is gone, closing listener");
                return false;
            }
        }
        Ok(TelemetryMessage::InputRequest(request)) => {
            debug!("Ignoring input request from {peer}: {request:?}");
        }
        Err(e) => {
            debug!("Dropping datagram from {peer}: {e}");
        }
    }
    true
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::status::RunStatus;

    fn snapshot(status: &str) -> String {
        format!(r#"{{"elapsed_time": 1.0, "status": "{status}", "scripts": []}}"#)
    }

    async fn send(to: SocketAddr, payload: &str) {
        let socket = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        socket.send_to(payload.as_bytes(), to).await.unwrap();
    }

    async fn next_status(events: &mut mpsc::Receiver<ListenerEvent>) -> RunStatus {
        match events.recv().await.unwrap() {
            ListenerEvent::Status(status) => status.status,
            other => panic!("unexpected event {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_ephemeral_port_is_reported() {
        let (tx, _rx) = mpsc::channel(8);
        let mut listener = StatusListener::new("127.0.0.1:0");
        let address = listener.start(tx).await.unwrap();
        assert_ne!(address.port(), 0);
        assert_eq!(listener.local_address(), Some(address));
        listener.stop().await;
    }

    #[tokio::test]
    async fn test_datagrams_are_dispatched_in_order() {
        let (tx, mut rx) = mpsc::channel(8);
        let mut listener = StatusListener::new("127.0.0.1:0");
        let address = listener.start(tx).await.unwrap();

        send(address, &snapshot("active")).await;
        assert_eq!(next_status(&mut rx).await, RunStatus::Active);
        send(address, &snapshot("passed")).await;
        assert_eq!(next_status(&mut rx).await, RunStatus::Passed);

        listener.stop().await;
    }

    #[tokio::test]
    async fn test_malformed_and_reserved_datagrams_are_dropped() {
        let (tx, mut rx) = mpsc::channel(8);
        let mut listener = StatusListener::new("127.0.0.1:0");
        let address = listener.start(tx).await.unwrap();

        send(address, "not json").await;
        send(address, r#"{"hello": "world"}"#).await;
        send(
            address,
            r#"{"path": "a.json", "test_name": "t", "test_number": 1, "instruction_index": 0, "continue": true}"#,
        )
        .await;
        send(address, &snapshot("failed")).await;

        assert_eq!(next_status(&mut rx).await, RunStatus::Failed);
        listener.stop().await;
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_stop_delivers_datagrams_already_queued() {
        let (tx, mut rx) = mpsc::channel(8);
        let mut listener = StatusListener::new("127.0.0.1:0");
        let address = listener.start(tx).await.unwrap();

        send(address, &snapshot("active")).await;
        send(address, &snapshot("passed")).await;
        listener.stop().await;

        assert_eq!(next_status(&mut rx).await, RunStatus::Active);
        assert_eq!(next_status(&mut rx).await, RunStatus::Passed);
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_stop_is_idempotent() {
        let (tx, _rx) = mpsc::channel(8);
        let mut listener = StatusListener::new("127.0.0.1:0");
        listener.start(tx).await.unwrap();

        listener.stop().await;
        listener.stop().await;
        assert!(!listener.is_running());
    }

    #[tokio::test]
    async fn test_stop_before_start_is_noop() {
        let mut listener = StatusListener::new("127.0.0.1:0");
        listener.stop().await;
        assert!(!listener.is_running());
    }

    #[tokio::test]
    async fn test_bind_conflict_is_listener_error() {
        let occupied = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        let address = occupied.local_addr().unwrap().to_string();

        let (tx, _rx) = mpsc::channel(8);
        let mut listener = StatusListener::new(address);
        let result = listener.start(tx).await;
        assert!(matches!(result, Err(Error::Listener { .. })));
    }
}
