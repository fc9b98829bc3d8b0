use crate::error::{KefError, Result};
use crate::options::SpeakerOptions;
use crate::protocol::{extract_reply, MAX_RESPONSE_LEN};
use crate::transport::{BoxedStream, Connector};
use crate::types::{ConnectionState, Endpoint, Reply};
use std::io;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::sync::{watch, Mutex};
use tokio::task::JoinHandle;
use tokio::time::{sleep, timeout, Instant};

/// Timeouts and bounds used by the connection manager
#[derive(Debug, Clone)]
pub struct ConnectionSettings {
    pub connect_timeout: Duration,
    pub reply_timeout: Duration,
    pub keep_alive: Duration,
    pub idle_poll_interval: Duration,
    pub max_connect_attempts: u32,
    pub connect_backoff_step: Duration,
}

impl From<&SpeakerOptions> for ConnectionSettings {
    fn from(options: &SpeakerOptions) -> Self {
        Self {
            connect_timeout: options.connect_timeout,
            reply_timeout: options.reply_timeout,
            keep_alive: options.keep_alive,
            idle_poll_interval: options.idle_poll_interval,
            max_connect_attempts: options.max_connect_attempts,
            connect_backoff_step: options.connect_backoff_step,
        }
    }
}

/// Socket handle and its bookkeeping
///
/// `stream` is `Some` exactly when `state` is `Connected`.
struct Link {
    state: ConnectionState,
    stream: Option<BoxedStream>,
    last_activity: Instant,
    /// The last exchange timed out; its reply may still arrive
    late_reply: bool,
}

impl Link {
    /// Close the write side, wait for it, then forget the socket
    async fn close(&mut self) {
        if let Some(stream) = self.stream.as_mut() {
            if let Err(e) = stream.shutdown().await {
                tracing::debug!("Error while closing connection: {}", e);
            }
        }
        self.stream = None;
        self.state = ConnectionState::Disconnected;
        self.late_reply = false;
    }

    /// Forget a socket that failed mid-exchange
    fn drop_broken(&mut self) {
        self.stream = None;
        self.state = ConnectionState::Disconnected;
        self.late_reply = false;
    }
}

/// Owner of the single TCP connection to one speaker
///
/// Connects on demand, performs one write/read exchange at a time and closes
/// the socket from a background task once it has been idle for longer than
/// the keep-alive window.
pub struct ConnectionManager {
    endpoint: Endpoint,
    connector: Arc<dyn Connector>,
    settings: ConnectionSettings,
    link: Arc<Mutex<Link>>,
    online: AtomicBool,
    stop_tx: watch::Sender<bool>,
    idle_task: std::sync::Mutex<Option<JoinHandle<()>>>,
}

impl ConnectionManager {
    /// Create a manager and start its idle checker
    ///
    /// Must be called from within a tokio runtime.
    pub fn new(
        endpoint: Endpoint,
        connector: Arc<dyn Connector>,
        settings: ConnectionSettings,
    ) -> Result<Self> {
        let runtime = tokio::runtime::Handle::try_current()
            .map_err(|e| KefError::Runtime(format!("no tokio runtime for idle checker: {}", e)))?;

        let link = Arc::new(Mutex::new(Link {
            state: ConnectionState::Disconnected,
            stream: None,
            last_activity: Instant::now(),
            late_reply: false,
        }));

        let (stop_tx, stop_rx) = watch::channel(false);
        let handle = runtime.spawn(run_idle_checker(
            link.clone(),
            settings.keep_alive,
            settings.idle_poll_interval,
            stop_rx,
        ));

        Ok(Self {
            endpoint,
            connector,
            settings,
            link,
            online: AtomicBool::new(false),
            stop_tx,
            idle_task: std::sync::Mutex::new(Some(handle)),
        })
    }

    pub fn endpoint(&self) -> &Endpoint {
        &self.endpoint
    }

    pub fn settings(&self) -> &ConnectionSettings {
        &self.settings
    }

    /// Whether the speaker was reachable on the last connection attempt
    ///
    /// Stays `true` while the socket is closed for idling.
    pub fn is_online(&self) -> bool {
        self.online.load(Ordering::SeqCst)
    }

    /// Current socket state
    ///
    /// Waits for an in-flight connect or exchange to finish.
    pub async fn state(&self) -> ConnectionState {
        self.link.lock().await.state
    }

    /// Connect unless a live socket already exists
    ///
    /// Refused attempts are retried with a linearly growing delay, up to
    /// `max_connect_attempts`. Any other failure marks the speaker offline
    /// straight away.
    pub async fn ensure_connected(&self) -> Result<()> {
        let mut link = self.link.lock().await;

        if link.state == ConnectionState::Connected {
            tracing::debug!("Connection is still alive");
            link.last_activity = Instant::now();
            return Ok(());
        }

        link.state = ConnectionState::Connecting;
        match self.open().await {
            Ok(stream) => {
                tracing::info!("Connected to {}", self.endpoint);
                link.stream = Some(stream);
                link.state = ConnectionState::Connected;
                link.last_activity = Instant::now();
                self.online.store(true, Ordering::SeqCst);
                Ok(())
            }
            Err(e) => {
                link.state = ConnectionState::Disconnected;
                self.online.store(false, Ordering::SeqCst);
                Err(e)
            }
        }
    }

    async fn open(&self) -> Result<BoxedStream> {
        let max_attempts = self.settings.max_connect_attempts.max(1);

        for attempt in 1..=max_attempts {
            tracing::debug!(attempt, max_attempts, "Opening connection to {}", self.endpoint);

            match timeout(self.settings.connect_timeout, self.connector.connect(&self.endpoint)).await {
                Ok(Ok(stream)) => return Ok(stream),
                Ok(Err(e)) if is_transient(&e) => {
                    tracing::debug!("Opening connection failed: {}", e);
                    if attempt < max_attempts {
                        sleep(self.settings.connect_backoff_step * attempt).await;
                    }
                }
                Ok(Err(e)) => {
                    tracing::debug!("Speaker at {} is offline: {}", self.endpoint, e);
                    return Err(KefError::Offline(e.to_string()));
                }
                Err(_) => {
                    tracing::debug!("Connecting to {} timed out", self.endpoint);
                    return Err(KefError::Offline(format!(
                        "connecting to {} timed out",
                        self.endpoint
                    )));
                }
            }
        }

        Err(KefError::RetriesExceeded {
            attempts: max_attempts,
        })
    }

    /// Write `message` and wait for the reply byte
    ///
    /// A reply timeout keeps the socket for the next exchange; write/read
    /// failures and a closed peer drop it so the next call reconnects.
    /// Replies are not tagged, so bytes left over from an earlier exchange
    /// are discarded before writing.
    pub async fn exchange(&self, message: &[u8]) -> Result<Reply> {
        let mut link = self.link.lock().await;
        let late_reply_wait =
            std::mem::take(&mut link.late_reply).then_some(self.settings.reply_timeout);
        let stream = link.stream.as_mut().ok_or(KefError::NotConnected)?;

        if let Err(e) = discard_stale(stream, late_reply_wait).await {
            link.drop_broken();
            return Err(e);
        }

        tracing::debug!("Writing message: {:?}", message);
        if let Err(e) = write_message(stream, message).await {
            link.drop_broken();
            return Err(e.into());
        }

        let mut buf = [0u8; MAX_RESPONSE_LEN];
        let read = timeout(self.settings.reply_timeout, stream.read(&mut buf)).await;
        match read {
            Err(_) => {
                tracing::error!("Timeout in waiting for reply");
                link.late_reply = true;
                Err(KefError::Timeout)
            }
            Ok(Err(e)) => {
                link.drop_broken();
                Err(e.into())
            }
            Ok(Ok(0)) => {
                tracing::debug!("Speaker closed the connection");
                link.drop_broken();
                Err(KefError::ConnectionClosed)
            }
            Ok(Ok(n)) => {
                tracing::debug!("Got reply: {:?}", &buf[..n]);
                link.last_activity = Instant::now();
                extract_reply(&buf[..n])
            }
        }
    }

    /// Close the socket; no-op when already disconnected
    pub async fn disconnect(&self) {
        let mut link = self.link.lock().await;
        if link.state == ConnectionState::Connected {
            tracing::debug!("Disconnecting from {}", self.endpoint);
            link.close().await;
        }
    }

    /// Stop the idle checker and close the socket
    pub async fn shutdown(&self) {
        let _ = self.stop_tx.send(true);
        let handle = self
            .idle_task
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .take();
        if let Some(handle) = handle {
            let _ = timeout(Duration::from_millis(500), handle).await;
        }
        self.disconnect().await;
        tracing::info!("Connection manager for {} shut down", self.endpoint);
    }
}

impl Drop for ConnectionManager {
    fn drop(&mut self) {
        let _ = self.stop_tx.send(true);
    }
}

fn is_transient(error: &io::Error) -> bool {
    matches!(
        error.kind(),
        io::ErrorKind::ConnectionRefused | io::ErrorKind::WouldBlock
    )
}

/// Read and drop whatever is already buffered on the socket
///
/// With `late_reply_wait`, first waits that long for the reply to a timed
/// out exchange.
async fn discard_stale(stream: &mut BoxedStream, late_reply_wait: Option<Duration>) -> Result<()> {
    let mut scratch = [0u8; MAX_RESPONSE_LEN];

    if let Some(wait) = late_reply_wait {
        match timeout(wait, stream.read(&mut scratch)).await {
            Ok(Ok(0)) => return Err(KefError::ConnectionClosed),
            Ok(Ok(n)) => tracing::debug!("Discarded late reply: {:?}", &scratch[..n]),
            Ok(Err(e)) => return Err(e.into()),
            Err(_) => tracing::debug!("Late reply never arrived"),
        }
    }

    loop {
        // A zero timeout still polls the read once
        match timeout(Duration::ZERO, stream.read(&mut scratch)).await {
            Ok(Ok(0)) => return Err(KefError::ConnectionClosed),
            Ok(Ok(n)) => tracing::debug!("Discarded stale bytes: {:?}", &scratch[..n]),
            Ok(Err(e)) => return Err(e.into()),
            Err(_) => return Ok(()),
        }
    }
}

async fn write_message(stream: &mut BoxedStream, message: &[u8]) -> io::Result<()> {
    stream.write_all(message).await?;
    stream.flush().await
}

/// Close the socket once it has been idle longer than `keep_alive`
async fn run_idle_checker(
    link: Arc<Mutex<Link>>,
    keep_alive: Duration,
    poll_interval: Duration,
    mut stop_rx: watch::Receiver<bool>,
) {
    loop {
        tokio::select! {
            changed = stop_rx.changed() => {
                if changed.is_err() || *stop_rx.borrow() {
                    tracing::debug!("Idle checker stopped");
                    break;
                }
            }
            _ = sleep(poll_interval) => {}
        }

        // A held lock means an exchange is in flight
        let Ok(mut link) = link.try_lock() else {
            continue;
        };
        if link.state == ConnectionState::Connected && link.last_activity.elapsed() > keep_alive {
            tracing::debug!("Connection idle for {:?}, disconnecting", keep_alive);
            link.close().await;
        }
    }
}
