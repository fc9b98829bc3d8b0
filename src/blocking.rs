use crate::error::{KefError, Result};
use crate::options::SpeakerOptions;
use crate::speaker::KefSpeaker;
use crate::transport::{Connector, TcpConnector};
use crate::types::{Endpoint, Power, Source, SourceState, VolumeState};
use std::future::Future;
use std::sync::Arc;
use tokio::runtime::{Handle, Runtime};

/// Synchronous view of a [`KefSpeaker`]
///
/// Every method runs the matching async operation to completion on the
/// calling thread. Must not be used from inside an async context.
///
/// # Example
///
/// ```no_run
/// use kef_wireless::{BlockingKefSpeaker, SpeakerOptions};
///
/// fn main() -> Result<(), Box<dyn std::error::Error>> {
///     let speaker = BlockingKefSpeaker::new("192.168.1.50", SpeakerOptions::default())?;
///     speaker.mute()?;
///     println!("Muted: {}", speaker.is_muted()?);
///     Ok(())
/// }
/// ```
pub struct BlockingKefSpeaker {
    speaker: KefSpeaker,
    handle: Handle,
    // Keeps the idle checker running; dropped after `speaker`
    _runtime: Option<Arc<Runtime>>,
}

impl BlockingKefSpeaker {
    /// Create a controller backed by its own runtime
    pub fn new(host: impl Into<String>, options: SpeakerOptions) -> Result<Self> {
        Self::with_connector(host, options, Arc::new(TcpConnector))
    }

    /// Create a controller backed by its own runtime, opening streams through `connector`
    pub fn with_connector(
        host: impl Into<String>,
        options: SpeakerOptions,
        connector: Arc<dyn Connector>,
    ) -> Result<Self> {
        let runtime = tokio::runtime::Builder::new_multi_thread()
            .worker_threads(1)
            .thread_name("kef-wireless")
            .enable_all()
            .build()
            .map_err(|e| KefError::Runtime(e.to_string()))?;

        let speaker = {
            let _guard = runtime.enter();
            KefSpeaker::with_connector(host, options, connector)?
        };

        Ok(Self {
            speaker,
            handle: runtime.handle().clone(),
            _runtime: Some(Arc::new(runtime)),
        })
    }

    /// Create a controller and connect right away
    pub fn connect(host: impl Into<String>, options: SpeakerOptions) -> Result<Self> {
        let speaker = Self::new(host, options)?;
        speaker.block_on(speaker.speaker.connection().ensure_connected())?;
        Ok(speaker)
    }

    /// Wrap an existing controller, driving it on `handle`
    ///
    /// `handle` must belong to a multi-threaded runtime so the idle checker
    /// keeps running between calls.
    pub fn from_speaker(speaker: KefSpeaker, handle: Handle) -> Self {
        Self {
            speaker,
            handle,
            _runtime: None,
        }
    }

    /// The asynchronous controller behind this view
    pub fn as_async(&self) -> &KefSpeaker {
        &self.speaker
    }

    pub fn host(&self) -> &str {
        self.speaker.host()
    }

    pub fn port(&self) -> u16 {
        self.speaker.port()
    }

    pub fn endpoint(&self) -> &Endpoint {
        self.speaker.endpoint()
    }

    pub fn options(&self) -> &SpeakerOptions {
        self.speaker.options()
    }

    fn block_on<F: Future>(&self, future: F) -> F::Output {
        self.handle.block_on(future)
    }

    pub fn get_source_and_power(&self) -> Result<SourceState> {
        self.block_on(self.speaker.get_source_and_power())
    }

    pub fn get_source(&self) -> Result<Source> {
        self.block_on(self.speaker.get_source())
    }

    pub fn is_on(&self) -> Result<bool> {
        self.block_on(self.speaker.is_on())
    }

    pub fn set_source(&self, source: Source, power: Power) -> Result<()> {
        self.block_on(self.speaker.set_source(source, power))
    }

    pub fn turn_on(&self, source: Option<Source>) -> Result<()> {
        self.block_on(self.speaker.turn_on(source))
    }

    pub fn turn_off(&self) -> Result<()> {
        self.block_on(self.speaker.turn_off())
    }

    pub fn get_volume_state(&self) -> Result<VolumeState> {
        self.block_on(self.speaker.get_volume_state())
    }

    pub fn get_volume_and_mute(&self, scaled: bool) -> Result<(f64, bool)> {
        self.block_on(self.speaker.get_volume_and_mute(scaled))
    }

    pub fn get_volume(&self) -> Result<Option<f64>> {
        self.block_on(self.speaker.get_volume())
    }

    pub fn is_muted(&self) -> Result<bool> {
        self.block_on(self.speaker.is_muted())
    }

    pub fn set_volume(&self, value: f64) -> Result<f64> {
        self.block_on(self.speaker.set_volume(value))
    }

    pub fn change_volume(&self, step: f64) -> Result<f64> {
        self.block_on(self.speaker.change_volume(step))
    }

    pub fn increase_volume(&self) -> Result<f64> {
        self.block_on(self.speaker.increase_volume())
    }

    pub fn decrease_volume(&self) -> Result<f64> {
        self.block_on(self.speaker.decrease_volume())
    }

    pub fn mute(&self) -> Result<()> {
        self.block_on(self.speaker.mute())
    }

    pub fn unmute(&self) -> Result<()> {
        self.block_on(self.speaker.unmute())
    }

    pub fn is_online(&self) -> bool {
        self.block_on(self.speaker.is_online())
    }

    pub fn shutdown(&self) {
        self.block_on(self.speaker.shutdown())
    }
}
