use crate::channel::CommandChannel;
use crate::connection::{ConnectionManager, ConnectionSettings};
use crate::error::{KefError, Result};
use crate::options::SpeakerOptions;
use crate::protocol::{CodecVersion, Command, STATE_BIT, VOLUME_SCALE};
use crate::transport::{Connector, TcpConnector};
use crate::types::{Endpoint, Power, Source, SourceState, VolumeState};
use std::sync::Arc;
use tokio::time::sleep;

/// Asynchronous controller for a KEF wireless speaker
///
/// Cloning is cheap; clones share the same connection.
///
/// # Example
///
/// ```no_run
/// use kef_wireless::{KefSpeaker, Source, SpeakerOptions};
///
/// #[tokio::main]
/// async fn main() -> Result<(), Box<dyn std::error::Error>> {
///     let speaker = KefSpeaker::connect("192.168.1.50", SpeakerOptions::default()).await?;
///     speaker.turn_on(Some(Source::Wifi)).await?;
///     speaker.set_volume(0.3).await?;
///     println!("Volume: {:?}", speaker.get_volume().await?);
///     Ok(())
/// }
/// ```
#[derive(Clone)]
pub struct KefSpeaker {
    channel: Arc<CommandChannel>,
    options: Arc<SpeakerOptions>,
}

impl std::fmt::Debug for KefSpeaker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KefSpeaker")
            .field("options", &self.options)
            .finish_non_exhaustive()
    }
}

impl KefSpeaker {
    /// Create a controller without connecting yet
    ///
    /// Must be called from within a tokio runtime; the connection's idle
    /// checker is spawned on it.
    pub fn new(host: impl Into<String>, options: SpeakerOptions) -> Result<Self> {
        Self::with_connector(host, options, Arc::new(TcpConnector))
    }

    /// Create a controller that opens its streams through `connector`
    pub fn with_connector(
        host: impl Into<String>,
        options: SpeakerOptions,
        connector: Arc<dyn Connector>,
    ) -> Result<Self> {
        options.validate()?;

        let endpoint = Endpoint::new(host, options.port);
        let manager = ConnectionManager::new(endpoint, connector, ConnectionSettings::from(&options))?;
        let channel = CommandChannel::new(Arc::new(manager), options.codec, options.command_retry.clone());

        Ok(Self {
            channel: Arc::new(channel),
            options: Arc::new(options),
        })
    }

    /// Create a controller and connect to the speaker right away
    ///
    /// Fails with an offline error if the speaker cannot be reached.
    pub async fn connect(host: impl Into<String>, options: SpeakerOptions) -> Result<Self> {
        let speaker = Self::new(host, options)?;
        speaker.connection().ensure_connected().await?;
        Ok(speaker)
    }

    pub fn host(&self) -> &str {
        &self.endpoint().host
    }

    pub fn port(&self) -> u16 {
        self.endpoint().port
    }

    pub fn endpoint(&self) -> &Endpoint {
        self.channel.connection().endpoint()
    }

    pub fn options(&self) -> &SpeakerOptions {
        &self.options
    }

    /// Get the underlying connection manager
    pub fn connection(&self) -> &Arc<ConnectionManager> {
        self.channel.connection()
    }

    /// Stop the idle checker and close the connection
    pub async fn shutdown(&self) {
        self.connection().shutdown().await;
    }

    // ========== Source and Power ==========

    /// Get the selected source and whether the speaker is on
    pub async fn get_source_and_power(&self) -> Result<SourceState> {
        self.options
            .operation_retry
            .run("get_source_and_power", || self.query_source_state())
            .await
    }

    /// Get the selected source
    pub async fn get_source(&self) -> Result<Source> {
        Ok(self.get_source_and_power().await?.source)
    }

    /// Whether the speaker is on
    pub async fn is_on(&self) -> Result<bool> {
        Ok(self.get_source_and_power().await?.is_on)
    }

    /// Select a source and wait until the speaker reports it
    ///
    /// Selecting a source with `Power::Off` puts the speaker in standby while
    /// remembering the source.
    ///
    /// # Example
    ///
    /// ```no_run
    /// # use kef_wireless::{KefSpeaker, Power, Source, SpeakerOptions};
    /// # #[tokio::main]
    /// # async fn main() -> Result<(), Box<dyn std::error::Error>> {
    /// # let speaker = KefSpeaker::new("192.168.1.50", SpeakerOptions::default())?;
    /// speaker.set_source(Source::Usb, Power::On).await?;
    /// # Ok(())
    /// # }
    /// ```
    pub async fn set_source(&self, source: Source, power: Power) -> Result<()> {
        self.options
            .operation_retry
            .run("set_source", || self.set_source_once(source, power))
            .await
    }

    async fn set_source_once(&self, source: Source, power: Power) -> Result<()> {
        let mut code = self
            .options
            .sources
            .code_for(source)
            .ok_or_else(|| KefError::InvalidInput(format!("no code configured for source {}", source)))?
            % STATE_BIT;
        if power == Power::Off {
            code += STATE_BIT;
        }
        self.channel.send_expecting_ok(Command::SetSource(code)).await?;

        let attempts = self.options.confirm_attempts;
        let mut current = None;
        for attempt in 1..=attempts {
            let state = self.query_source_state().await?;
            if self.source_confirmed(state, source, power) {
                return Ok(());
            }
            tracing::debug!("Source is {} but {} is selected", state.source, source);
            current = Some(state.source);
            if attempt < attempts {
                sleep(self.options.source_poll_interval).await;
            }
        }

        Err(KefError::SourceNotConfirmed {
            expected: source.to_string(),
            actual: current.map(|s| s.to_string()).unwrap_or_default(),
        })
    }

    fn source_confirmed(&self, state: SourceState, source: Source, power: Power) -> bool {
        // Legacy standby always reports Opt, whatever source was requested
        if power == Power::Off && self.channel.codec() == CodecVersion::Legacy {
            return !state.is_on;
        }
        state.source == source
    }

    async fn query_source_state(&self) -> Result<SourceState> {
        let reply = self.channel.send(Command::GetSource).await?;
        SourceState::from_reply(reply.value(), &self.options.sources)
    }

    /// Turn the speaker on, optionally switching to `source`
    ///
    /// Does nothing if the speaker is already on. Waits a bounded time for
    /// the speaker to report that it is on, but does not fail if it is
    /// still booting.
    pub async fn turn_on(&self, source: Option<Source>) -> Result<()> {
        let state = self.get_source_and_power().await?;
        if state.is_on {
            return Ok(());
        }
        self.set_source(source.unwrap_or(state.source), Power::On).await?;
        self.wait_for_power(true).await
    }

    /// Put the speaker in standby
    ///
    /// The current firmware keeps the selected source; legacy firmware has a
    /// single standby command and wakes up on Opt.
    pub async fn turn_off(&self) -> Result<()> {
        let state = self.get_source_and_power().await?;
        if !state.is_on {
            return Ok(());
        }
        match self.channel.codec() {
            CodecVersion::Legacy => {
                self.options
                    .operation_retry
                    .run("turn_off", || self.channel.send_expecting_ok(Command::TurnOff))
                    .await?
            }
            CodecVersion::Current => self.set_source(state.source, Power::Off).await?,
        }
        self.wait_for_power(false).await
    }

    async fn wait_for_power(&self, on: bool) -> Result<()> {
        let attempts = self.options.confirm_attempts;
        for attempt in 1..=attempts {
            if self.is_on().await? == on {
                tracing::debug!("Speaker is {}", if on { "on" } else { "off" });
                return Ok(());
            }
            tracing::debug!(attempt, "Speaker has not switched {} yet", if on { "on" } else { "off" });
            if attempt < attempts {
                sleep(self.options.power_poll_interval).await;
            }
        }
        tracing::warn!(
            "Speaker at {} did not confirm switching {} after {} checks",
            self.endpoint(),
            if on { "on" } else { "off" },
            attempts
        );
        Ok(())
    }

    // ========== Volume Control ==========

    /// Get the volume and mute flag in a single call
    pub async fn get_volume_state(&self) -> Result<VolumeState> {
        self.options
            .operation_retry
            .run("get_volume", || async move {
                let reply = self.channel.send(Command::GetVolume).await?;
                Ok(VolumeState::from_raw(reply.value()))
            })
            .await
    }

    /// Get the volume and whether the speaker is muted
    ///
    /// With `scaled` the raw byte is divided by 100, otherwise it is returned
    /// as is. The value is not meaningful while muted.
    pub async fn get_volume_and_mute(&self, scaled: bool) -> Result<(f64, bool)> {
        let state = self.get_volume_state().await?;
        let value = if scaled {
            state.scaled()
        } else {
            f64::from(state.raw())
        };
        Ok((value, state.is_muted()))
    }

    /// Get the volume level (0..1), or `None` while muted
    pub async fn get_volume(&self) -> Result<Option<f64>> {
        let state = self.get_volume_state().await?;
        Ok((!state.is_muted()).then(|| state.scaled()))
    }

    pub async fn is_muted(&self) -> Result<bool> {
        Ok(self.get_volume_state().await?.is_muted())
    }

    /// Set the volume level, clamped to `[0, maximum_volume]`
    ///
    /// Returns the level actually applied.
    ///
    /// # Example
    ///
    /// ```no_run
    /// # use kef_wireless::{KefSpeaker, SpeakerOptions};
    /// # #[tokio::main]
    /// # async fn main() -> Result<(), Box<dyn std::error::Error>> {
    /// # let speaker = KefSpeaker::new("192.168.1.50", SpeakerOptions::default())?;
    /// let applied = speaker.set_volume(0.45).await?;
    /// assert_eq!(applied, 0.45);
    /// # Ok(())
    /// # }
    /// ```
    pub async fn set_volume(&self, value: f64) -> Result<f64> {
        if value.is_nan() {
            return Err(KefError::InvalidInput("volume must be a number".to_string()));
        }
        let volume = value.clamp(0.0, self.options.maximum_volume);
        self.write_volume((volume * VOLUME_SCALE).round() as u8).await?;
        Ok(volume)
    }

    /// Change the volume by `step`, unmuting first if muted
    pub async fn change_volume(&self, step: f64) -> Result<f64> {
        let state = self.get_volume_state().await?;
        if state.is_muted() {
            self.unmute().await?;
        }
        self.set_volume(state.scaled_level() + step).await
    }

    /// Increase the volume by the configured step
    pub async fn increase_volume(&self) -> Result<f64> {
        self.change_volume(self.options.volume_step).await
    }

    /// Decrease the volume by the configured step
    pub async fn decrease_volume(&self) -> Result<f64> {
        self.change_volume(-self.options.volume_step).await
    }

    // ========== Mute Control ==========

    /// Mute, keeping the current level
    pub async fn mute(&self) -> Result<()> {
        let state = self.get_volume_state().await?;
        self.write_volume(state.level() + STATE_BIT).await
    }

    /// Unmute, restoring the level the speaker had before muting
    pub async fn unmute(&self) -> Result<()> {
        let state = self.get_volume_state().await?;
        self.write_volume(state.level()).await
    }

    async fn write_volume(&self, raw: u8) -> Result<()> {
        self.options
            .operation_retry
            .run("set_volume", || self.channel.send_expecting_ok(Command::SetVolume(raw)))
            .await
    }

    // ========== Reachability ==========

    /// Whether the speaker can be reached
    ///
    /// Connects if needed; an offline speaker is reported as `false` rather
    /// than as an error.
    pub async fn is_online(&self) -> bool {
        match self.connection().ensure_connected().await {
            Ok(()) => {}
            Err(e) if e.is_offline() => {
                tracing::debug!("Speaker at {} is offline: {}", self.endpoint(), e);
            }
            Err(e) => {
                tracing::warn!("Checking speaker at {} failed: {}", self.endpoint(), e);
            }
        }
        self.connection().is_online()
    }
}
