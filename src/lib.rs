//! Rust library for controlling KEF wireless speakers
//!
//! KEF LS50 Wireless and LSX speakers expose a small binary control protocol
//! on TCP port 50001. This library provides an async API on top of it:
//!
//! - Volume, relative volume steps and mute
//! - Input source selection
//! - Power on / standby with confirmation
//! - Reachability checks
//! - A blocking wrapper for callers without an async runtime
//!
//! The speaker silently drops idle sockets and never pushes state, so the
//! library connects on demand, closes the socket after a keep-alive window
//! and retries every operation with exponential backoff.
//!
//! # Quick Start
//!
//! ```no_run
//! use kef_wireless::{KefSpeaker, Source, SpeakerOptions};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let options = SpeakerOptions::default().with_maximum_volume(0.7);
//!     let speaker = KefSpeaker::new("192.168.1.50", options)?;
//!
//!     if !speaker.is_online().await {
//!         println!("Speaker is offline");
//!         return Ok(());
//!     }
//!
//!     speaker.turn_on(Some(Source::Usb)).await?;
//!     speaker.increase_volume().await?;
//!
//!     let state = speaker.get_source_and_power().await?;
//!     println!("Source: {}, on: {}", state.source, state.is_on);
//!     Ok(())
//! }
//! ```
//!
//! # Blocking Use
//!
//! ```no_run
//! use kef_wireless::{BlockingKefSpeaker, SpeakerOptions};
//!
//! fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let speaker = BlockingKefSpeaker::new("192.168.1.50", SpeakerOptions::default())?;
//!     speaker.set_volume(0.25)?;
//!     Ok(())
//! }
//! ```
//!
//! # Architecture
//!
//! - **Speaker**: high-level control API with confirmation loops
//! - **Channel**: one command on the wire at a time, retried per exchange
//! - **Connection**: socket lifecycle, reconnects and idle disconnect
//! - **Protocol**: command frames for the current and legacy firmware
//! - **Retry**: exponential backoff shared by every layer

mod blocking;
mod channel;
mod connection;
mod error;
mod options;
mod protocol;
mod retry;
mod speaker;
mod transport;
mod types;

// Public exports
pub use blocking::BlockingKefSpeaker;
pub use channel::CommandChannel;
pub use connection::{ConnectionManager, ConnectionSettings};
pub use error::{KefError, Result};
pub use options::SpeakerOptions;
pub use protocol::{extract_reply, CodecVersion, Command, DEFAULT_PORT, RESPONSE_OK, VOLUME_SCALE};
pub use retry::RetryPolicy;
pub use speaker::KefSpeaker;
pub use transport::{BoxedStream, Connector, SpeakerStream, TcpConnector};
pub use types::{
    ConnectionState, Endpoint, Power, Reply, Source, SourceEntry, SourceState, SourceTable,
    VolumeState,
};
