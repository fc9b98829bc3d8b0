use crate::error::{KefError, Result};
use crate::protocol::VOLUME_SCALE;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Network address of a speaker
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Endpoint {
    pub host: String,
    pub port: u16,
}

impl Endpoint {
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
        }
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.host, self.port)
    }
}

/// Lifecycle of the socket owned by the connection manager
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Connected,
}

/// Status/value byte extracted from a response buffer
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Reply(pub u8);

impl Reply {
    pub fn value(self) -> u8 {
        self.0
    }
}

/// Input source of the speaker
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Source {
    Wifi,
    Bluetooth,
    Aux,
    Opt,
    Usb,
}

impl Source {
    /// All sources, in the order the speaker lists them
    pub const ALL: [Source; 5] = [
        Source::Wifi,
        Source::Bluetooth,
        Source::Aux,
        Source::Opt,
        Source::Usb,
    ];

    pub fn name(self) -> &'static str {
        match self {
            Source::Wifi => "Wifi",
            Source::Bluetooth => "Bluetooth",
            Source::Aux => "Aux",
            Source::Opt => "Opt",
            Source::Usb => "Usb",
        }
    }
}

impl fmt::Display for Source {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Source {
    type Err = KefError;

    fn from_str(s: &str) -> Result<Self> {
        Source::ALL
            .into_iter()
            .find(|source| source.name().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| KefError::InvalidInput(format!("unknown source {:?}", s)))
    }
}

/// Requested power state for a source change
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Power {
    On,
    Off,
}

/// One row of the source table
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceEntry {
    pub source: Source,

    /// Code used to select the source, also reported back while it is active
    pub code: u8,

    /// Additional codes the speaker reports for the same source
    #[serde(default)]
    pub aliases: Vec<u8>,
}

/// Immutable mapping between sources and their wire codes
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SourceTable {
    entries: Vec<SourceEntry>,
}

impl SourceTable {
    pub fn new(entries: Vec<SourceEntry>) -> Self {
        Self { entries }
    }

    pub fn entries(&self) -> &[SourceEntry] {
        &self.entries
    }

    /// Code used to select `source`
    pub fn code_for(&self, source: Source) -> Option<u8> {
        self.entries
            .iter()
            .find(|entry| entry.source == source)
            .map(|entry| entry.code)
    }

    /// Source reported by `code`, if any
    pub fn decode(&self, code: u8) -> Option<Source> {
        self.entries
            .iter()
            .find(|entry| entry.code == code || entry.aliases.contains(&code))
            .map(|entry| entry.source)
    }
}

impl Default for SourceTable {
    fn default() -> Self {
        let entry = |source, code, aliases: &[u8]| SourceEntry {
            source,
            code,
            aliases: aliases.to_vec(),
        };
        // Bluetooth reports 31 while no device is paired
        Self::new(vec![
            entry(Source::Wifi, 18, &[]),
            entry(Source::Bluetooth, 25, &[31]),
            entry(Source::Aux, 26, &[]),
            entry(Source::Opt, 27, &[]),
            entry(Source::Usb, 28, &[]),
        ])
    }
}

/// Volume as reported by the speaker
///
/// Raw values `0..128` are the unmuted level, `128..=255` the same level with
/// the mute bit set.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VolumeState {
    raw: u8,
}

impl VolumeState {
    pub fn from_raw(raw: u8) -> Self {
        Self { raw }
    }

    pub fn raw(self) -> u8 {
        self.raw
    }

    pub fn is_muted(self) -> bool {
        self.raw >= 128
    }

    /// Level with the mute bit stripped
    pub fn level(self) -> u8 {
        self.raw % 128
    }

    /// Raw byte scaled to the `0.0..=1.0` range; not meaningful while muted
    pub fn scaled(self) -> f64 {
        f64::from(self.raw) / VOLUME_SCALE
    }

    /// Level with the mute bit stripped, scaled to `0.0..=1.0`
    pub fn scaled_level(self) -> f64 {
        f64::from(self.level()) / VOLUME_SCALE
    }
}

/// Source and power state as reported by the speaker
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SourceState {
    pub source: Source,
    pub is_on: bool,
}

impl SourceState {
    /// Decode a `GetSource` reply; codes above 128 mean the speaker is off
    pub fn from_reply(reply: u8, table: &SourceTable) -> Result<Self> {
        let is_on = reply <= 128;
        let code = if is_on { reply % 128 } else { (reply - 128) % 128 };
        let source = table.decode(code).ok_or(KefError::UnknownSource(reply))?;
        Ok(Self { source, is_on })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_volume_state_unmuted_range() {
        for raw in 0..128u8 {
            let state = VolumeState::from_raw(raw);
            assert!(!state.is_muted());
            assert_eq!(state.level(), raw);
            assert_eq!(state.scaled(), f64::from(raw) / 100.0);
        }
    }

    #[test]
    fn test_volume_state_muted_range() {
        for raw in 128..=255u8 {
            let state = VolumeState::from_raw(raw);
            assert!(state.is_muted());
            assert_eq!(state.level(), raw - 128);
            assert_eq!(state.scaled(), f64::from(raw) / 100.0);
        }
    }

    #[test]
    fn test_source_state_on_and_off() {
        let table = SourceTable::default();

        let on = SourceState::from_reply(28, &table).unwrap();
        assert_eq!(on, SourceState { source: Source::Usb, is_on: true });

        let off = SourceState::from_reply(28 + 128, &table).unwrap();
        assert_eq!(off, SourceState { source: Source::Usb, is_on: false });
    }

    #[test]
    fn test_source_state_bluetooth_alias() {
        let table = SourceTable::default();
        let state = SourceState::from_reply(31, &table).unwrap();
        assert_eq!(state.source, Source::Bluetooth);
        assert!(state.is_on);
    }

    #[test]
    fn test_source_state_unknown_code() {
        let table = SourceTable::default();
        assert!(matches!(
            SourceState::from_reply(128, &table),
            Err(KefError::UnknownSource(128))
        ));
        assert!(matches!(
            SourceState::from_reply(3, &table),
            Err(KefError::UnknownSource(3))
        ));
    }

    #[test]
    fn test_source_parse() {
        assert_eq!("Usb".parse::<Source>().unwrap(), Source::Usb);
        assert_eq!("bluetooth".parse::<Source>().unwrap(), Source::Bluetooth);
        assert!(matches!(
            "Phono".parse::<Source>(),
            Err(KefError::InvalidInput(_))
        ));
    }

    #[test]
    fn test_source_table_codes() {
        let table = SourceTable::default();
        assert_eq!(table.code_for(Source::Wifi), Some(18));
        assert_eq!(table.code_for(Source::Usb), Some(28));
        assert_eq!(table.decode(27), Some(Source::Opt));
        assert_eq!(table.decode(99), None);
    }
}
