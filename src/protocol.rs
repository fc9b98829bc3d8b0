use crate::error::{KefError, Result};
use crate::types::Reply;
use serde::{Deserialize, Serialize};

/// Default TCP port of the control protocol
pub const DEFAULT_PORT: u16 = 50001;

/// Status byte acknowledging every write-type command
pub const RESPONSE_OK: u8 = 17;

/// Raw volume byte `100` corresponds to full volume
pub const VOLUME_SCALE: f64 = 100.0;

/// Added to a volume level to mute it, or to a source code to power off
pub const STATE_BIT: u8 = 128;

/// Upper bound for a single read of a response
pub const MAX_RESPONSE_LEN: usize = 100;

const GET_START: u8 = b'G';
const SET_START: u8 = b'S';
const GET_MID: u8 = 0x80;
const SET_MID: u8 = 0x81;
const VOLUME: u8 = b'%';
const SOURCE: u8 = b'0';

/// Opt + power-off bit, the speaker's standby frame
const TURN_OFF_CODE: u8 = 0x9B;

/// Command understood by the speaker
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    GetVolume,
    /// Raw volume byte, mute bit included
    SetVolume(u8),
    GetSource,
    /// Source code, power-off bit included
    SetSource(u8),
    TurnOff,
}

impl Command {
    pub fn name(&self) -> &'static str {
        match self {
            Command::GetVolume => "get_volume",
            Command::SetVolume(_) => "set_volume",
            Command::GetSource => "get_source",
            Command::SetSource(_) => "set_source",
            Command::TurnOff => "turn_off",
        }
    }
}

/// Command table spoken by the speaker firmware
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CodecVersion {
    /// Short frames without trailer byte
    #[default]
    Current,
    /// Early firmware: every frame carries a fixed trailing byte
    Legacy,
}

impl CodecVersion {
    /// Encode a command into the bytes written to the socket
    pub fn encode(self, command: &Command) -> Result<Vec<u8>> {
        match self {
            CodecVersion::Current => Ok(encode_current(command)),
            CodecVersion::Legacy => encode_legacy(command),
        }
    }
}

fn encode_current(command: &Command) -> Vec<u8> {
    match *command {
        Command::GetVolume => vec![GET_START, VOLUME, GET_MID],
        Command::SetVolume(volume) => vec![SET_START, VOLUME, SET_MID, volume],
        Command::GetSource => vec![GET_START, SOURCE, GET_MID],
        Command::SetSource(code) => vec![SET_START, SOURCE, SET_MID, code],
        Command::TurnOff => vec![SET_START, SOURCE, SET_MID, TURN_OFF_CODE],
    }
}

fn encode_legacy(command: &Command) -> Result<Vec<u8>> {
    let frame = match *command {
        Command::GetVolume => vec![GET_START, VOLUME, GET_MID, 0x6C],
        Command::SetVolume(volume) => vec![SET_START, VOLUME, SET_MID, volume, 0x1A],
        Command::GetSource => vec![GET_START, SOURCE, GET_MID, 0xD9],
        // Legacy firmware knows a single standby frame
        Command::TurnOff => legacy_turn_off(),
        Command::SetSource(code) if code >= STATE_BIT => legacy_turn_off(),
        Command::SetSource(code) => {
            let trailer = match code {
                0x12 => 0x82,
                0x19 => 0xAD,
                0x1A => 0x9B,
                0x1B => 0x00,
                0x1C => 0xF7,
                other => {
                    return Err(KefError::Unsupported(format!(
                        "legacy codec has no frame for source code {}",
                        other
                    )))
                }
            };
            vec![SET_START, SOURCE, SET_MID, code, trailer]
        }
    };
    Ok(frame)
}

fn legacy_turn_off() -> Vec<u8> {
    vec![SET_START, SOURCE, SET_MID, TURN_OFF_CODE, 0x0B]
}

/// Extract the reply byte from a raw response
///
/// The value sits in the second-to-last byte of whatever the speaker sent.
pub fn extract_reply(response: &[u8]) -> Result<Reply> {
    if response.len() < 2 {
        return Err(KefError::ShortReply {
            len: response.len(),
        });
    }
    Ok(Reply(response[response.len() - 2]))
}
