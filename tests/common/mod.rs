//! In-memory speaker used by the integration tests.
//!
//! Emulates the device side of the control protocol over `tokio::io::duplex`
//! and records connection attempts and received frames.

#![allow(dead_code)]

use async_trait::async_trait;
use kef_wireless::{BoxedStream, Connector, Endpoint, RetryPolicy, SpeakerOptions, RESPONSE_OK};
use std::io;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt, DuplexStream};

pub const WIFI: u8 = 18;
pub const BLUETOOTH: u8 = 25;
pub const AUX: u8 = 26;
pub const OPT: u8 = 27;
pub const USB: u8 = 28;
pub const OFF: u8 = 128;

#[derive(Debug, Default)]
struct Device {
    volume: u8,
    source: u8,
    connects: u32,
    frames: Vec<Vec<u8>>,
    refuse_remaining: u32,
    unreachable: bool,
    hang: bool,
    silent: bool,
    reject_writes: bool,
    ignore_source_changes: bool,
    source_lag: u32,
    lag_remaining: u32,
    previous_source: u8,
    next_reply_delay: Option<Duration>,
}

impl Device {
    fn handle(&mut self, frame: &[u8]) -> u8 {
        match (frame.first(), frame.get(1)) {
            (Some(b'G'), Some(b'%')) => self.volume,
            (Some(b'S'), Some(b'%')) => {
                if self.reject_writes {
                    return 0;
                }
                self.volume = frame[3];
                RESPONSE_OK
            }
            (Some(b'G'), Some(b'0')) => {
                if self.lag_remaining > 0 {
                    self.lag_remaining -= 1;
                    return self.previous_source;
                }
                self.source
            }
            (Some(b'S'), Some(b'0')) => {
                if self.reject_writes {
                    return 0;
                }
                if !self.ignore_source_changes {
                    self.previous_source = self.source;
                    self.lag_remaining = self.source_lag;
                    self.source = frame[3];
                }
                RESPONSE_OK
            }
            _ => 0xFF,
        }
    }
}

/// Fake KEF speaker
#[derive(Clone, Default)]
pub struct FakeSpeaker {
    device: Arc<Mutex<Device>>,
}

impl FakeSpeaker {
    pub fn new(volume: u8, source: u8) -> Self {
        let speaker = Self::default();
        {
            let mut device = speaker.lock();
            device.volume = volume;
            device.source = source;
        }
        speaker
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Device> {
        self.device.lock().unwrap()
    }

    pub fn connector(&self) -> Arc<dyn Connector> {
        Arc::new(self.clone())
    }

    pub fn volume(&self) -> u8 {
        self.lock().volume
    }

    pub fn set_volume(&self, volume: u8) {
        self.lock().volume = volume;
    }

    pub fn source(&self) -> u8 {
        self.lock().source
    }

    pub fn set_source(&self, source: u8) {
        self.lock().source = source;
    }

    pub fn connects(&self) -> u32 {
        self.lock().connects
    }

    pub fn frames(&self) -> Vec<Vec<u8>> {
        self.lock().frames.clone()
    }

    /// Number of received frames starting with `start` and `kind`
    pub fn count_frames(&self, start: u8, kind: u8) -> usize {
        self.lock()
            .frames
            .iter()
            .filter(|frame| frame.first() == Some(&start) && frame.get(1) == Some(&kind))
            .count()
    }

    pub fn refuse_next(&self, attempts: u32) {
        self.lock().refuse_remaining = attempts;
    }

    pub fn set_unreachable(&self, unreachable: bool) {
        self.lock().unreachable = unreachable;
    }

    pub fn set_hang(&self, hang: bool) {
        self.lock().hang = hang;
    }

    pub fn set_silent(&self, silent: bool) {
        self.lock().silent = silent;
    }

    pub fn set_reject_writes(&self, reject: bool) {
        self.lock().reject_writes = reject;
    }

    pub fn set_ignore_source_changes(&self, ignore: bool) {
        self.lock().ignore_source_changes = ignore;
    }

    /// Answer the next frame only after `delay`
    pub fn delay_next_reply(&self, delay: Duration) {
        self.lock().next_reply_delay = Some(delay);
    }

    /// Keep reporting the old source for `queries` reads after a change
    pub fn set_source_lag(&self, queries: u32) {
        self.lock().source_lag = queries;
    }
}

#[async_trait]
impl Connector for FakeSpeaker {
    async fn connect(&self, _endpoint: &Endpoint) -> io::Result<BoxedStream> {
        let hang = {
            let mut device = self.lock();
            device.connects += 1;
            if device.unreachable {
                return Err(io::Error::new(io::ErrorKind::AddrNotAvailable, "no route to host"));
            }
            if device.refuse_remaining > 0 {
                device.refuse_remaining -= 1;
                return Err(io::Error::from(io::ErrorKind::ConnectionRefused));
            }
            device.hang
        };
        if hang {
            std::future::pending::<()>().await;
        }

        let (client, server) = tokio::io::duplex(256);
        tokio::spawn(serve(server, self.device.clone()));
        Ok(Box::new(client))
    }
}

async fn serve(mut stream: DuplexStream, device: Arc<Mutex<Device>>) {
    let mut buf = [0u8; 64];
    loop {
        let n = match stream.read(&mut buf).await {
            Ok(0) | Err(_) => return,
            Ok(n) => n,
        };
        let frame = buf[..n].to_vec();

        let (reply, delay) = {
            let mut device = device.lock().unwrap();
            device.frames.push(frame.clone());
            let delay = device.next_reply_delay.take();
            if device.silent {
                (None, delay)
            } else {
                (Some(device.handle(&frame)), delay)
            }
        };

        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        if let Some(value) = reply {
            let response = [b'R', frame.get(1).copied().unwrap_or(0), 0x81, value, 0xFF];
            if stream.write_all(&response).await.is_err() {
                return;
            }
        }
    }
}

/// Options with short retry budgets so failing paths finish quickly
pub fn fast_options() -> SpeakerOptions {
    let mut options = SpeakerOptions::default()
        .with_command_retry(RetryPolicy::new(2, Duration::from_millis(10)))
        .with_operation_retry(RetryPolicy::new(2, Duration::from_millis(10)))
        .with_reply_timeout(Duration::from_millis(200));
    options.source_poll_interval = Duration::from_millis(10);
    options.power_poll_interval = Duration::from_millis(10);
    options.connect_backoff_step = Duration::from_millis(1);
    options
}
