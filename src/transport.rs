use crate::types::Endpoint;
use async_trait::async_trait;
use std::io;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::TcpStream;

/// Byte stream to a speaker
pub trait SpeakerStream: AsyncRead + AsyncWrite + Unpin + Send {}

impl<T: AsyncRead + AsyncWrite + Unpin + Send> SpeakerStream for T {}

/// Boxed stream held by the connection manager
pub type BoxedStream = Box<dyn SpeakerStream>;

/// Opens streams to a speaker
///
/// The connection manager classifies the returned error: `ConnectionRefused`
/// and `WouldBlock` are retried, anything else marks the speaker offline.
#[async_trait]
pub trait Connector: Send + Sync {
    async fn connect(&self, endpoint: &Endpoint) -> io::Result<BoxedStream>;
}

/// Plain TCP connector
#[derive(Debug, Clone, Copy, Default)]
pub struct TcpConnector;

#[async_trait]
impl Connector for TcpConnector {
    async fn connect(&self, endpoint: &Endpoint) -> io::Result<BoxedStream> {
        let stream = TcpStream::connect((endpoint.host.as_str(), endpoint.port)).await?;
        // Frames are a handful of bytes; don't let Nagle hold them back
        stream.set_nodelay(true)?;
        Ok(Box::new(stream))
    }
}
