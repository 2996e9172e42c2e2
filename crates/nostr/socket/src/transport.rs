//! Transport seam between the socket client and the WebSocket library.
//!
//! [`Transport`] opens sessions. A [`Session`] is a write half
//! ([`FrameWriter`]) plus a stream of incoming [`Frame`]s. The production
//! implementation is [`TungsteniteTransport`]; tests substitute an in-memory
//! transport to observe connection attempts and script relay behavior.

use crate::error::Result;
use async_trait::async_trait;
use futures::stream::{BoxStream, SplitSink};
use futures::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::tungstenite::protocol::CloseFrame;
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async};
use tracing::debug;

/// One data-bearing WebSocket frame, or the peer's close.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Frame {
    Text(String),
    Binary(Vec<u8>),
    Close,
}

/// Incoming frames of a session. Ends when the socket ends.
pub type FrameStream = BoxStream<'static, Result<Frame>>;

/// Write half of a session.
#[async_trait]
pub trait FrameWriter: Send {
    /// Write one text frame.
    async fn send_text(&mut self, text: String) -> Result<()>;

    /// Send a normal-closure close frame and shut the write half.
    async fn close(&mut self) -> Result<()>;
}

/// A freshly opened WebSocket session.
pub struct Session {
    pub writer: Box<dyn FrameWriter>,
    pub frames: FrameStream,
}

/// Opens WebSocket sessions.
#[async_trait]
pub trait Transport: Send + Sync {
    async fn connect(&self, url: &str) -> Result<Session>;
}

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// [`Transport`] backed by `tokio-tungstenite`.
#[derive(Debug, Clone, Copy, Default)]
pub struct TungsteniteTransport;

#[async_trait]
impl Transport for TungsteniteTransport {
    async fn connect(&self, url: &str) -> Result<Session> {
        let (ws_stream, response) = connect_async(url).await?;
        debug!("WebSocket handshake with {} done ({})", url, response.status());

        let (sink, stream) = ws_stream.split();
        let frames = stream
            .filter_map(|item| async move {
                match item {
                    Ok(Message::Text(text)) => Some(Ok(Frame::Text(text.as_str().to_owned()))),
                    Ok(Message::Binary(data)) => Some(Ok(Frame::Binary(data.to_vec()))),
                    Ok(Message::Close(_)) => Some(Ok(Frame::Close)),
                    // Pongs are answered by tungstenite itself
                    Ok(Message::Ping(_) | Message::Pong(_) | Message::Frame(_)) => None,
                    Err(e) => Some(Err(e.into())),
                }
            })
            .boxed();

        Ok(Session {
            writer: Box::new(TungsteniteWriter { sink }),
            frames,
        })
    }
}

struct TungsteniteWriter {
    sink: SplitSink<WsStream, Message>,
}

#[async_trait]
impl FrameWriter for TungsteniteWriter {
    async fn send_text(&mut self, text: String) -> Result<()> {
        self.sink.send(Message::Text(text.into())).await?;
        Ok(())
    }

    async fn close(&mut self) -> Result<()> {
        let frame = CloseFrame {
            code: CloseCode::Normal,
            reason: "".into(),
        };
        self.sink.send(Message::Close(Some(frame))).await?;
        SinkExt::close(&mut self.sink).await?;
        Ok(())
    }
}
