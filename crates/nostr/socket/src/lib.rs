//! Nostr relay socket transport for OpenAgents.
//!
//! This crate provides:
//! - A single lazily-opened WebSocket session per relay endpoint
//! - Frame builders for REQ, EVENT, AUTH, COUNT and CLOSE
//! - A parser that turns relay frames into [`IncomingMessage`]s and never fails loudly
//! - Optional zlib compression of relay-to-client frames
//! - A lossless multi-subscriber stream of parsed messages, filterable per subscription
//!
//! # Example
//!
//! ```rust,no_run
//! use nostr_socket::{Filter, IncomingMessage, NostrSocketClient};
//!
//! #[tokio::main]
//! async fn main() -> nostr_socket::Result<()> {
//!     let client = NostrSocketClient::builder("wss://relay.damus.io")
//!         .on_closed(|url, err| println!("{} closed: {:?}", url, err))
//!         .build()?;
//!
//!     // Subscribe to kind 1 (text notes)
//!     let filter = Filter::new().kinds(vec![1]).limit(10).to_value()?;
//!     let mut sub = client.subscribe(&filter).await?;
//!
//!     while let Ok(msg) = sub.recv().await {
//!         match msg {
//!             IncomingMessage::Event { event: Some(event), .. } => {
//!                 println!("Received event: {}", event.id);
//!             }
//!             IncomingMessage::Eose { .. } => break,
//!             _ => {}
//!         }
//!     }
//!
//!     client.send_close(sub.id()).await?;
//!     client.close().await;
//!     Ok(())
//! }
//! ```

mod client;
mod compression;
mod config;
mod error;
mod event;
mod incoming;
mod kind;
mod logging;
mod message;
mod socket_url;
mod subscription;
mod transport;

// Re-export main types
pub use client::{
    ClosedCallback, ConnectionState, NostrSocketClient, NostrSocketClientBuilder, OpenedCallback,
    PublishConfirmation, QueryResult,
};
pub use compression::{COMPRESSION_ZLIB, NEGOTIATION_METHOD, inflate, negotiation_frame};
pub use config::SocketConfig;
pub use error::{Result, SocketError};
pub use event::{Event, ExtensionEvent};
pub use incoming::{IncomingMessage, MessageError, parse};
pub use kind::{DefaultKindClassifier, EXTENSION_KINDS, KindClass, KindClassifier, STANDARD_KINDS};
pub use logging::{Direction, chunk_text, log_frame};
pub use message::{
    ClientMessage, Filter, build_auth, build_close, build_count, build_event, build_req,
};
pub use socket_url::normalize_socket_url;
pub use subscription::{
    IncomingStream, PLATFORM_TAG, SubscriptionReceiver, generate_subscription_id,
};
pub use transport::{Frame, FrameStream, FrameWriter, Session, Transport, TungsteniteTransport};
