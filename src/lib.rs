//! Public API for the `noticewire` library.
//!
//! This crate provides a long-running client for a length-prefixed TCP
//! transport distributing real-time alert notices as XML documents: connect
//! and handshake, receive and classify frames, answer keep-alive probes,
//! filter by notice-type code, and dispatch to user handlers — reconnecting
//! with backoff until explicitly cancelled.

pub mod codec;
pub mod config;
mod connection;
pub mod dispatch;
pub mod error;
pub mod filter;
pub mod listener;
pub mod notice;

pub use config::{Endpoint, ListenerConfig, ListenerConfigBuilder};
pub use dispatch::{
    HandlerError,
    NoticeHandler,
    Registration,
    RegistrationBuilder,
    handler_fn,
};
pub use error::{ConfigError, ConnectError, DocumentError, FrameError, RegistrationError};
pub use filter::FilterSpec;
pub use listener::{ListenerState, NoticeListener};
pub use notice::{ControlVocabulary, Notice, NoticeDocument};
