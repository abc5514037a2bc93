//! A Reliable UDP (RUDP) protocol engine.
//!
//! The engine in [`session`] is a single-threaded state machine driven by
//! three kinds of events: user intents (connect, wait, send, close), inbound
//! datagrams, and timer expirations. It never touches sockets or clocks
//! itself. Instead it talks to a [`Transport`], a [`Scheduler`] and a
//! [`Client`] supplied by whoever owns it. [`UdpSession`] is one such owner
//! built on tokio.

pub mod buffer;
pub mod config;
pub mod logging;
pub mod segment;
pub mod seq_space;
pub mod session;
pub mod transmission_queue;
pub mod udp_session;
pub mod utility;

pub use buffer::SegmentBuffer;
pub use config::{ConfigError, ConnectionConfiguration};
pub use segment::{deserialize, Header, ParseError, SegmentHandler, SegmentHeader};
pub use session::{
    Client, Environment, Scheduler, SendError, Session, SessionInfo, State, Timer, TimerHandle,
    Transport,
};
pub use transmission_queue::TransmissionQueue;
pub use udp_session::{SessionError, UdpSession};

/// The only protocol version this engine speaks.
pub const PROTOCOL_VERSION: u8 = 0x01;
