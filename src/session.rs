//! The RUDP protocol engine.
//!
//! A [`Session`] is one end of one connection. It reacts to three kinds of
//! input, all delivered by its owner on a single thread:
//!
//! - user intents: [`connect`](Session::connect), [`wait`](Session::wait),
//!   [`send`](Session::send), [`close`](Session::close)
//! - inbound datagrams: [`receive`](Session::receive)
//! - timer expirations: [`timer_fired`](Session::timer_fired)
//!
//! Everything the session does to the outside world goes through its
//! [`Environment`]: datagrams out through [`Transport`], timers through
//! [`Scheduler`], and deliveries and notifications through [`Client`].

mod context;
mod state;
mod states;


pub use state::State;

use crate::{
    buffer::SegmentBuffer,
    config::{ConfigError, ConnectionConfiguration},
    transmission_queue::TransmissionQueue,
};
use context::Context;
use rand::Rng;
use std::time::Duration;
use thiserror::Error as ThisError;

/// Carries serialized segments to the peer.
pub trait Transport {
    /// Sends one segment as one datagram. Delivery is best effort.
    fn transmit(&mut self, segment: &[u8]);
}

/// Arms and disarms one-shot timers on behalf of a session.
pub trait Scheduler {
    /// Arranges for [`Session::timer_fired`] to be called with the returned
    /// handle and `timer` once `delay` has passed.
    fn schedule(&mut self, delay: Duration, timer: Timer) -> TimerHandle;

    /// Disarms a pending timer. Cancelling a timer that already fired is
    /// harmless.
    fn cancel(&mut self, handle: TimerHandle);
}

/// The user of a session.
pub trait Client {
    /// In-order payload arrived from the peer.
    fn on_receive(&mut self, _payload: &[u8]) {}

    /// A payload was accepted and sent with sequence number `seq`.
    fn on_send(&mut self, _seq: u16) {}

    /// The session moved to `state`.
    fn on_state_changed(&mut self, _state: State) {}
}

/// Everything a session needs from its owner.
pub trait Environment: Transport + Scheduler + Client {}

impl<T: Transport + Scheduler + Client> Environment for T {}

/// Identifies a scheduled timer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TimerHandle(pub u64);

/// What a timer is for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Timer {
    /// Resend the data segment with this sequence number
    Retransmission(u16),
    /// Resend our SYN or SYN+ACK
    Handshake,
    /// Send a NUL if the connection has been idle
    KeepAlive,
    /// Stop waiting for the peer to confirm a reset
    Disconnect,
}

/// The sequence number bookkeeping of a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionInfo {
    /// Our configuration, sent in our SYN
    pub local: ConnectionConfiguration,
    /// The peer's configuration, once its SYN has arrived
    pub remote: Option<ConnectionConfiguration>,
    /// Our initial sequence number, consumed by our SYN
    pub send_initial_seq: u16,
    /// The sequence number the next data segment will use
    pub send_next: u16,
    /// The oldest sequence number not yet acknowledged
    pub send_latest_unacked: u16,
    /// The peer's initial sequence number
    pub receive_initial_seq: u16,
    /// The latest sequence number received in order
    pub receive_latest_acked: u16,
    /// Set for sessions opened with [`Session::wait`]. They go back to
    /// waiting instead of closing when a handshake fails.
    pub keep_alive: bool,
}

impl SessionInfo {
    fn new(local: ConnectionConfiguration) -> Self {
        Self {
            local,
            remote: None,
            send_initial_seq: 0,
            send_next: 0,
            send_latest_unacked: 0,
            receive_initial_seq: 0,
            receive_latest_acked: 0,
            keep_alive: false,
        }
    }
}

/// Why a payload was not sent.
#[derive(Debug, ThisError, PartialEq, Eq, Clone, Copy)]
pub enum SendError {
    #[error("The session is not connected")]
    NotConnected,
    #[error("Cannot send an empty payload")]
    EmptyPayload,
    #[error("A payload of {len} bytes exceeds the peer's limit of {max}")]
    PayloadTooLarge { len: usize, max: usize },
    #[error("Too many segments are awaiting acknowledgment")]
    WindowFull,
}

/// Pending timers other than retransmissions, which live in the
/// [`TransmissionQueue`].
#[derive(Debug, Default)]
pub(crate) struct Timers {
    pub handshake: Option<TimerHandle>,
    pub handshake_transmissions: u8,
    pub keep_alive: Option<TimerHandle>,
    pub disconnect: Option<TimerHandle>,
    /// Nothing has been sent since the last keep-alive tick
    pub idle: bool,
}

/// The state of a session, apart from its environment.
#[derive(Debug)]
pub(crate) struct Core {
    pub state: State,
    pub info: SessionInfo,
    pub send_queue: Option<SegmentBuffer>,
    pub receive_queue: Option<SegmentBuffer>,
    pub retransmissions: Option<TransmissionQueue>,
    pub timers: Timers,
    /// Serialization buffer for outgoing segments
    pub scratch: Vec<u8>,
}

/// One end of an RUDP connection. See the [module documentation](self).
pub struct Session<E: Environment> {
    core: Core,
    env: E,
}

impl<E: Environment> Session<E> {
    /// Creates a closed session with the given local configuration.
    pub fn new(local: ConnectionConfiguration, env: E) -> Result<Self, ConfigError> {
        local.validate()?;
        Ok(Self {
            core: Core {
                state: State::Closed,
                info: SessionInfo::new(local),
                send_queue: None,
                receive_queue: None,
                retransmissions: None,
                timers: Timers::default(),
                scratch: Vec::with_capacity(local.max_segment_size as usize),
            },
            env,
        })
    }

    /// Actively opens a connection by sending a SYN.
    pub fn connect(&mut self) {
        self.connect_from(initial_sequence_number());
    }

    pub(crate) fn connect_from(&mut self, iss: u16) {
        let mut ctx = self.context();
        ctx.handler().connect(&mut ctx, iss);
    }

    /// Passively waits for a peer's SYN.
    pub fn wait(&mut self) {
        self.wait_from(initial_sequence_number());
    }

    pub(crate) fn wait_from(&mut self, iss: u16) {
        let mut ctx = self.context();
        ctx.handler().wait(&mut ctx, iss);
    }

    /// Gracefully tears the connection down, telling the peer.
    pub fn close(&mut self) {
        let mut ctx = self.context();
        ctx.handler().close(&mut ctx);
    }

    /// Drops the connection without telling the peer.
    pub fn invalidate(&mut self) {
        let mut ctx = self.context();
        ctx.handler().invalidate(&mut ctx);
    }

    /// Sends `payload` as one data segment.
    pub fn send(&mut self, payload: &[u8]) -> Result<(), SendError> {
        let mut ctx = self.context();
        ctx.handler().send(&mut ctx, payload)
    }

    /// Processes one inbound datagram.
    pub fn receive(&mut self, datagram: &[u8]) {
        let mut ctx = self.context();
        ctx.handler().receive(&mut ctx, datagram);
    }

    /// Processes the expiry of a timer previously scheduled by this session.
    pub fn timer_fired(&mut self, handle: TimerHandle, timer: Timer) {
        let mut ctx = self.context();
        ctx.handler().on_timer(&mut ctx, handle, timer);
    }

    pub fn state(&self) -> State {
        self.core.state
    }

    pub fn info(&self) -> &SessionInfo {
        &self.core.info
    }

    pub fn local_config(&self) -> &ConnectionConfiguration {
        &self.core.info.local
    }

    pub fn remote_config(&self) -> Option<&ConnectionConfiguration> {
        self.core.info.remote.as_ref()
    }

    /// Whether [`send`](Self::send) would currently accept a payload.
    pub fn can_send(&self) -> bool {
        self.core.can_send()
    }

    pub fn environment(&self) -> &E {
        &self.env
    }

    pub fn environment_mut(&mut self) -> &mut E {
        &mut self.env
    }

    fn context(&mut self) -> Context<'_> {
        Context {
            core: &mut self.core,
            env: &mut self.env,
        }
    }
}

impl<E: Environment> Drop for Session<E> {
    fn drop(&mut self) {
        let mut ctx = self.context();
        ctx.handler().destroy(&mut ctx);
    }
}

impl Core {
    pub fn can_send(&self) -> bool {
        self.state == State::Connected
            && self
                .send_queue
                .as_ref()
                .map_or(false, |queue| queue.has_slot(self.info.send_next))
    }
}

fn initial_sequence_number() -> u16 {
    rand::thread_rng().gen_range(1..=u16::MAX)
}
