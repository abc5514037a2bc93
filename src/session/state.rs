use super::{
    context::Context,
    states::{Closed, Connected, Connecting, Disconnecting, Initiating, Waiting},
    SendError, Timer, TimerHandle,
};
use crate::{
    config::ConnectionConfiguration,
    segment::{deserialize, ParseError, SegmentHeader},
};

/// The state of an RUDP session.
///
/// ```text
///                      +---------+
///        +------------>| CLOSED  |<-----------------------------+
///        |             +---------+                              |
///        |          wait |     | connect                        |
///        |   ----------- |     | -----------                    |
///        |               V     |  snd SYN                       |
///        |  close   +---------+ \                               |
///        +----------| WAITING |  \                              |
///                   +---------+   V                             |
///           rcv SYN      |     +------------+                   |
///         -----------    |     | INITIATING |--------+          |
///         snd SYN,ACK    |     +------------+        |          |
///                        V          |  rcv SYN       | rcv      |
///                 +------------+<---+  -----------   | SYN,ACK  |
///                 | CONNECTING |       snd SYN,ACK   | -------  |
///                 +------------+                     | snd ACK  |
///                        | rcv ACK of SYN            |          |
///                        V                           |          |
///                 +------------+<--------------------+          |
///                 | CONNECTED  |                                |
///                 +------------+                                |
///          close, rcv RST |                                     |
///          -------------- |                                     |
///             snd RST     V                                     |
///                 +---------------+    rcv RST, timeout         |
///                 | DISCONNECTING |-----------------------------+
///                 +---------------+
/// ```
///
/// Resets during the handshake return a session opened with `wait` to
/// WAITING and any other session to CLOSED.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum State {
    /// No connection. The only state that accepts `connect` and `wait`.
    Closed,
    /// Waiting for a peer's connection request.
    Waiting,
    /// Waiting for the peer to answer our connection request.
    Initiating,
    /// Waiting for the peer to acknowledge our SYN after having received
    /// theirs.
    Connecting,
    /// An open connection. Data flows both ways.
    Connected,
    /// Waiting for the peer to confirm a reset, or for enough time to pass.
    Disconnecting,
}

impl State {
    pub(crate) fn handler(self) -> &'static dyn ConnectionState {
        match self {
            State::Closed => &Closed,
            State::Waiting => &Waiting,
            State::Initiating => &Initiating,
            State::Connecting => &Connecting,
            State::Connected => &Connected,
            State::Disconnecting => &Disconnecting,
        }
    }
}

/// The behavior of one state. Every event a session can receive has a
/// method here; the defaults ignore the event.
pub(crate) trait ConnectionState {
    fn on_enter(&self, _ctx: &mut Context<'_>) {}

    fn on_exit(&self, _ctx: &mut Context<'_>) {}

    /// Drops the connection without telling the peer.
    fn invalidate(&self, ctx: &mut Context<'_>) {
        ctx.enter(State::Closed);
    }

    /// The session is going away.
    fn destroy(&self, ctx: &mut Context<'_>) {
        ctx.cancel_all_timers();
    }

    fn connect(&self, ctx: &mut Context<'_>, _iss: u16) {
        tracing::warn!(state = ?ctx.core.state, "connect ignored");
    }

    fn wait(&self, ctx: &mut Context<'_>, _iss: u16) {
        tracing::warn!(state = ?ctx.core.state, "wait ignored");
    }

    fn close(&self, _ctx: &mut Context<'_>) {}

    fn send(&self, _ctx: &mut Context<'_>, _payload: &[u8]) -> Result<(), SendError> {
        Err(SendError::NotConnected)
    }

    /// Parses a datagram and hands it to the current state.
    fn receive(&self, ctx: &mut Context<'_>, datagram: &[u8]) {
        let limit = ctx.core.info.local.max_segment_size as usize;
        if datagram.len() > limit {
            tracing::warn!(len = datagram.len(), limit, "dropping oversized datagram");
            return;
        }
        deserialize(datagram, &mut Dispatch(ctx));
    }

    fn on_syn(
        &self,
        _ctx: &mut Context<'_>,
        _header: &SegmentHeader,
        _config: ConnectionConfiguration,
    ) {
    }

    fn on_rst(&self, _ctx: &mut Context<'_>, _header: &SegmentHeader) {}

    fn on_nul(&self, _ctx: &mut Context<'_>, _header: &SegmentHeader) {}

    fn on_eack(
        &self,
        _ctx: &mut Context<'_>,
        _header: &SegmentHeader,
        _acks: &[u16],
        _payload: &[u8],
    ) {
    }

    fn on_regular(&self, _ctx: &mut Context<'_>, _header: &SegmentHeader, _payload: &[u8]) {}

    fn on_invalid(&self, ctx: &mut Context<'_>, error: ParseError) {
        tracing::warn!(state = ?ctx.core.state, %error, "dropping invalid segment");
    }

    fn on_timer(&self, ctx: &mut Context<'_>, handle: TimerHandle, timer: Timer) {
        tracing::debug!(state = ?ctx.core.state, ?handle, ?timer, "timer ignored");
    }
}

/// Routes parsed segments to whatever state the session is in when each
/// callback runs.
struct Dispatch<'c, 'a>(&'c mut Context<'a>);

impl crate::segment::SegmentHandler for Dispatch<'_, '_> {
    fn on_syn(&mut self, header: &SegmentHeader, config: ConnectionConfiguration) {
        self.0.trace_incoming(header, 0);
        self.0.handler().on_syn(self.0, header, config);
    }

    fn on_rst(&mut self, header: &SegmentHeader) {
        self.0.trace_incoming(header, 0);
        self.0.handler().on_rst(self.0, header);
    }

    fn on_nul(&mut self, header: &SegmentHeader) {
        self.0.trace_incoming(header, 0);
        self.0.handler().on_nul(self.0, header);
    }

    fn on_eack(&mut self, header: &SegmentHeader, acks: &[u16], payload: &[u8]) {
        self.0.trace_incoming(header, payload.len());
        self.0.handler().on_eack(self.0, header, acks, payload);
    }

    fn on_regular(&mut self, header: &SegmentHeader, payload: &[u8]) {
        self.0.trace_incoming(header, payload.len());
        self.0.handler().on_regular(self.0, header, payload);
    }

    fn on_invalid(&mut self, error: ParseError) {
        self.0.handler().on_invalid(self.0, error);
    }
}
