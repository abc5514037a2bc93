//! Actions shared by the states.

use super::{state::ConnectionState, Core, Environment, SendError, State, Timer, TimerHandle};
use crate::{
    buffer::SegmentBuffer,
    config::ConnectionConfiguration,
    logging::{segment_event, Direction},
    segment::{
        build_ack, build_eack, build_nul, build_rst, build_syn, build_with_payload, Header,
        SegmentHeader, ACK_HEADER_LENGTH, MAX_EACKS,
    },
    seq_space::{is_in_window, seq_offset},
    transmission_queue::{TimerOutcome, TransmissionQueue},
};
use std::time::Duration;

/// How long a disconnecting session waits for the peer's RST.
pub(crate) const DISCONNECT_TIMEOUT: Duration = Duration::from_secs(5);

/// A session borrowed apart into its state and its environment, so states
/// can update one while calling into the other.
pub(crate) struct Context<'a> {
    pub core: &'a mut Core,
    pub env: &'a mut dyn Environment,
}

impl Context<'_> {
    pub fn handler(&self) -> &'static dyn ConnectionState {
        self.core.state.handler()
    }

    /// Leaves the current state for `next`, running the exit and entry
    /// actions and notifying the client.
    pub fn enter(&mut self, next: State) {
        let previous = self.core.state;
        if previous == next {
            return;
        }
        previous.handler().on_exit(self);
        self.core.state = next;
        tracing::debug!(?previous, ?next, "state transition");
        next.handler().on_enter(self);
        self.env.on_state_changed(next);
    }

    /// Falls back after a failed or reset connection: sessions opened with
    /// `wait` go back to waiting, everything else closes.
    pub fn reset(&mut self) {
        if self.core.info.keep_alive {
            self.enter(State::Waiting);
        } else {
            self.enter(State::Closed);
        }
    }

    /// Records the peer's SYN. Answers with RST and falls back if the peer
    /// proposes a configuration we cannot run with.
    pub fn accept_remote(
        &mut self,
        header: &SegmentHeader,
        config: ConnectionConfiguration,
    ) -> bool {
        if let Err(error) = config.validate() {
            tracing::warn!(%error, "peer proposed an unusable configuration");
            self.reply_rst(header);
            self.reset();
            return false;
        }
        let info = &mut self.core.info;
        info.remote = Some(config);
        info.receive_initial_seq = header.seq;
        info.receive_latest_acked = header.seq;
        true
    }

    /// Resets the sequence numbers for a new connection attempt.
    pub fn open(&mut self, iss: u16, keep_alive: bool) {
        let info = &mut self.core.info;
        info.send_initial_seq = iss;
        info.send_latest_unacked = iss;
        info.send_next = iss.wrapping_add(1);
        info.remote = None;
        info.keep_alive = keep_alive;
    }

    /// Our SYN acknowledged: the handshake is complete.
    pub fn establish(&mut self) {
        let info = &mut self.core.info;
        info.send_latest_unacked = info.send_initial_seq.wrapping_add(1);
        self.enter(State::Connected);
    }

    /// Whether `header` acknowledges our SYN.
    pub fn acknowledges_syn(&self, header: &SegmentHeader) -> bool {
        header.description.ack() && header.ack == self.core.info.send_initial_seq
    }

    /// Serializes and sends a segment that will not be retransmitted.
    pub fn transmit(&mut self, mut header: Header) {
        let core = &mut *self.core;
        core.scratch.clear();
        match header.serialize(&[], &mut core.scratch) {
            Ok(_) => {
                segment_event(Direction::Outgoing, header.base(), 0);
                self.env.transmit(&core.scratch);
                core.timers.idle = false;
            }
            Err(error) => tracing::error!(%error, ?header, "failed to serialize segment"),
        }
    }

    /// Sends our SYN, acknowledging the peer's when `ack` is given.
    pub fn send_syn(&mut self, ack: Option<u16>) {
        let info = &self.core.info;
        let header = build_syn(info.local, info.send_initial_seq, ack);
        self.transmit(header);
    }

    /// Acknowledges everything received so far, listing any out-of-sequence
    /// segments being held. The list is cut short so the segment still fits
    /// the peer's maximum segment size.
    pub fn send_ack(&mut self) {
        let info = &self.core.info;
        let limit = info.remote.map_or(MAX_EACKS, |remote| {
            let room = remote.max_segment_size.saturating_sub(ACK_HEADER_LENGTH as u16);
            MAX_EACKS.min(room as usize / 2)
        });
        let acks = self
            .core
            .receive_queue
            .as_ref()
            .map(|queue| queue.enumerate_in_use(limit))
            .unwrap_or_default();
        let header = if acks.is_empty() {
            build_ack(info.send_next, info.receive_latest_acked)
        } else {
            build_eack(info.send_next, info.receive_latest_acked, &acks)
        };
        self.transmit(header);
    }

    /// Sends a reset for the current connection.
    pub fn send_rst(&mut self) {
        let info = &self.core.info;
        let header = build_rst(0, info.send_next, Some(info.receive_latest_acked));
        self.transmit(header);
    }

    /// Answers a segment that has no place in the current state.
    ///
    /// If the segment acknowledges something or is a NUL, the reset takes
    /// its sequence number from that acknowledgment. Otherwise the reset
    /// acknowledges the segment itself.
    pub fn reply_rst(&mut self, header: &SegmentHeader) {
        if header.description.rst() {
            return;
        }
        let reply = if header.description.ack() || header.description.nul() {
            build_rst(0, header.ack.wrapping_add(1), None)
        } else {
            build_rst(0, 0, Some(header.seq))
        };
        self.transmit(reply);
    }

    pub fn trace_incoming(&self, header: &SegmentHeader, payload_length: usize) {
        segment_event(Direction::Incoming, header, payload_length);
    }

    /// Sends `payload` as the next data segment and starts its
    /// retransmission timer.
    pub fn send_data(&mut self, payload: &[u8]) -> Result<(), SendError> {
        let core = &mut *self.core;
        let remote = core.info.remote.ok_or(SendError::NotConnected)?;
        let max = (remote.max_segment_size as usize).saturating_sub(ACK_HEADER_LENGTH as usize);
        if payload.is_empty() {
            Err(SendError::EmptyPayload)?
        }
        if payload.len() > max {
            Err(SendError::PayloadTooLarge {
                len: payload.len(),
                max,
            })?
        }
        if !core.can_send() {
            Err(SendError::WindowFull)?
        }
        let (Some(send_queue), Some(retransmissions)) =
            (core.send_queue.as_mut(), core.retransmissions.as_mut())
        else {
            return Err(SendError::NotConnected);
        };

        let seq = core.info.send_next;
        // Bounded by the peer's segment size, which is a u16
        let mut header =
            build_with_payload(seq, core.info.receive_latest_acked, payload.len() as u16);
        core.scratch.clear();
        if let Err(error) = header.serialize(payload, &mut core.scratch) {
            tracing::error!(%error, "failed to serialize data segment");
            Err(SendError::PayloadTooLarge {
                len: payload.len(),
                max,
            })?
        }
        send_queue.store(seq, &core.scratch);
        retransmissions.add_entry(seq, core.info.local.retransmission_duration(), self.env);
        segment_event(Direction::Outgoing, header.base(), payload.len());
        self.env.transmit(&core.scratch);
        core.timers.idle = false;
        core.info.send_next = seq.wrapping_add(1);
        self.env.on_send(seq);
        Ok(())
    }

    /// Creates the send, retransmission and receive queues for a newly
    /// established connection.
    pub fn open_queues(&mut self) {
        let info = self.core.info;
        let remote = info.remote.unwrap_or(info.local);

        let mut send_queue =
            SegmentBuffer::new(remote.max_segment_size, remote.max_outstanding_segments);
        send_queue.set_base(info.send_next);
        let mut retransmissions = TransmissionQueue::new(remote.max_outstanding_segments);
        retransmissions.set_base(info.send_next, self.env);
        let mut receive_queue =
            SegmentBuffer::new(info.local.max_segment_size, info.local.max_outstanding_segments);
        receive_queue.set_base(info.receive_latest_acked.wrapping_add(2));

        self.core.send_queue = Some(send_queue);
        self.core.retransmissions = Some(retransmissions);
        self.core.receive_queue = Some(receive_queue);
    }

    pub fn drop_queues(&mut self) {
        self.cancel_retransmissions();
        self.core.send_queue = None;
        self.core.retransmissions = None;
        self.core.receive_queue = None;
        self.core.info.remote = None;
    }

    /// Handles the ACK, EACK and payload of a segment arriving on an open
    /// connection.
    pub fn segment_arrives(&mut self, header: &SegmentHeader, acks: &[u16], payload: &[u8]) {
        if !self.in_receive_window(header) {
            self.send_ack();
            return;
        }
        if header.description.ack() {
            self.acknowledge(header.ack);
        }
        if !acks.is_empty() {
            self.extended_acknowledge(acks);
        }
        if payload.is_empty() {
            return;
        }
        let expected = self.core.info.receive_latest_acked.wrapping_add(1);
        if header.seq == expected {
            self.deliver(header.seq, payload);
        } else if let Some(queue) = self.core.receive_queue.as_mut() {
            if queue.has_slot(header.seq) && !queue.is_in_use(header.seq) {
                queue.store(header.seq, payload);
                tracing::debug!(seq = header.seq, expected, "holding out-of-sequence segment");
            }
        }
        self.send_ack();
    }

    /// Handles a keep-alive arriving on an open connection.
    pub fn nul_arrives(&mut self, header: &SegmentHeader) {
        if self.in_receive_window(header) && header.description.ack() {
            self.acknowledge(header.ack);
        }
        self.send_ack();
    }

    fn in_receive_window(&self, header: &SegmentHeader) -> bool {
        let info = &self.core.info;
        let expected = info.receive_latest_acked.wrapping_add(1);
        let window = info.local.max_outstanding_segments as u16;
        let accepted = is_in_window(header.seq, expected, window);
        if !accepted {
            tracing::debug!(seq = header.seq, expected, window, "segment outside receive window");
        }
        accepted
    }

    /// Releases every segment up to and including `ack`.
    fn acknowledge(&mut self, ack: u16) {
        let core = &mut *self.core;
        let (Some(send_queue), Some(retransmissions)) =
            (core.send_queue.as_mut(), core.retransmissions.as_mut())
        else {
            return;
        };
        let base = send_queue.base();
        // Acceptable acks lie in [base - 1, send_next - 1]
        let by = seq_offset(ack.wrapping_add(1), base);
        if by > seq_offset(core.info.send_next, base) {
            let send_next = core.info.send_next;
            tracing::debug!(ack, base, send_next, "ignoring unacceptable ack");
            return;
        }
        if by == 0 {
            return;
        }
        send_queue.advance_base(by);
        retransmissions.advance_base(by, self.env);
        core.info.send_latest_unacked = ack.wrapping_add(1);
    }

    /// Releases individually acknowledged out-of-sequence segments.
    fn extended_acknowledge(&mut self, acks: &[u16]) {
        let core = &mut *self.core;
        let (Some(send_queue), Some(retransmissions)) =
            (core.send_queue.as_mut(), core.retransmissions.as_mut())
        else {
            return;
        };
        for &seq in acks {
            if send_queue.is_in_use(seq) {
                send_queue.unmark(seq);
                retransmissions.remove_entry(seq, self.env);
            }
        }
    }

    /// Hands an in-order payload to the client, followed by any held
    /// segments it makes contiguous.
    fn deliver(&mut self, seq: u16, payload: &[u8]) {
        self.core.info.receive_latest_acked = seq;
        self.env.on_receive(payload);

        // The receive queue's base trails receive_latest_acked by two once
        // this loop is done. Until then its first slot is the next expected
        // segment.
        let Some(queue) = self.core.receive_queue.as_mut() else {
            return;
        };
        loop {
            let next = self.core.info.receive_latest_acked.wrapping_add(1);
            let held = if queue.is_in_use(next) {
                queue.slot(next).map(<[u8]>::to_vec)
            } else {
                None
            };
            queue.advance_base(1);
            let Some(held) = held else {
                break;
            };
            self.core.info.receive_latest_acked = next;
            self.env.on_receive(&held);
        }
    }

    /// Delivers the expiry of a retransmission timer. Returns false once the
    /// segment has been sent as many times as allowed.
    pub fn retransmit(&mut self, seq: u16, handle: TimerHandle) -> bool {
        let core = &mut *self.core;
        let (Some(send_queue), Some(retransmissions)) =
            (core.send_queue.as_ref(), core.retransmissions.as_mut())
        else {
            return true;
        };
        let max = core.info.local.max_retransmissions;
        let outcome = retransmissions.fire(seq, handle, self.env, |entry, seq, env| {
            if entry.transmissions >= max {
                return false;
            }
            match send_queue.slot(seq) {
                Some(segment) if send_queue.is_in_use(seq) => {
                    tracing::debug!(
                        seq,
                        attempt = entry.transmissions + 1,
                        since_first = ?entry.start_time.elapsed(),
                        "retransmitting"
                    );
                    env.transmit(segment);
                    true
                }
                _ => false,
            }
        });
        match outcome {
            TimerOutcome::Rescheduled => {
                core.timers.idle = false;
                true
            }
            TimerOutcome::Stale => true,
            // Nothing is lost if the segment was acknowledged meanwhile
            TimerOutcome::Exhausted => !send_queue.is_in_use(seq),
        }
    }

    pub fn cancel_retransmissions(&mut self) {
        if let Some(queue) = self.core.retransmissions.as_mut() {
            queue.set_base(queue.base(), self.env);
        }
    }

    /// Arms the handshake timer, counting the first transmission.
    pub fn arm_handshake(&mut self) {
        self.core.timers.handshake_transmissions = 0;
        self.rearm_handshake();
    }

    fn rearm_handshake(&mut self) {
        if let Some(handle) = self.core.timers.handshake.take() {
            self.env.cancel(handle);
        }
        let delay = self.core.info.local.retransmission_duration();
        self.core.timers.handshake = Some(self.env.schedule(delay, Timer::Handshake));
    }

    /// Handles the handshake timer. Returns false when the handshake has
    /// been retried as many times as allowed.
    pub fn handshake_timeout(&mut self, handle: TimerHandle) -> Option<bool> {
        if self.core.timers.handshake != Some(handle) {
            return None;
        }
        self.core.timers.handshake = None;
        if self.core.timers.handshake_transmissions >= self.core.info.local.max_retransmissions {
            return Some(false);
        }
        self.core.timers.handshake_transmissions += 1;
        self.rearm_handshake();
        Some(true)
    }

    pub fn cancel_handshake(&mut self) {
        if let Some(handle) = self.core.timers.handshake.take() {
            self.env.cancel(handle);
        }
    }

    /// Starts sending keep-alives at the peer's null segment interval.
    pub fn arm_keep_alive(&mut self) {
        let Some(remote) = self.core.info.remote else {
            return;
        };
        if remote.null_segment_timeout == 0 {
            return;
        }
        self.core.timers.idle = true;
        let handle = self
            .env
            .schedule(remote.null_segment_duration(), Timer::KeepAlive);
        self.core.timers.keep_alive = Some(handle);
    }

    /// Handles the keep-alive timer, sending a NUL if nothing else went out
    /// since the last tick.
    pub fn keep_alive(&mut self, handle: TimerHandle) {
        if self.core.timers.keep_alive != Some(handle) {
            return;
        }
        self.core.timers.keep_alive = None;
        if self.core.timers.idle {
            let info = &self.core.info;
            let header = build_nul(info.send_next, info.receive_latest_acked);
            self.transmit(header);
        }
        self.arm_keep_alive();
    }

    pub fn cancel_keep_alive(&mut self) {
        if let Some(handle) = self.core.timers.keep_alive.take() {
            self.env.cancel(handle);
        }
    }

    pub fn arm_disconnect(&mut self) {
        self.cancel_disconnect();
        let handle = self.env.schedule(DISCONNECT_TIMEOUT, Timer::Disconnect);
        self.core.timers.disconnect = Some(handle);
    }

    pub fn cancel_disconnect(&mut self) {
        if let Some(handle) = self.core.timers.disconnect.take() {
            self.env.cancel(handle);
        }
    }

    pub fn cancel_all_timers(&mut self) {
        self.cancel_retransmissions();
        self.cancel_handshake();
        self.cancel_keep_alive();
        self.cancel_disconnect();
    }
}
