use crate::{
    config::ConnectionConfiguration,
    segment::SegmentHeader,
    session::{context::Context, state::ConnectionState, SendError, State, Timer, TimerHandle},
};

pub(crate) struct Connected;

impl ConnectionState for Connected {
    fn on_enter(&self, ctx: &mut Context<'_>) {
        ctx.open_queues();
        // Only the side that opened the connection keeps it alive
        if !ctx.core.info.keep_alive {
            ctx.arm_keep_alive();
        }
    }

    fn on_exit(&self, ctx: &mut Context<'_>) {
        ctx.cancel_retransmissions();
        ctx.cancel_keep_alive();
    }

    fn close(&self, ctx: &mut Context<'_>) {
        ctx.send_rst();
        ctx.enter(State::Disconnecting);
    }

    fn send(&self, ctx: &mut Context<'_>, payload: &[u8]) -> Result<(), SendError> {
        ctx.send_data(payload)
    }

    fn on_syn(&self, ctx: &mut Context<'_>, header: &SegmentHeader, _: ConnectionConfiguration) {
        if header.seq == ctx.core.info.receive_initial_seq {
            // Our final ACK of the handshake was lost
            ctx.send_ack();
        } else {
            tracing::warn!(seq = header.seq, "SYN on an open connection");
            ctx.reply_rst(header);
            ctx.enter(State::Closed);
        }
    }

    fn on_rst(&self, ctx: &mut Context<'_>, _header: &SegmentHeader) {
        tracing::debug!("connection reset by peer");
        ctx.send_rst();
        ctx.enter(State::Disconnecting);
    }

    fn on_nul(&self, ctx: &mut Context<'_>, header: &SegmentHeader) {
        ctx.nul_arrives(header);
    }

    fn on_eack(&self, ctx: &mut Context<'_>, header: &SegmentHeader, acks: &[u16], payload: &[u8]) {
        ctx.segment_arrives(header, acks, payload);
    }

    fn on_regular(&self, ctx: &mut Context<'_>, header: &SegmentHeader, payload: &[u8]) {
        ctx.segment_arrives(header, &[], payload);
    }

    fn on_timer(&self, ctx: &mut Context<'_>, handle: TimerHandle, timer: Timer) {
        match timer {
            Timer::Retransmission(seq) => {
                if !ctx.retransmit(seq, handle) {
                    tracing::warn!(seq, "segment was never acknowledged");
                    ctx.send_rst();
                    ctx.enter(State::Disconnecting);
                }
            }
            Timer::KeepAlive => ctx.keep_alive(handle),
            Timer::Handshake | Timer::Disconnect => {}
        }
    }
}
