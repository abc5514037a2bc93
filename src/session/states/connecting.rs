use crate::{
    config::ConnectionConfiguration,
    segment::SegmentHeader,
    session::{context::Context, state::ConnectionState, State, Timer, TimerHandle},
};

/// SYN received and SYN+ACK sent, waiting for our SYN to be acknowledged.
pub(crate) struct Connecting;

impl ConnectionState for Connecting {
    fn on_enter(&self, ctx: &mut Context<'_>) {
        let ack = ctx.core.info.receive_latest_acked;
        ctx.send_syn(Some(ack));
        ctx.arm_handshake();
    }

    fn on_exit(&self, ctx: &mut Context<'_>) {
        ctx.cancel_handshake();
    }

    fn close(&self, ctx: &mut Context<'_>) {
        ctx.send_rst();
        ctx.enter(State::Closed);
    }

    fn on_syn(&self, ctx: &mut Context<'_>, header: &SegmentHeader, _: ConnectionConfiguration) {
        if header.seq != ctx.core.info.receive_initial_seq {
            tracing::warn!(seq = header.seq, "conflicting SYN during handshake");
            ctx.reply_rst(header);
            ctx.reset();
        } else if ctx.acknowledges_syn(header) {
            // The peer opened at the same time and has now seen our SYN
            ctx.establish();
            ctx.send_ack();
        } else {
            // The peer is still waiting for our SYN+ACK
            let ack = ctx.core.info.receive_latest_acked;
            ctx.send_syn(Some(ack));
        }
    }

    fn on_rst(&self, ctx: &mut Context<'_>, _header: &SegmentHeader) {
        ctx.reset();
    }

    fn on_nul(&self, ctx: &mut Context<'_>, header: &SegmentHeader) {
        if ctx.acknowledges_syn(header) {
            ctx.establish();
            State::Connected.handler().on_nul(ctx, header);
        } else {
            ctx.reply_rst(header);
        }
    }

    fn on_eack(&self, ctx: &mut Context<'_>, header: &SegmentHeader, _: &[u16], _: &[u8]) {
        // Nothing has been sent that could be acknowledged out of sequence
        ctx.reply_rst(header);
        ctx.reset();
    }

    fn on_regular(&self, ctx: &mut Context<'_>, header: &SegmentHeader, payload: &[u8]) {
        if ctx.acknowledges_syn(header) {
            ctx.establish();
            State::Connected.handler().on_regular(ctx, header, payload);
        } else {
            ctx.reply_rst(header);
        }
    }

    fn on_timer(&self, ctx: &mut Context<'_>, handle: TimerHandle, timer: Timer) {
        if timer != Timer::Handshake {
            return;
        }
        match ctx.handshake_timeout(handle) {
            Some(true) => {
                let ack = ctx.core.info.receive_latest_acked;
                ctx.send_syn(Some(ack));
            }
            Some(false) => {
                tracing::warn!("handshake was never completed");
                ctx.reset();
            }
            None => {}
        }
    }
}
