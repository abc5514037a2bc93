use crate::{
    config::ConnectionConfiguration,
    segment::{build_rst, SegmentHeader},
    session::{context::Context, state::ConnectionState, State, Timer, TimerHandle},
};

/// SYN sent, waiting for the peer's SYN.
pub(crate) struct Initiating;

impl ConnectionState for Initiating {
    fn on_enter(&self, ctx: &mut Context<'_>) {
        ctx.send_syn(None);
        ctx.arm_handshake();
    }

    fn on_exit(&self, ctx: &mut Context<'_>) {
        ctx.cancel_handshake();
    }

    fn close(&self, ctx: &mut Context<'_>) {
        let header = build_rst(0, ctx.core.info.send_next, None);
        ctx.transmit(header);
        ctx.enter(State::Closed);
    }

    fn on_syn(
        &self,
        ctx: &mut Context<'_>,
        header: &SegmentHeader,
        config: ConnectionConfiguration,
    ) {
        if header.description.ack() {
            if !ctx.acknowledges_syn(header) {
                // Acknowledges some other connection attempt
                ctx.reply_rst(header);
                return;
            }
            if ctx.accept_remote(header, config) {
                ctx.establish();
                ctx.send_ack();
            }
        } else if ctx.accept_remote(header, config) {
            // Both sides opened at once
            ctx.enter(State::Connecting);
        }
    }

    fn on_rst(&self, ctx: &mut Context<'_>, _header: &SegmentHeader) {
        tracing::debug!("connection refused");
        ctx.reset();
    }

    fn on_timer(&self, ctx: &mut Context<'_>, handle: TimerHandle, timer: Timer) {
        if timer != Timer::Handshake {
            return;
        }
        match ctx.handshake_timeout(handle) {
            Some(true) => ctx.send_syn(None),
            Some(false) => {
                tracing::warn!("no answer to connection request");
                ctx.reset();
            }
            None => {}
        }
    }
}
