use crate::{
    config::ConnectionConfiguration,
    segment::SegmentHeader,
    session::{context::Context, state::ConnectionState, State},
};

pub(crate) struct Waiting;

impl ConnectionState for Waiting {
    fn on_enter(&self, ctx: &mut Context<'_>) {
        // A failed handshake may leave timers and queues behind
        ctx.cancel_all_timers();
        ctx.drop_queues();
    }

    fn close(&self, ctx: &mut Context<'_>) {
        ctx.enter(State::Closed);
    }

    fn on_syn(
        &self,
        ctx: &mut Context<'_>,
        header: &SegmentHeader,
        config: ConnectionConfiguration,
    ) {
        if header.description.ack() {
            // Answer to a connection request we never made
            ctx.reply_rst(header);
            return;
        }
        if ctx.accept_remote(header, config) {
            ctx.enter(State::Connecting);
        }
    }

    fn on_nul(&self, ctx: &mut Context<'_>, header: &SegmentHeader) {
        ctx.reply_rst(header);
    }

    fn on_eack(&self, ctx: &mut Context<'_>, header: &SegmentHeader, _: &[u16], _: &[u8]) {
        ctx.reply_rst(header);
    }

    fn on_regular(&self, ctx: &mut Context<'_>, header: &SegmentHeader, _: &[u8]) {
        ctx.reply_rst(header);
    }
}
