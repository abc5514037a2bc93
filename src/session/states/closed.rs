use crate::{
    config::ConnectionConfiguration,
    segment::SegmentHeader,
    session::{context::Context, state::ConnectionState, State},
};

pub(crate) struct Closed;

impl ConnectionState for Closed {
    fn on_enter(&self, ctx: &mut Context<'_>) {
        ctx.cancel_all_timers();
        ctx.drop_queues();
    }

    fn invalidate(&self, _ctx: &mut Context<'_>) {}

    fn connect(&self, ctx: &mut Context<'_>, iss: u16) {
        ctx.open(iss, false);
        ctx.enter(State::Initiating);
    }

    fn wait(&self, ctx: &mut Context<'_>, iss: u16) {
        ctx.open(iss, true);
        ctx.enter(State::Waiting);
    }

    fn on_syn(&self, ctx: &mut Context<'_>, header: &SegmentHeader, _: ConnectionConfiguration) {
        ctx.reply_rst(header);
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
