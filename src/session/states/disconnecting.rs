use crate::{
    segment::SegmentHeader,
    session::{context::Context, state::ConnectionState, State, Timer, TimerHandle},
};

/// Reset sent, waiting for the peer's reset or for the disconnect timer.
pub(crate) struct Disconnecting;

impl ConnectionState for Disconnecting {
    fn on_enter(&self, ctx: &mut Context<'_>) {
        ctx.arm_disconnect();
    }

    fn on_exit(&self, ctx: &mut Context<'_>) {
        ctx.cancel_disconnect();
    }

    fn on_rst(&self, ctx: &mut Context<'_>, _header: &SegmentHeader) {
        ctx.enter(State::Closed);
    }

    fn on_timer(&self, ctx: &mut Context<'_>, handle: TimerHandle, timer: Timer) {
        if timer == Timer::Disconnect && ctx.core.timers.disconnect == Some(handle) {
            ctx.core.timers.disconnect = None;
            ctx.enter(State::Closed);
        }
    }
}
