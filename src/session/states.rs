//! One [`ConnectionState`](super::state::ConnectionState) implementation per
//! [`State`](super::State).

mod closed;
mod connected;
mod connecting;
mod disconnecting;
mod initiating;
mod waiting;

pub(crate) use closed::Closed;
pub(crate) use connected::Connected;
pub(crate) use connecting::Connecting;
pub(crate) use disconnecting::Disconnecting;
pub(crate) use initiating::Initiating;
pub(crate) use waiting::Waiting;
