//! Runs a [`Session`] on a tokio task over a UDP socket.

use crate::{
    config::{ConfigError, ConnectionConfiguration},
    session::{Client, Scheduler, SendError, Session, State, Timer, TimerHandle, Transport},
};
use futures::StreamExt;
use std::{collections::HashMap, io, net::SocketAddr, time::Duration};
use thiserror::Error as ThisError;
use tokio::{
    net::{lookup_host, ToSocketAddrs, UdpSocket},
    sync::{mpsc, oneshot, watch},
};
use tokio_util::time::{delay_queue::Key, DelayQueue};

/// A connection whose protocol engine runs on its own task.
///
/// Dropping the handle closes the connection; the task lingers until the
/// peer confirms or the disconnect timer runs out.
pub struct UdpSession {
    instructions: mpsc::Sender<Instruction>,
    received: mpsc::UnboundedReceiver<Vec<u8>>,
    state: watch::Receiver<State>,
}

impl UdpSession {
    /// Opens a connection to `peer`, returning once it is established.
    pub async fn connect(
        socket: UdpSocket,
        peer: impl ToSocketAddrs,
        config: ConnectionConfiguration,
    ) -> Result<Self, SessionError> {
        let peer = lookup_host(peer)
            .await?
            .next()
            .ok_or_else(|| {
                io::Error::new(io::ErrorKind::NotFound, "peer address did not resolve")
            })?;
        Self::spawn(socket, Some(peer), config)?.established().await
    }

    /// Waits for a peer to connect, returning once the connection is
    /// established. The first address that reaches the socket becomes the
    /// peer.
    pub async fn wait(
        socket: UdpSocket,
        config: ConnectionConfiguration,
    ) -> Result<Self, SessionError> {
        Self::spawn(socket, None, config)?.established().await
    }

    fn spawn(
        socket: UdpSocket,
        peer: Option<SocketAddr>,
        config: ConnectionConfiguration,
    ) -> Result<Self, SessionError> {
        let (instructions, recv) = mpsc::channel(8);
        let (delivered, received) = mpsc::unbounded_channel();
        let (state_changes, state) = watch::channel(State::Closed);
        let env = TaskEnvironment {
            outbox: Vec::new(),
            timers: DelayQueue::new(),
            keys: HashMap::new(),
            next_handle: 0,
            delivered,
            state_changes,
        };
        let mut session = Session::new(config, env)?;
        match peer {
            Some(_) => session.connect(),
            None => session.wait(),
        }
        tokio::spawn(run(session, socket, peer, recv));
        Ok(Self {
            instructions,
            received,
            state,
        })
    }

    async fn established(mut self) -> Result<Self, SessionError> {
        loop {
            let state = *self.state.borrow_and_update();
            match state {
                State::Connected => return Ok(self),
                State::Closed | State::Disconnecting => Err(SessionError::Refused)?,
                _ => {}
            }
            self.state
                .changed()
                .await
                .map_err(|_| SessionError::Closed)?;
        }
    }

    pub fn state(&self) -> State {
        *self.state.borrow()
    }

    /// Sends one payload as one segment.
    pub async fn send(&self, payload: Vec<u8>) -> Result<(), SessionError> {
        let (reply, response) = oneshot::channel();
        self.instructions
            .send(Instruction::Outgoing(payload, reply))
            .await
            .map_err(|_| SessionError::Closed)?;
        response.await.map_err(|_| SessionError::Closed)??;
        Ok(())
    }

    /// The next in-order payload from the peer, or `None` once the session
    /// task has stopped.
    pub async fn recv(&mut self) -> Option<Vec<u8>> {
        self.received.recv().await
    }

    /// Starts a graceful teardown.
    pub async fn close(&self) {
        // An error means the task already stopped
        let _ = self.instructions.send(Instruction::Close).await;
    }

    /// Resolves once the session has closed.
    pub async fn closed(&mut self) {
        while *self.state.borrow_and_update() != State::Closed {
            if self.state.changed().await.is_err() {
                return;
            }
        }
    }
}

#[derive(Debug, ThisError)]
pub enum SessionError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Send(#[from] SendError),
    #[error("Socket error: {0}")]
    Io(#[from] io::Error),
    #[error("The peer refused or never answered the connection")]
    Refused,
    #[error("The session task has stopped")]
    Closed,
}

enum Instruction {
    Outgoing(Vec<u8>, oneshot::Sender<Result<(), SendError>>),
    Close,
}

/// The collaborators of a session running on a task. Segments are queued in
/// the outbox and flushed to the socket after every event.
struct TaskEnvironment {
    outbox: Vec<Vec<u8>>,
    timers: DelayQueue<(TimerHandle, Timer)>,
    keys: HashMap<TimerHandle, Key>,
    next_handle: u64,
    delivered: mpsc::UnboundedSender<Vec<u8>>,
    state_changes: watch::Sender<State>,
}

impl Transport for TaskEnvironment {
    fn transmit(&mut self, segment: &[u8]) {
        self.outbox.push(segment.to_vec());
    }
}

impl Scheduler for TaskEnvironment {
    fn schedule(&mut self, delay: Duration, timer: Timer) -> TimerHandle {
        self.next_handle += 1;
        let handle = TimerHandle(self.next_handle);
        let key = self.timers.insert((handle, timer), delay);
        self.keys.insert(handle, key);
        handle
    }

    fn cancel(&mut self, handle: TimerHandle) {
        if let Some(key) = self.keys.remove(&handle) {
            self.timers.remove(&key);
        }
    }
}

impl Client for TaskEnvironment {
    fn on_receive(&mut self, payload: &[u8]) {
        // Nobody is listening once the handle is dropped
        let _ = self.delivered.send(payload.to_vec());
    }

    fn on_state_changed(&mut self, state: State) {
        self.state_changes.send_replace(state);
    }
}

async fn run(
    mut session: Session<TaskEnvironment>,
    socket: UdpSocket,
    mut peer: Option<SocketAddr>,
    mut instructions: mpsc::Receiver<Instruction>,
) {
    let mut datagram = vec![0; u16::MAX as usize];
    let mut handle_dropped = false;
    loop {
        let outbox = std::mem::take(&mut session.environment_mut().outbox);
        if let Some(peer) = peer {
            for segment in outbox {
                if let Err(e) = socket.send_to(&segment, peer).await {
                    tracing::error!(%e, %peer, "failed to send segment");
                }
            }
        }

        if handle_dropped && session.state() == State::Closed {
            break;
        }

        let timers_pending = !session.environment().timers.is_empty();
        tokio::select! {
            result = socket.recv_from(&mut datagram) => match result {
                Ok((len, from)) => {
                    let from_peer = *peer.get_or_insert(from) == from;
                    if from_peer {
                        session.receive(&datagram[..len]);
                    } else {
                        tracing::debug!(%from, "ignoring datagram from unknown peer");
                    }
                }
                Err(e) => tracing::error!(%e, "failed to receive datagram"),
            },
            instruction = instructions.recv(), if !handle_dropped => match instruction {
                Some(Instruction::Outgoing(payload, reply)) => {
                    let _ = reply.send(session.send(&payload));
                }
                Some(Instruction::Close) => session.close(),
                None => {
                    handle_dropped = true;
                    session.close();
                }
            },
            Some(expired) = session.environment_mut().timers.next(), if timers_pending => {
                let (handle, timer) = expired.into_inner();
                session.environment_mut().keys.remove(&handle);
                session.timer_fired(handle, timer);
            }
        }
    }
    tracing::debug!("session task stopped");
}
