//! Connection state machine

use std::fmt;
use std::sync::{Arc, Mutex};

use tokio::sync::mpsc::UnboundedReceiver;

use crate::error::{ConnectFailure, SendFailure};
use crate::transport::{LinkEvent, Transport};

/// State of the link to the hub
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    /// No link
    Disconnected,
    /// Connect in progress
    Connecting,
    /// Link is up
    Connected,
    /// Disconnect in progress
    Disconnecting,
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Disconnected => "disconnected",
            Self::Connecting => "connecting",
            Self::Connected => "connected",
            Self::Disconnecting => "disconnecting",
        };
        write!(f, "{}", s)
    }
}

type SharedState = Arc<Mutex<ConnectionState>>;

fn set_state(state: &SharedState, new: ConnectionState) {
    let mut guard = state.lock().unwrap_or_else(|e| e.into_inner());
    if *guard != new {
        log::debug!("Connection {} -> {}", *guard, new);
        *guard = new;
    }
}

/// A transport together with its connection state
///
/// Clones share the transport and the state.
#[derive(Clone)]
pub struct Connection {
    transport: Arc<dyn Transport>,
    state: SharedState,
}

impl Connection {
    /// Wrap a transport
    pub fn new(transport: Arc<dyn Transport>) -> Self {
        Self {
            transport,
            state: Arc::new(Mutex::new(ConnectionState::Disconnected)),
        }
    }

    /// Current state
    pub fn state(&self) -> ConnectionState {
        *self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Returns true while the link is up
    pub fn is_connected(&self) -> bool {
        self.state() == ConnectionState::Connected
    }

    /// Open the link and subscribe to its notifications
    pub async fn connect(&self) -> Result<Subscription, ConnectFailure> {
        set_state(&self.state, ConnectionState::Connecting);
        match self.transport.connect().await {
            Ok(events) => {
                set_state(&self.state, ConnectionState::Connected);
                Ok(Subscription {
                    events,
                    state: Arc::clone(&self.state),
                    dropped: false,
                })
            }
            Err(e) => {
                set_state(&self.state, ConnectionState::Disconnected);
                Err(e)
            }
        }
    }

    /// Write one frame
    pub async fn send(&self, frame: &[u8], require_ack: bool) -> Result<(), SendFailure> {
        if !self.is_connected() {
            return Err(SendFailure::NotConnected);
        }
        self.transport.send(frame, require_ack).await
    }

    /// Close the link if it is up
    pub async fn disconnect(&self) {
        {
            let mut guard = self.state.lock().unwrap_or_else(|e| e.into_inner());
            if *guard != ConnectionState::Connected {
                return;
            }
            *guard = ConnectionState::Disconnecting;
        }
        log::debug!("Disconnecting");
        self.transport.disconnect().await;
        set_state(&self.state, ConnectionState::Disconnected);
    }
}

/// Notification stream of one link
///
/// Yields [`LinkEvent::Dropped`] once when the link goes away, marks the
/// connection disconnected and then ends. Dropping the subscription
/// unsubscribes.
pub struct Subscription {
    events: UnboundedReceiver<LinkEvent>,
    state: SharedState,
    dropped: bool,
}

impl Subscription {
    /// Wait for the next event
    pub async fn next(&mut self) -> Option<LinkEvent> {
        if self.dropped {
            return None;
        }
        match self.events.recv().await {
            Some(LinkEvent::Notification(frame)) => Some(LinkEvent::Notification(frame)),
            // A closed channel means the transport let go of the link
            Some(LinkEvent::Dropped) | None => {
                self.dropped = true;
                self.events.close();
                set_state(&self.state, ConnectionState::Disconnected);
                Some(LinkEvent::Dropped)
            }
        }
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.events.close();
    }
}
