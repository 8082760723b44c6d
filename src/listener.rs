//! A passive listener backed by a channel instead of a socket.
//!
//! Mirrors this codebase's `utils::chanlistener` pattern: something upstream
//! (a TLS terminator, a second protocol dispatcher, a test harness) owns the
//! real accept loop and simply hands finished connections over, while the
//! rest of the server code keeps treating it like any other listener.

use std::net::SocketAddr;
use std::sync::Mutex as SyncMutex;

use tokio::sync::{mpsc, Mutex};

use crate::error::{Error, Result};
use crate::stream::BoxedStream;

/// Accepts connections pushed in from elsewhere rather than from a socket.
pub struct ChannelListener {
    addr: Option<SocketAddr>,
    sender: SyncMutex<Option<mpsc::Sender<BoxedStream>>>,
    receiver: Mutex<mpsc::Receiver<BoxedStream>>,
}

impl ChannelListener {
    /// Create a listener with room for `buffer` queued connections before
    /// [`ChannelListener::push`] starts blocking. `addr` is cosmetic — it's
    /// reported back by [`ChannelListener::addr`] and nowhere else used.
    pub fn new(buffer: usize, addr: Option<SocketAddr>) -> Self {
        let (sender, receiver) = mpsc::channel(buffer.max(1));
        ChannelListener {
            addr,
            sender: SyncMutex::new(Some(sender)),
            receiver: Mutex::new(receiver),
        }
    }

    /// Hand a connection to whoever is waiting on [`ChannelListener::accept`].
    pub async fn push(&self, stream: BoxedStream) -> Result<()> {
        let sender = self.sender.lock().unwrap().clone();
        match sender {
            Some(sender) => sender.send(stream).await.map_err(|_| Error::ListenerClosed),
            None => Err(Error::ListenerClosed),
        }
    }

    /// Wait for the next pushed connection, or [`Error::ListenerClosed`] once
    /// [`ChannelListener::close`] has been called and the queue has drained.
    ///
    /// Closing drops the sender half rather than racing a separate signal
    /// against the channel, so an `accept` issued after `close` — with
    /// nothing left queued — resolves immediately instead of waiting on a
    /// notification it arrived too late to observe.
    pub async fn accept(&self) -> Result<BoxedStream> {
        let mut receiver = self.receiver.lock().await;
        receiver.recv().await.ok_or(Error::ListenerClosed)
    }

    /// Stop accepting new connections. Already-queued connections can still
    /// be drained by outstanding `accept` calls.
    pub fn close(&self) {
        self.sender.lock().unwrap().take();
    }

    pub fn addr(&self) -> Option<SocketAddr> {
        self.addr
    }
}
