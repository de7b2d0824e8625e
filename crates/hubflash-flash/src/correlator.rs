//! Request/response correlation
//!
//! All writes go through one queue that is drained by a writer task, one
//! request at a time: a request is only written after the previous write has
//! completed or failed. Each request gets an id, and the writer records
//! whether the write for that id succeeded.
//!
//! Replies carry no id. A reader task decodes notifications into a buffer,
//! and callers wait for a reply by command kind. Only one command is in
//! flight at a time, so the kind identifies the request.

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::Instant;

use hubflash_core::protocol::{Command, Request, Response, ResultCode};
use hubflash_lwp3::{Connection, LinkEvent, SendFailure, Subscription};

use crate::error::{FailReason, HubError};
use crate::ids::MessageIds;

struct Outgoing {
    id: u32,
    request: Request,
    require_ack: bool,
}

#[derive(Default)]
struct Book {
    sent: HashSet<u32>,
    failed: HashMap<u32, SendFailure>,
    responses: VecDeque<Response>,
    disconnected: bool,
}

struct Shared {
    book: Mutex<Book>,
    changed: watch::Sender<u64>,
    queued: AtomicUsize,
}

impl Shared {
    fn book(&self) -> MutexGuard<'_, Book> {
        self.book.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn update(&self, f: impl FnOnce(&mut Book)) {
        f(&mut self.book());
        self.changed.send_modify(|generation| *generation += 1);
    }
}

/// Serialized request queue plus reply matching for one connection
pub struct Correlator {
    queue: mpsc::UnboundedSender<Outgoing>,
    shared: Arc<Shared>,
    ids: MessageIds,
    writer: JoinHandle<()>,
    reader: JoinHandle<()>,
}

impl Correlator {
    /// Start the writer and reader tasks for an open connection
    pub fn start(connection: Connection, subscription: Subscription, ids: MessageIds) -> Self {
        let (changed, _) = watch::channel(0);
        let shared = Arc::new(Shared {
            book: Mutex::new(Book::default()),
            changed,
            queued: AtomicUsize::new(0),
        });

        let (queue, rx) = mpsc::unbounded_channel();
        let writer = tokio::spawn(write_loop(connection, rx, Arc::clone(&shared)));
        let reader = tokio::spawn(read_loop(subscription, Arc::clone(&shared)));

        Self {
            queue,
            shared,
            ids,
            writer,
            reader,
        }
    }

    /// Queue a request and return its id
    pub fn request(&self, request: Request, require_ack: bool) -> u32 {
        let id = self.ids.next();
        log::trace!("Queue #{} {:?}", id, request.command());
        self.shared.queued.fetch_add(1, Ordering::SeqCst);
        let outgoing = Outgoing {
            id,
            request,
            require_ack,
        };
        if self.queue.send(outgoing).is_err() {
            // Writer is gone, report it like any other failed write
            self.shared.queued.fetch_sub(1, Ordering::SeqCst);
            self.shared.update(|book| {
                book.failed.insert(id, SendFailure::NotConnected);
            });
        }
        id
    }

    /// Queue a request with its usual ack mode
    pub fn send(&self, request: Request) -> u32 {
        let ack = request.default_ack();
        self.request(request, ack)
    }

    /// Number of requests waiting for the writer
    pub fn queued(&self) -> usize {
        self.shared.queued.load(Ordering::SeqCst)
    }

    /// Wait until the request with `id` was written
    pub async fn wait_for_did_request(&self, id: u32) -> Result<(), FailReason> {
        let mut changed = self.shared.changed.subscribe();
        loop {
            {
                let mut book = self.shared.book();
                if book.sent.remove(&id) {
                    return Ok(());
                }
                if let Some(e) = book.failed.remove(&id) {
                    log::error!("Request #{} failed: {}", id, e);
                    return Err(FailReason::BleError(e));
                }
            }
            if changed.changed().await.is_err() {
                return Err(FailReason::Disconnected);
            }
        }
    }

    /// Wait for the reply to `command`
    ///
    /// Buffered replies to other commands are stale and dropped. The generic
    /// error reply, a dropped link or the timeout end the wait with an error,
    /// except that a missing Erase reply counts as success.
    pub async fn wait_for_response(
        &self,
        command: Command,
        timeout: Duration,
    ) -> Result<Response, FailReason> {
        let deadline = Instant::now() + timeout;
        let mut changed = self.shared.changed.subscribe();
        loop {
            {
                let mut book = self.shared.book();
                while let Some(response) = book.responses.pop_front() {
                    match response.answers() {
                        Some(kind) if kind == command => return Ok(response),
                        Some(kind) => log::debug!("Discarding stale {} reply", kind),
                        None => {
                            log::error!("Hub rejected {:?}", response);
                            return Err(FailReason::HubError(HubError::UnknownCommand));
                        }
                    }
                }
                if book.disconnected {
                    return Err(FailReason::Disconnected);
                }
            }

            tokio::select! {
                res = changed.changed() => {
                    if res.is_err() {
                        return Err(FailReason::Disconnected);
                    }
                }
                _ = tokio::time::sleep_until(deadline) => {
                    if command == Command::EraseFlash {
                        // Some OS stacks swallow this notification. If erase
                        // really failed, Init will fail next.
                        log::warn!("Timeout waiting for erase response, continuing anyway");
                        return Ok(Response::Erase(ResultCode::Ok));
                    }
                    log::error!("Timeout waiting for {} reply", command);
                    return Err(FailReason::TimedOut);
                }
            }
        }
    }

    /// Wait until the link drops, up to `timeout`
    ///
    /// Returns true if it dropped.
    pub async fn wait_for_link_drop(&self, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        let mut changed = self.shared.changed.subscribe();
        loop {
            if self.shared.book().disconnected {
                return true;
            }
            tokio::select! {
                res = changed.changed() => {
                    if res.is_err() {
                        return true;
                    }
                }
                _ = tokio::time::sleep_until(deadline) => return false,
            }
        }
    }

    /// Stop the writer and reader tasks
    ///
    /// Queued requests are discarded and the notification subscription is
    /// released.
    pub fn shutdown(self) {
        // Drop does the work
    }
}

impl Drop for Correlator {
    fn drop(&mut self) {
        self.writer.abort();
        self.reader.abort();
    }
}

async fn write_loop(
    connection: Connection,
    mut queue: mpsc::UnboundedReceiver<Outgoing>,
    shared: Arc<Shared>,
) {
    while let Some(out) = queue.recv().await {
        shared.queued.fetch_sub(1, Ordering::SeqCst);
        let frame = out.request.encode();
        log::trace!("Send #{} {:02X?} (ack: {})", out.id, frame, out.require_ack);
        let result = connection.send(&frame, out.require_ack).await;
        shared.update(|book| match result {
            Ok(()) => {
                book.sent.insert(out.id);
            }
            Err(e) => {
                book.failed.insert(out.id, e);
            }
        });
    }
}

async fn read_loop(mut subscription: Subscription, shared: Arc<Shared>) {
    while let Some(event) = subscription.next().await {
        match event {
            LinkEvent::Notification(frame) => match Response::decode(&frame) {
                Ok(response) => {
                    log::trace!("Received {:?}", response);
                    shared.update(|book| book.responses.push_back(response));
                }
                Err(e) => log::error!("Dropping bad notification {:02X?}: {}", frame, e),
            },
            LinkEvent::Dropped => {
                log::debug!("Link dropped");
                shared.update(|book| book.disconnected = true);
            }
        }
    }
}
