//! Frame feed with broadcast to every session.
//!
//! Architecture:
//! - FrameFeed owns one capture thread pulling from a [`FrameSource`]
//! - Sessions (and the audio player) subscribe to receive frames
//! - Frames are `Arc`-shared and broadcast via try_send (non-blocking)
//! - Slow subscribers drop frames independently
//!
//! The capture thread starts with the first subscriber and exits once the
//! last subscription is dropped, the source ends, or the feed is shut down.
//! When it exits every remaining subscriber sees its channel disconnect.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;

use capview_katsukity::Frame;
use flume::{Receiver, RecvTimeoutError, Sender};
use parking_lot::{Mutex, RwLock};

use crate::error::{CapviewError, CapviewResult};
use crate::source::SourceFactory;

struct Subscriber {
    sender: Sender<Arc<Frame>>,
    name: String,
    id: u64,
}

struct FeedShared {
    factory: SourceFactory,
    subscribers: RwLock<Vec<Subscriber>>,
    next_subscriber_id: AtomicU64,
    /// Explicit shutdown, final. Idle exit is detected from the subscriber
    /// list and allows a restart.
    shutdown: AtomicBool,
    running: AtomicBool,
    /// Guards starting and exiting the capture thread.
    thread: Mutex<Option<JoinHandle<()>>>,
    last_error: Mutex<Option<String>>,
    frames: AtomicU64,
}

/// Broadcasts frames from one source to any number of subscribers.
#[derive(Clone)]
pub struct FrameFeed {
    shared: Arc<FeedShared>,
}

/// Handle returned when subscribing. Unsubscribes on drop.
pub struct Subscription {
    pub receiver: Receiver<Arc<Frame>>,
    id: u64,
    shared: Arc<FeedShared>,
}

impl Drop for Subscription {
    fn drop(&mut self) {
        let mut subs = self.shared.subscribers.write();
        subs.retain(|s| s.id != self.id);
        log::debug!(
            "[FEED] Subscriber {} dropped, {} remaining",
            self.id,
            subs.len()
        );
    }
}

impl Subscription {
    pub fn recv_timeout(&self, timeout: Duration) -> Result<Arc<Frame>, RecvTimeoutError> {
        self.receiver.recv_timeout(timeout)
    }
}

impl FrameFeed {
    /// Create a feed. Does NOT open the source until someone subscribes.
    pub fn new(factory: SourceFactory) -> Self {
        Self {
            shared: Arc::new(FeedShared {
                factory,
                subscribers: RwLock::new(Vec::new()),
                next_subscriber_id: AtomicU64::new(1),
                shutdown: AtomicBool::new(false),
                running: AtomicBool::new(false),
                thread: Mutex::new(None),
                last_error: Mutex::new(None),
                frames: AtomicU64::new(0),
            }),
        }
    }

    /// Subscribe to frames, starting the capture thread if needed.
    ///
    /// Fails once the feed has been shut down.
    ///
    /// # Arguments
    /// * `name` - Name for debugging (e.g., "session-1", "audio")
    /// * `buffer_size` - Channel buffer size (frames dropped if full)
    pub fn subscribe(&self, name: &str, buffer_size: usize) -> CapviewResult<Subscription> {
        let mut thread = self.shared.thread.lock();
        if self.shared.shutdown.load(Ordering::SeqCst) {
            return Err(CapviewError::Other("frame feed is shut down".to_string()));
        }

        let (sender, receiver) = flume::bounded(buffer_size.max(1));
        let id = self.shared.next_subscriber_id.fetch_add(1, Ordering::SeqCst);
        self.shared.subscribers.write().push(Subscriber {
            sender,
            name: name.to_string(),
            id,
        });
        log::info!(
            "[FEED] New subscriber '{}' (id={}, buffer={})",
            name,
            id,
            buffer_size
        );

        let subscription = Subscription {
            receiver,
            id,
            shared: Arc::clone(&self.shared),
        };

        if !self.shared.running.load(Ordering::SeqCst) {
            if let Some(old) = thread.take() {
                let _ = old.join();
            }
            *self.shared.last_error.lock() = None;
            self.shared.running.store(true, Ordering::SeqCst);

            let shared = Arc::clone(&self.shared);
            let handle = std::thread::Builder::new()
                .name("capview-feed".to_string())
                .spawn(move || capture_loop(shared))
                .map_err(|e| {
                    self.shared.running.store(false, Ordering::SeqCst);
                    CapviewError::Other(format!("Failed to spawn capture thread: {}", e))
                })?;
            *thread = Some(handle);
        }

        Ok(subscription)
    }

    /// Stop the capture thread and disconnect every subscriber. Later
    /// subscriptions fail.
    pub fn shutdown(&self) {
        let handle = {
            let mut thread = self.shared.thread.lock();
            self.shared.shutdown.store(true, Ordering::SeqCst);
            thread.take()
        };
        if let Some(handle) = handle {
            let _ = handle.join();
        }
    }

    pub fn is_running(&self) -> bool {
        self.shared.running.load(Ordering::SeqCst)
    }

    pub fn subscriber_count(&self) -> usize {
        self.shared.subscribers.read().len()
    }

    /// Frames produced since the feed was created.
    pub fn frames_captured(&self) -> u64 {
        self.shared.frames.load(Ordering::Relaxed)
    }

    /// Why the last capture run ended, if it failed.
    pub fn last_error(&self) -> Option<String> {
        self.shared.last_error.lock().clone()
    }
}

fn capture_loop(shared: Arc<FeedShared>) {
    let error = match run_source(&shared) {
        Ok(()) => None,
        Err(e) => {
            log::error!("[FEED] Capture failed: {}", e);
            Some(e.to_string())
        },
    };

    let _guard = shared.thread.lock();
    *shared.last_error.lock() = error;
    // Dropping the senders disconnects everyone still listening
    shared.subscribers.write().clear();
    shared.running.store(false, Ordering::SeqCst);
}

fn run_source(shared: &FeedShared) -> CapviewResult<()> {
    let mut source = (shared.factory)()?;
    log::info!("[FEED] Capture started ({})", source.name());

    let mut produced: u64 = 0;
    loop {
        if shared.shutdown.load(Ordering::SeqCst) {
            log::info!("[FEED] Shutdown after {} frames", produced);
            return Ok(());
        }
        {
            let _guard = shared.thread.lock();
            if shared.subscribers.read().is_empty() {
                log::info!("[FEED] No subscribers left, stopping after {} frames", produced);
                return Ok(());
            }
        }

        let Some(frame) = source.next_frame()? else {
            log::info!("[FEED] Source ended after {} frames", produced);
            return Ok(());
        };

        produced += 1;
        shared.frames.fetch_add(1, Ordering::Relaxed);
        broadcast_frame(&shared.subscribers, Arc::new(frame), produced);
    }
}

fn broadcast_frame(subscribers: &RwLock<Vec<Subscriber>>, frame: Arc<Frame>, frame_id: u64) {
    let mut to_remove = Vec::new();
    {
        let subs = subscribers.read();
        for sub in subs.iter() {
            match sub.sender.try_send(Arc::clone(&frame)) {
                Ok(()) => {},
                Err(flume::TrySendError::Full(_)) => {
                    if frame_id % 300 == 1 {
                        log::debug!("[FEED] Subscriber '{}' slow, dropping frame", sub.name);
                    }
                },
                Err(flume::TrySendError::Disconnected(_)) => {
                    log::info!("[FEED] Subscriber '{}' disconnected", sub.name);
                    to_remove.push(sub.id);
                },
            }
        }
    }

    if !to_remove.is_empty() {
        subscribers.write().retain(|s| !to_remove.contains(&s.id));
    }
}
