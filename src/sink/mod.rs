//! The view sink: hands host views to rendering sessions.
//!
//! `submit` is fire-and-forget. It copies the view's handles, records a
//! session and spawns its worker; GPU setup, capture and presentation all
//! happen off the caller's thread. Outcomes are reported on the event
//! channel returned by [`ViewSink::events`].
//!
//! ## Ownership
//!
//! A session keeps the copied raw handles until [`ViewSink::detach`],
//! [`ViewSink::shutdown`] or drop. The host must keep the view alive until
//! then. The sink never mutates the view.

pub mod backend;
mod session;

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use crossbeam_channel::{Receiver, Sender, TrySendError};
use parking_lot::Mutex;
use serde::Serialize;

use crate::audio::AudioPlayer;
use crate::config::CapviewConfig;
use crate::error::CapviewError;
use crate::feed::FrameFeed;
use crate::rendering::GpuBackend;
use crate::source::{factory_from_config, SourceFactory};
use crate::view::{ViewHandle, ViewId};

use backend::SurfaceBackend;
use session::Session;

/// Out-of-band notifications about sessions.
#[derive(Debug, Serialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum SinkEvent {
    /// The backend bound to the view.
    Attached { view: ViewId, backend: &'static str },
    /// The first frame was drawn.
    FirstFrame { view: ViewId, sequence: u64 },
    /// The session was stopped by the host.
    Detached { view: ViewId },
    /// The session could not start or stopped on an error. `view` is absent
    /// when the handle itself was unusable.
    Failed {
        view: Option<ViewId>,
        error: CapviewError,
    },
    /// The frame source ended; `reason` is set if it failed.
    SourceEnded { view: ViewId, reason: Option<String> },
}

pub(crate) struct SinkShared {
    pub(crate) config: CapviewConfig,
    pub(crate) backend: Arc<dyn SurfaceBackend>,
    pub(crate) feed: FrameFeed,
    sessions: Mutex<HashMap<ViewId, Session>>,
    events_tx: Sender<SinkEvent>,
    events_rx: Receiver<SinkEvent>,
    audio: Mutex<Option<AudioPlayer>>,
    next_session: AtomicU64,
    closed: AtomicBool,
}

impl SinkShared {
    pub(crate) fn emit(&self, event: SinkEvent) {
        match self.events_tx.try_send(event) {
            Ok(()) => {},
            Err(TrySendError::Full(event)) => {
                log::debug!("[SINK] Event queue full, dropping {:?}", event);
            },
            Err(TrySendError::Disconnected(_)) => {},
        }
    }

    fn has_live_sessions(&self) -> bool {
        self.sessions.lock().values().any(|s| !s.is_finished())
    }

    /// Called by a worker after it marked itself finished.
    ///
    /// Lock order is audio, then sessions, as in `ensure_audio`.
    pub(crate) fn on_session_finished(&self) {
        let mut audio = self.audio.lock();
        if audio.is_none() || self.has_live_sessions() {
            return;
        }
        if let Some(mut player) = audio.take() {
            log::debug!("[SINK] No live sessions, stopping audio");
            player.stop();
        }
    }

    #[cfg(test)]
    pub(crate) fn audio_running(&self) -> bool {
        self.audio.lock().is_some()
    }

    fn ensure_audio(&self) {
        if !self.config.audio.enabled || self.closed.load(Ordering::SeqCst) {
            return;
        }
        let mut audio = self.audio.lock();
        if audio.as_ref().is_some_and(|p| !p.is_finished()) {
            return;
        }
        // Workers mark themselves finished before taking the audio lock
        if !self.has_live_sessions() {
            return;
        }
        match AudioPlayer::start(&self.feed, &self.config.audio) {
            Ok(player) => *audio = Some(player),
            Err(e) => log::warn!("[SINK] Audio unavailable: {}", e),
        }
    }
}

/// Accepts host views and renders the capture feed into them.
pub struct ViewSink {
    shared: Arc<SinkShared>,
}

impl ViewSink {
    pub fn new(config: CapviewConfig, backend: Arc<dyn SurfaceBackend>, factory: SourceFactory) -> Self {
        let (events_tx, events_rx) = crossbeam_channel::bounded(config.session.event_buffer.max(1));
        log::info!(
            "[SINK] Created (backend={}, source={:?})",
            backend.name(),
            config.source.kind
        );
        Self {
            shared: Arc::new(SinkShared {
                feed: FrameFeed::new(factory),
                config,
                backend,
                sessions: Mutex::new(HashMap::new()),
                events_tx,
                events_rx,
                audio: Mutex::new(None),
                next_session: AtomicU64::new(1),
                closed: AtomicBool::new(false),
            }),
        }
    }

    /// wgpu rendering of the source named in `config`.
    pub fn with_defaults(config: CapviewConfig) -> Self {
        let factory = factory_from_config(&config);
        Self::new(config, Arc::new(GpuBackend::new()), factory)
    }

    /// Hand a view to the sink.
    ///
    /// Returns immediately. A view that already has a live session is left
    /// alone; a view whose session ended gets a fresh one.
    pub fn submit(&self, view: ViewHandle) {
        let id = view.id();
        let stale = {
            let mut sessions = self.shared.sessions.lock();
            // Checked under the lock so shutdown cannot drain in between
            if self.shared.closed.load(Ordering::SeqCst) {
                log::warn!("[SINK] Ignoring view {} after shutdown", id);
                return;
            }
            if sessions.get(&id).is_some_and(|s| !s.is_finished()) {
                log::debug!("[SINK] View {} already attached", id);
                return;
            }
            let stale = sessions.remove(&id);

            let session_id = self.shared.next_session.fetch_add(1, Ordering::SeqCst);
            match Session::spawn(Arc::clone(&self.shared), session_id, view) {
                Ok(session) => {
                    log::info!("[SINK] View {} submitted (session {})", id, session_id);
                    sessions.insert(id, session);
                },
                Err(e) => {
                    log::error!("[SINK] Failed to start session for view {}: {}", id, e);
                    self.shared.emit(SinkEvent::Failed {
                        view: Some(id),
                        error: e,
                    });
                },
            }
            stale
        };

        // Joined outside the lock; its worker takes the lock on exit
        if let Some(old) = stale {
            old.join();
        }
        self.shared.ensure_audio();
    }

    /// Report a handle that could not be turned into a [`ViewHandle`].
    pub fn reject(&self, error: CapviewError) {
        log::error!("[SINK] Rejected view: {}", error);
        self.shared.emit(SinkEvent::Failed { view: None, error });
    }

    /// Receiver for session events. All clones share one queue.
    pub fn events(&self) -> Receiver<SinkEvent> {
        self.shared.events_rx.clone()
    }

    /// Stop rendering into `view` and release its handles.
    ///
    /// Blocks until the session worker has exited, so the host may destroy
    /// the view afterwards. Returns whether a session existed.
    pub fn detach(&self, view: ViewId) -> bool {
        let session = self.shared.sessions.lock().remove(&view);
        match session {
            Some(session) => {
                session.stop();
                session.join();
                log::info!("[SINK] View {} detached", view);
                true
            },
            None => false,
        }
    }

    /// Forward a new view size (physical pixels) to its session.
    pub fn resize(&self, view: ViewId, width: u32, height: u32) -> bool {
        match self.shared.sessions.lock().get(&view) {
            Some(session) if !session.is_finished() => {
                session.request_resize(width, height);
                true
            },
            _ => false,
        }
    }

    pub fn is_attached(&self, view: ViewId) -> bool {
        self.shared
            .sessions
            .lock()
            .get(&view)
            .is_some_and(|s| !s.is_finished())
    }

    /// Views with a live session, in id order.
    pub fn active_views(&self) -> Vec<ViewId> {
        let mut views: Vec<ViewId> = self
            .shared
            .sessions
            .lock()
            .iter()
            .filter(|(_, s)| !s.is_finished())
            .map(|(id, _)| *id)
            .collect();
        views.sort();
        views
    }

    /// Detach every view and stop capture. Later submits are ignored.
    pub fn shutdown(&self) {
        let sessions: Vec<Session> = {
            let mut sessions = self.shared.sessions.lock();
            if self.shared.closed.swap(true, Ordering::SeqCst) {
                return;
            }
            sessions.drain().map(|(_, s)| s).collect()
        };
        for session in &sessions {
            session.stop();
        }
        let count = sessions.len();
        for session in sessions {
            session.join();
        }

        if let Some(mut player) = self.shared.audio.lock().take() {
            player.stop();
        }
        self.shared.feed.shutdown();
        log::info!("[SINK] Shut down ({} sessions detached)", count);
    }
}

impl Drop for ViewSink {
    fn drop(&mut self) {
        self.shutdown();
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use capview_katsukity::Frame;

    use super::backend::Presenter;
    use super::*;
    use crate::config::RenderConfig;
    use crate::error::CapviewResult;
    use crate::source::{FrameSource, PatternSource};

    struct NullBackend;

    struct NullPresenter;

    impl SurfaceBackend for NullBackend {
        fn attach(&self, _view: &ViewHandle, _config: &RenderConfig) -> CapviewResult<Box<dyn Presenter>> {
            Ok(Box::new(NullPresenter))
        }
    }

    impl Presenter for NullPresenter {
        fn present(&mut self, _frame: &Frame) -> CapviewResult<()> {
            Ok(())
        }

        fn resize(&mut self, _width: u32, _height: u32) {}

        fn size(&self) -> (u32, u32) {
            (1, 1)
        }
    }

    fn test_sink(audio: bool) -> ViewSink {
        let mut config = CapviewConfig::default();
        config.audio.enabled = audio;
        config.session.event_buffer = 256;
        let factory: SourceFactory = Arc::new(|| {
            Ok(Box::new(PatternSource::new(None, Some(Duration::from_millis(5)))) as Box<dyn FrameSource>)
        });
        ViewSink::new(config, Arc::new(NullBackend), factory)
    }

    fn hwnd(value: isize) -> ViewHandle {
        ViewHandle::from_hwnd(value).unwrap()
    }

    #[test]
    fn test_event_serialization() {
        let view = ViewHandle::from_hwnd(0x2a).unwrap().id();
        let json = serde_json::to_value(SinkEvent::FirstFrame { view, sequence: 3 }).unwrap();
        assert_eq!(json["type"], "firstFrame");
        assert_eq!(json["view"]["kind"], "win32");
        assert_eq!(json["view"]["raw"], 42);
        assert_eq!(json["sequence"], 3);

        let json = serde_json::to_value(SinkEvent::Failed {
            view: None,
            error: CapviewError::InvalidView("null NSView".to_string()),
        })
        .unwrap();
        assert_eq!(json["type"], "failed");
        assert!(json["view"].is_null());
        assert_eq!(json["error"], "Invalid view handle: null NSView");
    }

    #[test]
    fn test_sink_is_send_sync() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<ViewSink>();
    }

    #[test]
    fn test_audio_follows_live_sessions() {
        let sink = test_sink(true);
        assert!(!sink.shared.audio_running());

        let a = hwnd(0x10);
        let b = hwnd(0x20);
        sink.submit(a);
        assert!(sink.shared.audio_running());
        sink.submit(b);
        assert!(sink.shared.audio_running());

        // One view left keeps audio going
        assert!(sink.detach(a.id()));
        assert!(sink.shared.audio_running());

        assert!(sink.detach(b.id()));
        assert!(!sink.shared.audio_running());

        // The next live session brings it back
        sink.submit(a);
        assert!(sink.shared.audio_running());

        sink.shutdown();
        assert!(!sink.shared.audio_running());
        assert!(!sink.shared.feed.is_running());
    }

    #[test]
    fn test_audio_stays_off_when_disabled() {
        let sink = test_sink(false);
        sink.submit(hwnd(0x10));
        assert!(!sink.shared.audio_running());
    }

    #[test]
    fn test_submit_racing_shutdown_leaves_nothing_running() {
        for i in 0..200 {
            let sink = test_sink(false);
            std::thread::scope(|scope| {
                scope.spawn(|| sink.submit(hwnd(0x10 + i)));
                scope.spawn(|| sink.shutdown());
            });

            assert!(sink.active_views().is_empty(), "iteration {}", i);
            assert!(!sink.shared.feed.is_running(), "iteration {}", i);
            assert_eq!(sink.shared.feed.subscriber_count(), 0, "iteration {}", i);

            // Shutdown is final
            sink.submit(hwnd(0x10 + i));
            assert!(sink.active_views().is_empty());
        }
    }
}
