use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use flume::RecvTimeoutError;
use parking_lot::Mutex;

use super::{SinkEvent, SinkShared};
use crate::error::{CapviewError, CapviewResult};
use crate::view::ViewHandle;

const POLL_INTERVAL: Duration = Duration::from_millis(100);

#[derive(Default)]
struct Control {
    stop: AtomicBool,
    finished: AtomicBool,
    resize: Mutex<Option<(u32, u32)>>,
}

/// One view being rendered into by a worker thread.
pub(crate) struct Session {
    control: Arc<Control>,
    thread: Option<JoinHandle<()>>,
}

enum Exit {
    Stopped,
    SourceEnded,
}

impl Session {
    pub(crate) fn spawn(shared: Arc<SinkShared>, id: u64, view: ViewHandle) -> CapviewResult<Self> {
        let control = Arc::new(Control::default());
        let worker_control = Arc::clone(&control);
        let thread = std::thread::Builder::new()
            .name(format!("capview-session-{}", id))
            .spawn(move || run(&shared, id, &view, &worker_control))
            .map_err(|e| CapviewError::Other(format!("Failed to spawn session thread: {}", e)))?;

        Ok(Self {
            control,
            thread: Some(thread),
        })
    }

    pub(crate) fn is_finished(&self) -> bool {
        self.control.finished.load(Ordering::SeqCst)
    }

    pub(crate) fn stop(&self) {
        self.control.stop.store(true, Ordering::SeqCst);
    }

    /// Latest request wins; applied before the next frame.
    pub(crate) fn request_resize(&self, width: u32, height: u32) {
        *self.control.resize.lock() = Some((width, height));
    }

    pub(crate) fn join(mut self) {
        if let Some(thread) = self.thread.take() {
            if thread.join().is_err() {
                log::error!("[SESSION] Worker panicked");
            }
        }
    }
}

fn run(shared: &SinkShared, id: u64, view: &ViewHandle, control: &Control) {
    let view_id = view.id();
    log::debug!("[SESSION {}] Starting for view {}", id, view_id);

    let event = match render(shared, id, view, control) {
        Ok(Exit::Stopped) => SinkEvent::Detached { view: view_id },
        Ok(Exit::SourceEnded) => {
            let reason = shared.feed.last_error();
            log::info!("[SESSION {}] Source ended ({:?})", id, reason);
            SinkEvent::SourceEnded {
                view: view_id,
                reason,
            }
        },
        Err(e) => {
            log::error!("[SESSION {}] Failed: {}", id, e);
            SinkEvent::Failed {
                view: Some(view_id),
                error: e,
            }
        },
    };
    shared.emit(event);

    control.finished.store(true, Ordering::SeqCst);
    shared.on_session_finished();
    log::debug!("[SESSION {}] Finished", id);
}

fn render(shared: &SinkShared, id: u64, view: &ViewHandle, control: &Control) -> CapviewResult<Exit> {
    let view_id = view.id();
    let mut presenter = shared.backend.attach(view, &shared.config.render)?;
    let (width, height) = presenter.size();
    log::info!(
        "[SESSION {}] Attached {} to view {} ({}x{})",
        id,
        shared.backend.name(),
        view_id,
        width,
        height
    );
    shared.emit(SinkEvent::Attached {
        view: view_id,
        backend: shared.backend.name(),
    });

    let subscription = shared
        .feed
        .subscribe(&format!("session-{}", id), shared.config.session.frame_buffer)?;
    let first_frame_timeout = shared.config.session.first_frame_timeout();
    let started = Instant::now();
    let mut presented: u64 = 0;

    loop {
        if control.stop.load(Ordering::SeqCst) {
            log::debug!("[SESSION {}] Stopped after {} frames", id, presented);
            return Ok(Exit::Stopped);
        }
        if let Some((width, height)) = control.resize.lock().take() {
            presenter.resize(width, height);
        }

        match subscription.recv_timeout(POLL_INTERVAL) {
            Ok(frame) => {
                presenter.present(&frame)?;
                if presented == 0 {
                    log::info!(
                        "[SESSION {}] First frame after {:?}",
                        id,
                        started.elapsed()
                    );
                    shared.emit(SinkEvent::FirstFrame {
                        view: view_id,
                        sequence: frame.sequence,
                    });
                }
                presented += 1;
            },
            Err(RecvTimeoutError::Timeout) => {
                if presented == 0 && started.elapsed() >= first_frame_timeout {
                    return Err(CapviewError::Device(format!(
                        "no frame within {:?}",
                        first_frame_timeout
                    )));
                }
            },
            Err(RecvTimeoutError::Disconnected) => return Ok(Exit::SourceEnded),
        }
    }
}
