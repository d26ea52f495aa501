//! Behaviour of `ViewSink` with a recording backend and generated frames.
//!
//! Covers: submit returning immediately and rendering off-thread, repeated
//! submits of one view, concurrent submits of distinct views, unusable
//! handles, detach, resize, and failure reporting on the event channel.

use std::collections::HashSet;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use capview::config::{CapviewConfig, RenderConfig};
use capview::source::PatternSource;
use capview::{
    CapviewError, CapviewResult, Frame, FrameSource, Presenter, SinkEvent, SourceFactory,
    SurfaceBackend, ViewHandle, ViewId, ViewSink,
};
use crossbeam_channel::Receiver;
use parking_lot::Mutex;

const WAIT: Duration = Duration::from_secs(10);

#[derive(Default)]
struct Recorder {
    attaches: AtomicUsize,
    presented: AtomicUsize,
    sizes: Mutex<Vec<(ViewId, u32, u32)>>,
}

struct FakeBackend {
    recorder: Arc<Recorder>,
    fail: HashSet<u64>,
}

struct FakePresenter {
    view: ViewId,
    size: (u32, u32),
    recorder: Arc<Recorder>,
}

impl SurfaceBackend for FakeBackend {
    fn attach(&self, view: &ViewHandle, config: &RenderConfig) -> CapviewResult<Box<dyn Presenter>> {
        self.recorder.attaches.fetch_add(1, Ordering::SeqCst);
        if self.fail.contains(&view.id().as_u64()) {
            return Err(CapviewError::Surface("no surface for this view".to_string()));
        }
        Ok(Box::new(FakePresenter {
            view: view.id(),
            size: (config.initial_size[0], config.initial_size[1]),
            recorder: Arc::clone(&self.recorder),
        }))
    }

    fn name(&self) -> &'static str {
        "fake"
    }
}

impl Presenter for FakePresenter {
    fn present(&mut self, frame: &Frame) -> CapviewResult<()> {
        assert_eq!(frame.top.len(), capview::Screen::Top.rgba_len());
        self.recorder.presented.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn resize(&mut self, width: u32, height: u32) {
        self.size = (width, height);
        self.recorder.sizes.lock().push((self.view, width, height));
    }

    fn size(&self) -> (u32, u32) {
        self.size
    }
}

/// Pattern frames every 5 ms; `frames` bounds the stream.
fn pattern(frames: Option<u64>) -> SourceFactory {
    Arc::new(move || {
        Ok(Box::new(PatternSource::new(frames, Some(Duration::from_millis(5)))) as Box<dyn FrameSource>)
    })
}

fn test_config() -> CapviewConfig {
    let mut config = CapviewConfig::default();
    config.audio.enabled = false;
    config.session.event_buffer = 256;
    config
}

fn sink_with(factory: SourceFactory, fail: &[u64]) -> (ViewSink, Arc<Recorder>) {
    let recorder = Arc::new(Recorder::default());
    let backend = FakeBackend {
        recorder: Arc::clone(&recorder),
        fail: fail.iter().copied().collect(),
    };
    (ViewSink::new(test_config(), Arc::new(backend), factory), recorder)
}

fn hwnd(value: isize) -> ViewHandle {
    ViewHandle::from_hwnd(value).unwrap()
}

/// Read events until one matches, failing after `WAIT`.
fn wait_for(events: &Receiver<SinkEvent>, mut pred: impl FnMut(&SinkEvent) -> bool) -> SinkEvent {
    let deadline = Instant::now() + WAIT;
    loop {
        let left = deadline.saturating_duration_since(Instant::now());
        match events.recv_timeout(left) {
            Ok(event) if pred(&event) => return event,
            Ok(_) => {},
            Err(_) => panic!("timed out waiting for event"),
        }
    }
}

fn eventually(mut cond: impl FnMut() -> bool) {
    let deadline = Instant::now() + WAIT;
    while !cond() {
        assert!(Instant::now() < deadline, "condition never held");
        thread::sleep(Duration::from_millis(5));
    }
}

#[test]
fn submit_renders_frames_into_view() {
    let (sink, recorder) = sink_with(pattern(None), &[]);
    let events = sink.events();
    let view = hwnd(0x100);

    let start = Instant::now();
    sink.submit(view);
    assert!(start.elapsed() < Duration::from_secs(1));

    let event = wait_for(&events, |e| matches!(e, SinkEvent::FirstFrame { .. }));
    assert!(matches!(event, SinkEvent::FirstFrame { view: v, .. } if v == view.id()));
    eventually(|| recorder.presented.load(Ordering::SeqCst) >= 3);

    // The handle is only copied
    assert_eq!(view.id().as_u64(), 0x100);
    assert!(sink.is_attached(view.id()));
    assert_eq!(sink.active_views(), vec![view.id()]);

    assert!(sink.detach(view.id()));
    wait_for(&events, |e| matches!(e, SinkEvent::Detached { .. }));
    assert!(!sink.is_attached(view.id()));
    assert!(!sink.detach(view.id()));
}

#[test]
fn repeated_submit_keeps_one_session() {
    let (sink, recorder) = sink_with(pattern(None), &[]);
    let events = sink.events();
    let view = hwnd(0x200);

    sink.submit(view);
    wait_for(&events, |e| matches!(e, SinkEvent::FirstFrame { .. }));
    sink.submit(view);
    sink.submit(hwnd(0x200));

    assert_eq!(recorder.attaches.load(Ordering::SeqCst), 1);
    assert_eq!(sink.active_views().len(), 1);
}

#[test]
fn concurrent_submits_of_distinct_views() {
    let (sink, recorder) = sink_with(pattern(None), &[]);

    thread::scope(|scope| {
        for i in 1..=8 {
            let sink = &sink;
            scope.spawn(move || sink.submit(hwnd(i * 0x10)));
        }
    });

    let expected: Vec<ViewId> = (1..=8).map(|i| hwnd(i * 0x10).id()).collect();
    assert_eq!(sink.active_views(), expected);
    eventually(|| recorder.attaches.load(Ordering::SeqCst) == 8);

    sink.shutdown();
    assert!(sink.active_views().is_empty());
}

#[test]
fn unusable_handles_are_reported() {
    let (sink, recorder) = sink_with(pattern(None), &[]);
    let events = sink.events();

    for result in [ViewHandle::from_hwnd(0), ViewHandle::from_ns_view(std::ptr::null_mut())] {
        let error = result.unwrap_err();
        sink.reject(error);
        match events.recv_timeout(WAIT).unwrap() {
            SinkEvent::Failed { view, error } => {
                assert!(view.is_none());
                assert!(matches!(error, CapviewError::InvalidView(_)));
            },
            other => panic!("unexpected event {:?}", other),
        }
    }
    assert_eq!(recorder.attaches.load(Ordering::SeqCst), 0);
}

#[test]
fn attach_failure_is_reported_and_retryable() {
    let (sink, recorder) = sink_with(pattern(None), &[0x300]);
    let events = sink.events();
    let view = hwnd(0x300);

    sink.submit(view);
    let event = wait_for(&events, |e| matches!(e, SinkEvent::Failed { .. }));
    assert!(matches!(
        event,
        SinkEvent::Failed { view: Some(v), error: CapviewError::Surface(_) } if v == view.id()
    ));
    eventually(|| !sink.is_attached(view.id()));

    sink.submit(view);
    wait_for(&events, |e| matches!(e, SinkEvent::Failed { .. }));
    assert_eq!(recorder.attaches.load(Ordering::SeqCst), 2);
}

#[test]
fn source_end_is_reported() {
    let (sink, recorder) = sink_with(pattern(Some(5)), &[]);
    let events = sink.events();
    let view = hwnd(0x400);

    sink.submit(view);
    let event = wait_for(&events, |e| matches!(e, SinkEvent::SourceEnded { .. }));
    assert!(matches!(event, SinkEvent::SourceEnded { reason: None, .. }));
    eventually(|| !sink.is_attached(view.id()));
    assert!(recorder.presented.load(Ordering::SeqCst) <= 5);

    // A finished view can be submitted again and capture restarts
    sink.submit(view);
    wait_for(&events, |e| matches!(e, SinkEvent::FirstFrame { .. }));
}

#[test]
fn source_error_carries_reason() {
    let factory: SourceFactory = Arc::new(|| Err(CapviewError::Device("board unplugged".to_string())));
    let (sink, _) = sink_with(factory, &[]);
    let events = sink.events();

    sink.submit(hwnd(0x500));
    match wait_for(&events, |e| matches!(e, SinkEvent::SourceEnded { .. })) {
        SinkEvent::SourceEnded { reason, .. } => {
            assert!(reason.unwrap().contains("board unplugged"));
        },
        _ => unreachable!(),
    }
}

struct StalledSource;

impl FrameSource for StalledSource {
    fn next_frame(&mut self) -> CapviewResult<Option<Frame>> {
        thread::sleep(Duration::from_secs(1));
        Ok(None)
    }

    fn name(&self) -> &str {
        "stalled"
    }
}

#[test]
fn missing_first_frame_fails_session() {
    let recorder = Arc::new(Recorder::default());
    let backend = FakeBackend {
        recorder,
        fail: HashSet::new(),
    };
    let mut config = test_config();
    config.session.first_frame_timeout_ms = 100;
    let factory: SourceFactory = Arc::new(|| Ok(Box::new(StalledSource) as Box<dyn FrameSource>));
    let sink = ViewSink::new(config, Arc::new(backend), factory);
    let events = sink.events();

    sink.submit(hwnd(0x600));
    let event = wait_for(&events, |e| {
        matches!(e, SinkEvent::Failed { .. } | SinkEvent::SourceEnded { .. })
    });
    assert!(matches!(
        event,
        SinkEvent::Failed { error: CapviewError::Device(_), .. }
    ));
}

#[test]
fn resize_reaches_presenter() {
    let (sink, recorder) = sink_with(pattern(None), &[]);
    let events = sink.events();
    let view = hwnd(0x700);

    assert!(!sink.resize(view.id(), 800, 600));
    sink.submit(view);
    wait_for(&events, |e| matches!(e, SinkEvent::FirstFrame { .. }));

    assert!(sink.resize(view.id(), 800, 600));
    eventually(|| recorder.sizes.lock().contains(&(view.id(), 800, 600)));
}

#[test]
fn submit_after_shutdown_is_ignored() {
    let (sink, recorder) = sink_with(pattern(None), &[]);
    sink.shutdown();
    sink.submit(hwnd(0x800));

    assert!(sink.active_views().is_empty());
    assert_eq!(recorder.attaches.load(Ordering::SeqCst), 0);
}
