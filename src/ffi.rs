//! C ABI for hosts that own native views.
//!
//! ```c
//! CapviewSink *sink = capview_sink_new(NULL);
//! capview_sink_send_ns_view(sink, (__bridge void *)view);
//! ...
//! capview_sink_detach_all(sink);
//! capview_sink_free(sink);
//! ```
//!
//! Every function accepts a null sink and does nothing. A null view is
//! logged and reported as `Failed` on the sink's event channel.

use std::ffi::{c_char, c_void, CStr};
use std::path::PathBuf;

use crate::config::CapviewConfig;
use crate::error::CapviewResult;
use crate::logging::init_logging;
use crate::sink::ViewSink;
use crate::view::ViewHandle;

/// Create a sink. `config_path` may be null to use the default config
/// lookup. Returns null if the config cannot be loaded.
///
/// # Safety
/// `config_path` must be null or a valid NUL-terminated string.
#[no_mangle]
pub unsafe extern "C" fn capview_sink_new(config_path: *const c_char) -> *mut ViewSink {
    let path = if config_path.is_null() {
        None
    } else {
        // SAFETY: caller guarantees a valid C string
        let raw = unsafe { CStr::from_ptr(config_path) };
        Some(PathBuf::from(raw.to_string_lossy().into_owned()))
    };

    let config = match CapviewConfig::load(path.as_deref()) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("capview: {}", e);
            return std::ptr::null_mut();
        },
    };
    if let Err(e) = init_logging(&config.log) {
        eprintln!("capview: logging unavailable: {}", e);
    }

    Box::into_raw(Box::new(ViewSink::with_defaults(config)))
}

unsafe fn sink_ref<'a>(sink: *mut ViewSink) -> Option<&'a ViewSink> {
    // SAFETY: non-null pointers come from capview_sink_new
    unsafe { sink.as_ref() }
}

fn send(sink: &ViewSink, view: CapviewResult<ViewHandle>) {
    match view {
        Ok(view) => sink.submit(view),
        Err(e) => sink.reject(e),
    }
}

/// Hand an AppKit `NSView*` to the sink.
///
/// # Safety
/// `sink` must be null or from [`capview_sink_new`]. `view` must stay alive
/// until it is detached or the sink is freed.
#[no_mangle]
pub unsafe extern "C" fn capview_sink_send_ns_view(sink: *mut ViewSink, view: *mut c_void) {
    if let Some(sink) = unsafe { sink_ref(sink) } {
        send(sink, ViewHandle::from_ns_view(view));
    }
}

/// Hand a Win32 `HWND` to the sink.
///
/// # Safety
/// As for [`capview_sink_send_ns_view`].
#[no_mangle]
pub unsafe extern "C" fn capview_sink_send_hwnd(sink: *mut ViewSink, hwnd: isize) {
    if let Some(sink) = unsafe { sink_ref(sink) } {
        send(sink, ViewHandle::from_hwnd(hwnd));
    }
}

/// Tell the sink an `NSView*` changed size (physical pixels).
///
/// # Safety
/// `sink` must be null or from [`capview_sink_new`].
#[no_mangle]
pub unsafe extern "C" fn capview_sink_resize_ns_view(
    sink: *mut ViewSink,
    view: *mut c_void,
    width: u32,
    height: u32,
) {
    if let (Some(sink), Ok(view)) = (unsafe { sink_ref(sink) }, ViewHandle::from_ns_view(view)) {
        sink.resize(view.id(), width, height);
    }
}

/// Tell the sink an `HWND` changed size (physical pixels).
///
/// # Safety
/// `sink` must be null or from [`capview_sink_new`].
#[no_mangle]
pub unsafe extern "C" fn capview_sink_resize_hwnd(sink: *mut ViewSink, hwnd: isize, width: u32, height: u32) {
    if let (Some(sink), Ok(view)) = (unsafe { sink_ref(sink) }, ViewHandle::from_hwnd(hwnd)) {
        sink.resize(view.id(), width, height);
    }
}

/// Detach every view. Blocks until all sessions have released their views.
///
/// # Safety
/// `sink` must be null or from [`capview_sink_new`].
#[no_mangle]
pub unsafe extern "C" fn capview_sink_detach_all(sink: *mut ViewSink) {
    if let Some(sink) = unsafe { sink_ref(sink) } {
        for view in sink.active_views() {
            sink.detach(view);
        }
    }
}

/// Shut the sink down and free it.
///
/// # Safety
/// `sink` must be null or from [`capview_sink_new`], and not used again.
#[no_mangle]
pub unsafe extern "C" fn capview_sink_free(sink: *mut ViewSink) {
    if !sink.is_null() {
        // SAFETY: ownership returns from capview_sink_new
        drop(unsafe { Box::from_raw(sink) });
    }
}
