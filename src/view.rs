//! Host view handles.
//!
//! A [`ViewHandle`] is a copy of the platform's raw window and display
//! handles. It never owns the view: the host creates and destroys it, and
//! must keep it alive while a session renders into it (see
//! [`crate::ViewSink::detach`]).

use std::ffi::c_void;
use std::fmt;
use std::num::NonZeroIsize;
use std::ptr::NonNull;

use raw_window_handle::{
    AppKitDisplayHandle, AppKitWindowHandle, HasDisplayHandle, HasWindowHandle, RawDisplayHandle,
    RawWindowHandle, WaylandDisplayHandle, WaylandWindowHandle, Win32WindowHandle,
    WindowsDisplayHandle, XlibDisplayHandle, XlibWindowHandle,
};

use serde::Serialize;

use crate::error::{CapviewError, CapviewResult};

/// Windowing system a handle belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum ViewKind {
    AppKit,
    UiKit,
    Win32,
    Xlib,
    Xcb,
    Wayland,
}

impl ViewKind {
    pub fn as_str(self) -> &'static str {
        match self {
            ViewKind::AppKit => "appKit",
            ViewKind::UiKit => "uiKit",
            ViewKind::Win32 => "win32",
            ViewKind::Xlib => "xlib",
            ViewKind::Xcb => "xcb",
            ViewKind::Wayland => "wayland",
        }
    }
}

/// Stable identity of a host view: its windowing system plus the native
/// handle value. Equal values from different systems are different views.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct ViewId {
    kind: ViewKind,
    raw: u64,
}

impl ViewId {
    pub fn kind(self) -> ViewKind {
        self.kind
    }

    /// The native handle value (pointer, HWND or window id).
    pub fn as_u64(self) -> u64 {
        self.raw
    }
}

impl fmt::Display for ViewId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{:x}", self.kind.as_str(), self.raw)
    }
}

/// Non-owning reference to a live host view.
#[derive(Clone, Copy)]
pub struct ViewHandle {
    window: RawWindowHandle,
    display: RawDisplayHandle,
    id: ViewId,
}

// SAFETY: the raw handles are only identifiers here. They are dereferenced
// by the GPU backend when it creates a surface, under the contract that the
// host keeps the view alive until the session is detached.
unsafe impl Send for ViewHandle {}
unsafe impl Sync for ViewHandle {}

impl fmt::Debug for ViewHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ViewHandle").field("id", &self.id).finish()
    }
}

impl ViewHandle {
    /// Capture the handles of anything that exposes them (winit windows,
    /// tao windows, test doubles).
    pub fn from_view<V>(view: &V) -> CapviewResult<Self>
    where
        V: HasWindowHandle + HasDisplayHandle + ?Sized,
    {
        let window = view
            .window_handle()
            .map_err(|e| CapviewError::InvalidView(format!("window handle unavailable: {}", e)))?;
        let display = view
            .display_handle()
            .map_err(|e| CapviewError::InvalidView(format!("display handle unavailable: {}", e)))?;
        Self::from_raw(window.as_raw(), display.as_raw())
    }

    /// Build from raw handles, rejecting kinds we have no identity for.
    pub fn from_raw(window: RawWindowHandle, display: RawDisplayHandle) -> CapviewResult<Self> {
        let id = identity(&window).ok_or_else(|| {
            CapviewError::InvalidView(format!("unsupported view kind: {}", kind_name(&window)))
        })?;
        Ok(Self {
            window,
            display,
            id,
        })
    }

    /// An AppKit `NSView*`.
    pub fn from_ns_view(ns_view: *mut c_void) -> CapviewResult<Self> {
        let ptr = NonNull::new(ns_view)
            .ok_or_else(|| CapviewError::InvalidView("null NSView".to_string()))?;
        Self::from_raw(
            RawWindowHandle::AppKit(AppKitWindowHandle::new(ptr)),
            RawDisplayHandle::AppKit(AppKitDisplayHandle::new()),
        )
    }

    /// A Win32 `HWND`.
    pub fn from_hwnd(hwnd: isize) -> CapviewResult<Self> {
        let hwnd =
            NonZeroIsize::new(hwnd).ok_or_else(|| CapviewError::InvalidView("null HWND".to_string()))?;
        Self::from_raw(
            RawWindowHandle::Win32(Win32WindowHandle::new(hwnd)),
            RawDisplayHandle::Windows(WindowsDisplayHandle::new()),
        )
    }

    /// An X11 window on an Xlib `Display*`.
    pub fn from_xlib(window: u64, display: *mut c_void) -> CapviewResult<Self> {
        if window == 0 {
            return Err(CapviewError::InvalidView("null X11 window".to_string()));
        }
        let display = NonNull::new(display)
            .ok_or_else(|| CapviewError::InvalidView("null X11 display".to_string()))?;
        Self::from_raw(
            RawWindowHandle::Xlib(XlibWindowHandle::new(window as std::ffi::c_ulong)),
            RawDisplayHandle::Xlib(XlibDisplayHandle::new(Some(display), 0)),
        )
    }

    /// A `wl_surface*` on a `wl_display*`.
    pub fn from_wayland(surface: *mut c_void, display: *mut c_void) -> CapviewResult<Self> {
        let surface = NonNull::new(surface)
            .ok_or_else(|| CapviewError::InvalidView("null wl_surface".to_string()))?;
        let display = NonNull::new(display)
            .ok_or_else(|| CapviewError::InvalidView("null wl_display".to_string()))?;
        Self::from_raw(
            RawWindowHandle::Wayland(WaylandWindowHandle::new(surface)),
            RawDisplayHandle::Wayland(WaylandDisplayHandle::new(display)),
        )
    }

    pub fn id(&self) -> ViewId {
        self.id
    }

    pub fn raw_window_handle(&self) -> RawWindowHandle {
        self.window
    }

    pub fn raw_display_handle(&self) -> RawDisplayHandle {
        self.display
    }
}

fn identity(window: &RawWindowHandle) -> Option<ViewId> {
    let (kind, raw) = match window {
        RawWindowHandle::AppKit(h) => (ViewKind::AppKit, h.ns_view.as_ptr() as usize as u64),
        RawWindowHandle::UiKit(h) => (ViewKind::UiKit, h.ui_view.as_ptr() as usize as u64),
        RawWindowHandle::Win32(h) => (ViewKind::Win32, h.hwnd.get() as u64),
        RawWindowHandle::Xlib(h) if h.window != 0 => (ViewKind::Xlib, h.window as u64),
        RawWindowHandle::Xcb(h) => (ViewKind::Xcb, h.window.get() as u64),
        RawWindowHandle::Wayland(h) => (ViewKind::Wayland, h.surface.as_ptr() as usize as u64),
        _ => return None,
    };
    Some(ViewId { kind, raw })
}

fn kind_name(window: &RawWindowHandle) -> &'static str {
    match window {
        RawWindowHandle::AppKit(_) => "AppKit",
        RawWindowHandle::UiKit(_) => "UIKit",
        RawWindowHandle::Win32(_) => "Win32",
        RawWindowHandle::Xlib(_) => "Xlib",
        RawWindowHandle::Xcb(_) => "Xcb",
        RawWindowHandle::Wayland(_) => "Wayland",
        _ => "other",
    }
}
