use std::ffi::c_int;
use std::ptr::NonNull;

use objc2_app_kit::NSRunningApplication;
use objc2_core_foundation::{
    CFArray, CFDictionary, CFNumber, CFRetained, CFString, CFType, CGRect,
};
use objc2_core_graphics::{
    CGWindowID, CGWindowListCopyWindowInfo, CGWindowListOption, kCGNullWindowID, kCGWindowBounds,
    kCGWindowLayer, kCGWindowName, kCGWindowNumber, kCGWindowOwnerName, kCGWindowOwnerPID,
};
use serde::{Deserialize, Serialize};
use tracing::trace;

use crate::sys::cg_ok;
use crate::sys::geometry::CGRectDef;
use crate::sys::pid_t;
use crate::sys::skylight::{
    CGRectMakeWithDictionaryRepresentation, CGSGetActiveSpace, CGSGetOnScreenWindowCount,
    CGSGetOnScreenWindowList, CGSGetWindowBounds, CGSGetWindowCount, CGSGetWindowList,
    CGSSetConnectionProperty, G_CONNECTION, SLSCopySpacesForWindows,
};

/// Window level the window server assigns to status-bar item windows
/// (`kCGStatusWindowLevel`).
pub const STATUS_BAR_LEVEL: i32 = 25;

/// Extra slots requested beyond the last known window count. The server can
/// create windows between the count query and the list query; without slack
/// the list comes back truncated.
const SLOT_MARGIN: c_int = 10;

#[derive(PartialEq, Eq, PartialOrd, Ord, Hash, Debug, Clone, Copy, Serialize, Deserialize)]
pub struct WindowServerId(pub CGWindowID);

impl WindowServerId {
    #[inline]
    pub fn new(id: CGWindowID) -> Self {
        Self(id)
    }

    #[inline]
    pub fn as_u32(self) -> u32 {
        self.0
    }
}

impl From<WindowServerId> for u32 {
    #[inline]
    fn from(id: WindowServerId) -> Self {
        id.0
    }
}

/// One menu-bar item window as reported by the window server. Ephemeral: the
/// set is re-queried on every scan and a handle can vanish at any time.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MenuBarWindowInfo {
    pub id: WindowServerId,
    pub pid: pid_t,
    pub layer: i32,
    #[serde(with = "CGRectDef")]
    pub frame: CGRect,
    pub owner_name: Option<String>,
    pub bundle_id: Option<String>,
    pub title: Option<String>,
}

/// Queries the window server for the set of windows that are menu-bar items.
///
/// This layer absorbs transient churn: a window that vanishes between queries
/// is silently dropped, and a frame lookup for a dead handle returns `None`.
/// Nothing here retries.
#[derive(Debug, Default, Clone, Copy)]
pub struct WindowDirectory;

impl WindowDirectory {
    pub fn new() -> Self {
        Self
    }

    pub fn list_menu_bar_windows(
        &self,
        on_screen_only: bool,
        active_space_only: bool,
    ) -> Vec<MenuBarWindowInfo> {
        let ids = on_screen_window_ids(on_screen_only);
        if ids.is_empty() {
            return Vec::new();
        }

        let own_pid = std::process::id() as pid_t;
        let mut infos: Vec<MenuBarWindowInfo> = copy_window_info(on_screen_only)
            .into_iter()
            .filter(|info| ids.contains(&info.id))
            .filter(|info| info.layer == STATUS_BAR_LEVEL)
            .filter(|info| info.pid != own_pid)
            .collect();

        if active_space_only {
            let active = unsafe { CGSGetActiveSpace(*G_CONNECTION) };
            infos.retain(|info| window_space(info.id).is_none_or(|space| space == active));
        }

        for info in &mut infos {
            info.bundle_id = bundle_id_for_pid(info.pid);
        }

        trace!(count = infos.len(), on_screen_only, active_space_only, "menu bar window scan");
        infos
    }

    pub fn frame(&self, id: WindowServerId) -> Option<CGRect> {
        let mut frame = CGRect::default();
        cg_ok(unsafe { CGSGetWindowBounds(*G_CONNECTION, id.as_u32(), &mut frame) }).ok()?;
        Some(frame)
    }
}

/// Seam over the live window listing for consumers that substitute fakes in
/// tests.
pub trait WindowSource {
    fn list_menu_bar_windows(
        &self,
        on_screen_only: bool,
        active_space_only: bool,
    ) -> Vec<MenuBarWindowInfo>;
}

impl WindowSource for WindowDirectory {
    fn list_menu_bar_windows(
        &self,
        on_screen_only: bool,
        active_space_only: bool,
    ) -> Vec<MenuBarWindowInfo> {
        WindowDirectory::list_menu_bar_windows(self, on_screen_only, active_space_only)
    }
}

/// Count-then-list pair with slack for the TOCTOU race between the two calls.
fn on_screen_window_ids(on_screen_only: bool) -> Vec<WindowServerId> {
    let mut count: c_int = 0;
    let counted = unsafe {
        if on_screen_only {
            CGSGetOnScreenWindowCount(*G_CONNECTION, 0, &mut count)
        } else {
            CGSGetWindowCount(*G_CONNECTION, 0, &mut count)
        }
    };
    if cg_ok(counted).is_err() || count < 0 {
        return Vec::new();
    }

    let capacity = count + SLOT_MARGIN;
    let mut list = vec![0u32; capacity as usize];
    let mut out_count: c_int = 0;
    let listed = unsafe {
        if on_screen_only {
            CGSGetOnScreenWindowList(*G_CONNECTION, 0, capacity, list.as_mut_ptr(), &mut out_count)
        } else {
            CGSGetWindowList(*G_CONNECTION, 0, capacity, list.as_mut_ptr(), &mut out_count)
        }
    };
    if cg_ok(listed).is_err() {
        return Vec::new();
    }

    list.truncate(out_count.max(0) as usize);
    list.into_iter().map(WindowServerId::new).collect()
}

fn copy_window_info(on_screen_only: bool) -> Vec<MenuBarWindowInfo> {
    let options = if on_screen_only {
        CGWindowListOption::OptionOnScreenOnly | CGWindowListOption::ExcludeDesktopElements
    } else {
        CGWindowListOption::OptionAll | CGWindowListOption::ExcludeDesktopElements
    };

    let windows: CFRetained<CFArray<CFDictionary<CFString, CFType>>> = unsafe {
        match CGWindowListCopyWindowInfo(options, kCGNullWindowID) {
            Some(array) => CFRetained::cast_unchecked(array),
            None => return Vec::new(),
        }
    };

    windows.iter().filter_map(make_info).collect()
}

fn make_info(win: CFRetained<CFDictionary<CFString, CFType>>) -> Option<MenuBarWindowInfo> {
    let layer = get_num(&win, unsafe { kCGWindowLayer })?.try_into().ok()?;
    let id = get_num(&win, unsafe { kCGWindowNumber })?;
    let pid = get_num(&win, unsafe { kCGWindowOwnerPID })?;

    let dict = win.get(unsafe { kCGWindowBounds })?.downcast::<CFDictionary>().ok()?;
    let mut frame = CGRect::default();
    let ok = unsafe {
        CGRectMakeWithDictionaryRepresentation(
            CFRetained::<CFDictionary>::as_ptr(&dict).as_ptr().cast(),
            &mut frame,
        )
    };
    if !ok {
        return None;
    }

    Some(MenuBarWindowInfo {
        id: WindowServerId(id.try_into().ok()?),
        pid: pid.try_into().ok()?,
        layer,
        frame,
        owner_name: get_string(&win, unsafe { kCGWindowOwnerName }),
        // kCGWindowName is only populated when screen recording is granted.
        title: get_string(&win, unsafe { kCGWindowName }),
        bundle_id: None,
    })
}

fn get_num(dict: &CFDictionary<CFString, CFType>, key: &'static CFString) -> Option<i64> {
    dict.get(key)?.downcast::<CFNumber>().ok()?.as_i64()
}

fn get_string(dict: &CFDictionary<CFString, CFType>, key: &'static CFString) -> Option<String> {
    Some(dict.get(key)?.downcast::<CFString>().ok()?.to_string())
}

fn bundle_id_for_pid(pid: pid_t) -> Option<String> {
    let app = unsafe { NSRunningApplication::runningApplicationWithProcessIdentifier(pid) }?;
    unsafe { app.bundleIdentifier() }.map(|s| s.to_string())
}

fn window_space(id: WindowServerId) -> Option<u64> {
    let nums = [CFNumber::new_i64(id.as_u32() as i64)];
    let cf_windows = CFArray::from_retained_objects(&nums);
    let space_list_ref = unsafe {
        SLSCopySpacesForWindows(*G_CONNECTION, 0x7, CFRetained::as_ptr(&cf_windows).as_ptr())
    };
    let space_list_ref = NonNull::new(space_list_ref)?;
    let spaces: CFRetained<CFArray<CFNumber>> = unsafe { CFRetained::from_raw(space_list_ref) };
    spaces.iter().next().and_then(|num| num.as_i64()).and_then(|v| u64::try_from(v).ok())
}

/// Lets this connection hide the cursor while another app is frontmost. Needed
/// before a reposition hides the pointer.
pub fn allow_background_cursor_control() -> Result<(), objc2_core_graphics::CGError> {
    let property = CFString::from_str("SetsCursorInBackground");
    let value = CFNumber::new_i64(1);
    cg_ok(unsafe {
        CGSSetConnectionProperty(
            *G_CONNECTION,
            *G_CONNECTION,
            CFRetained::<CFString>::as_ptr(&property).as_ptr().cast(),
            CFRetained::<CFNumber>::as_ptr(&value).as_ptr().cast(),
        )
    })
}
