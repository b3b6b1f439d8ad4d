// Private CGS/SLS declarations, collected from the usual references:
// https://github.com/koekeishiya/yabai/blob/master/src/misc/extern.h
// https://github.com/asmagill/hs._asm.undocumented.spaces/blob/master/CGSSpace.h

use std::ffi::{c_int, c_void};

use objc2_core_foundation::{CFArray, CFNumber, CFType, CGPoint, CGRect};
use objc2_core_graphics::{CGError, CGImage};
use once_cell::sync::Lazy;

pub static G_CONNECTION: Lazy<cid_t> = Lazy::new(|| unsafe { SLSMainConnectionID() });

#[allow(non_camel_case_types)]
pub type cid_t = i32;

// CGWindowImageOption bits for the window-list capture calls.
pub const WINDOW_IMAGE_BOUNDS_IGNORE_FRAMING: u32 = 1 << 0;
pub const WINDOW_IMAGE_BEST_RESOLUTION: u32 = 1 << 3;

#[link(name = "SkyLight", kind = "framework")]
unsafe extern "C" {
    pub fn SLSMainConnectionID() -> cid_t;
    pub fn SLSGetCurrentCursorLocation(cid: cid_t, point: *mut CGPoint) -> CGError;
    pub fn CGSGetOnScreenWindowCount(cid: cid_t, target_cid: cid_t, count: *mut c_int) -> CGError;
    pub fn CGSGetOnScreenWindowList(
        cid: cid_t,
        target_cid: cid_t,
        capacity: c_int,
        list: *mut u32,
        out_count: *mut c_int,
    ) -> CGError;
    pub fn CGSGetWindowCount(cid: cid_t, target_cid: cid_t, count: *mut c_int) -> CGError;
    pub fn CGSGetWindowList(
        cid: cid_t,
        target_cid: cid_t,
        capacity: c_int,
        list: *mut u32,
        out_count: *mut c_int,
    ) -> CGError;
    pub fn CGSGetWindowBounds(cid: cid_t, wid: u32, frame: *mut CGRect) -> CGError;
    pub fn CGSGetActiveSpace(cid: cid_t) -> u64;
    pub fn SLSCopySpacesForWindows(
        cid: cid_t,
        mask: c_int,
        window_ids: *const CFArray<CFNumber>,
    ) -> *mut CFArray<CFNumber>;
    pub fn CGSSetConnectionProperty(
        cid: cid_t,
        target_cid: cid_t,
        key: *const c_void,
        value: *mut CFType,
    ) -> CGError;
}

#[link(name = "CoreGraphics", kind = "framework")]
unsafe extern "C" {
    pub fn CFRelease(obj: *mut CFType);
    pub fn CGRectMakeWithDictionaryRepresentation(dict: *const c_void, rect: *mut CGRect) -> bool;
    pub fn CGWarpMouseCursorPosition(point: CGPoint) -> CGError;
    pub fn CGPreflightScreenCaptureAccess() -> bool;

    /// `window_array` must hold raw `CGWindowID` values (not `CFNumber`s),
    /// i.e. an array created with null value callbacks.
    pub fn CGWindowListCreateImageFromArray(
        screen_bounds: CGRect,
        window_array: *const CFArray<c_void>,
        image_option: u32,
    ) -> *mut CGImage;
    pub fn CGWindowListCreateImage(
        screen_bounds: CGRect,
        list_option: u32,
        window_id: u32,
        image_option: u32,
    ) -> *mut CGImage;
    pub fn CGImageCreateWithImageInRect(image: *const CGImage, rect: CGRect) -> *mut CGImage;

    pub fn CFArrayCreate(
        allocator: *const c_void,
        values: *const *const c_void,
        num_values: isize,
        callbacks: *const c_void,
    ) -> *mut CFArray<c_void>;

    pub fn CGDisplayCopyDisplayMode(display: u32) -> *mut CFType;
    pub fn CGDisplayModeGetPixelWidth(mode: *const CFType) -> usize;
    pub fn CGDisplayModeRelease(mode: *mut CFType);

    pub fn CGEventCreateMouseEvent(
        source: *mut c_void,
        mouse_type: u32,
        position: CGPoint,
        button: u32,
    ) -> *mut CFType;
    pub fn CGEventSetFlags(event: *mut CFType, flags: u64);
    pub fn CGEventSetIntegerValueField(event: *mut CFType, field: u32, value: i64);
    pub fn CGEventPost(tap: u32, event: *mut CFType);
    pub fn CGEventPostPid(pid: crate::sys::pid_t, event: *mut CFType);
}
