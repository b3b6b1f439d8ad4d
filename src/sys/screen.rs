use std::ptr::NonNull;

use objc2_core_foundation::{CGPoint, CGRect, CGSize};
use objc2_core_graphics::{CGDisplayBounds, CGMainDisplayID};

use crate::sys::skylight::{
    CGDisplayCopyDisplayMode, CGDisplayModeGetPixelWidth, CGDisplayModeRelease,
    CGPreflightScreenCaptureAccess,
};

/// Height used when the window server does not report a menu-bar window.
const DEFAULT_MENU_BAR_HEIGHT: f64 = 24.0;

pub fn main_display_id() -> u32 {
    unsafe { CGMainDisplayID() }
}

/// Backing scale of a display, derived from the current display mode. 1.0 on
/// standard displays, 2.0 on Retina.
pub fn display_scale_factor(display: u32) -> f64 {
    let bounds = unsafe { CGDisplayBounds(display) };
    if bounds.size.width <= 0.0 {
        return 1.0;
    }

    let mode = unsafe { CGDisplayCopyDisplayMode(display) };
    let Some(mode) = NonNull::new(mode) else {
        return 1.0;
    };
    let pixel_width = unsafe { CGDisplayModeGetPixelWidth(mode.as_ptr()) };
    unsafe { CGDisplayModeRelease(mode.as_ptr()) };

    if pixel_width == 0 {
        1.0
    } else {
        pixel_width as f64 / bounds.size.width
    }
}

/// The menu-bar strip of a display in screen coordinates.
pub fn menu_bar_frame(display: u32) -> Option<CGRect> {
    let bounds = unsafe { CGDisplayBounds(display) };
    if bounds.size.width <= 0.0 {
        return None;
    }
    Some(CGRect::new(
        CGPoint::new(bounds.origin.x, bounds.origin.y),
        CGSize::new(bounds.size.width, DEFAULT_MENU_BAR_HEIGHT),
    ))
}

/// Capture capability gate. Checked before any capture call is attempted.
pub fn screen_capture_permitted() -> bool {
    unsafe { CGPreflightScreenCaptureAccess() }
}
