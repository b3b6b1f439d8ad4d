//! Pointer control and synthetic mouse events.

use objc2_core_foundation::CGPoint;
use objc2_core_graphics::{
    CGDisplayHideCursor, CGDisplayShowCursor, CGError, kCGNullDirectDisplay,
};
use tracing::warn;

use crate::sys::cg_ok;
use crate::sys::pid_t;
use crate::sys::skylight::{
    CFRelease, CGEventCreateMouseEvent, CGEventPost, CGEventPostPid, CGEventSetFlags,
    CGEventSetIntegerValueField, CGWarpMouseCursorPosition, G_CONNECTION,
    SLSGetCurrentCursorLocation,
};
use crate::sys::window_server::{WindowServerId, allow_background_cursor_control};

// CGEventType / CGMouseButton / CGEventTapLocation raw values.
const EVENT_LEFT_MOUSE_DOWN: u32 = 1;
const EVENT_LEFT_MOUSE_UP: u32 = 2;
const EVENT_MOUSE_MOVED: u32 = 5;
const MOUSE_BUTTON_LEFT: u32 = 0;
const HID_EVENT_TAP: u32 = 0;

/// The modifier the system recognizes as the menu-bar rearrange trigger
/// (`kCGEventFlagMaskCommand`).
const REARRANGE_MODIFIER_FLAGS: u64 = 0x0010_0000;

// Undocumented CGEventField values used to aim a synthetic mouse event at a
// specific window regardless of the event's on-screen position. Opaque
// platform constants; pass them through, never derive them.
const FIELD_WINDOW_UNDER_POINTER: u32 = 91;
const FIELD_WINDOW_THAT_CAN_HANDLE_EVENT: u32 = 92;
const FIELD_EVENT_TARGET_UNIX_PID: u32 = 40;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DragEventKind {
    /// Modifier-held press that begins the rearrange gesture.
    Press,
    /// Release that drops the item at the event's position.
    Release,
    /// Plain pointer motion used to nudge an unresponsive owner awake.
    Wake,
}

pub fn current_cursor_location() -> Result<CGPoint, CGError> {
    let mut point = CGPoint::new(0.0, 0.0);
    cg_ok(unsafe { SLSGetCurrentCursorLocation(*G_CONNECTION, &mut point) })?;
    Ok(point)
}

pub fn warp_mouse(point: CGPoint) -> Result<(), CGError> {
    cg_ok(unsafe { CGWarpMouseCursorPosition(point) })
}

pub fn hide_mouse() -> Result<(), CGError> {
    cg_ok(CGDisplayHideCursor(kCGNullDirectDisplay))
}

pub fn show_mouse() -> Result<(), CGError> {
    cg_ok(CGDisplayShowCursor(kCGNullDirectDisplay))
}

/// Scoped ownership of the real pointer. Hides the cursor on acquisition and
/// restores position and visibility exactly once when dropped, on every exit
/// path.
pub struct PointerGuard {
    original: CGPoint,
}

impl PointerGuard {
    pub fn acquire() -> Result<Self, CGError> {
        let original = current_cursor_location()?;
        // Without this property the server refuses to hide the cursor while
        // another app is frontmost.
        if let Err(err) = allow_background_cursor_control() {
            warn!(?err, "could not enable background cursor control");
        }
        hide_mouse()?;
        Ok(Self { original })
    }
}

impl Drop for PointerGuard {
    fn drop(&mut self) {
        if let Err(err) = warp_mouse(self.original) {
            warn!(?err, "failed to warp pointer back");
        }
        if let Err(err) = show_mouse() {
            warn!(?err, "failed to re-show pointer");
        }
    }
}

/// Posts one synthetic press/release/wake event at `position`, aimed at the
/// given window and owning process.
pub fn post_item_drag_event(
    kind: DragEventKind,
    position: CGPoint,
    window: WindowServerId,
    pid: pid_t,
) -> Result<(), CGError> {
    let event_type = match kind {
        DragEventKind::Press => EVENT_LEFT_MOUSE_DOWN,
        DragEventKind::Release => EVENT_LEFT_MOUSE_UP,
        DragEventKind::Wake => EVENT_MOUSE_MOVED,
    };

    unsafe {
        let event =
            CGEventCreateMouseEvent(std::ptr::null_mut(), event_type, position, MOUSE_BUTTON_LEFT);
        if event.is_null() {
            return Err(CGError::CannotComplete);
        }

        if matches!(kind, DragEventKind::Press | DragEventKind::Release) {
            CGEventSetFlags(event, REARRANGE_MODIFIER_FLAGS);
        }
        CGEventSetIntegerValueField(event, FIELD_WINDOW_UNDER_POINTER, window.as_u32() as i64);
        CGEventSetIntegerValueField(
            event,
            FIELD_WINDOW_THAT_CAN_HANDLE_EVENT,
            window.as_u32() as i64,
        );
        CGEventSetIntegerValueField(event, FIELD_EVENT_TARGET_UNIX_PID, pid as i64);

        match kind {
            DragEventKind::Wake => CGEventPostPid(pid, event),
            _ => CGEventPost(HID_EVENT_TAP, event),
        }
        CFRelease(event);
    }
    Ok(())
}
