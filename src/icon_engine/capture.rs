//! Captures menu-bar item windows into a composable snapshot.
//!
//! The primary path grabs every target window in a single compositor call and
//! slices per-icon crops out of the composite. When that is unavailable or
//! comes back undersized, a region capture of the whole menu-bar strip is
//! sliced into fixed-width segments instead; that fallback knows positions but
//! not owners.

use std::ffi::c_void;
use std::ptr::NonNull;

use objc2_core_foundation::{CFRetained, CGPoint, CGRect, CGSize};
use objc2_core_graphics::CGImage;
use thiserror::Error;
use tracing::{debug, warn};

use crate::model::layout::{OwnerId, Section};
use crate::sys::geometry::CGRectExt;
use crate::sys::screen;
use crate::sys::skylight::{
    CFArrayCreate, CFRelease, CGImageCreateWithImageInRect, CGWindowListCreateImage,
    CGWindowListCreateImageFromArray, WINDOW_IMAGE_BEST_RESOLUTION,
    WINDOW_IMAGE_BOUNDS_IGNORE_FRAMING,
};
use crate::sys::window_server::{MenuBarWindowInfo, WindowServerId};

/// Assumed icon footprint for the slicing fallback: standard status-item
/// width plus inter-item spacing, in points. A heuristic tied to the stock
/// icon size convention; its output is positional only, never
/// identity-accurate.
const FALLBACK_ICON_WIDTH: f64 = 22.0;
const FALLBACK_ICON_SPACING: f64 = 8.0;

/// Hard cap on fallback slices, bounding memory and time on wide displays.
const MAX_FALLBACK_ICONS: usize = 50;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum CaptureError {
    #[error("screen capture permission not granted")]
    PermissionDenied,
    #[error("no display available for capture")]
    ScreenNotFound,
    #[error("no menu bar item windows to capture")]
    NoMenuBarItems,
    #[error("window capture and region capture both failed")]
    CaptureFailed,
}

/// Pixel-space view of a captured bitmap. Backed by `CGImage` in production;
/// tests substitute a plain struct.
pub trait IconImage: Sized + Clone {
    fn width_px(&self) -> usize;
    fn height_px(&self) -> usize;
    /// Crop in pixel coordinates. `None` when the rect falls outside the
    /// image.
    fn crop_px(&self, rect: CGRect) -> Option<Self>;
}

/// Host services the capture engine depends on. `ServerCapture` is the real
/// window-server-backed implementation.
pub trait CaptureBackend {
    type Image: IconImage;

    fn screen_capture_permitted(&self) -> bool;
    fn scale_factor(&self) -> f64;
    fn menu_bar_frame(&self) -> Option<CGRect>;
    /// One compositor call for the whole window list.
    fn capture_composite(&self, windows: &[WindowServerId], bounds: CGRect)
    -> Option<Self::Image>;
    fn capture_region(&self, rect: CGRect) -> Option<Self::Image>;
}

/// A captured icon, alive only until reconciliation consumes it.
#[derive(Debug, Clone)]
pub struct CapturedIcon<I> {
    /// `None` for fallback slices, which have no window identity.
    pub window: Option<WindowServerId>,
    pub image: I,
    pub frame: CGRect,
    pub owner: Option<OwnerId>,
    /// Owner process name, kept separately so a saved process-name identity
    /// can still match after the app gained a bundle id.
    pub owner_name: Option<String>,
    pub title: Option<String>,
    pub section: Section,
}

#[derive(Debug, Clone)]
pub struct CaptureResult<I> {
    pub composite: I,
    pub icons: Vec<CapturedIcon<I>>,
    pub union_frame: CGRect,
}

pub struct IconCaptureEngine<B: CaptureBackend = ServerCapture> {
    backend: B,
}

impl IconCaptureEngine<ServerCapture> {
    pub fn new() -> Self {
        Self::with_backend(ServerCapture)
    }
}

impl Default for IconCaptureEngine<ServerCapture> {
    fn default() -> Self {
        Self::new()
    }
}

impl<B: CaptureBackend> IconCaptureEngine<B> {
    pub fn with_backend(backend: B) -> Self {
        Self { backend }
    }

    pub fn capture(
        &self,
        windows: &[MenuBarWindowInfo],
        separator_x: f64,
        always_hidden_separator_x: Option<f64>,
    ) -> Result<CaptureResult<B::Image>, CaptureError> {
        if !self.backend.screen_capture_permitted() {
            return Err(CaptureError::PermissionDenied);
        }
        if windows.is_empty() {
            return Err(CaptureError::NoMenuBarItems);
        }

        match self.capture_windows(windows, separator_x, always_hidden_separator_x) {
            Some(result) => Ok(result),
            None => {
                warn!("window-level capture failed, falling back to region slicing");
                self.capture_region_sliced(separator_x, always_hidden_separator_x)
            }
        }
    }

    fn capture_windows(
        &self,
        windows: &[MenuBarWindowInfo],
        separator_x: f64,
        always_hidden_separator_x: Option<f64>,
    ) -> Option<CaptureResult<B::Image>> {
        let scale = self.backend.scale_factor();
        let union_frame = windows
            .iter()
            .skip(1)
            .fold(windows[0].frame, |acc, w| acc.union(&w.frame));

        let ids: Vec<WindowServerId> = windows.iter().map(|w| w.id).collect();
        let composite = self.backend.capture_composite(&ids, union_frame)?;

        // Integer-rounded comparison; a float sum drifts at 2x scale.
        let expected_px = (windows.iter().map(|w| w.frame.size.width).sum::<f64>() * scale)
            .round() as i64;
        if composite.width_px() as i64 != expected_px {
            debug!(
                actual = composite.width_px(),
                expected = expected_px,
                "composite width mismatch, discarding"
            );
            return None;
        }

        let mut icons = Vec::with_capacity(windows.len());
        for window in windows {
            let crop = CGRect::new(
                CGPoint::new(
                    ((window.frame.origin.x - union_frame.origin.x) * scale).round(),
                    ((window.frame.origin.y - union_frame.origin.y) * scale).round(),
                ),
                CGSize::new(
                    (window.frame.size.width * scale).round(),
                    (window.frame.size.height * scale).round(),
                ),
            );
            let Some(image) = composite.crop_px(crop) else {
                warn!(id = window.id.as_u32(), "icon crop out of composite bounds, skipping");
                continue;
            };
            icons.push(CapturedIcon {
                window: Some(window.id),
                image,
                frame: window.frame,
                owner: OwnerId::from_window(
                    window.bundle_id.as_deref(),
                    window.owner_name.as_deref(),
                ),
                owner_name: window.owner_name.clone(),
                title: window.title.clone(),
                section: classify(window.frame.mid_x(), separator_x, always_hidden_separator_x),
            });
        }

        if icons.is_empty() {
            return None;
        }
        Some(CaptureResult { composite, icons, union_frame })
    }

    fn capture_region_sliced(
        &self,
        separator_x: f64,
        always_hidden_separator_x: Option<f64>,
    ) -> Result<CaptureResult<B::Image>, CaptureError> {
        let region = self.backend.menu_bar_frame().ok_or(CaptureError::ScreenNotFound)?;
        let image = self.backend.capture_region(region).ok_or(CaptureError::CaptureFailed)?;

        let scale = self.backend.scale_factor();
        let step_points = FALLBACK_ICON_WIDTH + FALLBACK_ICON_SPACING;
        let step_px = (step_points * scale).round().max(1.0) as usize;
        let count = (image.width_px() / step_px).min(MAX_FALLBACK_ICONS);

        let mut icons = Vec::with_capacity(count);
        for i in 0..count {
            let crop = CGRect::new(
                CGPoint::new((i * step_px) as f64, 0.0),
                CGSize::new(step_px as f64, image.height_px() as f64),
            );
            let Some(slice) = image.crop_px(crop) else { continue };
            let frame = CGRect::new(
                CGPoint::new(region.origin.x + i as f64 * step_points, region.origin.y),
                CGSize::new(step_points, region.size.height),
            );
            icons.push(CapturedIcon {
                window: None,
                image: slice,
                frame,
                owner: None,
                owner_name: None,
                title: None,
                section: classify(frame.mid_x(), separator_x, always_hidden_separator_x),
            });
        }

        if icons.is_empty() {
            return Err(CaptureError::CaptureFailed);
        }
        debug!(count = icons.len(), "region fallback produced positional icons");
        Ok(CaptureResult { composite: image, icons, union_frame: region })
    }
}

/// Section assignment by horizontal midpoint against the separator positions.
fn classify(mid_x: f64, separator_x: f64, always_hidden_separator_x: Option<f64>) -> Section {
    if let Some(always) = always_hidden_separator_x
        && mid_x < always
    {
        return Section::AlwaysHidden;
    }
    if mid_x < separator_x { Section::Hidden } else { Section::Visible }
}

#[derive(Clone)]
pub struct ServerImage(CFRetained<CGImage>);

impl ServerImage {
    fn from_raw(ptr: *mut CGImage) -> Option<Self> {
        NonNull::new(ptr).map(|p| Self(unsafe { CFRetained::from_raw(p) }))
    }
}

impl IconImage for ServerImage {
    fn width_px(&self) -> usize {
        unsafe { CGImage::width(Some(self.0.as_ref())) }
    }

    fn height_px(&self) -> usize {
        unsafe { CGImage::height(Some(self.0.as_ref())) }
    }

    fn crop_px(&self, rect: CGRect) -> Option<Self> {
        let ptr = unsafe {
            CGImageCreateWithImageInRect(CFRetained::as_ptr(&self.0).as_ptr(), rect)
        };
        Self::from_raw(ptr)
    }
}

/// Compositor-backed capture of live windows.
pub struct ServerCapture;

impl CaptureBackend for ServerCapture {
    type Image = ServerImage;

    fn screen_capture_permitted(&self) -> bool {
        screen::screen_capture_permitted()
    }

    fn scale_factor(&self) -> f64 {
        screen::display_scale_factor(screen::main_display_id())
    }

    fn menu_bar_frame(&self) -> Option<CGRect> {
        screen::menu_bar_frame(screen::main_display_id())
    }

    fn capture_composite(
        &self,
        windows: &[WindowServerId],
        bounds: CGRect,
    ) -> Option<Self::Image> {
        // CGWindowListCreateImageFromArray wants raw window IDs in the array,
        // not CFNumbers, hence the null value callbacks.
        let raw: Vec<*const c_void> =
            windows.iter().map(|id| id.as_u32() as usize as *const c_void).collect();
        unsafe {
            let array =
                CFArrayCreate(std::ptr::null(), raw.as_ptr(), raw.len() as isize, std::ptr::null());
            if array.is_null() {
                return None;
            }
            let image = CGWindowListCreateImageFromArray(
                bounds,
                array,
                WINDOW_IMAGE_BOUNDS_IGNORE_FRAMING | WINDOW_IMAGE_BEST_RESOLUTION,
            );
            CFRelease(array.cast());
            ServerImage::from_raw(image)
        }
    }

    fn capture_region(&self, rect: CGRect) -> Option<Self::Image> {
        // kCGWindowListOptionOnScreenOnly = 1, below no particular window.
        let ptr = unsafe {
            CGWindowListCreateImage(rect, 1, 0, WINDOW_IMAGE_BEST_RESOLUTION)
        };
        ServerImage::from_raw(ptr)
    }
}

#[cfg(test)]
pub(crate) mod test_support {
    use super::*;

    #[derive(Debug, Clone, PartialEq)]
    pub struct FakeImage {
        pub width: usize,
        pub height: usize,
    }

    impl IconImage for FakeImage {
        fn width_px(&self) -> usize {
            self.width
        }

        fn height_px(&self) -> usize {
            self.height
        }

        fn crop_px(&self, rect: CGRect) -> Option<Self> {
            let right = rect.origin.x + rect.size.width;
            if right > self.width as f64 + 0.5 {
                return None;
            }
            Some(FakeImage {
                width: rect.size.width as usize,
                height: rect.size.height as usize,
            })
        }
    }

    pub struct FakeBackend {
        pub permitted: bool,
        pub scale: f64,
        pub menu_bar: Option<CGRect>,
        pub composite: Option<FakeImage>,
        pub region: Option<FakeImage>,
    }

    impl Default for FakeBackend {
        fn default() -> Self {
            Self {
                permitted: true,
                scale: 2.0,
                menu_bar: Some(CGRect::new(
                    CGPoint::new(0.0, 0.0),
                    CGSize::new(1512.0, 24.0),
                )),
                composite: None,
                region: None,
            }
        }
    }

    impl CaptureBackend for FakeBackend {
        type Image = FakeImage;

        fn screen_capture_permitted(&self) -> bool {
            self.permitted
        }

        fn scale_factor(&self) -> f64 {
            self.scale
        }

        fn menu_bar_frame(&self) -> Option<CGRect> {
            self.menu_bar
        }

        fn capture_composite(&self, _windows: &[WindowServerId], _bounds: CGRect) -> Option<FakeImage> {
            self.composite.clone()
        }

        fn capture_region(&self, _rect: CGRect) -> Option<FakeImage> {
            self.region.clone()
        }
    }
}
