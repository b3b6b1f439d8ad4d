//! Moves one menu-bar icon next to another by synthesizing the modifier-held
//! drag the system itself recognizes, then verifying the move by watching the
//! window's frame.
//!
//! Per attempt: press at an off-screen point aimed at the source window, wait
//! for its frame to move (the drag has engaged), release at the destination
//! edge midpoint, wait for the drop to settle, then verify. The press-phase
//! wait always completes or times out before the release is posted.

use std::time::Duration;

use objc2_core_foundation::{CGPoint, CGRect};
use thiserror::Error;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::model::layout::{LayoutItem, OwnerId};
use crate::sys::event::{self, DragEventKind, PointerGuard};
use crate::sys::geometry::{CGRectExt, SameAs};
use crate::sys::pid_t;
use crate::sys::window_server::{MenuBarWindowInfo, WindowDirectory, WindowServerId};

/// Press coordinate. Deliberately off every display; the event's window
/// fields aim it at the source item.
const OFFSCREEN_POINT: CGPoint = CGPoint { x: -10_000.0, y: -10_000.0 };

/// Items the system refuses to relocate, keyed by bundle id and, where one
/// bundle hosts several items, the item title.
const IMMOVABLE_ITEMS: &[(&str, Option<&str>)] = &[
    ("com.apple.controlcenter", Some("Clock")),
    ("com.apple.controlcenter", Some("BentoBox")),
    ("com.apple.Siri", None),
];

#[derive(Debug, Error, PartialEq, Eq)]
pub enum RepositionError {
    #[error("item is pinned by the system and cannot be moved")]
    NotMovable,
    #[error("item cannot be the subject of a move")]
    InvalidItem,
    #[error("window vanished before the move could run")]
    WindowNotFound,
    #[error("window frame did not change within the phase timeout")]
    Timeout,
    #[error("could not construct the synthetic input event")]
    EventCreationFailed,
    #[error("move attempts exhausted without a verified frame change")]
    CouldNotComplete,
    #[error("operation was cancelled")]
    Cancelled,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MoveDestination {
    /// Place the source so its right edge meets the target's left edge.
    LeftOf(WindowServerId),
    /// Place the source so its left edge meets the target's right edge.
    RightOf(WindowServerId),
}

impl MoveDestination {
    pub fn target(self) -> WindowServerId {
        match self {
            MoveDestination::LeftOf(id) | MoveDestination::RightOf(id) => id,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MoveOutcome {
    /// The relative position already satisfied the destination; no events
    /// were posted.
    AlreadyInPlace,
    Moved { attempts: u32 },
}

/// Host services a move depends on. The real backend talks to the window
/// server and the HID event tap.
pub trait MoveBackend {
    fn frame(&self, id: WindowServerId) -> Option<CGRect>;
    fn post_drag_event(
        &mut self,
        kind: DragEventKind,
        position: CGPoint,
        window: WindowServerId,
        pid: pid_t,
    ) -> Result<(), RepositionError>;
    /// Hide the pointer and remember where it was.
    fn acquire_pointer(&mut self) -> Result<(), RepositionError>;
    /// Restore pointer position and visibility. Must be idempotent per move.
    fn release_pointer(&mut self);
}

#[derive(Debug, Clone, Copy)]
pub struct RepositionTuning {
    pub poll_interval: Duration,
    pub phase_timeout: Duration,
    pub max_attempts: u32,
    pub wake_between_attempts: bool,
}

impl Default for RepositionTuning {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_millis(10),
            phase_timeout: Duration::from_millis(50),
            max_attempts: 3,
            wake_between_attempts: true,
        }
    }
}

pub struct IconRepositioningEngine<B: MoveBackend = ServerMove> {
    backend: B,
    tuning: RepositionTuning,
}

impl IconRepositioningEngine<ServerMove> {
    pub fn new(tuning: RepositionTuning) -> Self {
        Self::with_backend(ServerMove::new(), tuning)
    }
}

impl<B: MoveBackend> IconRepositioningEngine<B> {
    pub fn with_backend(backend: B, tuning: RepositionTuning) -> Self {
        Self { backend, tuning }
    }

    pub async fn reposition(
        &mut self,
        item: &LayoutItem,
        source: &MenuBarWindowInfo,
        destination: MoveDestination,
        cancel: &CancellationToken,
    ) -> Result<MoveOutcome, RepositionError> {
        if item.is_spacer {
            return Err(RepositionError::InvalidItem);
        }
        if !is_movable(item) {
            // Terminal; nothing has been touched yet, so nothing to restore.
            return Err(RepositionError::NotMovable);
        }

        let source_frame =
            self.backend.frame(source.id).ok_or(RepositionError::WindowNotFound)?;
        let dest_frame =
            self.backend.frame(destination.target()).ok_or(RepositionError::WindowNotFound)?;

        let (satisfied, release_point) = match destination {
            MoveDestination::LeftOf(_) => (
                source_frame.right().same_as(dest_frame.left()),
                dest_frame.left_edge_mid(),
            ),
            MoveDestination::RightOf(_) => (
                source_frame.left().same_as(dest_frame.right()),
                dest_frame.right_edge_mid(),
            ),
        };
        if satisfied {
            debug!(item = %item.id, "already positioned, no events needed");
            return Ok(MoveOutcome::AlreadyInPlace);
        }

        self.backend.acquire_pointer()?;
        let outcome = self.run_attempts(item, source, release_point, cancel).await;
        self.backend.release_pointer();
        outcome
    }

    async fn run_attempts(
        &mut self,
        item: &LayoutItem,
        source: &MenuBarWindowInfo,
        release_point: CGPoint,
        cancel: &CancellationToken,
    ) -> Result<MoveOutcome, RepositionError> {
        for attempt in 1..=self.tuning.max_attempts {
            if cancel.is_cancelled() {
                return Err(RepositionError::Cancelled);
            }

            match self.attempt(source, release_point, cancel).await {
                Ok(()) => return Ok(MoveOutcome::Moved { attempts: attempt }),
                Err(err @ (RepositionError::Cancelled | RepositionError::WindowNotFound)) => {
                    return Err(err);
                }
                Err(err) => {
                    warn!(item = %item.id, attempt, ?err, "move attempt failed");
                    if attempt < self.tuning.max_attempts && self.tuning.wake_between_attempts {
                        // Some owners only notice the drag after any input at
                        // all; nudge them before the next try.
                        let center = self
                            .backend
                            .frame(source.id)
                            .map(|f| f.center())
                            .unwrap_or(release_point);
                        let _ = self.backend.post_drag_event(
                            DragEventKind::Wake,
                            center,
                            source.id,
                            source.pid,
                        );
                    }
                }
            }
        }
        Err(RepositionError::CouldNotComplete)
    }

    /// One full press/await/release/await/verify cycle.
    async fn attempt(
        &mut self,
        source: &MenuBarWindowInfo,
        release_point: CGPoint,
        cancel: &CancellationToken,
    ) -> Result<(), RepositionError> {
        let before = self.backend.frame(source.id).ok_or(RepositionError::WindowNotFound)?;

        self.backend.post_drag_event(
            DragEventKind::Press,
            OFFSCREEN_POINT,
            source.id,
            source.pid,
        )?;
        let drag_started = self.await_frame_change(source.id, before, cancel).await;

        // The press wait has completed or timed out; always end the gesture
        // so a mouse button is never left logically held down.
        self.backend.post_drag_event(
            DragEventKind::Release,
            release_point,
            source.id,
            source.pid,
        )?;
        drag_started?;

        let at_release = self.backend.frame(source.id).ok_or(RepositionError::WindowNotFound)?;
        self.await_frame_change(source.id, at_release, cancel).await.or_else(|err| {
            // The drop often lands exactly where the drag already put the
            // window; a quiet frame after release is only a failure if the
            // whole attempt moved nothing.
            if err == RepositionError::Timeout { Ok(()) } else { Err(err) }
        })?;

        let after = self.backend.frame(source.id).ok_or(RepositionError::WindowNotFound)?;
        if after.same_as(before) {
            return Err(RepositionError::Timeout);
        }
        Ok(())
    }

    async fn await_frame_change(
        &self,
        id: WindowServerId,
        baseline: CGRect,
        cancel: &CancellationToken,
    ) -> Result<(), RepositionError> {
        let deadline = tokio::time::Instant::now() + self.tuning.phase_timeout;
        loop {
            if cancel.is_cancelled() {
                return Err(RepositionError::Cancelled);
            }
            if let Some(frame) = self.backend.frame(id)
                && !frame.same_as(baseline)
            {
                return Ok(());
            }
            if tokio::time::Instant::now() >= deadline {
                return Err(RepositionError::Timeout);
            }
            tokio::time::sleep(self.tuning.poll_interval).await;
        }
    }
}

fn is_movable(item: &LayoutItem) -> bool {
    let Some(OwnerId::Bundle(bundle)) = &item.owner else {
        return true;
    };
    !IMMOVABLE_ITEMS.iter().any(|(pinned_bundle, pinned_title)| {
        bundle == pinned_bundle
            && pinned_title.is_none_or(|title| item.title.as_deref() == Some(title))
    })
}

/// Window-server-backed move operations.
pub struct ServerMove {
    directory: WindowDirectory,
    pointer: Option<PointerGuard>,
}

impl ServerMove {
    pub fn new() -> Self {
        Self { directory: WindowDirectory::new(), pointer: None }
    }
}

impl Default for ServerMove {
    fn default() -> Self {
        Self::new()
    }
}

impl MoveBackend for ServerMove {
    fn frame(&self, id: WindowServerId) -> Option<CGRect> {
        self.directory.frame(id)
    }

    fn post_drag_event(
        &mut self,
        kind: DragEventKind,
        position: CGPoint,
        window: WindowServerId,
        pid: pid_t,
    ) -> Result<(), RepositionError> {
        event::post_item_drag_event(kind, position, window, pid)
            .map_err(|_| RepositionError::EventCreationFailed)
    }

    fn acquire_pointer(&mut self) -> Result<(), RepositionError> {
        let guard =
            PointerGuard::acquire().map_err(|_| RepositionError::EventCreationFailed)?;
        self.pointer = Some(guard);
        Ok(())
    }

    fn release_pointer(&mut self) {
        self.pointer.take();
    }
}
