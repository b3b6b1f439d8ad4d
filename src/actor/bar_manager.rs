//! The single serialized execution context for capture and move operations.
//!
//! All engine work funnels through one actor task; a request arriving while
//! another operation is in flight is rejected with [`Error::Busy`] rather
//! than queued. Every operation runs under a child cancellation token so an
//! external cancel unwinds polling loops promptly.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use thiserror::Error;
use tokio::sync::oneshot;
use tokio_util::sync::CancellationToken;
use tracing::{Instrument, debug, info_span, warn};

use crate::actor::{self, Receiver};
use crate::common::config::Settings;
use crate::icon_engine::capture::{
    CaptureBackend, CaptureError, IconCaptureEngine, ServerCapture,
};
use crate::icon_engine::matcher;
use crate::icon_engine::reconcile::{self, ReconciliationResult};
use crate::icon_engine::reposition::{
    IconRepositioningEngine, MoveBackend, MoveDestination, MoveOutcome, RepositionError,
    ServerMove,
};
use crate::model::layout::{LayoutItem, LayoutItemId, LayoutStore};
use crate::sys::window_server::{WindowDirectory, WindowServerId, WindowSource};

#[derive(Debug, Error)]
pub enum Error {
    #[error("another operation is already in flight")]
    Busy,
    #[error("bar manager is shutting down")]
    Shutdown,
    #[error("operation was cancelled")]
    Cancelled,
    #[error("no layout item with id {0}")]
    ItemNotFound(LayoutItemId),
    #[error("no live window could be resolved for item {0}")]
    WindowUnresolved(LayoutItemId),
    #[error(transparent)]
    Capture(#[from] CaptureError),
    #[error(transparent)]
    Reposition(#[from] RepositionError),
    #[error("layout store failed: {0}")]
    Store(String),
}

/// Which edge of an anchor item the moved item should land on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MoveTarget {
    LeftOf(LayoutItemId),
    RightOf(LayoutItemId),
}

#[derive(Debug, Clone)]
pub struct RefreshSummary {
    pub items: Vec<LayoutItem>,
    pub matched_overrides: usize,
    pub newly_positioned: usize,
}

pub enum Request {
    Refresh {
        separator_x: f64,
        always_hidden_separator_x: Option<f64>,
        reply: oneshot::Sender<Result<RefreshSummary, Error>>,
    },
    MoveItem {
        item: LayoutItemId,
        target: MoveTarget,
        reply: oneshot::Sender<Result<MoveOutcome, Error>>,
    },
}

/// Cloneable front door to the actor. Holds the in-flight gate so a second
/// caller is rejected before anything is enqueued.
#[derive(Clone)]
pub struct BarManagerHandle {
    tx: actor::Sender<Request>,
    in_flight: Arc<AtomicBool>,
    shutdown: CancellationToken,
}

impl BarManagerHandle {
    pub async fn refresh(
        &self,
        separator_x: f64,
        always_hidden_separator_x: Option<f64>,
    ) -> Result<RefreshSummary, Error> {
        self.begin()?;
        let (reply, rx) = oneshot::channel();
        self.tx.send(Request::Refresh { separator_x, always_hidden_separator_x, reply });
        rx.await.map_err(|_| Error::Shutdown)?
    }

    pub async fn move_item(
        &self,
        item: LayoutItemId,
        target: MoveTarget,
    ) -> Result<MoveOutcome, Error> {
        self.begin()?;
        let (reply, rx) = oneshot::channel();
        self.tx.send(Request::MoveItem { item, target, reply });
        rx.await.map_err(|_| Error::Shutdown)?
    }

    /// Cancels the operation in flight (if any) and all future ones.
    pub fn shutdown(&self) {
        self.shutdown.cancel();
    }

    fn begin(&self) -> Result<(), Error> {
        self.in_flight
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .map_err(|_| Error::Busy)?;
        Ok(())
    }
}

pub struct BarManager<S, W = WindowDirectory, C = ServerCapture, M = ServerMove>
where
    S: LayoutStore,
    W: WindowSource,
    C: CaptureBackend,
    M: MoveBackend,
{
    rx: Receiver<Request>,
    windows: W,
    capture: IconCaptureEngine<C>,
    reposition: IconRepositioningEngine<M>,
    store: S,
    settings: Settings,
    /// Handle cache from the most recent reconciliation pass. Replaced
    /// wholesale on every refresh, never merged.
    window_handles: HashMap<LayoutItemId, WindowServerId>,
    in_flight: Arc<AtomicBool>,
    shutdown: CancellationToken,
}

impl<S: LayoutStore> BarManager<S> {
    pub fn new(settings: Settings, store: S) -> (Self, BarManagerHandle) {
        let tuning = settings.reposition_tuning();
        Self::with_backends(
            settings,
            store,
            WindowDirectory::new(),
            IconCaptureEngine::new(),
            IconRepositioningEngine::new(tuning),
        )
    }
}

impl<S, W, C, M> BarManager<S, W, C, M>
where
    S: LayoutStore,
    W: WindowSource,
    C: CaptureBackend,
    M: MoveBackend,
{
    pub fn with_backends(
        settings: Settings,
        store: S,
        windows: W,
        capture: IconCaptureEngine<C>,
        reposition: IconRepositioningEngine<M>,
    ) -> (Self, BarManagerHandle) {
        let (tx, rx) = actor::channel();
        let in_flight = Arc::new(AtomicBool::new(false));
        let shutdown = CancellationToken::new();
        let handle = BarManagerHandle {
            tx,
            in_flight: in_flight.clone(),
            shutdown: shutdown.clone(),
        };
        let manager = Self {
            rx,
            windows,
            capture,
            reposition,
            store,
            settings,
            window_handles: HashMap::new(),
            in_flight,
            shutdown,
        };
        (manager, handle)
    }

    pub async fn run(mut self) {
        while let Some((span, request)) = self.rx.recv().await {
            match request {
                Request::Refresh { separator_x, always_hidden_separator_x, reply } => {
                    let result = self
                        .refresh_once(separator_x, always_hidden_separator_x)
                        .instrument(span.in_scope(|| info_span!("refresh")))
                        .await;
                    _ = reply.send(result);
                }
                Request::MoveItem { item, target, reply } => {
                    let result = self
                        .move_item_once(item, target)
                        .instrument(span.in_scope(|| info_span!("move_item", item = %item)))
                        .await;
                    _ = reply.send(result);
                }
            }
            self.in_flight.store(false, Ordering::Release);
        }
    }

    async fn refresh_once(
        &mut self,
        separator_x: f64,
        always_hidden_separator_x: Option<f64>,
    ) -> Result<RefreshSummary, Error> {
        let cancel = self.shutdown.child_token();

        // Let the panel finish rendering before the compositor snapshot.
        tokio::select! {
            _ = cancel.cancelled() => return Err(Error::Cancelled),
            _ = tokio::time::sleep(self.settings.panel_settle()) => {}
        }

        let windows = self
            .windows
            .list_menu_bar_windows(self.settings.on_screen_only, self.settings.active_space_only);
        let captured = self.capture.capture(&windows, separator_x, always_hidden_separator_x)?;
        let saved = self.store.read().map_err(|err| Error::Store(err.to_string()))?;

        let ReconciliationResult {
            items,
            matched_overrides,
            newly_positioned,
            window_handles,
        } = reconcile::reconcile(&captured.icons, &saved);

        self.store.write(&items).map_err(|err| Error::Store(err.to_string()))?;
        self.window_handles = window_handles;

        debug!(items = items.len(), "refresh pass complete");
        Ok(RefreshSummary { items, matched_overrides, newly_positioned })
    }

    async fn move_item_once(
        &mut self,
        item_id: LayoutItemId,
        target: MoveTarget,
    ) -> Result<MoveOutcome, Error> {
        let cancel = self.shutdown.child_token();

        let saved = self.store.read().map_err(|err| Error::Store(err.to_string()))?;
        let item = saved
            .iter()
            .find(|item| item.id == item_id)
            .ok_or(Error::ItemNotFound(item_id))?;
        let (anchor_id, left_of) = match target {
            MoveTarget::LeftOf(anchor) => (anchor, true),
            MoveTarget::RightOf(anchor) => (anchor, false),
        };
        let anchor = saved
            .iter()
            .find(|item| item.id == anchor_id)
            .ok_or(Error::ItemNotFound(anchor_id))?;

        let live = self
            .windows
            .list_menu_bar_windows(self.settings.on_screen_only, self.settings.active_space_only);

        let source = matcher::find_window(item, &self.window_handles, &live)
            .window
            .ok_or(Error::WindowUnresolved(item_id))?;
        let anchor_window = matcher::find_window(anchor, &self.window_handles, &live)
            .window
            .ok_or(Error::WindowUnresolved(anchor_id))?;

        let destination = if left_of {
            MoveDestination::LeftOf(anchor_window.id)
        } else {
            MoveDestination::RightOf(anchor_window.id)
        };

        let outcome = self.reposition.reposition(item, &source, destination, &cancel).await;
        if let Err(err) = &outcome {
            warn!(item = %item_id, ?err, "move failed");
        }
        Ok(outcome?)
    }
}

#[cfg(test)]
mod tests {
    use std::cell::RefCell;

    use objc2_core_foundation::{CGPoint, CGRect, CGSize};
    use pretty_assertions::assert_eq;
    use test_log::test;

    use super::*;
    use crate::icon_engine::capture::test_support::{FakeBackend, FakeImage};
    use crate::model::layout::{OwnerId, Section};
    use crate::sys::window_server::MenuBarWindowInfo;

    #[derive(Default)]
    struct MemoryStore(RefCell<Vec<LayoutItem>>);

    impl LayoutStore for MemoryStore {
        fn read(&self) -> anyhow::Result<Vec<LayoutItem>> {
            Ok(self.0.borrow().clone())
        }

        fn write(&self, items: &[LayoutItem]) -> anyhow::Result<()> {
            *self.0.borrow_mut() = items.to_vec();
            Ok(())
        }
    }

    struct FakeWindows(Vec<MenuBarWindowInfo>);

    impl WindowSource for FakeWindows {
        fn list_menu_bar_windows(&self, _: bool, _: bool) -> Vec<MenuBarWindowInfo> {
            self.0.clone()
        }
    }

    fn window(id: u32, x: f64, bundle: &str) -> MenuBarWindowInfo {
        MenuBarWindowInfo {
            id: WindowServerId::new(id),
            pid: 100,
            layer: 25,
            frame: CGRect::new(CGPoint::new(x, 0.0), CGSize::new(30.0, 24.0)),
            owner_name: Some(bundle.to_owned()),
            bundle_id: Some(bundle.to_owned()),
            title: None,
        }
    }

    fn manager(
        windows: Vec<MenuBarWindowInfo>,
        composite_width: usize,
    ) -> (
        BarManager<
            MemoryStore,
            FakeWindows,
            FakeBackend,
            crate::icon_engine::reposition::ServerMove,
        >,
        BarManagerHandle,
    ) {
        let settings = Settings { panel_settle_ms: 0, ..Default::default() };
        let backend = FakeBackend {
            composite: Some(FakeImage { width: composite_width, height: 48 }),
            ..Default::default()
        };
        BarManager::with_backends(
            settings.clone(),
            MemoryStore::default(),
            FakeWindows(windows),
            IconCaptureEngine::with_backend(backend),
            IconRepositioningEngine::new(settings.reposition_tuning()),
        )
    }

    #[test(tokio::test(start_paused = true))]
    async fn refresh_persists_reconciled_layout_and_rebuilds_cache() {
        // Two 30pt windows at 2x scale: 120px composite passes validation.
        let (mut manager, _handle) = manager(
            vec![window(1, 100.0, "com.example.a"), window(2, 600.0, "com.example.b")],
            120,
        );

        let summary = manager.refresh_once(500.0, None).await.unwrap();
        assert_eq!(summary.items.len(), 2);
        assert_eq!(summary.newly_positioned, 2);
        assert_eq!(manager.window_handles.len(), 2);

        let persisted = manager.store.read().unwrap();
        assert_eq!(persisted, summary.items);

        // A second pass replaces the cache rather than merging into it.
        let summary = manager.refresh_once(500.0, None).await.unwrap();
        assert_eq!(summary.items.len(), 2);
        assert_eq!(manager.window_handles.len(), 2);
    }

    #[test(tokio::test(start_paused = true))]
    async fn in_flight_gate_rejects_concurrent_requests() {
        let (_manager, handle) = manager(Vec::new(), 0);

        handle.begin().unwrap();
        assert!(matches!(handle.begin(), Err(Error::Busy)));
    }

    #[test(tokio::test(start_paused = true))]
    async fn move_of_unknown_item_is_reported() {
        let (mut manager, _handle) = manager(Vec::new(), 0);
        let ghost = LayoutItem::icon(
            Some(OwnerId::Bundle("com.example.ghost".into())),
            None,
            Section::Hidden,
        );

        let err = manager
            .move_item_once(ghost.id, MoveTarget::LeftOf(ghost.id))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::ItemNotFound(id) if id == ghost.id));
    }
}
