//! Persisted layout shapes. The reconciler produces these and an external
//! store keeps them across runs; nothing in here touches storage internals
//! except the provided JSON file store.

use std::fmt;
use std::path::PathBuf;

use anyhow::Context;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Logical grouping of icons by separator threshold.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Section {
    Visible,
    Hidden,
    AlwaysHidden,
}

/// Identity of the process that owns an icon. Bundle identifiers are stable
/// across restarts; a process name is the weaker stand-in used when an app has
/// no bundle id.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OwnerId {
    Bundle(String),
    ProcessName(String),
}

impl OwnerId {
    pub fn from_window(bundle_id: Option<&str>, owner_name: Option<&str>) -> Option<OwnerId> {
        match (bundle_id, owner_name) {
            (Some(bundle), _) => Some(OwnerId::Bundle(bundle.to_owned())),
            (None, Some(name)) => Some(OwnerId::ProcessName(name.to_owned())),
            (None, None) => None,
        }
    }

    pub fn is_process_name(&self) -> bool {
        matches!(self, OwnerId::ProcessName(_))
    }
}

impl fmt::Display for OwnerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OwnerId::Bundle(s) | OwnerId::ProcessName(s) => f.write_str(s),
        }
    }
}

/// Stable identifier for one layout item, persisted across app runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct LayoutItemId(Uuid);

impl LayoutItemId {
    pub fn mint() -> Self {
        Self(Uuid::new_v4())
    }
}

impl fmt::Display for LayoutItemId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// One persisted record describing an icon's identity, section and order.
/// `order` is sequential and 0-based within a section.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LayoutItem {
    pub id: LayoutItemId,
    pub owner: Option<OwnerId>,
    pub title: Option<String>,
    pub section: Section,
    pub order: u32,
    #[serde(default)]
    pub is_spacer: bool,
}

impl LayoutItem {
    pub fn icon(owner: Option<OwnerId>, title: Option<String>, section: Section) -> Self {
        Self {
            id: LayoutItemId::mint(),
            owner,
            title,
            section,
            order: 0,
            is_spacer: false,
        }
    }

    /// A user-inserted blank position. Spacers never correspond to a live
    /// window.
    pub fn spacer(section: Section, order: u32) -> Self {
        Self {
            id: LayoutItemId::mint(),
            owner: None,
            title: None,
            section,
            order,
            is_spacer: true,
        }
    }
}

/// Seam to the persisted layout store. The reconciler only ever sees the
/// in-memory shape.
pub trait LayoutStore {
    fn read(&self) -> anyhow::Result<Vec<LayoutItem>>;
    fn write(&self, items: &[LayoutItem]) -> anyhow::Result<()>;
}

/// Layout persisted as a JSON file, written via a temp file and rename so a
/// crash mid-write never truncates the previous layout.
pub struct JsonFileStore {
    path: PathBuf,
}

impl JsonFileStore {
    pub fn new(path: PathBuf) -> Self {
        Self { path }
    }
}

impl LayoutStore for JsonFileStore {
    fn read(&self) -> anyhow::Result<Vec<LayoutItem>> {
        if !self.path.exists() {
            return Ok(Vec::new());
        }
        let raw = std::fs::read_to_string(&self.path)
            .with_context(|| format!("reading layout from {}", self.path.display()))?;
        serde_json::from_str(&raw)
            .with_context(|| format!("parsing layout from {}", self.path.display()))
    }

    fn write(&self, items: &[LayoutItem]) -> anyhow::Result<()> {
        let raw = serde_json::to_string_pretty(items)?;
        let tmp = self.path.with_extension("json.tmp");
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(&tmp, raw)?;
        std::fs::rename(&tmp, &self.path)
            .with_context(|| format!("replacing layout at {}", self.path.display()))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    #[test]
    fn owner_id_prefers_bundle_over_process_name() {
        let owner = OwnerId::from_window(Some("com.example.App"), Some("Example"));
        assert_eq!(owner, Some(OwnerId::Bundle("com.example.App".into())));

        let fallback = OwnerId::from_window(None, Some("Example"));
        assert_eq!(fallback, Some(OwnerId::ProcessName("Example".into())));

        assert_eq!(OwnerId::from_window(None, None), None);
    }

    #[test]
    fn json_store_round_trips_and_survives_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonFileStore::new(dir.path().join("layout.json"));

        assert_eq!(store.read().unwrap(), Vec::new());

        let items = vec![
            LayoutItem::icon(
                Some(OwnerId::Bundle("com.example.App".into())),
                Some("Item".into()),
                Section::Hidden,
            ),
            LayoutItem::spacer(Section::Visible, 1),
        ];
        store.write(&items).unwrap();
        assert_eq!(store.read().unwrap(), items);
    }
}
