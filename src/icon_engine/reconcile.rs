//! Merges freshly captured icons with the previously saved layout.
//!
//! Captured x-order is the source of truth for positioning; the saved layout
//! contributes identities, deliberate section overrides and spacers. The
//! window-handle cache is rebuilt from scratch on every pass.

use std::collections::HashMap;

use tracing::debug;

use crate::icon_engine::capture::CapturedIcon;
use crate::model::layout::{LayoutItem, LayoutItemId, OwnerId, Section};
use crate::sys::window_server::WindowServerId;

const SECTIONS: [Section; 3] = [Section::Visible, Section::Hidden, Section::AlwaysHidden];

#[derive(Debug, Clone, Default)]
pub struct ReconciliationResult {
    /// Ordered by section (visible, hidden, always-hidden), then by order.
    pub items: Vec<LayoutItem>,
    /// Items whose saved section was kept as a user override.
    pub matched_overrides: usize,
    /// Items positioned from capture, whether or not a saved identity matched.
    pub newly_positioned: usize,
    /// Same-pass acceleration hint from item id to the window it was captured
    /// from. Never carried across passes.
    pub window_handles: HashMap<LayoutItemId, WindowServerId>,
}

pub fn reconcile<I>(captured: &[CapturedIcon<I>], saved: &[LayoutItem]) -> ReconciliationResult {
    let mut result = ReconciliationResult::default();
    let mut used = vec![false; saved.len()];

    // Captured physical order wins over whatever order values the save holds;
    // the user may have dragged icons since the layout was written.
    let mut ordered: Vec<&CapturedIcon<I>> = captured.iter().collect();
    ordered.sort_by(|a, b| a.frame.origin.x.total_cmp(&b.frame.origin.x));

    let mut buckets: HashMap<Section, Vec<LayoutItem>> = HashMap::new();

    for icon in ordered {
        let matched = find_saved(icon, saved, &used);
        let (id, section) = match matched {
            Some(idx) => {
                used[idx] = true;
                let prior = &saved[idx];
                if prior.section != icon.section {
                    // Saved section differing from the live one is a
                    // deliberate user choice; keep it.
                    result.matched_overrides += 1;
                    (prior.id, prior.section)
                } else {
                    result.newly_positioned += 1;
                    (prior.id, icon.section)
                }
            }
            None => {
                result.newly_positioned += 1;
                (LayoutItemId::mint(), icon.section)
            }
        };

        if let Some(window) = icon.window {
            result.window_handles.insert(id, window);
        }
        buckets.entry(section).or_default().push(LayoutItem {
            id,
            owner: icon.owner.clone(),
            title: icon.title.clone(),
            section,
            order: 0,
            is_spacer: false,
        });
    }

    // Spacers survive verbatim at their recorded section and slot.
    let mut spacers: Vec<&LayoutItem> = saved.iter().filter(|item| item.is_spacer).collect();
    spacers.sort_by_key(|spacer| (spacer.section as usize, spacer.order));
    for spacer in spacers {
        let bucket = buckets.entry(spacer.section).or_default();
        let slot = (spacer.order as usize).min(bucket.len());
        bucket.insert(slot, spacer.clone());
    }

    for section in SECTIONS {
        let Some(bucket) = buckets.remove(&section) else { continue };
        for (order, mut item) in bucket.into_iter().enumerate() {
            item.order = order as u32;
            item.section = section;
            result.items.push(item);
        }
    }

    debug!(
        items = result.items.len(),
        overrides = result.matched_overrides,
        new = result.newly_positioned,
        "reconciled layout"
    );
    result
}

/// Owner-identity match against the unconsumed saved items, title-insensitive,
/// preferring a title-equal candidate when one owner has several.
fn find_saved<I>(icon: &CapturedIcon<I>, saved: &[LayoutItem], used: &[bool]) -> Option<usize> {
    let candidates: Vec<usize> = saved
        .iter()
        .enumerate()
        .filter(|&(idx, item)| !used[idx] && !item.is_spacer && identity_matches(icon, item))
        .map(|(idx, _)| idx)
        .collect();

    candidates
        .iter()
        .copied()
        .find(|&idx| saved[idx].title == icon.title)
        .or_else(|| candidates.first().copied())
}

fn identity_matches<I>(icon: &CapturedIcon<I>, item: &LayoutItem) -> bool {
    let Some(saved_owner) = &item.owner else { return false };
    match (&icon.owner, saved_owner) {
        (Some(captured), saved) if captured == saved => true,
        // A layout written before the app had a bundle id stores the process
        // name; keep matching it against the live owner name.
        (_, OwnerId::ProcessName(name)) => icon.owner_name.as_deref() == Some(name.as_str()),
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use objc2_core_foundation::{CGPoint, CGRect, CGSize};
    use pretty_assertions::assert_eq;

    use super::*;
    use crate::icon_engine::capture::test_support::FakeImage;

    fn icon(id: u32, x: f64, bundle: &str, section: Section) -> CapturedIcon<FakeImage> {
        CapturedIcon {
            window: Some(WindowServerId::new(id)),
            image: FakeImage { width: 60, height: 48 },
            frame: CGRect::new(CGPoint::new(x, 0.0), CGSize::new(30.0, 24.0)),
            owner: Some(OwnerId::Bundle(bundle.to_owned())),
            owner_name: Some(bundle.to_owned()),
            title: None,
            section,
        }
    }

    fn saved_icon(bundle: &str, section: Section, order: u32) -> LayoutItem {
        let mut item =
            LayoutItem::icon(Some(OwnerId::Bundle(bundle.to_owned())), None, section);
        item.order = order;
        item
    }

    #[test]
    fn matched_items_keep_their_saved_ids() {
        let saved = vec![saved_icon("com.example.a", Section::Hidden, 0)];
        let captured = [icon(1, 100.0, "com.example.a", Section::Hidden)];

        let result = reconcile(&captured, &saved);
        assert_eq!(result.items.len(), 1);
        assert_eq!(result.items[0].id, saved[0].id);
        assert_eq!(result.window_handles[&saved[0].id], WindowServerId::new(1));
    }

    #[test]
    fn override_counter_only_moves_on_section_difference() {
        let saved = vec![
            saved_icon("com.example.a", Section::AlwaysHidden, 0),
            saved_icon("com.example.b", Section::Hidden, 0),
        ];
        let captured = [
            icon(1, 100.0, "com.example.a", Section::Hidden),
            icon(2, 150.0, "com.example.b", Section::Hidden),
        ];

        let result = reconcile(&captured, &saved);
        assert_eq!(result.matched_overrides, 1);
        assert_eq!(result.newly_positioned, 1);

        let a = result.items.iter().find(|i| i.id == saved[0].id).unwrap();
        assert_eq!(a.section, Section::AlwaysHidden);
        let b = result.items.iter().find(|i| i.id == saved[1].id).unwrap();
        assert_eq!(b.section, Section::Hidden);
    }

    #[test]
    fn saved_items_are_consumed_at_most_once() {
        // Two captured icons from one owner, one saved record: the second
        // capture mints a fresh id instead of reusing the same save twice.
        let saved = vec![saved_icon("com.example.multi", Section::Hidden, 0)];
        let captured = [
            icon(1, 100.0, "com.example.multi", Section::Hidden),
            icon(2, 150.0, "com.example.multi", Section::Hidden),
        ];

        let result = reconcile(&captured, &saved);
        assert_eq!(result.items.len(), 2);
        assert_eq!(result.items.iter().filter(|i| i.id == saved[0].id).count(), 1);
        assert_eq!(result.window_handles.len(), 2);
    }

    #[test]
    fn process_name_identity_still_matches_after_bundle_id_appears() {
        let saved = vec![LayoutItem::icon(
            Some(OwnerId::ProcessName("LegacyTool".into())),
            None,
            Section::Hidden,
        )];
        let mut captured = icon(1, 100.0, "com.example.legacy", Section::Hidden);
        captured.owner_name = Some("LegacyTool".into());

        let result = reconcile(&[captured], &saved);
        assert_eq!(result.items[0].id, saved[0].id);
        // Identity is refreshed to the stronger bundle form.
        assert_eq!(
            result.items[0].owner,
            Some(OwnerId::Bundle("com.example.legacy".into()))
        );
    }

    #[test]
    fn fallback_icons_without_identity_mint_new_items() {
        let saved = vec![saved_icon("com.example.a", Section::Hidden, 0)];
        let captured = [CapturedIcon {
            window: None,
            image: FakeImage { width: 60, height: 48 },
            frame: CGRect::new(CGPoint::new(10.0, 0.0), CGSize::new(30.0, 24.0)),
            owner: None,
            owner_name: None,
            title: None,
            section: Section::Hidden,
        }];

        let result = reconcile(&captured, &saved);
        assert_eq!(result.items.len(), 1);
        assert_ne!(result.items[0].id, saved[0].id);
        assert!(result.window_handles.is_empty());
    }
}
