//! Resolves a persisted layout item back to a live window handle.
//!
//! Tiered fallback: same-pass handle cache, then exact owner+title, then
//! owner identity alone (titles are volatile; clocks and counters rewrite
//! them constantly), then owner-process name for items that never had a
//! bundle identifier.

use std::collections::HashMap;

use tracing::trace;

use crate::model::layout::{LayoutItem, LayoutItemId, OwnerId};
use crate::sys::window_server::{MenuBarWindowInfo, WindowServerId};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MatchMethod {
    WindowHandleCache,
    ExactMatch,
    OwnerIdentityOnly,
    OwnerNameFallback,
    Spacer,
    NotFound,
}

#[derive(Debug, Clone)]
pub struct MatchResult {
    pub window: Option<MenuBarWindowInfo>,
    pub method: MatchMethod,
}

impl MatchResult {
    fn none(method: MatchMethod) -> Self {
        Self { window: None, method }
    }

    fn hit(window: &MenuBarWindowInfo, method: MatchMethod) -> Self {
        Self { window: Some(window.clone()), method }
    }
}

pub fn find_window(
    item: &LayoutItem,
    window_handle_cache: &HashMap<LayoutItemId, WindowServerId>,
    live: &[MenuBarWindowInfo],
) -> MatchResult {
    if item.is_spacer {
        return MatchResult::none(MatchMethod::Spacer);
    }

    if let Some(&cached) = window_handle_cache.get(&item.id)
        && let Some(window) = live.iter().find(|w| w.id == cached)
    {
        return MatchResult::hit(window, MatchMethod::WindowHandleCache);
    }

    if let Some(owner) = &item.owner {
        // Prefer the title-exact window when one owner has several icons.
        let candidates: Vec<&MenuBarWindowInfo> =
            live.iter().filter(|w| window_owner(w).as_ref() == Some(owner)).collect();
        if let Some(window) = candidates.iter().find(|w| w.title == item.title) {
            return MatchResult::hit(window, MatchMethod::ExactMatch);
        }
        if let Some(window) = candidates.first() {
            return MatchResult::hit(window, MatchMethod::OwnerIdentityOnly);
        }

        // The stored "identity" may be a bare process name; match it against
        // owner names even when the live window does report a bundle id.
        if let OwnerId::ProcessName(name) = owner {
            let by_name: Vec<&MenuBarWindowInfo> =
                live.iter().filter(|w| w.owner_name.as_deref() == Some(name)).collect();
            if let Some(window) =
                by_name.iter().find(|w| w.title == item.title).or_else(|| by_name.first())
            {
                return MatchResult::hit(window, MatchMethod::OwnerNameFallback);
            }
        }
    }

    trace!(item = %item.id, "no live window for layout item");
    MatchResult::none(MatchMethod::NotFound)
}

fn window_owner(window: &MenuBarWindowInfo) -> Option<OwnerId> {
    OwnerId::from_window(window.bundle_id.as_deref(), window.owner_name.as_deref())
}

#[cfg(test)]
mod tests {
    use objc2_core_foundation::{CGPoint, CGRect, CGSize};
    use pretty_assertions::assert_eq;

    use super::*;
    use crate::model::layout::{LayoutItem, Section};

    fn window(id: u32, bundle: Option<&str>, name: &str, title: Option<&str>) -> MenuBarWindowInfo {
        MenuBarWindowInfo {
            id: WindowServerId::new(id),
            pid: 500,
            layer: 25,
            frame: CGRect::new(CGPoint::new(0.0, 0.0), CGSize::new(30.0, 24.0)),
            owner_name: Some(name.to_owned()),
            bundle_id: bundle.map(str::to_owned),
            title: title.map(str::to_owned),
        }
    }

    fn item(owner: Option<OwnerId>, title: Option<&str>) -> LayoutItem {
        LayoutItem::icon(owner, title.map(str::to_owned), Section::Hidden)
    }

    #[test]
    fn spacer_short_circuits() {
        let spacer = LayoutItem::spacer(Section::Hidden, 0);
        let live = [window(1, Some("com.example.a"), "A", None)];
        let result = find_window(&spacer, &HashMap::new(), &live);
        assert_eq!(result.method, MatchMethod::Spacer);
        assert!(result.window.is_none());
    }

    #[test]
    fn cache_hit_beats_exact_match() {
        let it = item(Some(OwnerId::Bundle("com.example.a".into())), Some("A"));
        let exact = window(1, Some("com.example.a"), "A", Some("A"));
        let cached = window(2, Some("com.example.a"), "A", Some("A"));
        let cache = HashMap::from([(it.id, WindowServerId::new(2))]);

        let result = find_window(&it, &cache, &[exact, cached]);
        assert_eq!(result.method, MatchMethod::WindowHandleCache);
        assert_eq!(result.window.unwrap().id, WindowServerId::new(2));
    }

    #[test]
    fn stale_cache_entry_is_ignored() {
        let it = item(Some(OwnerId::Bundle("com.example.a".into())), Some("A"));
        let live = [window(1, Some("com.example.a"), "A", Some("A"))];
        let cache = HashMap::from([(it.id, WindowServerId::new(99))]);

        let result = find_window(&it, &cache, &live);
        assert_eq!(result.method, MatchMethod::ExactMatch);
        assert_eq!(result.window.unwrap().id, WindowServerId::new(1));
    }

    #[test]
    fn title_change_still_matches_by_identity() {
        let it = item(Some(OwnerId::Bundle("com.example.clock".into())), Some("12:00"));
        let live = [window(3, Some("com.example.clock"), "Clock", Some("12:01"))];

        let result = find_window(&it, &HashMap::new(), &live);
        assert_eq!(result.method, MatchMethod::OwnerIdentityOnly);
        assert_eq!(result.window.unwrap().id, WindowServerId::new(3));
    }

    #[test]
    fn same_identity_prefers_exact_title() {
        let it = item(Some(OwnerId::Bundle("com.example.multi".into())), Some("Two"));
        let live = [
            window(1, Some("com.example.multi"), "Multi", Some("One")),
            window(2, Some("com.example.multi"), "Multi", Some("Two")),
        ];

        let result = find_window(&it, &HashMap::new(), &live);
        assert_eq!(result.method, MatchMethod::ExactMatch);
        assert_eq!(result.window.unwrap().id, WindowServerId::new(2));
    }

    #[test]
    fn process_name_identity_falls_back_to_owner_name() {
        // Stored before the app gained a bundle id; live window now has one.
        let it = item(Some(OwnerId::ProcessName("LegacyTool".into())), None);
        let live = [window(7, Some("com.example.legacy"), "LegacyTool", Some("x"))];

        let result = find_window(&it, &HashMap::new(), &live);
        assert_eq!(result.method, MatchMethod::OwnerNameFallback);
        assert_eq!(result.window.unwrap().id, WindowServerId::new(7));
    }

    #[test]
    fn unmatched_item_is_not_found() {
        let it = item(Some(OwnerId::Bundle("com.example.gone".into())), None);
        let live = [window(1, Some("com.example.other"), "Other", None)];

        let result = find_window(&it, &HashMap::new(), &live);
        assert_eq!(result.method, MatchMethod::NotFound);
        assert!(result.window.is_none());
    }
}
