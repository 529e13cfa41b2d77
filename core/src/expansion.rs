//! Expand/collapse state for the main → peer → hourly hierarchy
//!
//! Two id sets are owned directly: expanded main groups and expanded peer
//! groups. Group ids encode their ancestry (`main-{m}-{d}` owns
//! `peer-{m}-{p}-{d}`), so collapsing a main can close its peers without a
//! parent lookup.
//!
//! Every mutation that actually changes a set records an [`ExpansionChange`].
//! The manager drains them after each operation and publishes them.

use hashbrown::HashSet;

/// Which set an [`ExpansionChange`] refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExpansionLevel {
    Main,
    Peer,
    All,
}

/// One effective expand/collapse. Bulk operations use `*` or
/// `peer-{body}-*` as the id.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExpansionChange {
    pub level: ExpansionLevel,
    pub id: String,
    pub expanded: bool,
}

impl ExpansionChange {
    fn new(level: ExpansionLevel, id: impl Into<String>, expanded: bool) -> Self {
        Self { level, id: id.into(), expanded }
    }
}

fn main_body(main_id: &str) -> &str {
    main_id.strip_prefix("main-").unwrap_or(main_id)
}

/// True when `peer_id` names a peer group under `main_id`.
///
/// The main body is `{m}-{d}` and owned peers look like `peer-{m}-{p}-{d}`,
/// so ownership means starting with `peer-{m}-` and ending with `-{d}`
/// without overlap. The peer part may be empty. Sanitized parts may contain
/// `-`, so every split point of the body is tried.
pub fn peer_belongs_to(peer_id: &str, main_id: &str) -> bool {
    let body = main_body(main_id);
    let Some(rest) = peer_id.strip_prefix("peer-") else {
        return false;
    };
    body.match_indices('-').any(|(i, _)| {
        let (main, dest) = (&body[..i], &body[i + 1..]);
        rest.len() >= main.len() + dest.len() + 2
            && rest.strip_prefix(main).is_some_and(|r| r.starts_with('-'))
            && rest.strip_suffix(dest).is_some_and(|r| r.ends_with('-'))
    })
}

#[derive(Debug, Default)]
pub struct ExpansionState {
    main_expanded: HashSet<String>,
    peer_expanded: HashSet<String>,
    changes: Vec<ExpansionChange>,
}

impl ExpansionState {
    pub fn new() -> Self {
        Self::default()
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Queries
    // ─────────────────────────────────────────────────────────────────────────

    pub fn is_main_expanded(&self, id: &str) -> bool {
        self.main_expanded.contains(id)
    }

    pub fn is_peer_expanded(&self, id: &str) -> bool {
        self.peer_expanded.contains(id)
    }

    pub fn main_count(&self) -> usize {
        self.main_expanded.len()
    }

    pub fn peer_count(&self) -> usize {
        self.peer_expanded.len()
    }

    pub fn expanded_mains(&self) -> impl Iterator<Item = &str> {
        self.main_expanded.iter().map(String::as_str)
    }

    pub fn expanded_peers(&self) -> impl Iterator<Item = &str> {
        self.peer_expanded.iter().map(String::as_str)
    }

    /// True when any main or peer group is open.
    pub fn any_expanded(&self) -> bool {
        !self.main_expanded.is_empty() || !self.peer_expanded.is_empty()
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Main level
    // ─────────────────────────────────────────────────────────────────────────

    pub fn expand_main(&mut self, id: &str) {
        if self.main_expanded.insert(id.to_string()) {
            self.changes.push(ExpansionChange::new(ExpansionLevel::Main, id, true));
        }
    }

    /// Collapse a main group and every peer group under it.
    pub fn collapse_main(&mut self, id: &str) {
        if self.main_expanded.remove(id) {
            self.peer_expanded.retain(|pid| !peer_belongs_to(pid, id));
            self.changes.push(ExpansionChange::new(ExpansionLevel::Main, id, false));
        }
    }

    pub fn toggle_main(&mut self, id: &str) {
        if self.is_main_expanded(id) {
            self.collapse_main(id);
        } else {
            self.expand_main(id);
        }
    }

    pub fn expand_all_main<'a>(&mut self, ids: impl IntoIterator<Item = &'a str>) {
        let mut changed = 0usize;
        for id in ids {
            if self.main_expanded.insert(id.to_string()) {
                changed += 1;
            }
        }
        if changed > 0 {
            self.changes.push(ExpansionChange::new(ExpansionLevel::Main, "*", true));
        }
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Peer level
    // ─────────────────────────────────────────────────────────────────────────

    pub fn expand_peer(&mut self, id: &str) {
        if self.peer_expanded.insert(id.to_string()) {
            self.changes.push(ExpansionChange::new(ExpansionLevel::Peer, id, true));
        }
    }

    pub fn collapse_peer(&mut self, id: &str) {
        if self.peer_expanded.remove(id) {
            self.changes.push(ExpansionChange::new(ExpansionLevel::Peer, id, false));
        }
    }

    pub fn toggle_peer(&mut self, id: &str) {
        if self.is_peer_expanded(id) {
            self.collapse_peer(id);
        } else {
            self.expand_peer(id);
        }
    }

    /// Close every peer group under `main_id`, leaving the main itself alone.
    /// Returns how many peers were closed.
    pub fn close_peers_under_main(&mut self, main_id: &str) -> usize {
        let before = self.peer_expanded.len();
        self.peer_expanded.retain(|pid| !peer_belongs_to(pid, main_id));
        let removed = before - self.peer_expanded.len();
        if removed > 0 {
            let id = format!("peer-{}-*", main_body(main_id));
            self.changes.push(ExpansionChange::new(ExpansionLevel::Peer, id, false));
        }
        removed
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Bulk
    // ─────────────────────────────────────────────────────────────────────────

    pub fn collapse_all(&mut self) {
        if self.any_expanded() {
            self.main_expanded.clear();
            self.peer_expanded.clear();
            self.changes.push(ExpansionChange::new(ExpansionLevel::All, "*", false));
        }
    }

    /// Take the changes recorded since the last drain.
    pub fn drain_changes(&mut self) -> Vec<ExpansionChange> {
        std::mem::take(&mut self.changes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn collapse_main_cascades_to_its_peers_only() {
        let mut state = ExpansionState::new();
        state.expand_main("main-Acme-US");
        state.expand_peer("peer-Acme-CarrierX-US");
        state.expand_peer("peer-Acme-CarrierY-US");
        state.expand_peer("peer-Other-CarrierX-US");

        state.collapse_main("main-Acme-US");

        assert!(!state.is_main_expanded("main-Acme-US"));
        assert!(!state.is_peer_expanded("peer-Acme-CarrierX-US"));
        assert!(!state.is_peer_expanded("peer-Acme-CarrierY-US"));
        assert!(state.is_peer_expanded("peer-Other-CarrierX-US"));
    }

    #[test]
    fn only_effective_mutations_record_changes() {
        let mut state = ExpansionState::new();
        state.expand_main("main-a-b");
        state.expand_main("main-a-b");
        state.collapse_peer("peer-a-x-b");
        state.collapse_all();
        state.collapse_all();

        let changes = state.drain_changes();
        assert_eq!(
            changes,
            vec![
                ExpansionChange::new(ExpansionLevel::Main, "main-a-b", true),
                ExpansionChange::new(ExpansionLevel::All, "*", false),
            ]
        );
        assert!(state.drain_changes().is_empty());
    }

    #[test]
    fn toggles_flip_membership() {
        let mut state = ExpansionState::new();
        state.toggle_main("main-a-b");
        assert!(state.is_main_expanded("main-a-b"));
        state.toggle_main("main-a-b");
        assert!(!state.is_main_expanded("main-a-b"));

        state.toggle_peer("peer-a-x-b");
        assert_eq!(state.peer_count(), 1);
        state.toggle_peer("peer-a-x-b");
        assert_eq!(state.peer_count(), 0);
    }

    #[test]
    fn close_peers_under_main_uses_wildcard_id() {
        let mut state = ExpansionState::new();
        state.expand_main("main-a-b");
        state.expand_peer("peer-a-x-b");
        state.expand_peer("peer-a-y-b");
        state.drain_changes();

        assert_eq!(state.close_peers_under_main("main-a-b"), 2);
        assert!(state.is_main_expanded("main-a-b"));
        assert_eq!(
            state.drain_changes(),
            vec![ExpansionChange::new(ExpansionLevel::Peer, "peer-a-b-*", false)]
        );
        assert_eq!(state.close_peers_under_main("main-a-b"), 0);
        assert!(state.drain_changes().is_empty());
    }

    #[test]
    fn peer_ownership_handles_dashed_parts() {
        assert!(peer_belongs_to("peer-Acme-Carrier-X-US", "main-Acme-US"));
        assert!(peer_belongs_to("peer-New-York-X-US-East", "main-New-York-US-East"));
        assert!(peer_belongs_to("peer-a--b", "main-a-b"));
        assert!(!peer_belongs_to("peer-Acme-X-UK", "main-Acme-US"));
        assert!(!peer_belongs_to("peer-AcmeCorp-X-US", "main-Acme-US"));
        assert!(!peer_belongs_to("main-Acme-X-US", "main-Acme-US"));
    }

    #[test]
    fn expand_all_records_single_bulk_change() {
        let mut state = ExpansionState::new();
        state.expand_all_main(["main-a-b", "main-c-d"]);
        assert_eq!(state.main_count(), 2);
        let mut ids: Vec<&str> = state.expanded_mains().collect();
        ids.sort_unstable();
        assert_eq!(ids, ["main-a-b", "main-c-d"]);
        assert_eq!(state.expanded_peers().count(), 0);
        assert_eq!(
            state.drain_changes(),
            vec![ExpansionChange::new(ExpansionLevel::Main, "*", true)]
        );

        state.expand_all_main(["main-a-b"]);
        assert!(state.drain_changes().is_empty());
    }
}
