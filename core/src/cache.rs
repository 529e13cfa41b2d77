//! Signature-keyed memo caches for the visible-list computation
//!
//! Each cache is only valid for the filter/sort [`Signature`] it was filled
//! under. Checking the live signature is the single invalidation trigger;
//! expanding or collapsing a group never touches these caches.

use std::sync::Arc;

use hashbrown::HashMap;
use routegrid_types::{SortSpec, TableState};

use crate::filter::FilterSet;
use crate::sort::normalize_multi_sort;

/// Structured cache key: normalized filters plus normalized sort order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Signature {
    pub filters: FilterSet,
    pub multi_sort: Vec<SortSpec>,
}

impl Signature {
    pub fn from_state(state: &TableState) -> Self {
        Self {
            filters: FilterSet::from_state(state),
            multi_sort: normalize_multi_sort(&state.multi_sort),
        }
    }
}

/// Per-group values computed under one signature.
#[derive(Debug)]
pub struct SignatureCache<V> {
    entries: HashMap<Arc<str>, V>,
}

impl<V> Default for SignatureCache<V> {
    fn default() -> Self {
        Self { entries: HashMap::new() }
    }
}

impl<V: Clone> SignatureCache<V> {
    pub fn get(&self, group_id: &str) -> Option<V> {
        self.entries.get(group_id).cloned()
    }

    pub fn insert(&mut self, group_id: Arc<str>, value: V) {
        self.entries.insert(group_id, value);
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }
}

/// The three caches behind [`crate::visible`], plus the signature they share.
#[derive(Debug, Default)]
pub struct CacheSet {
    signature: Option<Signature>,
    /// Main group id → passes its own filters.
    pub main_pass: SignatureCache<bool>,
    /// Main group id → filtered, sorted, deduplicated peer row indices.
    pub peer_children: SignatureCache<Arc<[usize]>>,
    /// Peer group id → filtered, sorted, deduplicated hourly row indices.
    pub hourly_children: SignatureCache<Arc<[usize]>>,
}

impl CacheSet {
    /// Make the caches valid for `signature`, clearing them if it changed.
    /// Returns true when a reset happened.
    pub fn ensure(&mut self, signature: &Signature) -> bool {
        if self.signature.as_ref() == Some(signature) {
            return false;
        }
        let had_entries = !self.is_empty();
        self.clear_entries();
        self.signature = Some(signature.clone());
        if had_entries {
            tracing::debug!("Filter/sort signature changed, caches cleared");
        }
        true
    }

    /// Drop everything, including the remembered signature. Used on dataset load.
    pub fn reset(&mut self) {
        self.clear_entries();
        self.signature = None;
    }

    pub fn signature(&self) -> Option<&Signature> {
        self.signature.as_ref()
    }

    pub fn is_empty(&self) -> bool {
        self.main_pass.is_empty() && self.peer_children.is_empty() && self.hourly_children.is_empty()
    }

    fn clear_entries(&mut self) {
        self.main_pass.clear();
        self.peer_children.clear();
        self.hourly_children.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn signature_ignores_whitespace_and_empty_filters() {
        let mut a = TableState::default();
        a.column_filters.insert("main".into(), " acme".into());
        a.column_filters.insert("ASR".into(), "".into());
        a.global_filter_query = "US ".into();

        let mut b = TableState::default();
        b.column_filters.insert("main".into(), "acme ".into());
        b.global_filter_query = " us".into();

        assert_eq!(Signature::from_state(&a), Signature::from_state(&b));
    }

    #[test]
    fn signature_tracks_normalized_sort() {
        let a = TableState::default();
        let mut b = TableState::default();
        b.multi_sort.reverse();
        assert_ne!(Signature::from_state(&a), Signature::from_state(&b));
    }

    #[test]
    fn ensure_clears_only_on_change() {
        let mut caches = CacheSet::default();
        let sig = Signature::from_state(&TableState::default());

        assert!(caches.ensure(&sig));
        caches.main_pass.insert("main-a-b".into(), true);
        caches.peer_children.insert("main-a-b".into(), Arc::from(vec![0, 1]));

        assert!(!caches.ensure(&sig));
        assert_eq!(caches.main_pass.get("main-a-b"), Some(true));

        let mut state = TableState::default();
        state.set_column_filter("main", "x");
        assert!(caches.ensure(&Signature::from_state(&state)));
        assert!(caches.is_empty());
    }

    #[test]
    fn reset_forgets_signature() {
        let mut caches = CacheSet::default();
        let sig = Signature::from_state(&TableState::default());
        caches.ensure(&sig);
        caches.hourly_children.insert("peer-a-x-b".into(), Arc::from(vec![3]));

        caches.reset();

        assert!(caches.signature().is_none());
        assert!(caches.is_empty());
        assert!(caches.ensure(&sig));
    }
}
