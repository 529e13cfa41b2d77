//! Flat parent/child index over the three row arrays
//!
//! Built once per dataset (or per re-sort of the main rows). Entries never
//! hold row data, only the raw index plus the ids needed to walk the
//! hierarchy, so rebuilding is cheap compared to a full render.

use std::sync::Arc;

use hashbrown::HashMap;
use routegrid_types::{MetricRow, RowLevel};

/// Columns probed, in order, for the display date of an hourly row.
pub const HOURLY_DATE_FIELDS: [&str; 5] = ["date", "Date", "time", "datetime", "timestamp"];

// ─────────────────────────────────────────────────────────────────────────────
// Group Ids
// ─────────────────────────────────────────────────────────────────────────────

/// Make a value safe for use inside a group id: whitespace runs become `-`
/// and anything outside `[A-Za-z0-9-_.]` is dropped. Case is preserved.
pub fn sanitize_id_part(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    let mut in_space = false;
    for c in value.chars() {
        if c.is_whitespace() {
            if !in_space {
                out.push('-');
            }
            in_space = true;
            continue;
        }
        in_space = false;
        if c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.') {
            out.push(c);
        }
    }
    out
}

pub fn main_group_id(main: &str, destination: &str) -> String {
    format!("main-{}-{}", sanitize_id_part(main), sanitize_id_part(destination))
}

pub fn peer_group_id(main: &str, peer: &str, destination: &str) -> String {
    format!(
        "peer-{}-{}-{}",
        sanitize_id_part(main),
        sanitize_id_part(peer),
        sanitize_id_part(destination)
    )
}

pub fn hourly_group_id(main: &str, peer: &str, destination: &str, index: usize) -> String {
    format!(
        "hour-{}-{}-{}-{index}",
        sanitize_id_part(main),
        sanitize_id_part(peer),
        sanitize_id_part(destination)
    )
}

// ─────────────────────────────────────────────────────────────────────────────
// Dataset
// ─────────────────────────────────────────────────────────────────────────────

/// The three raw row arrays the table renders from.
#[derive(Debug, Clone, Default)]
pub struct TableData {
    pub main: Arc<Vec<MetricRow>>,
    pub peer: Arc<Vec<MetricRow>>,
    pub hourly: Arc<Vec<MetricRow>>,
}

impl TableData {
    pub fn new(main: Vec<MetricRow>, peer: Vec<MetricRow>, hourly: Vec<MetricRow>) -> Self {
        Self { main: Arc::new(main), peer: Arc::new(peer), hourly: Arc::new(hourly) }
    }

    pub fn rows(&self, level: RowLevel) -> &[MetricRow] {
        match level {
            RowLevel::Main => &self.main,
            RowLevel::Peer => &self.peer,
            RowLevel::Hourly => &self.hourly,
        }
    }

    pub fn row(&self, level: RowLevel, index: usize) -> Option<&MetricRow> {
        self.rows(level).get(index)
    }

    pub fn total_count(&self) -> usize {
        self.main.len() + self.peer.len() + self.hourly.len()
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Index
// ─────────────────────────────────────────────────────────────────────────────

/// One entry per raw row.
#[derive(Debug, Clone, PartialEq)]
pub struct GroupIndexEntry {
    pub index: usize,
    pub group_id: Arc<str>,
    pub parent_id: Option<Arc<str>>,
    pub level: RowLevel,
    pub main: String,
    pub peer: Option<String>,
    pub destination: String,
    /// Display date of hourly rows.
    pub date: Option<String>,
}

#[derive(Debug, Default)]
pub struct HierarchicalIndex {
    pub main: Vec<GroupIndexEntry>,
    pub peer: Vec<GroupIndexEntry>,
    pub hourly: Vec<GroupIndexEntry>,
    peers_by_parent: HashMap<Arc<str>, Vec<usize>>,
    hourly_by_parent: HashMap<Arc<str>, Vec<usize>>,
    levels: HashMap<Arc<str>, RowLevel>,
}

impl HierarchicalIndex {
    pub fn build(data: &TableData) -> Self {
        let main: Vec<GroupIndexEntry> = data
            .main
            .iter()
            .enumerate()
            .map(|(index, row)| GroupIndexEntry {
                index,
                group_id: main_group_id(&row.main, &row.destination).into(),
                parent_id: None,
                level: RowLevel::Main,
                main: row.main.clone(),
                peer: None,
                destination: row.destination.clone(),
                date: None,
            })
            .collect();

        let peer: Vec<GroupIndexEntry> = data
            .peer
            .iter()
            .enumerate()
            .map(|(index, row)| GroupIndexEntry {
                index,
                group_id: peer_group_id(&row.main, row.peer_text(), &row.destination).into(),
                parent_id: Some(main_group_id(&row.main, &row.destination).into()),
                level: RowLevel::Peer,
                main: row.main.clone(),
                peer: row.peer.clone(),
                destination: row.destination.clone(),
                date: None,
            })
            .collect();

        let hourly: Vec<GroupIndexEntry> = data
            .hourly
            .iter()
            .enumerate()
            .map(|(index, row)| GroupIndexEntry {
                index,
                group_id: hourly_group_id(&row.main, row.peer_text(), &row.destination, index)
                    .into(),
                parent_id: Some(peer_group_id(&row.main, row.peer_text(), &row.destination).into()),
                level: RowLevel::Hourly,
                main: row.main.clone(),
                peer: row.peer.clone(),
                destination: row.destination.clone(),
                date: row
                    .first_present(&HOURLY_DATE_FIELDS)
                    .map(|f| f.as_text().into_owned())
                    .filter(|s| !s.is_empty()),
            })
            .collect();

        let peers_by_parent = children_by_parent(&peer);
        let hourly_by_parent = children_by_parent(&hourly);
        let levels = main
            .iter()
            .chain(&peer)
            .chain(&hourly)
            .map(|e| (Arc::clone(&e.group_id), e.level))
            .collect();

        tracing::debug!(
            main = data.main.len(),
            peer = data.peer.len(),
            hourly = data.hourly.len(),
            "Built hierarchical index"
        );

        Self { main, peer, hourly, peers_by_parent, hourly_by_parent, levels }
    }

    /// Raw indices of the peer rows under a main group, in raw order.
    pub fn peer_children(&self, main_id: &str) -> &[usize] {
        self.peers_by_parent.get(main_id).map(Vec::as_slice).unwrap_or_default()
    }

    /// Raw indices of the hourly rows under a peer group, in raw order.
    pub fn hourly_children(&self, peer_id: &str) -> &[usize] {
        self.hourly_by_parent.get(peer_id).map(Vec::as_slice).unwrap_or_default()
    }

    pub fn entry(&self, level: RowLevel, index: usize) -> Option<&GroupIndexEntry> {
        match level {
            RowLevel::Main => self.main.get(index),
            RowLevel::Peer => self.peer.get(index),
            RowLevel::Hourly => self.hourly.get(index),
        }
    }

    /// Level of an indexed group. `None` for ids the dataset does not contain.
    pub fn level_of(&self, group_id: &str) -> Option<RowLevel> {
        self.levels.get(group_id).copied()
    }

    pub fn main_ids(&self) -> impl Iterator<Item = &str> {
        self.main.iter().map(|e| &*e.group_id)
    }

    pub fn is_empty(&self) -> bool {
        self.main.is_empty() && self.peer.is_empty() && self.hourly.is_empty()
    }
}

fn children_by_parent(entries: &[GroupIndexEntry]) -> HashMap<Arc<str>, Vec<usize>> {
    let mut map: HashMap<Arc<str>, Vec<usize>> = HashMap::new();
    for entry in entries {
        if let Some(parent) = &entry.parent_id {
            map.entry(Arc::clone(parent)).or_default().push(entry.index);
        }
    }
    map
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sanitize_collapses_whitespace_and_strips() {
        assert_eq!(sanitize_id_part("Acme  Corp"), "Acme-Corp");
        assert_eq!(sanitize_id_part("US/Mobile (x)"), "USMobile-x");
        assert_eq!(sanitize_id_part("a_b.c-d"), "a_b.c-d");
        assert_eq!(sanitize_id_part("Zürich"), "Zrich");
        assert_eq!(sanitize_id_part(""), "");
    }

    #[test]
    fn ids_follow_hierarchy() {
        let data = TableData::new(
            vec![MetricRow::new("Acme Corp", None, "US")],
            vec![MetricRow::new("Acme Corp", Some("Carrier X"), "US")],
            vec![
                MetricRow::new("Acme Corp", Some("Carrier X"), "US").with("time", "2024-05-01 10:00"),
                MetricRow::new("Acme Corp", Some("Carrier X"), "US").with("date", "2024-05-01 11:00"),
            ],
        );

        let index = HierarchicalIndex::build(&data);

        assert_eq!(&*index.main[0].group_id, "main-Acme-Corp-US");
        assert_eq!(&*index.peer[0].group_id, "peer-Acme-Corp-Carrier-X-US");
        assert_eq!(index.peer[0].parent_id.as_deref(), Some("main-Acme-Corp-US"));
        assert_eq!(&*index.hourly[1].group_id, "hour-Acme-Corp-Carrier-X-US-1");
        assert_eq!(index.hourly[1].parent_id.as_deref(), Some("peer-Acme-Corp-Carrier-X-US"));
        assert_eq!(index.hourly[0].date.as_deref(), Some("2024-05-01 10:00"));
        assert_eq!(index.hourly[1].date.as_deref(), Some("2024-05-01 11:00"));

        assert_eq!(index.peer_children("main-Acme-Corp-US"), &[0]);
        assert_eq!(index.hourly_children("peer-Acme-Corp-Carrier-X-US"), &[0, 1]);
        assert!(index.peer_children("main-missing").is_empty());
        assert_eq!(data.total_count(), 4);
    }

    #[test]
    fn level_of_only_knows_indexed_groups() {
        let data = TableData::new(
            vec![MetricRow::new("a", None, "b")],
            vec![MetricRow::new("a", Some("x"), "b")],
            vec![MetricRow::new("a", Some("x"), "b")],
        );
        let index = HierarchicalIndex::build(&data);

        assert_eq!(index.level_of("main-a-b"), Some(RowLevel::Main));
        assert_eq!(index.level_of("peer-a-x-b"), Some(RowLevel::Peer));
        assert_eq!(index.level_of("hour-a-x-b-0"), Some(RowLevel::Hourly));
        assert_eq!(index.level_of("main-nobody-b"), None);
        assert_eq!(index.level_of("peer-a-y-b"), None);
        assert_eq!(index.level_of("other"), None);
        assert_eq!(HierarchicalIndex::default().level_of("main-a-b"), None);
    }
}
