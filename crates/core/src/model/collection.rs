use serde::{Deserialize, Serialize};
use tracing::debug;

use sensorline_protocol::{CollectionKind, Interval, Record, RecordId, SiteId};

use crate::index::IntervalIndex;
use crate::source::{NormalizedCollection, resource_name};

/// A load request handed to the host. The response must be applied with the
/// same ticket; the epoch tells stale responses apart.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoadTicket {
    pub kind: CollectionKind,
    pub epoch: u64,
    pub sites: Vec<SiteId>,
    pub labeled_only: bool,
}

impl LoadTicket {
    /// Backend resource to fetch for this ticket.
    pub fn resource(&self) -> &'static str {
        resource_name(self.kind, self.labeled_only)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum LoadOutcome {
    Applied { records: usize },
    /// A newer request superseded this one; the response was dropped.
    Discarded,
}

/// One loaded record collection with its index.
#[derive(Debug, Clone)]
pub struct Collection {
    kind: CollectionKind,
    epoch: u64,
    records: Vec<Record>,
    index: IntervalIndex,
    extent: Option<Interval>,
}

impl Collection {
    pub fn new(kind: CollectionKind) -> Self {
        Self {
            kind,
            epoch: 0,
            records: Vec::new(),
            index: IntervalIndex::new(),
            extent: None,
        }
    }

    pub fn kind(&self) -> CollectionKind {
        self.kind
    }

    pub fn epoch(&self) -> u64 {
        self.epoch
    }

    pub fn records(&self) -> &[Record] {
        &self.records
    }

    pub fn index(&self) -> &IntervalIndex {
        &self.index
    }

    pub fn extent(&self) -> Option<Interval> {
        self.extent
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Look up a record by id. Ids are row indices, so records are sorted by id.
    pub fn record(&self, id: RecordId) -> Option<&Record> {
        self.records
            .binary_search_by_key(&id, |r| r.id)
            .ok()
            .map(|i| &self.records[i])
    }

    /// Start a new request. Drops the current records and invalidates every
    /// ticket issued before.
    pub fn begin_load(&mut self, sites: &[SiteId], labeled_only: bool) -> LoadTicket {
        self.epoch += 1;
        self.clear();
        LoadTicket {
            kind: self.kind,
            epoch: self.epoch,
            sites: sites.to_vec(),
            labeled_only,
        }
    }

    /// Invalidate outstanding tickets without issuing a new one.
    pub fn invalidate(&mut self) {
        self.epoch += 1;
        self.clear();
    }

    pub fn apply(&mut self, ticket: &LoadTicket, loaded: NormalizedCollection) -> LoadOutcome {
        if ticket.kind != self.kind || ticket.epoch != self.epoch {
            debug!(
                kind = %self.kind,
                ticket_epoch = ticket.epoch,
                current_epoch = self.epoch,
                "discarding stale load"
            );
            return LoadOutcome::Discarded;
        }
        let mut records = loaded.records;
        if !records.is_sorted_by_key(|r| r.id) {
            records.sort_by_key(|r| r.id);
        }
        self.index = records.iter().map(|r| (r.interval, r.id)).collect();
        self.extent = loaded.extent;
        self.records = records;
        LoadOutcome::Applied {
            records: self.records.len(),
        }
    }

    fn clear(&mut self) {
        self.records.clear();
        self.index = IntervalIndex::new();
        self.extent = None;
    }
}
