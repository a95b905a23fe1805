use std::sync::Arc;

use crate::models::{Filter, PackageRecord};
use crate::store::{Generation, RecordStore};

/// Lazy walk over one pinned snapshot.
///
/// The iterator holds its own reference to the store it started on, so a
/// publish in the middle of iteration does not affect it. `rewind` restarts
/// the walk over the same frozen data.
#[derive(Clone, Debug)]
pub struct FilteredRecords {
    store: Arc<RecordStore>,
    filter: Filter,
    position: usize,
}

impl FilteredRecords {
    pub(crate) fn new(store: Arc<RecordStore>, filter: Filter) -> Self {
        Self {
            store,
            filter,
            position: 0,
        }
    }

    /// Generation of the snapshot being walked
    pub fn generation(&self) -> Generation {
        self.store.generation()
    }

    /// Restart from the first record
    pub fn rewind(&mut self) {
        self.position = 0;
    }
}

impl Iterator for FilteredRecords {
    type Item = Arc<PackageRecord>;

    fn next(&mut self) -> Option<Self::Item> {
        while let Some(record) = self.store.record_at(self.position) {
            self.position += 1;
            if self.filter.matches(record) {
                return Some(record.clone());
            }
        }
        None
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        (0, Some(self.store.size().saturating_sub(self.position)))
    }
}
