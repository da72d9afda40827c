//! Follow-up requests driven by a query's total result count.

use std::ops::RangeInclusive;

/// Records per list page.
pub const PAGE_SIZE: u64 = 10;

/// Last page the list endpoint will serve for one query.
pub const MAX_PAGES: u32 = 20;

/// Result count above which a query is subdivided.
pub const SUBDIVIDE_THRESHOLD: u64 = MAX_PAGES as u64 * PAGE_SIZE;

/// What to request after page `index` of a query reported `count` results.
///
/// Only the first page drives follow-ups; later pages never schedule more.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PagePlan {
    pub count: u64,
    pub index: u32,
}

impl PagePlan {
    #[must_use]
    pub fn new(count: u64, index: u32) -> Self {
        Self { count, index }
    }

    /// Pages to request directly, empty when there is nothing to add.
    #[must_use]
    #[allow(clippy::reversed_empty_ranges)]
    pub fn next_pages(&self) -> RangeInclusive<u32> {
        if self.index != 1 || self.count <= PAGE_SIZE {
            return 2..=1;
        }
        let pages = self.count.div_ceil(PAGE_SIZE).min(u64::from(MAX_PAGES));
        2..=u32::try_from(pages).unwrap_or(MAX_PAGES)
    }

    /// True when the query matches more than the result window holds.
    #[must_use]
    pub fn should_subdivide(&self) -> bool {
        self.index == 1 && self.count > SUBDIVIDE_THRESHOLD
    }
}
