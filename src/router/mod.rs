//! Routing for chainhttp-rs.
//!
//! Routes live in append-only tables. Dispatch runs every entry whose
//! pattern matches, not just the first, and stops once a response has
//! been completed.

mod dispatch;
mod handler;
mod pattern;

use std::sync::Arc;

use arc_swap::ArcSwap;

// Re-export public items
pub use dispatch::dispatch;
pub use handler::{error_handler, handler, HandlerFuture, Middleware, Route};
pub use pattern::{PathSpec, RoutePattern};

/// An insertion-ordered sequence of route entries.
///
/// Registration publishes a new snapshot; exchanges already in flight keep
/// the snapshot they started with.
pub struct RouteTable {
    entries: ArcSwap<Vec<Route>>,
}

impl RouteTable {
    /// Create an empty table.
    pub fn new() -> Self {
        Self {
            entries: ArcSwap::from_pointee(Vec::new()),
        }
    }

    /// Append an entry.
    pub fn push(&self, route: Route) {
        self.entries.rcu(|current| {
            let mut next = Vec::clone(current);
            next.push(route.clone());
            next
        });
    }

    /// The current entries.
    pub fn snapshot(&self) -> Arc<Vec<Route>> {
        self.entries.load_full()
    }

    /// The number of entries.
    pub fn len(&self) -> usize {
        self.entries.load().len()
    }

    /// Whether the table has no entries.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for RouteTable {
    fn default() -> Self {
        Self::new()
    }
}
