//! Identifier types.
//!
//! Three ids meet in the engine and are assigned by different parties:
//! - `ViewInstanceId`: allocated here, once per host element binding
//! - `InternalInstanceId`: assigned by the plugin attachment handle
//! - `GuestInstanceId`: assigned by the Guest View Service on creation

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::sync::atomic::{AtomicU64, Ordering};

// =============================================================================
// Allocator
// =============================================================================

/// Monotonic id counter. Safe to share between threads.
///
/// The first id handed out is 1, so 0 never names anything.
#[derive(Debug)]
pub struct IdAllocator {
    last: AtomicU64,
}

impl IdAllocator {
    /// Create an allocator whose first id is 1.
    pub const fn new() -> Self {
        Self {
            last: AtomicU64::new(0),
        }
    }

    /// Allocate the next id.
    pub fn next(&self) -> u64 {
        self.last.fetch_add(1, Ordering::Relaxed) + 1
    }
}

impl Default for IdAllocator {
    fn default() -> Self {
        Self::new()
    }
}

/// Process-wide allocator shared by view instance ids and element handles.
static PROCESS_IDS: IdAllocator = IdAllocator::new();

// =============================================================================
// Id Types
// =============================================================================

macro_rules! id_type {
    ($(#[$meta:meta])* $name:ident, $prefix:literal) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(u64);

        impl $name {
            /// Wrap a raw id value.
            pub const fn new(raw: u64) -> Self {
                Self(raw)
            }

            /// The raw id value.
            pub const fn get(self) -> u64 {
                self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, concat!($prefix, ":{}"), self.0)
            }
        }
    };
}

id_type!(
    /// Stable id of one host element binding. Survives detach/reattach.
    ViewInstanceId,
    "view"
);

id_type!(
    /// Id of the plugin attachment handle hosting the guest's rendering slot.
    InternalInstanceId,
    "internal"
);

id_type!(
    /// Id of a guest surface as assigned by the Guest View Service.
    GuestInstanceId,
    "guest"
);

id_type!(
    /// Identity of a host element in the element registry.
    ElementHandle,
    "element"
);

impl ViewInstanceId {
    /// Allocate a fresh id from the process-wide counter.
    pub fn allocate() -> Self {
        Self(PROCESS_IDS.next())
    }
}

impl ElementHandle {
    /// Allocate a fresh handle from the process-wide counter.
    pub fn allocate() -> Self {
        Self(PROCESS_IDS.next())
    }
}

/// Plugin attachment ids arrive as attribute strings.
impl FromStr for InternalInstanceId {
    type Err = std::num::ParseIntError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        s.trim().parse::<u64>().map(Self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;
    use std::sync::Arc;
    use std::thread;

    #[test]
    fn test_allocator_starts_at_one() {
        let ids = IdAllocator::new();
        assert_eq!(ids.next(), 1);
        assert_eq!(ids.next(), 2);
        assert_eq!(ids.next(), 3);
    }

    #[test]
    fn test_allocator_unique_across_threads() {
        let ids = Arc::new(IdAllocator::new());
        let workers: Vec<_> = (0..8)
            .map(|_| {
                let ids = Arc::clone(&ids);
                thread::spawn(move || (0..500).map(|_| ids.next()).collect::<Vec<_>>())
            })
            .collect();

        let mut seen = HashSet::new();
        for worker in workers {
            for id in worker.join().unwrap() {
                assert!(seen.insert(id), "id {} handed out twice", id);
            }
        }
        assert_eq!(seen.len(), 4000);
        assert_eq!(ids.next(), 4001);
    }

    #[test]
    fn test_view_instance_ids_are_monotonic() {
        let a = ViewInstanceId::allocate();
        let b = ViewInstanceId::allocate();
        assert!(b > a);
    }

    #[test]
    fn test_internal_id_parse() {
        assert_eq!("42".parse::<InternalInstanceId>().unwrap().get(), 42);
        assert_eq!(" 7 ".parse::<InternalInstanceId>().unwrap().get(), 7);
        assert!("seven".parse::<InternalInstanceId>().is_err());
        assert!("".parse::<InternalInstanceId>().is_err());
    }

    #[test]
    fn test_display() {
        assert_eq!(GuestInstanceId::new(3).to_string(), "guest:3");
        assert_eq!(ViewInstanceId::new(9).to_string(), "view:9");
    }
}
