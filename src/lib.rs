//! A fixed-size-class, partitioned, lock-free slab allocator.
//!
//! This crate is a building block for workloads dominated by many
//! concurrent allocators and one (or a few) concurrent freers per
//! partition — request-processing pipelines, connection caches, object
//! pools — where a general-purpose allocator is either a contention
//! bottleneck or cannot provide the placement guarantees a caller needs
//! (a fixed virtual address, a persistent backing file, or shared memory).
//!
//! # What this crate does not do
//!
//! No variable-size allocations, no per-object metadata beyond the single
//! machine word used while a slot is free, no coalescing, no
//! defragmentation, no cross-partition rebalancing beyond opportunistic
//! work-stealing, and no reclamation of retired objects — if a caller needs
//! an epoch or hazard-pointer scheme on top of this, that is the caller's
//! concern.
//!
//! # Example
//!
//! ```
//! use uslab::Arena;
//!
//! let arena = Arena::create_heap(8, 4, 2).unwrap();
//! let a = arena.alloc().unwrap();
//! let b = arena.alloc().unwrap();
//! arena.free(a.as_ptr());
//! let c = arena.alloc().unwrap();
//! assert_eq!(a, c); // LIFO within a partition
//! arena.free(b.as_ptr());
//! arena.free(c.as_ptr());
//! arena.destroy_heap();
//! ```

mod affinity;
mod arena;
mod backing;
mod error;
mod partition;
mod page;
mod slot;

pub use arena::Arena;
pub use error::{Error, Result};
