//! Lazy stochastic contact sampling for agent-based transmission models
//!
//! `ixa-contacts` answers one question for a disease model, once per simulated day: "whom did
//! this agent contact today, and how many times?" It does so across many overlapping contact
//! channels (classrooms, departments, friend groups, residences, incidental broad contact)
//! without ever materializing the full pairwise contact graph.
//!
//! The crate is organized bottom-up:
//! * [`partition_tree`] is a lazily subdivided order-statistic tree over a fixed index range.
//! * [`reducible_tree`] is a point-update/reduce/threshold-search tree used for weighted
//!   sampling, and [`discrete`] builds discrete distributions on top of it.
//! * [`poisson`] draws Poisson variates of arbitrary intensity from a shared, append-only table
//!   cache.
//! * [`tracker`] partitions a weighted population into active and inactive agents.
//! * [`process`] generates edges of a virtual complete (or complete bipartite) graph lazily,
//!   one queried agent at a time, with memoization per time bucket.
//! * [`channel`] holds the concrete per-channel engines and the closed [`Channel`] type.
//! * [`orchestrator`] owns every channel and exposes the per-agent, per-day queries a disease
//!   model uses.
//!
//! A model drives the engine like this:
//!
//! ```rust
//! use ixa_contacts::{AgentId, ContactConfig, ContactOrchestrator, Intensity};
//!
//! let mut contacts = ContactOrchestrator::new(ContactConfig::default()).unwrap();
//! let people: Vec<AgentId> = (0..100).map(AgentId).collect();
//! contacts
//!     .register_symmetric(Some(&people), Intensity::Constant(0.05), "broad")
//!     .unwrap();
//!
//! for _ in 0..14 {
//!     contacts.advance_day();
//!     let partners = contacts.query_transmit(AgentId(0), 0).unwrap();
//!     assert!(!partners.contains_key(&AgentId(0)));
//! }
//! ```
pub mod channel;
pub mod config;
pub mod discrete;
pub mod error;
pub mod log;
mod macros;
pub mod numeric;
pub mod orchestrator;
pub mod partition_tree;
pub mod poisson;
pub mod process;
pub mod reducible_tree;
pub mod tracker;
pub mod window;

use std::fmt::{Debug, Display, Formatter};

pub use channel::{Channel, ChannelKind, SimpleContact, SparseContact};
pub use config::{ContactConfig, ContactConfigBuilder};
pub use error::ContactError;
pub use crate::log::{debug, error, info, trace, warn, LevelFilter};
pub use orchestrator::{ChannelId, ContactOrchestrator};
pub use partition_tree::PartitionTree;
pub use poisson::PoissonSampler;
pub use process::{AsymmetricProcess, Intensity, SymmetricProcess};
pub use tracker::{Activity, ActivityTracker};

// Deterministic hashing keeps results reproducible for a given seed.
pub use rustc_hash::{FxHashMap as HashMap, FxHashSet as HashSet};

// Re-exports for consumers that want the same generators and distributions.
pub use rand;

/// An opaque agent identifier. The engine attaches no meaning to it; models decide what an
/// agent is (a student, an instructor, ...).
#[derive(Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct AgentId(pub usize);

impl Display for AgentId {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl Debug for AgentId {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "Agent {}", self.0)
    }
}

/// Contact counts keyed by partner.
pub type PartnerCounts = HashMap<AgentId, u32>;

/// Adds every count of `from` into `into`.
pub(crate) fn merge_counts(into: &mut PartnerCounts, from: &PartnerCounts) {
    for (partner, count) in from {
        *into.entry(*partner).or_insert(0) += count;
    }
}
