//! Two-level hierarchical routing.
//!
//! The macro level searches the intersection graph and answers "which block
//! corners do I pass". The micro level searches tiles inside a single block.
//! `combined` stitches the two into a waypoint list, and `navigator` owns the
//! per-agent session state plus the shared planning queue.

pub mod combined;
pub mod graph;
pub mod local;
pub mod navigator;
