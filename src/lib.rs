//! # minizero
//!
//! Membership and shard-assignment coordinator ("zero") for a replicated
//! data store:
//! - Member registry with replica groups of a fixed target size
//! - Deterministic group placement
//! - Tablet (shard) ownership with atomic first-claim
//! - Propose-then-apply commit log, replayed on restart
//! - HTTP/JSON API for data nodes, with a matching client
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────┐
//! │             Zero coordinator             │
//! │  MembershipRegistry (RwLock)             │
//! │   ├─ group placement                     │
//! │   ├─ tablet ownership                    │
//! │   └─ CommitLog (WAL, replayed on start)  │
//! └───────────┬──────────────────────────────┘
//!             │ HTTP: connect / update / should_serve
//!   ┌─────────┴──────────┬──────────────┐
//!   │                    │              │
//! ┌─▼──────────┐   ┌─────▼──────┐   ┌───▼────────┐
//! │ Node 1     │   │ Node 2     │   │ Node 3     │
//! │ (group 1)  │   │ (group 1)  │   │ (group 2)  │
//! └────────────┘   └────────────┘   └────────────┘
//! ```
//!
//! ## Usage
//!
//! ### Start a coordinator
//! ```bash
//! minizero-coord serve \
//!   --bind 0.0.0.0:5080 \
//!   --wal ./zero-data/zero.wal \
//!   --replicas 3
//! ```
//!
//! ### Use the CLI
//! ```bash
//! minizero connect --id 1 --address 10.0.0.1:7080
//! minizero should-serve --id 1 --group 1 name
//! minizero status
//! ```

pub mod common;
pub mod coordinator;

// Re-export commonly used types
pub use common::{Config, Error, Result, ZeroConfig};
pub use coordinator::{MembershipRegistry, ZeroServer};

/// Current version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Build info
pub const BUILD_INFO: &str = concat!(env!("CARGO_PKG_VERSION"), " (", env!("CARGO_PKG_NAME"), ")");
