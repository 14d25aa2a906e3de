//! Zero coordinator: cluster membership and tablet assignment
//!
//! The coordinator is responsible for:
//! - Member registry (member id → address, replica group)
//! - Group placement (first-fit by ascending group id)
//! - Tablet ownership (first claim wins, never reassigned)
//! - Durability via a replayable commit log

pub mod assign;
pub mod client;
pub mod commit_log;
pub mod http;
pub mod probe;
pub mod registry;
pub mod server;
pub mod state;
pub mod tablet;

pub use client::ZeroClient;
pub use commit_log::{Command, CommitLog, LogEntry, MemoryCommitLog, WalCommitLog};
pub use probe::{ChannelProbe, ConnectionProbe};
pub use registry::MembershipRegistry;
pub use server::ZeroServer;
pub use state::{ClusterSnapshot, ClusterState, Member, MembershipUpdate, ServeStatus};
pub use tablet::MemberRef;
