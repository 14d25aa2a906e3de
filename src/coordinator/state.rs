//! Cluster state owned by the membership registry
//!
//! Holds members, replica groups and tablet ownership. Nothing here takes
//! a lock: [`ClusterState`] is only reachable through
//! [`MembershipRegistry`](crate::coordinator::registry::MembershipRegistry),
//! which decides under its lock and then calls [`ClusterState::apply`]
//! with the committed command.

use crate::coordinator::commit_log::Command;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};

/// A data-serving node
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Member {
    pub id: u64,
    pub address: String,
    /// 0 means unassigned
    #[serde(default)]
    pub group_id: u32,
}

impl Member {
    pub fn new(id: u64, address: impl Into<String>) -> Self {
        Self {
            id,
            address: address.into(),
            group_id: 0,
        }
    }

    /// Same member, asking for a specific group
    pub fn in_group(mut self, group_id: u32) -> Self {
        self.group_id = group_id;
        self
    }
}

/// A replica set
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Group {
    members: BTreeMap<u64, Member>,
}

impl Group {
    pub fn len(&self) -> usize {
        self.members.len()
    }

    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }

    pub fn contains(&self, member_id: u64) -> bool {
        self.members.contains_key(&member_id)
    }

    pub fn get(&self, member_id: u64) -> Option<&Member> {
        self.members.get(&member_id)
    }

    /// Members ordered by id
    pub fn members(&self) -> impl Iterator<Item = &Member> {
        self.members.values()
    }

    pub fn has_room(&self, num_replicas: usize) -> bool {
        self.members.len() < num_replicas
    }
}

/// Result of ShouldServe
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ServeStatus {
    /// Caller's group owns the tablet (possibly just claimed)
    Ok,
    /// Another group owns the tablet
    Not,
    /// Caller's identity doesn't match the registry
    Wrong,
}

impl ServeStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ServeStatus::Ok => "ok",
            ServeStatus::Not => "not",
            ServeStatus::Wrong => "wrong",
        }
    }
}

impl std::fmt::Display for ServeStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What a node learns after Connect or Update
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MembershipUpdate {
    /// The caller as registered, with its resolved group
    pub member: Member,
    pub group_id: u32,
    /// Every group and its members, ordered by group id then member id
    pub groups: BTreeMap<u32, Vec<Member>>,
}

impl MembershipUpdate {
    /// The caller's replica peers, excluding itself
    pub fn peers(&self) -> Vec<&Member> {
        self.groups
            .get(&self.group_id)
            .map(|ms| ms.iter().filter(|m| m.id != self.member.id).collect())
            .unwrap_or_default()
    }
}

/// Operator view of the whole registry
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClusterSnapshot {
    pub num_replicas: usize,
    pub next_group_id: u32,
    pub groups: BTreeMap<u32, Vec<Member>>,
    /// predicate -> owning group
    pub tablets: BTreeMap<String, u32>,
    /// member id -> last heartbeat (unix millis)
    pub last_seen: BTreeMap<u64, u64>,
}

/// Members, groups and tablets
#[derive(Debug, Clone)]
pub struct ClusterState {
    num_replicas: usize,
    next_group_id: u32,
    groups: BTreeMap<u32, Group>,
    /// member id -> group id
    member_index: HashMap<u64, u32>,
    /// predicate -> owning group (never 0 once present)
    tablets: HashMap<String, u32>,
}

impl ClusterState {
    pub fn new(num_replicas: usize) -> Self {
        Self {
            num_replicas,
            next_group_id: 1,
            groups: BTreeMap::new(),
            member_index: HashMap::new(),
            tablets: HashMap::new(),
        }
    }

    pub fn num_replicas(&self) -> usize {
        self.num_replicas
    }

    pub fn next_group_id(&self) -> u32 {
        self.next_group_id
    }

    pub fn group(&self, group_id: u32) -> Option<&Group> {
        self.groups.get(&group_id)
    }

    /// Groups in ascending id order
    pub fn groups(&self) -> impl Iterator<Item = (u32, &Group)> {
        self.groups.iter().map(|(id, g)| (*id, g))
    }

    pub fn group_count(&self) -> usize {
        self.groups.len()
    }

    /// Group the member is registered in, if any
    pub fn group_of(&self, member_id: u64) -> Option<u32> {
        self.member_index.get(&member_id).copied()
    }

    pub fn member(&self, member_id: u64) -> Option<&Member> {
        let gid = self.group_of(member_id)?;
        self.groups.get(&gid)?.get(member_id)
    }

    /// Owning group of a tablet, 0 when unowned or unknown
    pub fn tablet_owner(&self, predicate: &str) -> u32 {
        self.tablets.get(predicate).copied().unwrap_or(0)
    }

    pub fn tablet_count(&self) -> usize {
        self.tablets.len()
    }

    /// Apply a committed command.
    ///
    /// Deterministic: replaying the same commands in the same order always
    /// produces the same state. Commands carry decisions, so no policy runs here.
    pub fn apply(&mut self, command: &Command) {
        match command {
            Command::Connect { member, .. } => self.apply_connect(member),
            Command::ClaimTablet {
                predicate,
                group_id,
            } => {
                // Claims are monotonic: an owned tablet is never reassigned.
                self.tablets
                    .entry(predicate.clone())
                    .or_insert(*group_id);
            }
        }
    }

    fn apply_connect(&mut self, member: &Member) {
        let gid = member.group_id;
        if let Some(previous) = self.member_index.get(&member.id).copied() {
            if previous != gid {
                tracing::warn!(
                    member_id = member.id,
                    recorded = previous,
                    requested = gid,
                    "Ignoring group change for registered member"
                );
            }
            if let Some(existing) = self
                .groups
                .get_mut(&previous)
                .and_then(|g| g.members.get_mut(&member.id))
            {
                existing.address = member.address.clone();
            }
            return;
        }

        let group = self.groups.entry(gid).or_default();
        group.members.insert(member.id, member.clone());
        self.member_index.insert(member.id, gid);
        if gid >= self.next_group_id {
            self.next_group_id = match gid.checked_add(1) {
                Some(next) => next,
                None => {
                    // The registry refuses to hand this id out again
                    tracing::error!(group_id = gid, "Last group id allocated");
                    u32::MAX
                }
            };
        }
    }

    /// Full membership view, ordered by group id then member id
    pub fn membership(&self) -> BTreeMap<u32, Vec<Member>> {
        self.groups
            .iter()
            .map(|(gid, g)| (*gid, g.members().cloned().collect()))
            .collect()
    }

    pub fn membership_update(&self, member_id: u64) -> Option<MembershipUpdate> {
        let member = self.member(member_id)?.clone();
        Some(MembershipUpdate {
            group_id: member.group_id,
            member,
            groups: self.membership(),
        })
    }

    pub fn tablets(&self) -> BTreeMap<String, u32> {
        self.tablets
            .iter()
            .map(|(p, g)| (p.clone(), *g))
            .collect()
    }
}
