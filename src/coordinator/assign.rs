//! Group assignment policy
//!
//! Decides which replica group a connecting member lands in. The decision
//! is a pure function of the current [`ClusterState`]; groups are scanned
//! in ascending id order so every coordinator replica reaches the same
//! answer from the same history.

use crate::coordinator::state::{ClusterState, Member};

/// Outcome of placing a member
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Placement {
    /// Member is already registered in this group; only its fields change
    Existing(u32),
    /// Join an existing group that has room
    Join(u32),
    /// Allocate a new group with this id
    NewGroup(u32),
}

impl Placement {
    pub fn group_id(&self) -> u32 {
        match *self {
            Placement::Existing(gid) | Placement::Join(gid) | Placement::NewGroup(gid) => gid,
        }
    }

    pub fn creates_group(&self) -> bool {
        matches!(self, Placement::NewGroup(_))
    }
}

/// Place `member` without mutating `state`.
///
/// 1. A registered member stays where it is.
/// 2. A preferred group is honoured if it exists and has room.
/// 3. Otherwise the lowest-id group with room wins.
/// 4. Otherwise a new group is allocated from the counter.
pub fn place(state: &ClusterState, member: &Member) -> Placement {
    if let Some(gid) = state.group_of(member.id) {
        return Placement::Existing(gid);
    }

    let capacity = state.num_replicas();

    if member.group_id > 0 {
        if let Some(group) = state.group(member.group_id) {
            if group.has_room(capacity) {
                return Placement::Join(member.group_id);
            }
        }
        // Full or unknown preference: capacity is a hard ceiling, fall through.
    }

    state
        .groups()
        .find(|(_, group)| group.has_room(capacity))
        .map(|(gid, _)| Placement::Join(gid))
        .unwrap_or(Placement::NewGroup(state.next_group_id()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::coordinator::commit_log::Command;

    /// Place and apply, the way the registry does after commit
    fn admit(state: &mut ClusterState, member: Member) -> Placement {
        let placement = place(state, &member);
        let mut resolved = member;
        resolved.group_id = placement.group_id();
        state.apply(&Command::Connect {
            member: resolved,
            group_created: placement.creates_group(),
        });
        placement
    }

    #[test]
    fn test_single_replica_groups() {
        let mut state = ClusterState::new(1);
        assert_eq!(admit(&mut state, Member::new(1, "a")), Placement::NewGroup(1));
        assert_eq!(admit(&mut state, Member::new(2, "b")), Placement::NewGroup(2));
    }

    #[test]
    fn test_fills_group_before_allocating() {
        let mut state = ClusterState::new(3);
        for id in 1..=3 {
            assert_eq!(admit(&mut state, Member::new(id, "x")).group_id(), 1);
        }
        assert_eq!(admit(&mut state, Member::new(4, "x")), Placement::NewGroup(2));
    }

    /// Two half-full groups, as left behind by members that asked for them
    fn two_open_groups() -> ClusterState {
        let mut state = ClusterState::new(2);
        for (id, gid) in [(1, 1), (2, 2)] {
            state.apply(&Command::Connect {
                member: Member::new(id, "x").in_group(gid),
                group_created: true,
            });
        }
        state
    }

    #[test]
    fn test_preferred_group_with_room() {
        let mut state = two_open_groups();
        assert_eq!(
            admit(&mut state, Member::new(3, "c").in_group(2)),
            Placement::Join(2)
        );
    }

    #[test]
    fn test_lowest_group_with_room_wins() {
        let mut state = two_open_groups();
        assert_eq!(admit(&mut state, Member::new(3, "c")), Placement::Join(1));
        assert_eq!(admit(&mut state, Member::new(4, "d")), Placement::Join(2));
        assert_eq!(admit(&mut state, Member::new(5, "e")), Placement::NewGroup(3));
    }

    #[test]
    fn test_full_preferred_group_falls_through() {
        let mut state = ClusterState::new(1);
        admit(&mut state, Member::new(1, "a"));
        let placement = admit(&mut state, Member::new(2, "b").in_group(1));
        assert_eq!(placement, Placement::NewGroup(2));
        assert_eq!(state.group(1).unwrap().len(), 1);
    }

    #[test]
    fn test_unknown_preferred_group_is_ignored() {
        let mut state = ClusterState::new(3);
        let placement = admit(&mut state, Member::new(1, "a").in_group(9));
        assert_eq!(placement, Placement::NewGroup(1));
        assert_eq!(state.next_group_id(), 2);
    }

    #[test]
    fn test_scan_skips_full_groups() {
        let mut state = ClusterState::new(2);
        admit(&mut state, Member::new(1, "a"));
        admit(&mut state, Member::new(2, "b"));
        admit(&mut state, Member::new(3, "c"));
        admit(&mut state, Member::new(4, "d"));
        admit(&mut state, Member::new(5, "e"));
        // groups: 1 = {1,2}, 2 = {3,4}, 3 = {5}
        assert_eq!(admit(&mut state, Member::new(6, "f")), Placement::Join(3));
    }

    #[test]
    fn test_registered_member_stays_put() {
        let mut state = ClusterState::new(3);
        admit(&mut state, Member::new(1, "a"));
        admit(&mut state, Member::new(2, "b"));
        admit(&mut state, Member::new(3, "c"));
        admit(&mut state, Member::new(4, "d"));

        let placement = place(&state, &Member::new(4, "d2").in_group(1));
        assert_eq!(placement, Placement::Existing(2));
    }

    #[test]
    fn test_place_is_pure() {
        let mut state = ClusterState::new(2);
        admit(&mut state, Member::new(1, "a"));
        let before = state.membership();
        let _ = place(&state, &Member::new(2, "b"));
        let _ = place(&state, &Member::new(3, "c").in_group(5));
        assert_eq!(state.membership(), before);
        assert_eq!(state.next_group_id(), 2);
    }
}
