//! Tablet ownership resolution
//!
//! Answers "may this member serve tablet T?" from the current
//! [`ClusterState`]. Resolution is pure; when the answer requires claiming
//! an unowned tablet the registry commits a
//! [`Command::ClaimTablet`](crate::coordinator::commit_log::Command) and
//! applies it while still holding its exclusive lock.

use crate::coordinator::state::{ClusterState, ServeStatus};
use serde::{Deserialize, Serialize};

/// Identity a caller asserts when asking about a tablet
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct MemberRef {
    pub id: u64,
    pub group_id: u32,
}

/// Outcome of resolving a tablet for a caller
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Resolution {
    /// Final answer, nothing to change
    Decided(ServeStatus),
    /// Tablet is unowned; the caller's group may claim it
    Claim(u32),
}

/// Does the registry know this member under this group?
pub fn is_known(state: &ClusterState, caller: &MemberRef) -> bool {
    state.group_of(caller.id) == Some(caller.group_id) && caller.group_id != 0
}

/// Resolve `predicate` for `caller`.
///
/// | owner            | result                    |
/// |------------------|---------------------------|
/// | unknown caller   | `wrong`                   |
/// | 0                | claim for caller's group  |
/// | caller's group   | `ok`                      |
/// | any other group  | `not`                     |
pub fn resolve(state: &ClusterState, caller: &MemberRef, predicate: &str) -> Resolution {
    if !is_known(state, caller) {
        return Resolution::Decided(ServeStatus::Wrong);
    }

    match state.tablet_owner(predicate) {
        0 => Resolution::Claim(caller.group_id),
        owner if owner == caller.group_id => Resolution::Decided(ServeStatus::Ok),
        _ => Resolution::Decided(ServeStatus::Not),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::coordinator::commit_log::Command;
    use crate::coordinator::state::Member;

    fn state_with_two_groups() -> ClusterState {
        let mut state = ClusterState::new(1);
        for (id, gid) in [(1, 1), (2, 2)] {
            state.apply(&Command::Connect {
                member: Member::new(id, format!("node-{}", id)).in_group(gid),
                group_created: true,
            });
        }
        state
    }

    #[test]
    fn test_unknown_member_is_wrong() {
        let state = state_with_two_groups();
        let caller = MemberRef { id: 9, group_id: 1 };
        assert_eq!(
            resolve(&state, &caller, "name"),
            Resolution::Decided(ServeStatus::Wrong)
        );
    }

    #[test]
    fn test_group_mismatch_is_wrong() {
        let state = state_with_two_groups();
        let caller = MemberRef { id: 1, group_id: 2 };
        assert_eq!(
            resolve(&state, &caller, "name"),
            Resolution::Decided(ServeStatus::Wrong)
        );
    }

    #[test]
    fn test_unowned_tablet_is_claimable() {
        let state = state_with_two_groups();
        let caller = MemberRef { id: 1, group_id: 1 };
        assert_eq!(resolve(&state, &caller, "name"), Resolution::Claim(1));
    }

    #[test]
    fn test_owner_decides() {
        let mut state = state_with_two_groups();
        state.apply(&Command::ClaimTablet {
            predicate: "name".into(),
            group_id: 1,
        });

        let owner = MemberRef { id: 1, group_id: 1 };
        let other = MemberRef { id: 2, group_id: 2 };
        assert_eq!(
            resolve(&state, &owner, "name"),
            Resolution::Decided(ServeStatus::Ok)
        );
        assert_eq!(
            resolve(&state, &other, "name"),
            Resolution::Decided(ServeStatus::Not)
        );
    }

    #[test]
    fn test_predicate_match_is_exact() {
        let mut state = state_with_two_groups();
        state.apply(&Command::ClaimTablet {
            predicate: "name".into(),
            group_id: 1,
        });
        let other = MemberRef { id: 2, group_id: 2 };
        assert_eq!(resolve(&state, &other, "Name"), Resolution::Claim(2));
        assert_eq!(resolve(&state, &other, "name "), Resolution::Claim(2));
    }
}
