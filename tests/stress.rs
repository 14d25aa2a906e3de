//! Concurrent connects and claims against one registry

use minizero::common::{RequestContext, Result};
use minizero::coordinator::{
    ConnectionProbe, Member, MemberRef, MembershipRegistry, MemoryCommitLog, ServeStatus,
};
use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;
use std::time::Duration;

struct JitterProbe;

#[tonic::async_trait]
impl ConnectionProbe for JitterProbe {
    async fn probe(&self, address: &str) -> Result<()> {
        // Stagger probe completion so commits interleave
        let jitter = address.len() as u64 % 3;
        tokio::time::sleep(Duration::from_millis(jitter)).await;
        Ok(())
    }
}

async fn connect_all(replicas: usize, members: u64) -> Arc<MembershipRegistry> {
    let reg = Arc::new(
        MembershipRegistry::new(
            replicas,
            Arc::new(MemoryCommitLog::with_latency(Duration::from_millis(1))),
            Arc::new(JitterProbe),
        )
        .unwrap(),
    );

    let handles: Vec<_> = (1..=members)
        .map(|id| {
            let reg = reg.clone();
            tokio::spawn(async move {
                let preferred = (id % 7) as u32;
                let member =
                    Member::new(id, format!("node-{}:{}", id, 7000 + id)).in_group(preferred);
                reg.connect(&RequestContext::background(), member).await
            })
        })
        .collect();

    for result in futures_util::future::join_all(handles).await {
        result.unwrap().unwrap();
    }
    reg
}

fn assert_capacity(groups: &BTreeMap<u32, Vec<Member>>, replicas: usize, total: u64) {
    let mut seen = HashSet::new();
    for (gid, members) in groups {
        assert!(*gid >= 1);
        assert!(!members.is_empty());
        assert!(members.len() <= replicas, "group {} over capacity", gid);
        for m in members {
            assert_eq!(m.group_id, *gid);
            assert!(seen.insert(m.id), "member {} in two groups", m.id);
        }
    }
    assert_eq!(seen.len() as u64, total);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_connects_respect_capacity() {
    let reg = connect_all(3, 60).await;
    let snapshot = reg.snapshot().await;

    assert_capacity(&snapshot.groups, 3, 60);
    assert_eq!(snapshot.groups.len(), 20);
    assert_eq!(snapshot.next_group_id, 21);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_claims_across_tablets() {
    let reg = connect_all(2, 20).await;
    let snapshot = reg.snapshot().await;

    let mut handles = Vec::new();
    for (gid, members) in &snapshot.groups {
        for m in members {
            for predicate in ["name", "age", "friend", "follows"] {
                let reg = reg.clone();
                let caller = MemberRef {
                    id: m.id,
                    group_id: *gid,
                };
                handles.push(tokio::spawn(async move {
                    let status = reg
                        .should_serve(&RequestContext::background(), caller, predicate)
                        .await
                        .unwrap();
                    (predicate, caller.group_id, status)
                }));
            }
        }
    }

    let results: Vec<_> = futures_util::future::join_all(handles)
        .await
        .into_iter()
        .map(|r| r.unwrap())
        .collect();

    for predicate in ["name", "age", "friend", "follows"] {
        let owner = reg.tablet_owner(predicate).await;
        assert_ne!(owner, 0);
        for (p, gid, status) in &results {
            if *p != predicate {
                continue;
            }
            let expected = if *gid == owner {
                ServeStatus::Ok
            } else {
                ServeStatus::Not
            };
            assert_eq!(*status, expected);
        }
    }
    assert_eq!(reg.metrics().tablet_claims.get(), 4);
}

#[cfg(feature = "heavy-tests")]
#[tokio::test(flavor = "multi_thread", worker_threads = 8)]
async fn test_many_members() {
    let reg = connect_all(5, 2_000).await;
    let snapshot = reg.snapshot().await;
    assert_capacity(&snapshot.groups, 5, 2_000);
    assert_eq!(snapshot.groups.len(), 400);
}
