//! Tablet ownership checks and claims

use minizero::common::{Error, RequestContext, Result};
use minizero::coordinator::{
    ConnectionProbe, Member, MemberRef, MembershipRegistry, MemoryCommitLog, ServeStatus,
};
use std::sync::Arc;
use std::time::Duration;

struct Reachable;

#[tonic::async_trait]
impl ConnectionProbe for Reachable {
    async fn probe(&self, _address: &str) -> Result<()> {
        Ok(())
    }
}

/// Registry with `groups` single-member groups: member i lives in group i
async fn cluster(groups: u64, log: MemoryCommitLog) -> Arc<MembershipRegistry> {
    let reg = MembershipRegistry::new(1, Arc::new(log), Arc::new(Reachable)).unwrap();
    let ctx = RequestContext::background();
    for id in 1..=groups {
        reg.connect(&ctx, Member::new(id, format!("node-{}", id)))
            .await
            .unwrap();
    }
    Arc::new(reg)
}

fn caller(id: u64, group_id: u32) -> MemberRef {
    MemberRef { id, group_id }
}

#[tokio::test]
async fn first_caller_claims_unowned_tablet() {
    let reg = cluster(2, MemoryCommitLog::new()).await;
    let ctx = RequestContext::background();

    assert_eq!(
        reg.should_serve(&ctx, caller(1, 1), "name").await.unwrap(),
        ServeStatus::Ok
    );
    assert_eq!(reg.tablet_owner("name").await, 1);

    assert_eq!(
        reg.should_serve(&ctx, caller(2, 2), "name").await.unwrap(),
        ServeStatus::Not
    );
    assert_eq!(reg.tablet_owner("name").await, 1);
}

#[tokio::test]
async fn same_group_keeps_serving() {
    let reg = MembershipRegistry::new(2, Arc::new(MemoryCommitLog::new()), Arc::new(Reachable))
        .unwrap();
    let ctx = RequestContext::background();
    reg.connect(&ctx, Member::new(1, "a")).await.unwrap();
    reg.connect(&ctx, Member::new(2, "b")).await.unwrap();

    assert_eq!(
        reg.should_serve(&ctx, caller(1, 1), "age").await.unwrap(),
        ServeStatus::Ok
    );
    for _ in 0..3 {
        assert_eq!(
            reg.should_serve(&ctx, caller(2, 1), "age").await.unwrap(),
            ServeStatus::Ok
        );
    }
}

#[tokio::test]
async fn unknown_or_mismatched_caller_is_wrong() {
    let reg = cluster(2, MemoryCommitLog::new()).await;
    let ctx = RequestContext::background();

    assert_eq!(
        reg.should_serve(&ctx, caller(42, 1), "name").await.unwrap(),
        ServeStatus::Wrong
    );
    assert_eq!(
        reg.should_serve(&ctx, caller(1, 2), "name").await.unwrap(),
        ServeStatus::Wrong
    );
    assert_eq!(
        reg.should_serve(&ctx, caller(1, 0), "name").await.unwrap(),
        ServeStatus::Wrong
    );
    // A wrong caller never claims anything
    assert_eq!(reg.tablet_owner("name").await, 0);
    assert_eq!(reg.metrics().serve_wrong.get(), 3);
}

#[tokio::test]
async fn cancelled_should_serve_claims_nothing() {
    let reg = cluster(1, MemoryCommitLog::new()).await;
    let ctx = RequestContext::background();
    ctx.cancel();

    assert!(matches!(
        reg.should_serve(&ctx, caller(1, 1), "name").await,
        Err(Error::Cancelled)
    ));
    assert_eq!(reg.tablet_owner("name").await, 0);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_claims_have_one_winner() {
    // Slow commits widen the window between the read and the claim
    let reg = cluster(8, MemoryCommitLog::with_latency(Duration::from_millis(5))).await;

    let mut handles = Vec::new();
    for id in 1..=8u64 {
        let reg = reg.clone();
        handles.push(tokio::spawn(async move {
            let ctx = RequestContext::background();
            let status = reg
                .should_serve(&ctx, caller(id, id as u32), "contested")
                .await
                .unwrap();
            (id, status)
        }));
    }

    let results = futures_util::future::join_all(handles).await;
    let winners: Vec<u64> = results
        .into_iter()
        .map(|r| r.unwrap())
        .filter(|(_, status)| *status == ServeStatus::Ok)
        .map(|(id, _)| id)
        .collect();

    assert_eq!(winners.len(), 1);
    assert_eq!(reg.tablet_owner("contested").await, winners[0] as u32);
    assert_eq!(reg.metrics().tablet_claims.get(), 1);
    assert_eq!(reg.metrics().serve_not.get(), 7);
}

#[tokio::test]
async fn tablets_are_independent() {
    let reg = cluster(2, MemoryCommitLog::new()).await;
    let ctx = RequestContext::background();

    assert_eq!(
        reg.should_serve(&ctx, caller(1, 1), "name").await.unwrap(),
        ServeStatus::Ok
    );
    assert_eq!(
        reg.should_serve(&ctx, caller(2, 2), "age").await.unwrap(),
        ServeStatus::Ok
    );

    let tablets = reg.snapshot().await.tablets;
    assert_eq!(tablets.len(), 2);
    assert_eq!(tablets["name"], 1);
    assert_eq!(tablets["age"], 2);
}
