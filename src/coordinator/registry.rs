//! Membership registry
//!
//! The only owner of [`ClusterState`]. Callers go through [`MembershipRegistry`],
//! which guards the state with a single readers-writer lock:
//!
//! - Connect: validate, probe (unlocked), then decide, commit and apply
//!   under the write lock.
//! - ShouldServe: answer under the read lock; an unowned tablet is claimed
//!   under the write lock after re-resolving it.
//!
//! Commit sections run on a spawned task holding an owned write guard, so a
//! caller that disconnects mid-commit cannot leave the log ahead of memory.
//! Holding the guard across the proposal also makes apply order equal log
//! order.

use crate::common::{timestamp_now_millis, Error, RequestContext, Result, ZeroMetrics};
use crate::coordinator::assign::{self, Placement};
use crate::coordinator::commit_log::{Command, CommitLog};
use crate::coordinator::probe::ConnectionProbe;
use crate::coordinator::state::{
    ClusterSnapshot, ClusterState, Member, MembershipUpdate, ServeStatus,
};
use crate::coordinator::tablet::{self, MemberRef, Resolution};
use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex};
use std::time::Instant;
use tokio::sync::RwLock;

pub struct MembershipRegistry {
    state: Arc<RwLock<ClusterState>>,
    /// member id -> last contact (unix millis); volatile, never logged
    last_seen: Mutex<HashMap<u64, u64>>,
    log: Arc<dyn CommitLog>,
    probe: Arc<dyn ConnectionProbe>,
    metrics: Arc<ZeroMetrics>,
}

impl MembershipRegistry {
    /// Empty registry. Use [`MembershipRegistry::recover`] when the log may
    /// already hold entries.
    pub fn new(
        num_replicas: usize,
        log: Arc<dyn CommitLog>,
        probe: Arc<dyn ConnectionProbe>,
    ) -> Result<Self> {
        Self::from_state(ClusterState::new(num_replicas), log, probe)
    }

    /// Rebuild the registry by replaying every committed entry of `log`.
    pub async fn recover(
        num_replicas: usize,
        log: Arc<dyn CommitLog>,
        probe: Arc<dyn ConnectionProbe>,
    ) -> Result<Self> {
        let mut state = ClusterState::new(num_replicas);
        let entries = log.entries().await?;
        let count = entries.len();
        for entry in &entries {
            state.apply(&entry.command);
        }
        tracing::info!(
            entries = count,
            groups = state.group_count(),
            tablets = state.tablet_count(),
            next_group_id = state.next_group_id(),
            "Recovered cluster state from commit log"
        );
        Self::from_state(state, log, probe)
    }

    fn from_state(
        state: ClusterState,
        log: Arc<dyn CommitLog>,
        probe: Arc<dyn ConnectionProbe>,
    ) -> Result<Self> {
        if state.num_replicas() == 0 {
            return Err(Error::InvalidConfig(
                "num_replicas must be at least 1".into(),
            ));
        }
        Ok(Self {
            state: Arc::new(RwLock::new(state)),
            last_seen: Mutex::new(HashMap::new()),
            log,
            probe,
            metrics: Arc::new(ZeroMetrics::new()),
        })
    }

    pub fn metrics(&self) -> &Arc<ZeroMetrics> {
        &self.metrics
    }

    /// Register a member, or refresh the fields of a registered one.
    pub async fn connect(&self, ctx: &RequestContext, member: Member) -> Result<MembershipUpdate> {
        let start = Instant::now();
        let res = self.connect_inner(ctx, member).await;
        match &res {
            Ok(_) => self.metrics.connects_accepted.inc(),
            Err(_) => self.metrics.connects_rejected.inc(),
        }
        self.metrics
            .connect_latency
            .observe(start.elapsed().as_secs_f64() * 1000.0);
        res
    }

    async fn connect_inner(
        &self,
        ctx: &RequestContext,
        member: Member,
    ) -> Result<MembershipUpdate> {
        ctx.check()?;
        validate(&member)?;

        if let Err(e) = ctx.run(self.probe.probe(&member.address)).await {
            tracing::warn!(
                member_id = member.id,
                address = %member.address,
                "Rejecting member: {}",
                e
            );
            return Err(e);
        }

        let member_id = member.id;
        let update = self.commit_connect(ctx.clone(), member).await?;
        self.touch(member_id);
        Ok(update)
    }

    async fn commit_connect(
        &self,
        ctx: RequestContext,
        member: Member,
    ) -> Result<MembershipUpdate> {
        let state = self.state.clone();
        let log = self.log.clone();
        let metrics = self.metrics.clone();

        let task = tokio::spawn(async move {
            let mut guard = state.write_owned().await;
            // The caller may have given up while we waited for the lock.
            ctx.check()?;

            let placement = assign::place(&guard, &member);
            if placement.creates_group() && guard.group(placement.group_id()).is_some() {
                tracing::error!(
                    group_id = placement.group_id(),
                    "Group ids exhausted; refusing to reuse a live group id"
                );
                return Err(Error::Internal(format!(
                    "group id {} already in use",
                    placement.group_id()
                )));
            }
            let mut resolved = member;
            resolved.group_id = placement.group_id();

            let unchanged = matches!(placement, Placement::Existing(_))
                && guard
                    .member(resolved.id)
                    .is_some_and(|m| m.address == resolved.address);

            if !unchanged {
                let command = Command::Connect {
                    member: resolved.clone(),
                    group_created: placement.creates_group(),
                };
                let index = log.propose(command.clone()).await.map_err(|e| {
                    tracing::warn!(member_id = resolved.id, "Connect not committed: {}", e);
                    e
                })?;
                guard.apply(&command);

                if placement.creates_group() {
                    metrics.groups_created.inc();
                }
                tracing::info!(
                    member_id = resolved.id,
                    address = %resolved.address,
                    group_id = resolved.group_id,
                    index,
                    new_group = placement.creates_group(),
                    "Member connected"
                );
            }

            guard
                .membership_update(resolved.id)
                .ok_or_else(|| Error::Internal(format!("member {} missing after apply", resolved.id)))
        });

        task.await
            .map_err(|e| Error::Internal(format!("connect task failed: {}", e)))?
    }

    /// Heartbeat: refresh liveness, or fall back to Connect when the member
    /// is unknown or has moved to a new address.
    pub async fn update(&self, ctx: &RequestContext, member: Member) -> Result<MembershipUpdate> {
        ctx.check()?;
        if member.id == 0 {
            return Err(Error::InvalidId);
        }

        {
            let state = self.state.read().await;
            if let Some(existing) = state.member(member.id) {
                if member.address.is_empty() || member.address == existing.address {
                    self.touch(member.id);
                    self.metrics.heartbeats.inc();
                    tracing::debug!(member_id = member.id, "Heartbeat");
                    return state
                        .membership_update(member.id)
                        .ok_or_else(|| Error::Internal("registered member vanished".into()));
                }
            }
        }

        self.connect(ctx, member).await
    }

    /// May `caller` serve `predicate`? Claims the tablet for the caller's
    /// group when nobody owns it yet.
    pub async fn should_serve(
        &self,
        ctx: &RequestContext,
        caller: MemberRef,
        predicate: &str,
    ) -> Result<ServeStatus> {
        ctx.check()?;

        let resolution = {
            let state = self.state.read().await;
            tablet::resolve(&state, &caller, predicate)
        };

        let status = match resolution {
            Resolution::Decided(status) => status,
            Resolution::Claim(_) => {
                ctx.check()?;
                self.commit_claim(ctx.clone(), caller, predicate.to_string())
                    .await?
            }
        };

        match status {
            ServeStatus::Ok => self.metrics.serve_ok.inc(),
            ServeStatus::Not => self.metrics.serve_not.inc(),
            ServeStatus::Wrong => self.metrics.serve_wrong.inc(),
        }
        Ok(status)
    }

    async fn commit_claim(
        &self,
        ctx: RequestContext,
        caller: MemberRef,
        predicate: String,
    ) -> Result<ServeStatus> {
        let state = self.state.clone();
        let log = self.log.clone();
        let metrics = self.metrics.clone();

        let task = tokio::spawn(async move {
            let mut guard = state.write_owned().await;
            ctx.check()?;

            // Another caller may have claimed it between our read and this lock.
            match tablet::resolve(&guard, &caller, &predicate) {
                Resolution::Decided(status) => Ok::<_, Error>(status),
                Resolution::Claim(group_id) => {
                    let command = Command::ClaimTablet {
                        predicate: predicate.clone(),
                        group_id,
                    };
                    let index = log.propose(command.clone()).await.map_err(|e| {
                        tracing::warn!(predicate = %predicate, "Claim not committed: {}", e);
                        e
                    })?;
                    guard.apply(&command);
                    metrics.tablet_claims.inc();
                    tracing::info!(
                        predicate = %predicate,
                        group_id,
                        member_id = caller.id,
                        index,
                        "Tablet claimed"
                    );
                    Ok(ServeStatus::Ok)
                }
            }
        });

        task.await
            .map_err(|e| Error::Internal(format!("claim task failed: {}", e)))?
    }

    /// Current membership view for a registered member
    pub async fn membership_update(&self, member_id: u64) -> Option<MembershipUpdate> {
        self.state.read().await.membership_update(member_id)
    }

    pub async fn member(&self, member_id: u64) -> Option<Member> {
        self.state.read().await.member(member_id).cloned()
    }

    pub async fn tablet_owner(&self, predicate: &str) -> u32 {
        self.state.read().await.tablet_owner(predicate)
    }

    pub async fn next_group_id(&self) -> u32 {
        self.state.read().await.next_group_id()
    }

    pub fn last_seen(&self, member_id: u64) -> Option<u64> {
        self.last_seen
            .lock()
            .ok()
            .and_then(|seen| seen.get(&member_id).copied())
    }

    pub async fn snapshot(&self) -> ClusterSnapshot {
        let state = self.state.read().await;
        let last_seen: BTreeMap<u64, u64> = self
            .last_seen
            .lock()
            .map(|seen| seen.iter().map(|(k, v)| (*k, *v)).collect())
            .unwrap_or_default();
        ClusterSnapshot {
            num_replicas: state.num_replicas(),
            next_group_id: state.next_group_id(),
            groups: state.membership(),
            tablets: state.tablets(),
            last_seen,
        }
    }

    fn touch(&self, member_id: u64) {
        if let Ok(mut seen) = self.last_seen.lock() {
            seen.insert(member_id, timestamp_now_millis());
        }
    }
}

fn validate(member: &Member) -> Result<()> {
    if member.id == 0 {
        return Err(Error::InvalidId);
    }
    if member.address.is_empty() {
        return Err(Error::InvalidAddress);
    }
    Ok(())
}
