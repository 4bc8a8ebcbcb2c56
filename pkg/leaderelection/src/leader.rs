use chrono::Utc;
use pkg_types::election::LeaderElectionRecord;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::watch;
use tokio::time::{Instant, sleep, timeout};
use tracing::{debug, info, warn};

use crate::bootstrap::LeaderElectionConfig;
use crate::error::ElectionError;

/// Acquire retries wait between `retry_period` and `retry_period * (1 + JITTER_FACTOR)`.
const JITTER_FACTOR: f64 = 1.2;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ElectionState {
    NotLeader,
    Leader,
    /// Terminal: shutdown was observed.
    Stopped,
}

struct Observed {
    record: Option<LeaderElectionRecord>,
    /// Local time the record was last seen to change. Expiry is judged
    /// against this, never against timestamps written by other hosts.
    time: Instant,
    /// Last time the lock backend answered at all.
    last_contact: Instant,
}

enum RenewOutcome {
    Lost,
    Shutdown,
}

/// Runs the lease protocol for one participant.
///
/// `NotLeader -> Leader` on acquiring the lock, `Leader -> NotLeader` when a
/// renewal can't succeed within `renew_deadline`, and any state `-> Stopped`
/// once shutdown is signalled. The current state is published on a watch
/// channel so work can be gated on `Leader`.
pub struct LeaderElector {
    config: LeaderElectionConfig,
    observed: Mutex<Observed>,
    state_tx: watch::Sender<ElectionState>,
}

async fn wait_shutdown(shutdown: &mut watch::Receiver<bool>) {
    if shutdown.wait_for(|stop| *stop).await.is_err() {
        // Sender gone: nobody can ask us to stop any more.
        std::future::pending::<()>().await;
    }
}

fn jittered(period: Duration) -> Duration {
    period.mul_f64(1.0 + rand::random::<f64>() * JITTER_FACTOR)
}

impl LeaderElector {
    pub fn new(config: LeaderElectionConfig) -> Result<Arc<Self>, ElectionError> {
        config.policy.validate()?;
        let (state_tx, _) = watch::channel(ElectionState::NotLeader);
        let now = Instant::now();
        let elector = Arc::new(Self {
            config,
            observed: Mutex::new(Observed {
                record: None,
                time: now,
                last_contact: now,
            }),
            state_tx,
        });
        elector.config.watchdog.set_elector(&elector);
        Ok(elector)
    }

    /// Observe state changes.
    pub fn subscribe(&self) -> watch::Receiver<ElectionState> {
        self.state_tx.subscribe()
    }

    pub fn state(&self) -> ElectionState {
        *self.state_tx.borrow()
    }

    pub fn is_leader(&self) -> bool {
        self.state() == ElectionState::Leader
    }

    pub fn identity(&self) -> &str {
        self.config.lock.identity()
    }

    /// Holder of the lock as last observed, empty if none.
    pub fn leader(&self) -> String {
        self.observed()
            .record
            .as_ref()
            .map(|r| r.holder_identity.clone())
            .unwrap_or_default()
    }

    fn observed(&self) -> std::sync::MutexGuard<'_, Observed> {
        self.observed.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn set_state(&self, state: ElectionState) {
        self.state_tx.send_replace(state);
    }

    /// Watchdog hook: fail when we should be renewing but aren't.
    pub fn check(&self, max_tolerable_expired: Duration) -> Result<(), ElectionError> {
        let limit = self.config.policy.lease_duration + max_tolerable_expired;
        let observed = self.observed();
        if self.is_leader() && observed.time.elapsed() > limit {
            return Err(ElectionError::Unhealthy(format!(
                "failed election to renew leadership on lease {}",
                self.config.name
            )));
        }
        if self.state() != ElectionState::Stopped && observed.last_contact.elapsed() > limit {
            return Err(ElectionError::Unhealthy(format!(
                "lock backend for {} unreachable for {:?}",
                self.config.lock.describe(),
                observed.last_contact.elapsed()
            )));
        }
        Ok(())
    }

    /// Run until `shutdown` turns true. Returns after publishing `Stopped`.
    pub async fn run(self: Arc<Self>, mut shutdown: watch::Receiver<bool>) {
        info!(
            identity = %self.identity(),
            lock = %self.config.lock.describe(),
            lease = ?self.config.policy.lease_duration,
            renew = ?self.config.policy.renew_deadline,
            retry = ?self.config.policy.retry_period,
            "LeaderElector started"
        );

        loop {
            if !self.acquire(&mut shutdown).await {
                break;
            }

            self.set_state(ElectionState::Leader);
            self.config.lock.record_event("became leader");
            info!(identity = %self.identity(), "Leadership acquired");

            match self.renew(&mut shutdown).await {
                RenewOutcome::Shutdown => {
                    if self.config.release_on_cancel {
                        self.release().await;
                    }
                    self.config.lock.record_event("stopped leading");
                    break;
                }
                RenewOutcome::Lost => {
                    self.set_state(ElectionState::NotLeader);
                    self.config.lock.record_event("stopped leading");
                    warn!(identity = %self.identity(), "Leadership lost");
                }
            }
        }

        self.set_state(ElectionState::Stopped);
        info!(identity = %self.identity(), "LeaderElector stopped");
    }

    /// Retry until the lock is ours. `false` means shutdown was requested.
    async fn acquire(&self, shutdown: &mut watch::Receiver<bool>) -> bool {
        let policy = self.config.policy;
        info!(
            identity = %self.identity(),
            lock = %self.config.lock.describe(),
            "Attempting to acquire leader lease"
        );
        loop {
            if *shutdown.borrow() {
                return false;
            }
            let attempt = tokio::select! {
                res = timeout(policy.renew_deadline, self.try_acquire_or_renew()) => res,
                _ = wait_shutdown(shutdown) => return false,
            };
            match attempt {
                Ok(Ok(true)) => return true,
                Ok(Ok(false)) => {
                    debug!(
                        identity = %self.identity(),
                        leader = %self.leader(),
                        "Lease held by another, waiting..."
                    );
                }
                Ok(Err(e)) => {
                    warn!(identity = %self.identity(), error = %e, "Failed to acquire lease, retrying...");
                }
                Err(_) => {
                    warn!(identity = %self.identity(), "Acquire attempt timed out, retrying...");
                }
            }
            tokio::select! {
                _ = sleep(jittered(policy.retry_period)) => {}
                _ = wait_shutdown(shutdown) => return false,
            }
        }
    }

    /// Keep renewing while we hold the lock.
    async fn renew(&self, shutdown: &mut watch::Receiver<bool>) -> RenewOutcome {
        let policy = self.config.policy;
        loop {
            let renewed = tokio::select! {
                res = timeout(policy.renew_deadline, self.renew_until_success()) => res.is_ok(),
                _ = wait_shutdown(shutdown) => return RenewOutcome::Shutdown,
            };
            if !renewed {
                warn!(
                    identity = %self.identity(),
                    deadline = ?policy.renew_deadline,
                    "Failed to renew lease before the deadline"
                );
                return RenewOutcome::Lost;
            }
            tokio::select! {
                _ = sleep(policy.retry_period) => {}
                _ = wait_shutdown(shutdown) => return RenewOutcome::Shutdown,
            }
        }
    }

    /// Poll every `retry_period` until a renewal goes through. Bounded by the caller.
    async fn renew_until_success(&self) {
        loop {
            match self.try_acquire_or_renew().await {
                Ok(true) => return,
                Ok(false) => debug!(identity = %self.identity(), "Renewal refused"),
                Err(e) => warn!(identity = %self.identity(), error = %e, "Renewal failed"),
            }
            sleep(self.config.policy.retry_period).await;
        }
    }

    /// One round of the protocol: create the record, renew our own claim, or
    /// take over an expired one. `Ok(false)` means someone else holds it.
    async fn try_acquire_or_renew(&self) -> Result<bool, ElectionError> {
        let lock = &self.config.lock;
        let now = Utc::now();
        let mut desired = LeaderElectionRecord {
            holder_identity: lock.identity().to_string(),
            lease_duration_seconds: self.config.policy.lease_duration.as_secs() as i64,
            acquire_time: Some(now),
            renew_time: Some(now),
            leader_transitions: 0,
        };

        let existing = lock.get().await?;
        self.observed().last_contact = Instant::now();

        let Some(old) = existing else {
            return match lock.create(&desired).await {
                Ok(()) => {
                    self.set_observed(desired);
                    Ok(true)
                }
                Err(e) if e.is_conflict() => Ok(false),
                Err(e) => Err(e),
            };
        };

        let held_by_us = old.is_held_by(lock.identity());
        {
            let mut observed = self.observed();
            if observed.record.as_ref() != Some(&old) {
                if observed.record.as_ref().map(|r| &r.holder_identity) != Some(&old.holder_identity) {
                    info!(identity = %lock.identity(), leader = %old.holder_identity, "New leader observed");
                }
                observed.record = Some(old.clone());
                observed.time = Instant::now();
            }
            if !old.holder_identity.is_empty()
                && !held_by_us
                && observed.time + self.config.policy.lease_duration > Instant::now()
            {
                // Wall-clock expiry only hints at a dead holder or clock skew.
                if old.is_expired(now) {
                    debug!(leader = %old.holder_identity, "Lease looks expired by its renew time, waiting for local expiry");
                }
                return Ok(false);
            }
        }

        if held_by_us {
            desired.acquire_time = old.acquire_time;
            desired.leader_transitions = old.leader_transitions;
        } else {
            desired.leader_transitions = old.leader_transitions + 1;
        }

        match lock.update(&desired).await {
            Ok(()) => {
                self.set_observed(desired);
                Ok(true)
            }
            Err(e) if e.is_conflict() => Ok(false),
            Err(e) => Err(e),
        }
    }

    fn set_observed(&self, record: LeaderElectionRecord) {
        let mut observed = self.observed();
        let now = Instant::now();
        observed.record = Some(record);
        observed.time = now;
        observed.last_contact = now;
    }

    /// Give up the lock so a standby can take over without waiting for expiry.
    async fn release(&self) {
        let transitions = match &self.observed().record {
            Some(r) if r.is_held_by(self.identity()) => r.leader_transitions,
            _ => return,
        };
        let now = Utc::now();
        let released = LeaderElectionRecord {
            holder_identity: String::new(),
            lease_duration_seconds: 1,
            acquire_time: Some(now),
            renew_time: Some(now),
            leader_transitions: transitions,
        };
        let attempt = timeout(
            self.config.policy.renew_deadline,
            self.config.lock.update(&released),
        )
        .await;
        match attempt {
            Ok(Ok(())) => {
                self.set_observed(released);
                info!(identity = %self.identity(), "Lease released for fast failover");
            }
            Ok(Err(e)) => warn!(identity = %self.identity(), error = %e, "Failed to release lease"),
            Err(_) => warn!(identity = %self.identity(), "Timed out releasing lease"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ElectionPolicy;
    use crate::events::{EventBroadcaster, EventRecorder};
    use crate::healthz::HealthzAdaptor;
    use crate::resourcelock::{ResourceLock, new_resource_lock};
    use async_trait::async_trait;
    use pkg_client::memory::MemoryObjectApi;
    use pkg_client::object::ObjectRef;
    use pkg_client::{ClientError, ObjectApi};
    use serde_json::Value;

    fn policy() -> ElectionPolicy {
        ElectionPolicy {
            lease_duration: Duration::from_secs(15),
            renew_deadline: Duration::from_secs(10),
            retry_period: Duration::from_secs(2),
            watchdog_threshold: Duration::from_secs(20),
        }
    }

    fn config(
        identity: &str,
        api: Arc<dyn ObjectApi>,
        recorder: Option<Arc<dyn EventRecorder>>,
    ) -> LeaderElectionConfig {
        let lock: Arc<dyn ResourceLock> = new_resource_lock(
            "leases",
            "vc-manager",
            "vc-syncer-leaderelection-lock",
            identity,
            api,
            recorder,
        )
        .unwrap();
        LeaderElectionConfig {
            lock,
            policy: policy(),
            watchdog: Arc::new(HealthzAdaptor::new(Duration::from_secs(20))),
            name: "resource-syncer".to_string(),
            release_on_cancel: true,
        }
    }

    struct Participant {
        elector: Arc<LeaderElector>,
        stop: watch::Sender<bool>,
        task: tokio::task::JoinHandle<()>,
    }

    fn start(identity: &str, api: Arc<dyn ObjectApi>) -> Participant {
        let elector = LeaderElector::new(config(identity, api, None)).unwrap();
        let (stop, rx) = watch::channel(false);
        let task = tokio::spawn(Arc::clone(&elector).run(rx));
        Participant {
            elector,
            stop,
            task,
        }
    }

    async fn wait_for_state(elector: &LeaderElector, state: ElectionState) {
        let mut rx = elector.subscribe();
        rx.wait_for(|s| *s == state).await.unwrap();
    }

    /// Records when each `get` (one per protocol round) happened.
    struct TimedApi {
        inner: MemoryObjectApi,
        gets: Mutex<Vec<Instant>>,
    }

    #[async_trait]
    impl ObjectApi for TimedApi {
        async fn get(&self, object: &ObjectRef) -> Result<Option<Value>, ClientError> {
            self.gets.lock().unwrap().push(Instant::now());
            self.inner.get(object).await
        }
        async fn create(&self, object: &ObjectRef, body: &Value) -> Result<Value, ClientError> {
            self.inner.create(object, body).await
        }
        async fn replace(&self, object: &ObjectRef, body: &Value) -> Result<Value, ClientError> {
            self.inner.replace(object, body).await
        }
    }

    #[test]
    fn invalid_policy_is_rejected() {
        let api: Arc<dyn ObjectApi> = Arc::new(MemoryObjectApi::new());
        let mut cfg = config("a", api, None);
        cfg.policy.renew_deadline = cfg.policy.lease_duration;
        assert!(matches!(
            LeaderElector::new(cfg),
            Err(ElectionError::InvalidPolicy(_))
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn single_participant_becomes_leader_and_stops() {
        let api = Arc::new(MemoryObjectApi::new());
        let recorder = Arc::new(EventBroadcaster::new(16));
        let elector = LeaderElector::new(config(
            "host_a",
            api.clone(),
            Some(recorder.clone() as Arc<dyn EventRecorder>),
        ))
        .unwrap();
        let (stop, rx) = watch::channel(false);
        let task = tokio::spawn(Arc::clone(&elector).run(rx));

        wait_for_state(&elector, ElectionState::Leader).await;
        assert_eq!(elector.leader(), "host_a");

        // Several renew rounds pass without losing the lock.
        sleep(Duration::from_secs(30)).await;
        assert!(elector.is_leader());
        assert!(elector.check(Duration::from_secs(20)).is_ok());

        stop.send(true).unwrap();
        task.await.unwrap();
        assert_eq!(elector.state(), ElectionState::Stopped);

        // Released: nobody holds the lease any more.
        let object = ObjectRef::new(
            "/apis/coordination.k8s.io/v1",
            "leases",
            "vc-manager",
            "vc-syncer-leaderelection-lock",
        );
        assert!(api.snapshot(&object).unwrap()["spec"]["holderIdentity"].is_null());

        let messages: Vec<String> = recorder.events_since(0).into_iter().map(|e| e.message).collect();
        assert_eq!(messages, vec!["host_a became leader", "host_a stopped leading"]);
    }

    #[tokio::test(start_paused = true)]
    async fn racing_participants_never_both_lead() {
        let api: Arc<dyn ObjectApi> = Arc::new(MemoryObjectApi::new());
        let a = start("host_a", api.clone());
        let b = start("host_b", api.clone());

        let mut leaders_seen = 0;
        for _ in 0..600 {
            sleep(Duration::from_millis(100)).await;
            let leaders = [&a, &b].iter().filter(|p| p.elector.is_leader()).count();
            assert!(leaders <= 1, "two leaders at once");
            leaders_seen = leaders_seen.max(leaders);
        }
        assert_eq!(leaders_seen, 1);

        // Hand over: the leader stops and releases, the standby takes over.
        let (leader, standby) = if a.elector.is_leader() { (a, b) } else { (b, a) };
        leader.stop.send(true).unwrap();
        leader.task.await.unwrap();
        wait_for_state(&standby.elector, ElectionState::Leader).await;
        assert_eq!(standby.elector.leader(), standby.elector.identity());

        standby.stop.send(true).unwrap();
        standby.task.await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn live_holder_keeps_standby_out() {
        let api: Arc<dyn ObjectApi> = Arc::new(MemoryObjectApi::new());
        let holder = start("host_a", api.clone());
        wait_for_state(&holder.elector, ElectionState::Leader).await;

        let standby = start("host_b", api.clone());
        sleep(Duration::from_secs(60)).await;
        assert!(holder.elector.is_leader());
        assert!(!standby.elector.is_leader());
        assert_eq!(standby.elector.leader(), "host_a");
        // Standing by is healthy.
        assert!(standby.elector.check(Duration::from_secs(20)).is_ok());

        holder.stop.send(true).unwrap();
        standby.stop.send(true).unwrap();
        holder.task.await.unwrap();
        standby.task.await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn failed_attempts_are_spaced_by_retry_period() {
        let api = Arc::new(TimedApi {
            inner: MemoryObjectApi::new(),
            gets: Mutex::new(Vec::new()),
        });
        api.inner.set_unavailable(true);
        let p = start("host_b", api.clone());

        sleep(Duration::from_secs(60)).await;
        assert_eq!(p.elector.state(), ElectionState::NotLeader);

        let gets = api.gets.lock().unwrap().clone();
        assert!(gets.len() >= 5);
        for pair in gets.windows(2) {
            assert!(pair[1] - pair[0] >= policy().retry_period);
        }

        p.stop.send(true).unwrap();
        p.task.await.unwrap();
        assert_eq!(p.elector.state(), ElectionState::Stopped);
    }

    #[tokio::test(start_paused = true)]
    async fn outage_demotes_leader_then_recovers() {
        let api = Arc::new(MemoryObjectApi::new());
        let p = start("host_a", api.clone());
        wait_for_state(&p.elector, ElectionState::Leader).await;

        api.set_unavailable(true);
        wait_for_state(&p.elector, ElectionState::NotLeader).await;

        // Persistent outage: still alive, but health degrades.
        sleep(Duration::from_secs(40)).await;
        assert_eq!(p.elector.state(), ElectionState::NotLeader);
        assert!(p.elector.check(Duration::from_secs(20)).is_err());

        api.set_unavailable(false);
        wait_for_state(&p.elector, ElectionState::Leader).await;
        assert!(p.elector.check(Duration::from_secs(20)).is_ok());

        p.stop.send(true).unwrap();
        p.task.await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn slow_backend_cannot_hold_leadership_past_deadline() {
        let api = Arc::new(MemoryObjectApi::new());
        let p = start("host_a", api.clone());
        wait_for_state(&p.elector, ElectionState::Leader).await;

        api.set_latency(Duration::from_secs(30));
        let lost_at = Instant::now();
        wait_for_state(&p.elector, ElectionState::NotLeader).await;
        // retry_period sleep + renew_deadline at most.
        assert!(lost_at.elapsed() <= Duration::from_secs(12) + Duration::from_millis(1));

        p.stop.send(true).unwrap();
        p.task.await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn expired_foreign_lease_is_taken_over() {
        let api: Arc<dyn ObjectApi> = Arc::new(MemoryObjectApi::new());
        // A crashed holder: wrote the lease once and never renewed.
        let crashed = new_resource_lock(
            "leases",
            "vc-manager",
            "vc-syncer-leaderelection-lock",
            "host_dead",
            api.clone(),
            None,
        )
        .unwrap();
        let now = Utc::now();
        crashed
            .create(&LeaderElectionRecord {
                holder_identity: "host_dead".to_string(),
                lease_duration_seconds: 15,
                acquire_time: Some(now),
                renew_time: Some(now),
                leader_transitions: 3,
            })
            .await
            .unwrap();

        let started = Instant::now();
        let p = start("host_b", api.clone());
        wait_for_state(&p.elector, ElectionState::Leader).await;
        assert!(started.elapsed() >= policy().lease_duration);

        let record = crashed.get().await.unwrap().unwrap();
        assert_eq!(record.holder_identity, "host_b");
        assert_eq!(record.leader_transitions, 4);

        p.stop.send(true).unwrap();
        p.task.await.unwrap();
    }

    #[tokio::test]
    async fn watchdog_follows_elector() {
        let api: Arc<dyn ObjectApi> = Arc::new(MemoryObjectApi::new());
        let cfg = config("host_a", api, None);
        let watchdog = Arc::clone(&cfg.watchdog);
        assert!(watchdog.check().is_ok());
        let elector = LeaderElector::new(cfg).unwrap();
        assert!(watchdog.check().is_ok());
        drop(elector);
        // The adaptor only holds a weak reference.
        assert!(watchdog.check().is_ok());
        assert_eq!(watchdog.name(), "leaderElection");
    }
}
