//! Lease-based leader election for replicated syncers.
//!
//! Exactly one replica holds the resource lock at a time; the lock backend
//! (an API object updated with resourceVersion compare-and-swap) is the only
//! source of truth. [`bootstrap::make_leader_election_config`] assembles a
//! ready-to-run configuration and [`leader::LeaderElector`] runs the protocol.

pub mod bootstrap;
pub mod config;
pub mod error;
pub mod events;
pub mod healthz;
pub mod identity;
pub mod leader;
pub mod resourcelock;

pub use bootstrap::{LeaderElectionConfig, leader_election_client, make_leader_election_config};
pub use config::{ElectionPolicy, LeaderElectionOptions};
pub use error::ElectionError;
pub use events::{Event, EventBroadcaster, EventRecorder};
pub use healthz::HealthzAdaptor;
pub use identity::{FixedIdentity, HostnameIdentity, IdentityGenerator, in_cluster_namespace};
pub use leader::{ElectionState, LeaderElector};
pub use resourcelock::{LockDescriptor, LockKind, ResourceLock, new_resource_lock};
