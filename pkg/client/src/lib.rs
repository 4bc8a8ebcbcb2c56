//! Client-side plumbing for talking to the super and meta clusters.
//!
//! Resolution (`rest`, `kubeconfig`, `topology`) is synchronous and never
//! touches the network. `kube` and `memory` provide the two `ObjectApi`
//! implementations used for coordination traffic.

pub mod error;
pub mod kube;
pub mod kubeconfig;
pub mod memory;
pub mod object;
pub mod ratelimit;
pub mod rest;
pub mod topology;

pub use error::ClientError;
pub use object::{ObjectApi, ObjectRef};
pub use rest::{ConfigLoader, DefaultLoader, EndpointSpec, RestConfig, get_client_config};
pub use topology::{Topology, TopologySpec, leader_election_endpoint, resolve_topology};
