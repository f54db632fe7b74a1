//! Deployment engine for wirelab.
//!
//! The engine takes a parsed topology and a runtime handle and drives
//! the whole lab lifecycle:
//!
//! 1. resolve kind defaults, names, MACs and endpoint uniqueness
//! 2. create the management network and learn its bridge and gateways
//! 3. register every node with the phase-aware dependency manager,
//!    derive the implicit edges (static-IP before dynamic, `wait-for`,
//!    shared namespaces) and reject cyclic graphs before any container
//!    exists
//! 4. create nodes through a launcher/worker pool gated on the DAG,
//!    wiring links in parallel as soon as both endpoint nodes are
//!    created
//! 5. run post-deploy hooks, gate dependers on container health where
//!    requested, and finalise exports, hosts entries and exec commands
//!
//! Per-node failures are aggregated into the final report; failures of
//! the management network or the DAG validation abort the deploy.

pub mod dag;
pub mod deploy;
pub mod destroy;
pub mod external;
pub mod hostsfile;
pub mod labnode;
pub mod report;

pub use dag::DependencyManager;
pub use deploy::{DeployOptions, Engine, DEFAULT_NODE_WORKERS};
pub use external::ExternalWaiter;
pub use labnode::{LabNode, NodeHandle, NodeMap};
pub use report::{DeployReport, NodeReport};
