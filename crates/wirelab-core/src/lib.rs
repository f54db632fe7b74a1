//! Shared model types for wirelab.
//!
//! This crate holds everything the other wirelab crates agree on: the
//! topology data model, node and link state machines, the top-level error
//! enum, MAC generation under the lab OUI, label keys used for lab-scoped
//! container discovery and the on-disk lab directory layout.
//!
//! The types here are passive. Deployment behaviour lives in
//! `wirelab-engine`; runtime and kernel access live in `wirelab-runtime`
//! and `wirelab-netlink`.

pub mod error;
pub mod labels;
pub mod mac;
pub mod paths;
pub mod topology;

pub use error::{LabError, Result};
pub use paths::LabDirectory;
pub use topology::{
    LinkDescriptor, LinkState, MgmtNet, NetworkMode, NodeConfig, NodeDefaults, NodeState,
    ParsedEndpoint, Phase, Topology,
};
