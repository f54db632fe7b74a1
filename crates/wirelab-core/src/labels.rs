//! Container label keys used for lab-scoped discovery.

/// Label carrying the lab name; present on every lab-owned container and
/// on the management network.
pub const LAB_LABEL: &str = "containerlab";

/// Label carrying the node short-name.
pub const NODE_NAME_LABEL: &str = "clab-node-name";
