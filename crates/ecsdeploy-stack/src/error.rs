//! Error types for stack construction

use ecsdeploy_config::NameError;
use std::path::PathBuf;
use thiserror::Error;

/// Errors raised while declaring resources. All of them abort assembly.
#[derive(Debug, Error)]
pub enum StackError {
    #[error("invalid logical id '{0}': must start with a letter or '_' and contain only [A-Za-z0-9_-]")]
    InvalidLogicalId(String),

    #[error("duplicate resource {0}")]
    DuplicateResource(String),

    #[error("duplicate variable '{0}'")]
    DuplicateVariable(String),

    #[error("duplicate output '{0}'")]
    DuplicateOutput(String),

    /// A declaration refers to something not declared earlier in the same stack
    #[error("{from} references {reference}, which is not declared before it in this stack")]
    UnknownReference { from: String, reference: String },

    #[error("{0} did not serialize to an object")]
    NotAnObject(String),

    #[error("security rule has an empty CIDR set")]
    EmptyCidrSet,

    #[error("invalid security rule: {0}")]
    InvalidRule(String),

    #[error("{tier} subnets span {found} availability zone(s); at least two are required")]
    InsufficientAvailabilityZones { tier: String, found: usize },

    #[error("no {tier} subnets declared")]
    NoSubnets { tier: String },

    #[error("listener '{listener}': target group is in {target_group_vpc} but the load balancer is in {load_balancer_vpc}")]
    VpcMismatch {
        listener: String,
        target_group_vpc: String,
        load_balancer_vpc: String,
    },

    #[error("security group belongs to {group_vpc}, not {network_vpc}")]
    ForeignSecurityGroup {
        group_vpc: String,
        network_vpc: String,
    },

    #[error("routing rule '{rule}' names unknown listener '{listener}'")]
    UnknownListener { rule: String, listener: String },

    /// An invoke grant was presented for the wrong function or principal
    #[error("invoke grant mismatch: expected {expected}, got {actual}")]
    GrantMismatch { expected: String, actual: String },

    #[error(transparent)]
    Name(#[from] NameError),

    #[error("serialization failed: {0}")]
    Serialize(#[from] serde_json::Error),

    #[error("failed to write {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

pub type Result<T, E = StackError> = std::result::Result<T, E>;
