//! Typed AWS resource graph for the ECS deploy estate.
//!
//! Builders declare resources into a [`Stack`] in dependency order and hand
//! back typed contexts ([`Network`], [`Security`], [`Compute`], ...) that the
//! next builder consumes. [`assemble`] runs them all and the result is
//! written out as Terraform JSON with [`Stack::synth_to`].

pub mod api;
pub mod assembly;
pub mod compute;
pub mod document;
pub mod error;
pub mod function;
pub mod graph;
pub mod identity;
pub mod load_balancer;
pub mod network;
pub mod notification;
pub mod observability;
pub mod security;
pub mod storage;

use std::collections::BTreeMap;

pub use api::Api;
pub use assembly::{assemble, Assembly};
pub use compute::{Compute, ImageReference, LaunchType};
pub use error::{Result, StackError};
pub use function::{grant_invoke, Function, Functions, InvokeGrant, InvokePrincipal};
pub use graph::{
    Address, Declaration, HasArn, Handle, LogicalId, Reference, Resource, Stack, Variable,
    SYNTH_FILE,
};
pub use identity::Identity;
pub use load_balancer::LoadBalancing;
pub use network::Network;
pub use notification::Notification;
pub use security::{Direction, Security, SecurityRule};

/// `{"Name": name}`, the tag AWS consoles display
pub(crate) fn name_tag(name: &str) -> BTreeMap<String, String> {
    BTreeMap::from([("Name".to_string(), name.to_string())])
}
