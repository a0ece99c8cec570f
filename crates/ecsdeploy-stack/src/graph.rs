//! Resource graph: declarations, typed handles and the references between them.
//!
//! A [`Stack`] accepts declarations in order. Every string inside a declared
//! resource is scanned for Terraform interpolations (`${type.name.attr}`,
//! `${var.name}`), and each one must point at something declared earlier in
//! the same stack. Forward references and handles taken from another stack
//! are therefore rejected at construction time.

use crate::error::{Result, StackError};
use serde::{Serialize, Serializer};
use serde_json::{json, Map, Value};
use std::collections::{BTreeMap, HashSet};
use std::fmt;
use std::marker::PhantomData;
use std::path::{Path, PathBuf};
use tracing::debug;

/// File written by [`Stack::synth_to`]
pub const SYNTH_FILE: &str = "main.tf.json";

const AWS_PROVIDER_SOURCE: &str = "hashicorp/aws";
const AWS_PROVIDER_VERSION: &str = "~> 5.0";

/// A Terraform resource kind
pub trait Resource: Serialize {
    /// Terraform resource type, e.g. `aws_vpc`
    const TYPE: &'static str;
}

/// Resources exporting an `arn` attribute
pub trait HasArn: Resource {}

/// Name of a resource within its type
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct LogicalId(String);

impl LogicalId {
    pub fn new(id: impl Into<String>) -> Result<Self> {
        let id = id.into();
        let mut chars = id.chars();
        let first_ok = chars
            .next()
            .is_some_and(|c| c.is_ascii_alphabetic() || c == '_');
        let rest_ok = chars.all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-');
        if first_ok && rest_ok {
            Ok(Self(id))
        } else {
            Err(StackError::InvalidLogicalId(id))
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for LogicalId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// `(resource type, logical id)`, unique within a stack
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Address {
    resource_type: &'static str,
    logical_id: LogicalId,
}

impl Address {
    pub fn resource_type(&self) -> &'static str {
        self.resource_type
    }

    pub fn logical_id(&self) -> &LogicalId {
        &self.logical_id
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.resource_type, self.logical_id)
    }
}

/// An attribute of a declared resource, or a declared variable.
/// Renders as the interpolation `${...}`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reference {
    expr: String,
}

impl Reference {
    fn attribute(address: &Address, attr: &str) -> Self {
        Self {
            expr: format!("{}.{}", address, attr),
        }
    }

    pub fn variable(name: &str) -> Self {
        Self {
            expr: format!("var.{}", name),
        }
    }

    /// The expression without the `${}` wrapper
    pub fn expression(&self) -> &str {
        &self.expr
    }
}

impl fmt::Display for Reference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "${{{}}}", self.expr)
    }
}

impl Serialize for Reference {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

/// Read-only identity of a declared resource of kind `R`.
///
/// Only [`Stack::declare`] and [`Stack::declare_after`] hand these out.
pub struct Handle<R> {
    address: Address,
    _kind: PhantomData<fn() -> R>,
}

impl<R> Clone for Handle<R> {
    fn clone(&self) -> Self {
        Self {
            address: self.address.clone(),
            _kind: PhantomData,
        }
    }
}

impl<R> fmt::Debug for Handle<R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Handle").field(&self.address.to_string()).finish()
    }
}

impl<R> PartialEq for Handle<R> {
    fn eq(&self, other: &Self) -> bool {
        self.address == other.address
    }
}

impl<R: Resource> Handle<R> {
    pub fn address(&self) -> &Address {
        &self.address
    }

    pub fn attr(&self, name: &str) -> Reference {
        Reference::attribute(&self.address, name)
    }

    pub fn id(&self) -> Reference {
        self.attr("id")
    }
}

impl<R: HasArn> Handle<R> {
    pub fn arn(&self) -> Reference {
        self.attr("arn")
    }
}

/// An input variable of the synthesized configuration
#[derive(Debug, Clone, Serialize)]
pub struct Variable {
    #[serde(rename = "type")]
    kind: &'static str,
    description: String,
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    sensitive: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    default: Option<String>,
}

impl Variable {
    pub fn string(description: impl Into<String>) -> Self {
        Self {
            kind: "string",
            description: description.into(),
            sensitive: false,
            default: None,
        }
    }

    pub fn sensitive(mut self) -> Self {
        self.sensitive = true;
        self
    }

    pub fn with_default(mut self, default: impl Into<String>) -> Self {
        self.default = Some(default.into());
        self
    }
}

/// One resource as it will be written, plus what it points at
#[derive(Debug, Clone)]
pub struct Declaration {
    address: Address,
    body: Value,
    references: Vec<String>,
}

impl Declaration {
    pub fn address(&self) -> &Address {
        &self.address
    }

    pub fn body(&self) -> &Value {
        &self.body
    }

    /// Resource addresses (`type.name`) and variables (`var.name`) this declaration uses
    pub fn references(&self) -> &[String] {
        &self.references
    }
}

/// Ordered collection of declarations for one provider region
#[derive(Debug)]
pub struct Stack {
    region: String,
    default_tags: BTreeMap<String, String>,
    variables: BTreeMap<String, Variable>,
    declarations: Vec<Declaration>,
    declared: HashSet<String>,
    outputs: BTreeMap<String, Value>,
}

impl Stack {
    pub fn new(region: impl Into<String>, default_tags: BTreeMap<String, String>) -> Self {
        Self {
            region: region.into(),
            default_tags,
            variables: BTreeMap::new(),
            declarations: Vec::new(),
            declared: HashSet::new(),
            outputs: BTreeMap::new(),
        }
    }

    pub fn region(&self) -> &str {
        &self.region
    }

    /// Declare an input variable and return a reference to it
    pub fn variable(&mut self, name: &str, variable: Variable) -> Result<Reference> {
        LogicalId::new(name)?;
        if self.variables.contains_key(name) {
            return Err(StackError::DuplicateVariable(name.to_string()));
        }
        self.variables.insert(name.to_string(), variable);
        Ok(Reference::variable(name))
    }

    pub fn declare<R: Resource>(&mut self, id: &str, resource: R) -> Result<Handle<R>> {
        self.declare_after(id, resource, &[])
    }

    /// Declare a resource with explicit `depends_on` edges
    pub fn declare_after<R: Resource>(
        &mut self,
        id: &str,
        resource: R,
        depends_on: &[&Address],
    ) -> Result<Handle<R>> {
        let address = Address {
            resource_type: R::TYPE,
            logical_id: LogicalId::new(id)?,
        };
        let key = address.to_string();
        if self.declared.contains(&key) {
            return Err(StackError::DuplicateResource(key));
        }

        let mut body = serde_json::to_value(&resource)?;
        let mut references = Vec::new();
        collect_references(&body, &mut references);
        references.extend(depends_on.iter().map(|dep| dep.to_string()));
        references.sort();
        references.dedup();
        for reference in &references {
            self.check_reference(&key, reference)?;
        }

        if !depends_on.is_empty() {
            let Value::Object(map) = &mut body else {
                return Err(StackError::NotAnObject(key));
            };
            let deps = depends_on
                .iter()
                .map(|dep| Value::String(dep.to_string()))
                .collect();
            map.insert("depends_on".to_string(), Value::Array(deps));
        }

        debug!(address = %key, references = references.len(), "declared resource");
        self.declared.insert(key);
        self.declarations.push(Declaration {
            address: address.clone(),
            body,
            references,
        });
        Ok(Handle {
            address,
            _kind: PhantomData,
        })
    }

    /// Expose a value; it may interpolate references
    pub fn output(&mut self, name: &str, value: impl fmt::Display, description: &str) -> Result<()> {
        LogicalId::new(name)?;
        if self.outputs.contains_key(name) {
            return Err(StackError::DuplicateOutput(name.to_string()));
        }
        let value = Value::String(value.to_string());
        let mut references = Vec::new();
        collect_references(&value, &mut references);
        let from = format!("output.{}", name);
        for reference in &references {
            self.check_reference(&from, reference)?;
        }
        self.outputs.insert(
            name.to_string(),
            json!({ "value": value, "description": description }),
        );
        Ok(())
    }

    fn check_reference(&self, from: &str, reference: &str) -> Result<()> {
        let known = match reference.strip_prefix("var.") {
            Some(name) => self.variables.contains_key(name),
            None => self.declared.contains(reference),
        };
        if known {
            Ok(())
        } else {
            Err(StackError::UnknownReference {
                from: from.to_string(),
                reference: reference.to_string(),
            })
        }
    }

    pub fn declarations(&self) -> &[Declaration] {
        &self.declarations
    }

    pub fn len(&self) -> usize {
        self.declarations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.declarations.is_empty()
    }

    /// The whole configuration as a Terraform JSON document.
    /// Object keys are ordered, so equal stacks render identically.
    pub fn to_json(&self) -> Value {
        let mut resources = Map::new();
        for decl in &self.declarations {
            if let Value::Object(by_name) = resources
                .entry(decl.address.resource_type.to_string())
                .or_insert_with(|| Value::Object(Map::new()))
            {
                by_name.insert(decl.address.logical_id.to_string(), decl.body.clone());
            }
        }

        json!({
            "terraform": {
                "required_providers": {
                    "aws": {
                        "source": AWS_PROVIDER_SOURCE,
                        "version": AWS_PROVIDER_VERSION,
                    }
                }
            },
            "provider": {
                "aws": {
                    "region": self.region,
                    "default_tags": { "tags": self.default_tags },
                }
            },
            "variable": self.variables,
            "resource": resources,
            "output": self.outputs,
        })
    }

    pub fn to_string_pretty(&self) -> Result<String> {
        let mut rendered = serde_json::to_string_pretty(&self.to_json())?;
        rendered.push('\n');
        Ok(rendered)
    }

    /// Write `main.tf.json` into `dir`, creating it if needed
    pub fn synth_to(&self, dir: impl AsRef<Path>) -> Result<PathBuf> {
        let dir = dir.as_ref();
        std::fs::create_dir_all(dir).map_err(|source| StackError::Io {
            path: dir.to_path_buf(),
            source,
        })?;
        let path = dir.join(SYNTH_FILE);
        std::fs::write(&path, self.to_string_pretty()?).map_err(|source| StackError::Io {
            path: path.clone(),
            source,
        })?;
        Ok(path)
    }
}

fn collect_references(value: &Value, out: &mut Vec<String>) {
    match value {
        Value::String(s) => {
            out.extend(interpolations(s).into_iter().filter_map(reference_target));
        }
        Value::Array(items) => items.iter().for_each(|v| collect_references(v, out)),
        Value::Object(map) => map.values().for_each(|v| collect_references(v, out)),
        _ => {}
    }
}

/// Bodies of every `${...}` in `s`, skipping `$${` escapes
fn interpolations(s: &str) -> Vec<&str> {
    let mut found = Vec::new();
    let mut rest = s;
    while let Some(start) = rest.find("${") {
        let escaped = start > 0 && rest.as_bytes()[start - 1] == b'$';
        let after = &rest[start + 2..];
        let Some(end) = after.find('}') else {
            break;
        };
        if !escaped {
            found.push(&after[..end]);
        }
        rest = &after[end + 1..];
    }
    found
}

/// Map an expression to the thing it depends on. Function calls such as
/// `filemd5("...")` depend on nothing in the graph.
fn reference_target(expr: &str) -> Option<String> {
    let expr = expr.trim();
    if expr.contains('(') {
        return None;
    }
    let mut parts = expr.split('.');
    match (parts.next(), parts.next()) {
        (Some("var"), Some(name)) => Some(format!("var.{}", name)),
        (Some(kind), Some(name)) => Some(format!("{}.{}", kind, name)),
        _ => Some(expr.to_string()),
    }
}
