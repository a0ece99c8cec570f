// ecsdeploy - synthesize the ECS deploy estate as Terraform JSON
//
// The binary in main.rs parses arguments; the commands live here so they can
// be driven from tests without spawning a process.

use anyhow::{Context, Result};
use ecsdeploy_config::StackConfig;
use ecsdeploy_stack::{assemble, Stack};
use std::fmt::Write as _;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

mod init;

pub use init::{init_tracing, TracingHandle};

/// Default `synth` output directory
pub const DEFAULT_OUT_DIR: &str = "ecsdeploy.out";

/// Resolve the stack configuration, from `path` if given or from the
/// usual sources otherwise
pub fn load_config(path: Option<&Path>) -> Result<StackConfig> {
    match path {
        Some(path) => StackConfig::load_from_path(path)
            .with_context(|| format!("Failed to load config from {}", path.display())),
        None => StackConfig::load().context("Failed to load configuration"),
    }
}

fn build(config: &StackConfig) -> Result<Stack> {
    let assembly = assemble(config).context("Failed to assemble the resource graph")?;
    Ok(assembly.stack)
}

/// Assemble and write `main.tf.json` into `out`
pub fn synth(config: &StackConfig, out: &Path) -> Result<PathBuf> {
    let stack = build(config)?;
    let path = stack
        .synth_to(out)
        .with_context(|| format!("Failed to write {}", out.display()))?;
    info!(
        path = %path.display(),
        declarations = stack.len(),
        "synthesized stack"
    );
    Ok(path)
}

/// One line per declaration, in declaration order, with what it references
pub fn render_graph(config: &StackConfig) -> Result<String> {
    let stack = build(config)?;
    let mut rendered = String::new();
    for declaration in stack.declarations() {
        let references = declaration.references();
        if references.is_empty() {
            writeln!(rendered, "{}", declaration.address())?;
        } else {
            writeln!(
                rendered,
                "{} -> {}",
                declaration.address(),
                references.join(", ")
            )?;
        }
    }
    debug!(declarations = stack.len(), "rendered graph");
    Ok(rendered)
}

/// Validate the configuration and assemble without writing anything.
/// Returns the number of declarations.
pub fn validate(config: &StackConfig) -> Result<usize> {
    config.validate().context("Invalid configuration")?;
    let stack = build(config)?;
    info!(declarations = stack.len(), region = stack.region(), "configuration is valid");
    Ok(stack.len())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_graph_lines_show_references() {
        let rendered = render_graph(&StackConfig::default()).unwrap();
        let lines: Vec<&str> = rendered.lines().collect();
        assert!(lines.contains(&"aws_vpc.cdktf-production"));

        let subnet = lines
            .iter()
            .position(|line| line.starts_with("aws_subnet.public-subnet1-az1a-cdktf -> "))
            .unwrap();
        assert!(lines[subnet].contains("aws_vpc.cdktf-production"));
        let vpc = lines
            .iter()
            .position(|line| *line == "aws_vpc.cdktf-production")
            .unwrap();
        assert!(vpc < subnet);
    }

    #[test]
    fn test_validate_counts_declarations() {
        let count = validate(&StackConfig::default()).unwrap();
        assert_eq!(
            count,
            render_graph(&StackConfig::default()).unwrap().lines().count()
        );
    }

    #[test]
    fn test_synth_writes_terraform_json() {
        let dir = tempfile::tempdir().unwrap();
        let path = synth(&StackConfig::default(), &dir.path().join("out")).unwrap();
        let document: serde_json::Value =
            serde_json::from_str(&std::fs::read_to_string(path).unwrap()).unwrap();
        assert!(document["resource"]["aws_ecs_service"].is_object());
        assert!(document["variable"]["slack_api_token"]["sensitive"]
            .as_bool()
            .unwrap());
    }
}
