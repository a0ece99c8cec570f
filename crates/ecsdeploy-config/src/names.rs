// Typed identifiers shared by the stack builders and the Lambda handlers
//
// Anything the stack declares and the webhook later refers to by name lives
// here, so both sides agree on one value instead of two string literals.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::net::Ipv4Addr;
use std::str::FromStr;
use thiserror::Error;

/// Errors raised when parsing an identifier
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum NameError {
    #[error("invalid image tag '{0}': must match [A-Za-z0-9_][A-Za-z0-9_.-]{{0,127}}")]
    ImageTag(String),

    #[error("invalid CIDR block '{value}': {reason}")]
    Cidr { value: String, reason: &'static str },

    #[error("invalid Fargate task size: cpu={cpu} memory={memory}")]
    TaskSize { cpu: u32, memory: u32 },
}

/// A container image tag (the part after `:` in `<registry-url>:<tag>`)
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ImageTag(String);

impl ImageTag {
    pub fn latest() -> Self {
        Self("latest".to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl FromStr for ImageTag {
    type Err = NameError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut chars = s.chars();
        let first_ok = chars
            .next()
            .is_some_and(|c| c.is_ascii_alphanumeric() || c == '_');
        let rest_ok = chars.all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '.' | '-'));
        if first_ok && rest_ok && s.len() <= 128 {
            Ok(Self(s.to_string()))
        } else {
            Err(NameError::ImageTag(s.to_string()))
        }
    }
}

impl TryFrom<String> for ImageTag {
    type Error = NameError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<ImageTag> for String {
    fn from(tag: ImageTag) -> Self {
        tag.0
    }
}

impl fmt::Display for ImageTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// An IPv4 network in CIDR notation, host bits zero
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Cidr {
    addr: Ipv4Addr,
    prefix: u8,
}

impl Cidr {
    /// Build from octets; callers pass an already aligned network
    pub const fn v4(octets: [u8; 4], prefix: u8) -> Self {
        Self {
            addr: Ipv4Addr::new(octets[0], octets[1], octets[2], octets[3]),
            prefix,
        }
    }

    pub fn any() -> Self {
        Self {
            addr: Ipv4Addr::UNSPECIFIED,
            prefix: 0,
        }
    }

    pub fn prefix(&self) -> u8 {
        self.prefix
    }

    fn mask(&self) -> u32 {
        match self.prefix {
            0 => 0,
            p => u32::MAX << (32 - u32::from(p)),
        }
    }

    /// True if `other` lies entirely within this network
    pub fn contains(&self, other: &Cidr) -> bool {
        other.prefix >= self.prefix && (u32::from(other.addr) & self.mask()) == u32::from(self.addr)
    }

    pub fn overlaps(&self, other: &Cidr) -> bool {
        self.contains(other) || other.contains(self)
    }
}

impl FromStr for Cidr {
    type Err = NameError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = |reason| NameError::Cidr {
            value: s.to_string(),
            reason,
        };
        let (addr, prefix) = s.split_once('/').ok_or_else(|| invalid("missing '/'"))?;
        let addr: Ipv4Addr = addr.parse().map_err(|_| invalid("bad IPv4 address"))?;
        let prefix: u8 = prefix.parse().map_err(|_| invalid("bad prefix length"))?;
        if prefix > 32 {
            return Err(invalid("prefix length above 32"));
        }
        let cidr = Self { addr, prefix };
        if u32::from(addr) & !cidr.mask() != 0 {
            return Err(invalid("host bits set"));
        }
        Ok(cidr)
    }
}

impl TryFrom<String> for Cidr {
    type Error = NameError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<Cidr> for String {
    fn from(cidr: Cidr) -> Self {
        cidr.to_string()
    }
}

impl fmt::Display for Cidr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.addr, self.prefix)
    }
}

/// Where a security rule's addresses come from: the VPC's own range or a literal block.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum CidrSource {
    Vpc,
    Block(Cidr),
}

impl FromStr for CidrSource {
    type Err = NameError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.eq_ignore_ascii_case("vpc") {
            Ok(CidrSource::Vpc)
        } else {
            s.parse().map(CidrSource::Block)
        }
    }
}

impl TryFrom<String> for CidrSource {
    type Error = NameError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<CidrSource> for String {
    fn from(source: CidrSource) -> Self {
        match source {
            CidrSource::Vpc => "vpc".to_string(),
            CidrSource::Block(cidr) => cidr.to_string(),
        }
    }
}

/// Names of the ECS objects the webhook redeploys
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServiceNames {
    pub cluster: String,
    pub task_family: String,
    pub container: String,
    pub service: String,
}

impl Default for ServiceNames {
    fn default() -> Self {
        Self {
            cluster: "cluster-for-cdktf".to_string(),
            task_family: "task-for-cdktf".to_string(),
            container: "container-for-cdktf".to_string(),
            service: "container-for-cdktf-service".to_string(),
        }
    }
}

impl ServiceNames {
    /// Log group the task's containers ship their output to
    pub fn task_log_group(&self) -> String {
        format!("/aws/ecs/{}", self.task_family)
    }
}

/// Fargate task CPU units and memory (MiB)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TaskSize {
    pub cpu: u32,
    pub memory: u32,
}

impl Default for TaskSize {
    fn default() -> Self {
        Self {
            cpu: 512,
            memory: 1024,
        }
    }
}

impl TaskSize {
    /// Check the pair against the combinations Fargate accepts
    pub fn validate(&self) -> Result<(), NameError> {
        let Self { cpu, memory } = *self;
        let ok = match cpu {
            256 => matches!(memory, 512 | 1024 | 2048),
            512 => (1024..=4096).contains(&memory) && memory % 1024 == 0,
            1024 => (2048..=8192).contains(&memory) && memory % 1024 == 0,
            2048 => (4096..=16384).contains(&memory) && memory % 1024 == 0,
            4096 => (8192..=30720).contains(&memory) && memory % 1024 == 0,
            8192 => (16384..=61440).contains(&memory) && memory % 4096 == 0,
            16384 => (32768..=122880).contains(&memory) && memory % 8192 == 0,
            _ => false,
        };
        if ok {
            Ok(())
        } else {
            Err(NameError::TaskSize { cpu, memory })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_image_tag_validation() {
        assert_eq!("v123".parse::<ImageTag>().unwrap().as_str(), "v123");
        assert!("release_1.2-rc".parse::<ImageTag>().is_ok());
        assert!("".parse::<ImageTag>().is_err());
        assert!(".hidden".parse::<ImageTag>().is_err());
        assert!("has space".parse::<ImageTag>().is_err());
        assert!("a".repeat(129).parse::<ImageTag>().is_err());
    }

    #[test]
    fn test_cidr_parsing() {
        let vpc: Cidr = "10.0.0.0/16".parse().unwrap();
        assert_eq!(vpc.to_string(), "10.0.0.0/16");
        assert!("10.0.0.1/16".parse::<Cidr>().is_err());
        assert!("10.0.0.0/33".parse::<Cidr>().is_err());
        assert!("10.0.0.0".parse::<Cidr>().is_err());
        assert_eq!("0.0.0.0/0".parse::<Cidr>().unwrap(), Cidr::any());
        assert_eq!(Cidr::v4([10, 0, 16, 0], 20), "10.0.16.0/20".parse().unwrap());
    }

    #[test]
    fn test_cidr_containment() {
        let vpc: Cidr = "10.0.0.0/16".parse().unwrap();
        let subnet: Cidr = "10.0.16.0/20".parse().unwrap();
        let outside: Cidr = "10.1.0.0/20".parse().unwrap();
        assert!(vpc.contains(&subnet));
        assert!(!vpc.contains(&outside));
        assert!(!subnet.contains(&vpc));
        assert!(Cidr::any().contains(&vpc));
        assert!(subnet.overlaps(&vpc));
    }

    #[test]
    fn test_cidr_source() {
        assert_eq!("vpc".parse::<CidrSource>().unwrap(), CidrSource::Vpc);
        assert!(matches!(
            "0.0.0.0/0".parse::<CidrSource>().unwrap(),
            CidrSource::Block(_)
        ));
        assert!("nope".parse::<CidrSource>().is_err());
    }

    #[test]
    fn test_task_size() {
        assert!(TaskSize::default().validate().is_ok());
        assert!(TaskSize {
            cpu: 256,
            memory: 512
        }
        .validate()
        .is_ok());
        assert!(TaskSize {
            cpu: 256,
            memory: 4096
        }
        .validate()
        .is_err());
        assert!(TaskSize {
            cpu: 300,
            memory: 1024
        }
        .validate()
        .is_err());
    }

    #[test]
    fn test_service_names_log_group() {
        assert_eq!(
            ServiceNames::default().task_log_group(),
            "/aws/ecs/task-for-cdktf"
        );
    }
}
