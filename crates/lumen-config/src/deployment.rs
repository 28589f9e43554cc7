//! Process role configuration.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Which halves of the system a process runs.
///
/// Workers and gateways only share the Redis coordination store, so they can
/// be scaled independently.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum ProcessRole {
    /// Worker pool and realtime gateway in one process.
    #[default]
    All,
    /// Worker pool only.
    Worker,
    /// Realtime gateway and job API only.
    Gateway,
}

impl ProcessRole {
    /// Returns true if this process consumes the work queue.
    #[must_use]
    pub const fn runs_workers(&self) -> bool {
        matches!(self, Self::All | Self::Worker)
    }

    /// Returns true if this process serves realtime sessions.
    #[must_use]
    pub const fn runs_gateway(&self) -> bool {
        matches!(self, Self::All | Self::Gateway)
    }
}

impl fmt::Display for ProcessRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::All => write!(f, "all"),
            Self::Worker => write!(f, "worker"),
            Self::Gateway => write!(f, "gateway"),
        }
    }
}

impl FromStr for ProcessRole {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "all" => Ok(Self::All),
            "worker" => Ok(Self::Worker),
            "gateway" => Ok(Self::Gateway),
            _ => Err(format!("Unknown process role: {}", s)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_role_capabilities() {
        assert!(ProcessRole::All.runs_workers());
        assert!(ProcessRole::All.runs_gateway());
        assert!(ProcessRole::Worker.runs_workers());
        assert!(!ProcessRole::Worker.runs_gateway());
        assert!(!ProcessRole::Gateway.runs_workers());
    }

    #[test]
    fn test_role_parsing() {
        assert_eq!("Worker".parse::<ProcessRole>().unwrap(), ProcessRole::Worker);
        assert!("controller".parse::<ProcessRole>().is_err());
    }
}
