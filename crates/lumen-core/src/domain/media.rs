//! Media kind discriminator.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Kind of source media; selects the renderer used for a job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MediaKind {
    /// Still image, resized directly.
    Image,
    /// Video, thumbnailed from an extracted frame.
    Video,
}

impl MediaKind {
    /// Resolves a kind from either a bare kind name (`image`, `video`) or a
    /// MIME type (`image/png`, `video/mp4`).
    #[must_use]
    pub fn parse(value: &str) -> Option<Self> {
        let value = value.trim().to_ascii_lowercase();
        let family = value.split('/').next().unwrap_or_default();
        match family {
            "image" => Some(Self::Image),
            "video" => Some(Self::Video),
            _ => None,
        }
    }

    /// Wire name of the kind.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Image => "image",
            Self::Video => "video",
        }
    }
}

impl fmt::Display for MediaKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for MediaKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s).ok_or_else(|| format!("Unsupported media kind: {s}"))
    }
}
