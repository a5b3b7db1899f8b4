//! Host platform names used as settings keys.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Operating system family, named the way editor settings key paths by OS.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Platform {
    Osx,
    Linux,
    Windows,
}

impl Platform {
    /// The platform this binary was built for.
    ///
    /// Unix flavours other than macOS report as `Linux`.
    #[must_use]
    pub fn current() -> Self {
        if cfg!(windows) {
            Self::Windows
        } else if cfg!(target_os = "macos") {
            Self::Osx
        } else {
            Self::Linux
        }
    }

    /// Settings key for this platform.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Osx => "osx",
            Self::Linux => "linux",
            Self::Windows => "windows",
        }
    }
}

impl fmt::Display for Platform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Platform {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "osx" => Ok(Self::Osx),
            "linux" => Ok(Self::Linux),
            "windows" => Ok(Self::Windows),
            other => Err(format!("unknown platform: {other}")),
        }
    }
}
