use std::fmt;
use std::str::FromStr;

use serde::Deserialize;

/// How deep into the dependency tree required files are still watched.
///
/// Configured as an integer in `[watch].deps`:
///
/// - `-1`: watch every required file, however deeply nested.
/// - `0`: only first-party files (no package-boundary directory in the path).
/// - `n`: files nested in at most `n` package-boundary directories.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(try_from = "i64")]
pub enum DepthLimit {
    Unlimited,
    Max(usize),
}

impl DepthLimit {
    /// Whether a path at `depth` falls within this limit.
    pub fn allows(&self, depth: usize) -> bool {
        match self {
            DepthLimit::Unlimited => true,
            DepthLimit::Max(max) => depth <= *max,
        }
    }

    /// True when dependency files are watched at all.
    pub fn watches_dependencies(&self) -> bool {
        !matches!(self, DepthLimit::Max(0))
    }
}

impl Default for DepthLimit {
    fn default() -> Self {
        DepthLimit::Max(1)
    }
}

impl TryFrom<i64> for DepthLimit {
    type Error = String;

    fn try_from(value: i64) -> Result<Self, Self::Error> {
        match value {
            -1 => Ok(DepthLimit::Unlimited),
            n if n >= 0 => Ok(DepthLimit::Max(n as usize)),
            other => Err(format!(
                "invalid deps value: {other} (expected -1 for unlimited or a non-negative depth)"
            )),
        }
    }
}

impl FromStr for DepthLimit {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let value: i64 = s
            .trim()
            .parse()
            .map_err(|e| format!("invalid deps value '{s}': {e}"))?;
        DepthLimit::try_from(value)
    }
}

impl fmt::Display for DepthLimit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DepthLimit::Unlimited => write!(f, "-1"),
            DepthLimit::Max(n) => write!(f, "{n}"),
        }
    }
}
