use std::str::FromStr;
use std::time::Duration;

use serde::Deserialize;

/// Scope at which persistent sessions are reused between item executions.
///
/// - `Item`: every item execution gets a fresh session. Maximum isolation,
///   no amortization of session startup cost.
/// - `Branch`: one session per (backend kind, branch); items within the same
///   branch reuse it. This is the default.
/// - `Run`: one session per backend kind for the whole run. Branches reuse
///   the same backend process, so interpreter state written by one branch is
///   visible to every other branch. Only suitable when item commands are
///   self-contained.
///
/// Regardless of scope, access to a shared session is serialized: two items
/// never submit to the same session concurrently.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionSharing {
    Item,
    Branch,
    Run,
}

impl Default for SessionSharing {
    fn default() -> Self {
        SessionSharing::Branch
    }
}

impl FromStr for SessionSharing {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "item" => Ok(SessionSharing::Item),
            "branch" => Ok(SessionSharing::Branch),
            "run" => Ok(SessionSharing::Run),
            other => Err(format!(
                "invalid session_sharing: {other} (expected \"item\", \"branch\" or \"run\")"
            )),
        }
    }
}

/// Parse a simple duration string like `"3s"`, `"250ms"`, `"1m"`, `"2h"`.
pub fn parse_duration(s: &str) -> Result<Duration, String> {
    let s = s.trim();
    if s.is_empty() {
        return Err("empty duration string".to_string());
    }

    // Find the boundary between digits and suffix.
    let idx = s
        .chars()
        .position(|c| !c.is_ascii_digit())
        .ok_or_else(|| "duration missing unit suffix".to_string())?;

    let (num_part, unit_part) = s.split_at(idx);
    let value: u64 = num_part
        .parse()
        .map_err(|e| format!("invalid duration number '{}': {}", num_part, e))?;
    let unit = unit_part.trim().to_lowercase();

    match unit.as_str() {
        "ms" => Ok(Duration::from_millis(value)),
        "s" => Ok(Duration::from_secs(value)),
        "m" => Ok(Duration::from_secs(value * 60)),
        "h" => Ok(Duration::from_secs(value * 60 * 60)),
        _ => Err(format!(
            "unsupported duration unit '{}'; expected ms, s, m, or h",
            unit
        )),
    }
}
