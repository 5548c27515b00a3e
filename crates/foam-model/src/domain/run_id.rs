use std::{borrow::Borrow, fmt};

use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

/// Opaque identifier of a single run.
///
/// Generated ids look like `run_20250101_120000_1a2b3c4d`: the UTC start
/// second followed by eight random hex digits. The id doubles as the name of
/// the run directory, so it never contains path separators.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RunId(String);

impl RunId {
    /// Generate a fresh id stamped with the current UTC time.
    pub fn generate() -> Self {
        Self::generate_at(OffsetDateTime::now_utc())
    }

    fn generate_at(at: OffsetDateTime) -> Self {
        let nonce = uuid::Uuid::new_v4().simple().to_string();
        Self(format!(
            "run_{:04}{:02}{:02}_{:02}{:02}{:02}_{}",
            at.year(),
            u8::from(at.month()),
            at.day(),
            at.hour(),
            at.minute(),
            at.second(),
            &nonce[..8],
        ))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Whether the id is safe to use as a single path component.
    pub fn is_path_safe(&self) -> bool {
        !self.0.is_empty()
            && self.0 != "."
            && self.0 != ".."
            && !self.0.contains(['/', '\\', '\0'])
    }
}

impl fmt::Display for RunId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<String> for RunId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for RunId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl AsRef<str> for RunId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl Borrow<str> for RunId {
    fn borrow(&self) -> &str {
        &self.0
    }
}
