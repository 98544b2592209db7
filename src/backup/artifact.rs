use derive_more::{Display, From};
use regex::Regex;
use serde::de::Visitor;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt::{Debug, Formatter};
use std::path::PathBuf;
use std::result;

/// Absolute path of a dump under a home directory, as printed by the dump script
pub static DEFAULT_ARTIFACT_PATTERN: &str = r"(/home[^ ]*?/backup_postgres[^ ]*?\.dump)";

/// Pattern locating the backup artifact path in the dump script's output
#[derive(Clone, From, Display)]
#[display("{regex}")]
pub struct ArtifactPattern {
    regex: Regex,
}

impl Default for ArtifactPattern {
    fn default() -> Self {
        Regex::new(DEFAULT_ARTIFACT_PATTERN)
            .expect("default artifact pattern is a valid regex")
            .into()
    }
}

impl Debug for ArtifactPattern {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "ArtifactPattern({:?})", self.regex.as_str())
    }
}

impl PartialEq for ArtifactPattern {
    fn eq(&self, other: &Self) -> bool {
        self.regex.as_str() == other.regex.as_str()
    }
}

impl ArtifactPattern {
    /// First artifact path found in `output`, if any.
    pub fn first_artifact<S: AsRef<str>>(&self, output: S) -> Option<PathBuf> {
        self.regex
            .find(output.as_ref())
            .map(|m| PathBuf::from(m.as_str()))
    }

    pub fn all_artifacts<'a>(&'a self, output: &'a str) -> impl Iterator<Item = PathBuf> + 'a {
        self.regex
            .find_iter(output)
            .map(|m| PathBuf::from(m.as_str()))
    }
}

impl Serialize for ArtifactPattern {
    fn serialize<S: Serializer>(&self, serializer: S) -> result::Result<S::Ok, S::Error> {
        serializer.serialize_str(self.regex.as_str())
    }
}

struct ArtifactPatternVisitor;

impl Visitor<'_> for ArtifactPatternVisitor {
    type Value = ArtifactPattern;

    fn expecting(&self, formatter: &mut Formatter) -> std::fmt::Result {
        formatter.write_str("a regular expression")
    }

    fn visit_str<E>(self, v: &str) -> result::Result<Self::Value, E>
    where
        E: serde::de::Error,
    {
        Regex::new(v)
            .map(ArtifactPattern::from)
            .map_err(serde::de::Error::custom)
    }
}

impl<'de> Deserialize<'de> for ArtifactPattern {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> result::Result<Self, D::Error> {
        deserializer.deserialize_str(ArtifactPatternVisitor)
    }
}
