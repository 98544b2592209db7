//! Per-branch variable lookup.
//!
//! The checked-out git branch selects a secrets file through a branch table
//! (`{"main": "/etc/app/main.json", ...}`), and variables are looked up by
//! name in that file (`{"POSTGRESQL_NAME": "app", ...}`).

pub mod branch;

use crate::backup::function_path;
use crate::backup::redacted::RedactedString;
use crate::backup::result_error::error::Error;
use crate::backup::result_error::result::Result;
use crate::backup::result_error::{AddFunctionName, AddMsg};
use function_name::named;
use getset::Getters;
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::collections::HashMap;
use std::fs::File;
use std::io::BufReader;
use std::path::{Path, PathBuf};

pub static AWS_ACCESS_KEY_ID: &str = "AWS_ACCESS_KEY_ID";
pub static AWS_SECRET_ACCESS_KEY: &str = "AWS_SECRET_ACCESS_KEY";
pub static AWS_STORAGE_BUCKET_NAME: &str = "AWS_STORAGE_BUCKET_NAME";
pub static AWS_S3_REGION_NAME: &str = "AWS_S3_REGION_NAME";
pub static POSTGRESQL_NAME: &str = "POSTGRESQL_NAME";
pub static POSTGRESQL_USER: &str = "POSTGRESQL_USER";
pub static POSTGRESQL_PASSWORD: &str = "POSTGRESQL_PASSWORD";

/// Looks up variables for the branch checked out in `repo_root`.
///
/// The branch is read once at construction and stays pinned for the lifetime
/// of the resolver. The branch table and the secrets file are read on every
/// lookup.
#[derive(Debug, Clone, Getters)]
#[getset(get = "pub")]
pub struct VarResolver {
    repo_root: PathBuf,
    branch_table: PathBuf,
    branch: Option<String>,
}

impl VarResolver {
    pub fn new<P1: Into<PathBuf>, P2: Into<PathBuf>>(repo_root: P1, branch_table: P2) -> Self {
        let repo_root = repo_root.into();
        let branch = match branch::active_branch(&repo_root) {
            Ok(branch) => Some(branch),
            Err(e) => {
                tracing::warn!("Cannot determine active branch, variables will be absent: {e}");
                None
            }
        };

        Self {
            repo_root,
            branch_table: branch_table.into(),
            branch,
        }
    }

    /// Path of the secrets file mapped to the active branch.
    #[named]
    pub fn store_path(&self) -> Result<PathBuf> {
        let branch = self
            .branch
            .as_ref()
            .ok_or_else(|| Error::no_active_branch(self.repo_root.as_path()))?;

        let table: HashMap<String, PathBuf> = read_json(&self.branch_table)
            .add_msg(format!("Failed to load branch table {:?}", self.branch_table))
            .add_fn_name(function_path!())?;

        let store = table
            .get(branch)
            .ok_or_else(|| Error::branch_not_mapped(branch.as_str(), self.branch_table.as_path()))?;

        Ok(match self.branch_table.parent() {
            Some(table_dir) if store.is_relative() => table_dir.join(store),
            _ => store.clone(),
        })
    }

    /// Looks up `name` in the active branch's secrets file.
    ///
    /// Branch, table and file problems are errors; an absent key is `Ok(None)`.
    #[named]
    pub fn try_get<S: AsRef<str>>(&self, name: S) -> Result<Option<String>> {
        let store_path = self.store_path()?;
        let mut store: HashMap<String, Value> = read_json(&store_path)
            .add_msg(format!("Failed to load variable store {:?}", store_path))
            .add_fn_name(function_path!())?;

        Ok(store.remove(name.as_ref()).and_then(value_to_string))
    }

    /// Looks up `name`, logging any failure and returning `None` for it.
    pub fn get<S: AsRef<str>>(&self, name: S) -> Option<String> {
        let name = name.as_ref();
        match self.try_get(name) {
            Ok(Some(value)) => Some(value),
            Ok(None) => {
                tracing::warn!("Variable {name} is not set for branch {:?}", self.branch);
                None
            }
            Err(e) => {
                tracing::warn!("Variable {name} could not be resolved: {e}");
                None
            }
        }
    }

    /// Like [`VarResolver::get`], for values that must not show up in logs.
    pub fn get_secret<S: AsRef<str>>(&self, name: S) -> Option<RedactedString> {
        self.get(name).map(RedactedString::from)
    }
}

fn read_json<T: DeserializeOwned, P: AsRef<Path>>(path: P) -> Result<T> {
    let reader = BufReader::new(File::open(path.as_ref())?);
    Ok(serde_json::from_reader(reader)?)
}

fn value_to_string(value: Value) -> Option<String> {
    match value {
        Value::Null => None,
        Value::String(s) => Some(s),
        other => Some(other.to_string()),
    }
}
