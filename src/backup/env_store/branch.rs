use crate::backup::function_path;
use crate::backup::result_error::error::Error;
use crate::backup::result_error::result::Result;
use crate::backup::result_error::{AddFunctionName, AddMsg};
use function_name::named;
use std::path::{Path, PathBuf};

/// Marker of a symbolic reference line in `.git/HEAD`
pub static HEAD_REF_MARKER: &str = "ref:";
/// Prefix in front of a local branch name
pub static BRANCH_REF_PREFIX: &str = "refs/heads/";

pub fn head_file_path<P: AsRef<Path>>(repo_root: P) -> PathBuf {
    repo_root.as_ref().join(".git").join("HEAD")
}

/// Extracts the branch name from the content of a HEAD file.
///
/// Returns `None` for a detached HEAD (no `ref:` line) and for references
/// outside `refs/heads/`.
pub fn parse_head<S: AsRef<str>>(content: S) -> Option<String> {
    content
        .as_ref()
        .lines()
        .find(|line| line.starts_with(HEAD_REF_MARKER))
        .and_then(|line| line.split_once(BRANCH_REF_PREFIX))
        .map(|(_, branch)| branch.trim())
        .filter(|branch| !branch.is_empty())
        .map(str::to_owned)
}

/// Reads `<repo_root>/.git/HEAD` and returns the checked-out branch.
#[named]
pub fn active_branch<P: AsRef<Path>>(repo_root: P) -> Result<String> {
    let head = head_file_path(&repo_root);
    let content = std::fs::read_to_string(&head)
        .map_err(Error::from)
        .add_msg(format!("Failed to read {:?}", head))
        .add_fn_name(function_path!())?;

    let branch = parse_head(content)
        .ok_or_else(|| Error::no_active_branch(repo_root.as_ref()))
        .add_fn_name(function_path!())?;
    tracing::debug!("Active branch of {:?} is {:?}", repo_root.as_ref(), branch);
    Ok(branch)
}
