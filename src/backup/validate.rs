//! Validation functions for configuration values.
//!
//! Provides custom validation functions for file paths and directories
//! referenced from the backup configuration.

use validator::ValidationError;

use std::path::Path;

pub fn validate_dir_exist<P: AsRef<Path>>(dir: P) -> Result<(), ValidationError> {
    let dir = dir.as_ref();
    if dir.exists() {
        if !dir.is_dir() {
            return Err(ValidationError::new("InvalidDirectory")
                .with_message(format!("{:?} is not a directory", dir).into()));
        }
    } else {
        return Err(ValidationError::new("InvalidDirectory")
            .with_message(format!("{:?} not found", dir).into()));
    }

    Ok(())
}

pub fn validate_file_exist<P: AsRef<Path>>(file: P) -> Result<(), ValidationError> {
    let file = file.as_ref();
    if file.exists() {
        if !file.is_file() {
            return Err(ValidationError::new("InvalidFile")
                .with_message(format!("{:?} is not a file", file).into()));
        }
    } else {
        return Err(ValidationError::new("InvalidFile")
            .with_message(format!("{:?} not found", file).into()));
    }

    Ok(())
}

pub fn validate_not_blank<S: AsRef<str>>(value: S) -> Result<(), ValidationError> {
    if value.as_ref().trim().is_empty() {
        return Err(ValidationError::new("Blank").with_message("value must not be blank".into()));
    }

    Ok(())
}
