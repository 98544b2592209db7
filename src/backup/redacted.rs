//! Secret values read from the variable store.
//!
//! `RedactedString` keeps the database password and the AWS secret key out of
//! logs, debug output and serialized data, and zeroes them when dropped.

use bon::Builder;
use derive_more::From;
use getset::Getters;
use serde::{Serialize, Serializer};
use std::fmt::{Debug, Display, Formatter};
use std::result;
use zeroize::Zeroize;

/// Placeholder text shown instead of the actual secret
pub static REDACTED_SECRET: &str = "###REDACTED_SECRET###";

/// A string that gets redacted in debug and display output
#[derive(Clone, Zeroize, From, Builder, PartialEq, Eq, Getters)]
#[getset(get = "pub")]
pub struct RedactedString {
    #[builder(into)]
    inner: String,
}

impl Debug for RedactedString {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", REDACTED_SECRET)
    }
}

impl Display for RedactedString {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", REDACTED_SECRET)
    }
}

impl Serialize for RedactedString {
    fn serialize<S: Serializer>(&self, serializer: S) -> result::Result<S::Ok, S::Error> {
        serializer.serialize_str(REDACTED_SECRET)
    }
}

impl Drop for RedactedString {
    fn drop(&mut self) {
        self.zeroize();
    }
}
