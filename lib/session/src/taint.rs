//! Taints and the tolerance rule.
//!
//! An operation tolerating the set `T` may be called with a session whose
//! taints are `S` iff `S \ T` is empty. Taints are only ever removed after a
//! session is created.

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;

/// Carried by the anonymous sentinel.
pub const ANONYMOUS: &str = "anonymous";
/// Carried by a session minted for WebAuthn enrollment.
pub const ENROLLMENT: &str = "enrollment";
/// Carried by a session between login start and finish.
pub const START_LOGIN: &str = "start_login";

/// A sorted set of taint names.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TaintSet(BTreeSet<String>);

impl TaintSet {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.0.contains(name)
    }

    pub fn remove(&mut self, name: &str) -> bool {
        self.0.remove(name)
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Taint names in sorted order.
    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.0.iter().map(String::as_str)
    }

    #[must_use]
    pub fn to_vec(&self) -> Vec<String> {
        self.0.iter().cloned().collect()
    }

    /// Checks these taints against the set an operation tolerates.
    ///
    /// # Errors
    ///
    /// Returns the taints that are not tolerated, sorted.
    pub fn check(&self, tolerated: &TaintSet) -> Result<(), UntoleratedTaints> {
        let remaining: Vec<String> = self.0.difference(&tolerated.0).cloned().collect();
        if remaining.is_empty() {
            Ok(())
        } else {
            Err(UntoleratedTaints { remaining })
        }
    }
}

impl<S: Into<String>> FromIterator<S> for TaintSet {
    fn from_iter<I: IntoIterator<Item = S>>(iter: I) -> Self {
        Self(iter.into_iter().map(Into::into).collect())
    }
}

impl fmt::Display for TaintSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}]", self.to_vec().join(", "))
    }
}

/// A session carries taints the operation does not tolerate.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UntoleratedTaints {
    /// Offending taints, sorted.
    pub remaining: Vec<String>,
}

impl fmt::Display for UntoleratedTaints {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "operation does not tolerate session taints [{}]",
            self.remaining.join(", ")
        )
    }
}

impl std::error::Error for UntoleratedTaints {}
