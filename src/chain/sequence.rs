// Sequence continuity tracking.
//
// Each document state may be tagged with an opaque id. A delta names the id
// of the state it was produced against; applying it to any other state is
// refused before the engine runs.

use std::fmt;

/// Identifier of a document state. Unset equals only unset.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct SequenceToken(Option<String>);

impl SequenceToken {
    pub const fn unset() -> Self {
        Self(None)
    }

    pub fn new(id: impl Into<String>) -> Self {
        Self(Some(id.into()))
    }

    pub fn as_str(&self) -> Option<&str> {
        self.0.as_deref()
    }

    pub fn is_set(&self) -> bool {
        self.0.is_some()
    }
}

impl From<&str> for SequenceToken {
    fn from(id: &str) -> Self {
        Self::new(id)
    }
}

impl From<String> for SequenceToken {
    fn from(id: String) -> Self {
        Self(Some(id))
    }
}

impl From<Option<&str>> for SequenceToken {
    fn from(id: Option<&str>) -> Self {
        Self(id.map(str::to_owned))
    }
}

impl From<Option<String>> for SequenceToken {
    fn from(id: Option<String>) -> Self {
        Self(id)
    }
}

impl fmt::Display for SequenceToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.0 {
            Some(id) => f.write_str(id),
            None => f.write_str("unset"),
        }
    }
}

/// `expected` is the id the caller claimed; `actual` the one held.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error(
    "sequence continuity check failed: the provided id ({expected}) does not match \
     the last preserved sequence id ({actual})"
)]
pub struct ContinuityError {
    pub expected: SequenceToken,
    pub actual: SequenceToken,
}

#[derive(Debug, Default)]
pub struct SequenceGuard {
    current: SequenceToken,
}

impl SequenceGuard {
    pub fn new() -> Self {
        Self::default()
    }

    /// Succeeds iff `expected` equals the held token. Never mutates.
    pub fn check(&self, expected: &SequenceToken) -> Result<(), ContinuityError> {
        if *expected == self.current {
            Ok(())
        } else {
            Err(ContinuityError {
                expected: expected.clone(),
                actual: self.current.clone(),
            })
        }
    }

    pub fn advance(&mut self, new: SequenceToken) {
        self.current = new;
    }

    pub fn current(&self) -> &SequenceToken {
        &self.current
    }
}
