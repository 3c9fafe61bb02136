//! Newtype wrappers for domain identifiers.
//!
//! These types prevent accidental mixing of different identifier kinds
//! (e.g., using a ticket key where a stream ID is expected) and make the
//! code more self-documenting.

use serde::{Deserialize, Serialize};
use std::fmt;

/// An issue-tracker ticket key (e.g., "PAY-142").
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TicketKey(pub String);

impl TicketKey {
    pub fn new(s: impl Into<String>) -> Self {
        TicketKey(s.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Returns the project portion of the key ("PAY-142" → "PAY").
    ///
    /// Keys without a dash return the whole key.
    pub fn project(&self) -> ProjectKey {
        match self.0.split_once('-') {
            Some((project, _)) => ProjectKey::new(project),
            None => ProjectKey::new(&self.0),
        }
    }
}

impl fmt::Display for TicketKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for TicketKey {
    fn from(s: &str) -> Self {
        TicketKey(s.to_string())
    }
}

/// An issue-tracker project key (the prefix of ticket keys, e.g., "PAY").
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ProjectKey(pub String);

impl ProjectKey {
    pub fn new(s: impl Into<String>) -> Self {
        ProjectKey(s.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ProjectKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for ProjectKey {
    fn from(s: &str) -> Self {
        ProjectKey(s.to_string())
    }
}

/// A pull request number within a repository.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PrNumber(pub u64);

impl fmt::Display for PrNumber {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

impl From<u64> for PrNumber {
    fn from(n: u64) -> Self {
        PrNumber(n)
    }
}

/// A repository identifier (owner/repo format).
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct RepoId {
    pub owner: String,
    pub repo: String,
}

impl RepoId {
    pub fn new(owner: impl Into<String>, repo: impl Into<String>) -> Self {
        RepoId {
            owner: owner.into(),
            repo: repo.into(),
        }
    }
}

impl fmt::Display for RepoId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.owner, self.repo)
    }
}

/// A delivery or tech stream identifier.
///
/// Streams are the unit of attribution for forecasts, blocking correlation,
/// and deploy/incident matching. Delivery streams own tickets; tech streams
/// own deploys and take blame for blocking.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct StreamId(pub String);

impl StreamId {
    pub fn new(s: impl Into<String>) -> Self {
        StreamId(s.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for StreamId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for StreamId {
    fn from(s: &str) -> Self {
        StreamId(s.to_string())
    }
}

/// Identifier of a row in the intake queue.
///
/// Assigned by the queue store at enqueue time; monotonically increasing in
/// the in-memory store so it doubles as an enqueue-order tiebreaker.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct QueueId(pub u64);

impl fmt::Display for QueueId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<u64> for QueueId {
    fn from(n: u64) -> Self {
        QueueId(n)
    }
}
