//! Capability-based access control for version content.
//!
//! A version is readable either because its code is on the public
//! allow-list or because the caller holds the [`SCRIPTURE_READ`]
//! capability (or the `*` wildcard). Capabilities arrive as a
//! comma-separated `X-Permissions` header set by upstream middleware;
//! they are parsed once into an immutable [`Capabilities`] value and
//! threaded through every call, so the checks here are pure functions.
//!
//! Validation runs before any retrieval or streaming work — no embedding
//! call, no query, no I/O happens for a denied request.

use crate::error::{Result, ScriptoriumError};

/// Capability required to read non-public versions.
pub const SCRIPTURE_READ: &str = "bible:read";

/// Wildcard granting every capability.
pub const ALL_CAPABILITIES: &str = "*";

/// The caller's capability set, parsed from the permissions header.
#[derive(Debug, Clone, Default)]
pub struct Capabilities(Vec<String>);

impl Capabilities {
    /// Parse a comma-separated header value. Entries are trimmed and
    /// empties dropped; a missing header yields an empty set.
    pub fn from_header(header: Option<&str>) -> Self {
        let caps = header
            .unwrap_or_default()
            .split(',')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_string)
            .collect();
        Capabilities(caps)
    }

    /// Whether the set contains the given capability or the wildcard.
    pub fn has(&self, capability: &str) -> bool {
        self.0
            .iter()
            .any(|c| c == capability || c == ALL_CAPABILITIES)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// Decides whether a capability set may read a given version.
#[derive(Debug, Clone)]
pub struct AccessFilter {
    public_versions: Vec<String>,
}

impl AccessFilter {
    pub fn new(public_versions: Vec<String>) -> Self {
        Self { public_versions }
    }

    /// True if the version is public or the caller holds `bible:read`.
    pub fn can_access(&self, caps: &Capabilities, version_code: &str) -> bool {
        if caps.has(SCRIPTURE_READ) {
            return true;
        }
        self.public_versions.iter().any(|v| v == version_code)
    }

    /// [`Self::can_access`] as a guard: `Err(Forbidden)` on denial.
    pub fn validate(&self, caps: &Capabilities, version_code: &str) -> Result<()> {
        if !self.can_access(caps, version_code) {
            return Err(ScriptoriumError::forbidden(version_code));
        }
        Ok(())
    }
}
