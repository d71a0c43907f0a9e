//! Descriptors, open modes and handles.

use super::context::Context;
use crate::resource::SharedResource;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::Serialize;
use std::fmt;
use std::ops::{BitOr, BitOrAssign};
use std::sync::Arc;

/// Opaque descriptor returned by `open`. Never reused within a process.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(transparent)]
pub struct ResourceDescriptor(i64);

impl ResourceDescriptor {
    pub(crate) fn new(raw: i64) -> Self {
        Self(raw)
    }

    pub fn raw(&self) -> i64 {
        self.0
    }
}

impl fmt::Display for ResourceDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "rd:{}", self.0)
    }
}

/// Set of operation classes a descriptor permits, fixed at open time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(transparent)]
pub struct OpenMode(u8);

impl OpenMode {
    pub const NONE: OpenMode = OpenMode(0);
    pub const READ: OpenMode = OpenMode(1);
    pub const WRITE: OpenMode = OpenMode(1 << 1);
    pub const INVOKE: OpenMode = OpenMode(1 << 2);
    pub const WATCH: OpenMode = OpenMode(1 << 3);
    pub const ALL: OpenMode = OpenMode(0b1111);

    pub fn contains(self, other: OpenMode) -> bool {
        self.0 & other.0 == other.0
    }

    pub fn bits(self) -> u8 {
        self.0
    }

    pub fn from_bits(bits: u8) -> Self {
        OpenMode(bits & Self::ALL.0)
    }
}

impl BitOr for OpenMode {
    type Output = OpenMode;

    fn bitor(self, rhs: OpenMode) -> OpenMode {
        OpenMode(self.0 | rhs.0)
    }
}

impl BitOrAssign for OpenMode {
    fn bitor_assign(&mut self, rhs: OpenMode) {
        self.0 |= rhs.0;
    }
}

impl fmt::Display for OpenMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let flags = [
            (OpenMode::READ, 'r'),
            (OpenMode::WRITE, 'w'),
            (OpenMode::INVOKE, 'x'),
            (OpenMode::WATCH, 'n'),
        ];
        for (flag, c) in flags {
            let shown = if self.contains(flag) { c } else { '-' };
            write!(f, "{shown}")?;
        }
        Ok(())
    }
}

/// An open resource. Owned by the descriptor table; destroyed by `close`.
pub struct ResourceHandle {
    pub rd: ResourceDescriptor,
    pub resource: SharedResource,
    pub mode: OpenMode,
    pub context: Arc<Context>,
    pub opened_at: DateTime<Utc>,
    last_access: Mutex<DateTime<Utc>>,
}

impl ResourceHandle {
    pub(crate) fn new(
        rd: ResourceDescriptor,
        resource: SharedResource,
        mode: OpenMode,
        context: Arc<Context>,
    ) -> Self {
        let now = Utc::now();
        Self {
            rd,
            resource,
            mode,
            context,
            opened_at: now,
            last_access: Mutex::new(now),
        }
    }

    pub fn last_access(&self) -> DateTime<Utc> {
        *self.last_access.lock()
    }

    pub(crate) fn touch(&self) {
        *self.last_access.lock() = Utc::now();
    }

    pub fn info(&self) -> HandleInfo {
        HandleInfo {
            rd: self.rd,
            resource_id: self.resource.id().to_string(),
            path: self.resource.path().to_string(),
            mode: self.mode,
            context_id: self.context.id.clone(),
            opened_at: self.opened_at,
            last_access: self.last_access(),
        }
    }
}

/// Serializable summary of a handle.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HandleInfo {
    pub rd: ResourceDescriptor,
    pub resource_id: String,
    pub path: String,
    pub mode: OpenMode,
    pub context_id: String,
    pub opened_at: DateTime<Utc>,
    pub last_access: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mode_bits() {
        let mode = OpenMode::READ | OpenMode::INVOKE;
        assert_eq!(mode.bits(), 5);
        assert!(mode.contains(OpenMode::READ));
        assert!(!mode.contains(OpenMode::WRITE));
        assert!(!mode.contains(OpenMode::READ | OpenMode::WRITE));
        assert!(OpenMode::ALL.contains(OpenMode::WATCH));
        assert_eq!(mode.to_string(), "r-x-");
        assert_eq!(OpenMode::from_bits(0xff), OpenMode::ALL);
    }
}
