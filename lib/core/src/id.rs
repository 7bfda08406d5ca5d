//! Strongly-typed ID types for runs and history entries.

use serde::{Deserialize, Serialize};
use std::fmt;
use ulid::Ulid;

/// Declares a ULID-backed ID that displays as `<prefix>_<ulid>` and
/// serializes as the bare ULID.
macro_rules! define_id {
    ($(#[$meta:meta])* $name:ident, $prefix:literal) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(Ulid);

        impl $name {
            #[must_use]
            pub fn new() -> Self {
                Self(Ulid::new())
            }
        }

        impl Default for $name {
            fn default() -> Self {
                Self::new()
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}_{}", $prefix, self.0)
            }
        }
    };
}

define_id!(
    /// Identifier for a single local run of a workflow (validate, submit, replay).
    WorkflowRunId,
    "run"
);

define_id!(
    /// Identifier for an entry in the execution history log.
    HistoryEntryId,
    "hist"
);
