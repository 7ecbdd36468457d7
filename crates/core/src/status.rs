//! Status enums mapping to SMALLINT lookup tables.
//!
//! Each enum variant's discriminant matches the seed data order (1-based)
//! in the corresponding `*_statuses` database table, and each variant has
//! a stable wire name used in API payloads.

use serde::{Deserialize, Serialize};

/// Status ID type matching SMALLINT/SMALLSERIAL in the database.
pub type StatusId = i16;

macro_rules! define_status_enum {
    (
        $(#[$meta:meta])*
        $name:ident {
            $( $(#[$vmeta:meta])* $variant:ident = $val:literal => $wire:literal ),+ $(,)?
        }
    ) => {
        $(#[$meta])*
        #[repr(i16)]
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
        pub enum $name {
            $( $(#[$vmeta])* #[serde(rename = $wire)] $variant = $val ),+
        }

        impl $name {
            /// Return the database status ID.
            pub fn id(self) -> StatusId {
                self as StatusId
            }

            /// Resolve a database status ID, if it is known.
            pub fn from_id(id: StatusId) -> Option<Self> {
                match id {
                    $( $val => Some(Self::$variant), )+
                    _ => None,
                }
            }

            /// Wire name used in API payloads.
            pub fn as_str(self) -> &'static str {
                match self {
                    $( Self::$variant => $wire, )+
                }
            }
        }

        impl From<$name> for StatusId {
            fn from(value: $name) -> Self {
                value as StatusId
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                f.write_str(self.as_str())
            }
        }
    };
}

define_status_enum! {
    /// Import job lifecycle status. Everything except `Running` is terminal.
    ImportJobStatus {
        Running = 1 => "running",
        Succeeded = 2 => "succeeded",
        Failed = 3 => "failed",
        PartiallySucceeded = 4 => "partiallySucceeded",
        Cancelled = 5 => "cancelled",
    }
}

impl ImportJobStatus {
    /// Whether the status is final for the lifetime of the job.
    pub fn is_terminal(self) -> bool {
        self != Self::Running
    }

    /// Whether the job's checkpoint should be discarded on reaching this status.
    pub fn clears_checkpoint(self) -> bool {
        matches!(self, Self::Succeeded | Self::PartiallySucceeded)
    }
}

/// Terminal statuses: succeeded, failed, partially succeeded, cancelled.
pub const TERMINAL_STATUSES: [ImportJobStatus; 4] = [
    ImportJobStatus::Succeeded,
    ImportJobStatus::Failed,
    ImportJobStatus::PartiallySucceeded,
    ImportJobStatus::Cancelled,
];
