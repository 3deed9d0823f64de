//! Identifier types
//!
//! Generated IDs use the format: `{type}-{uuid-v7}`
//! Example: `worker-01943a6e-7c1b-7d2e-9f00-3b1c2d4e5f60`

use serde::{Deserialize, Serialize};

/// Generate a fresh, time-ordered ID with the given type prefix
pub fn generate_id(id_type: &str) -> String {
    format!("{}-{}", id_type, uuid::Uuid::now_v7())
}

macro_rules! string_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(String);

        impl $name {
            /// Wrap an existing ID string
            pub fn new(id: impl Into<String>) -> Self {
                Self(id.into())
            }

            /// Get the full ID string
            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl From<&str> for $name {
            fn from(s: &str) -> Self {
                Self(s.to_string())
            }
        }

        impl From<String> for $name {
            fn from(s: String) -> Self {
                Self(s)
            }
        }
    };
}

string_id!(
    /// Unique identity of one admitted request
    RequestId
);

string_id!(
    /// Identity of one live worker; a replacement worker always gets a new one
    WorkerId
);

string_id!(
    /// Grouping key used to scope cancellation (a job or workflow)
    OwnerId
);

string_id!(
    /// Identifier of a job on the remote API
    JobId
);

impl RequestId {
    /// Mint a fresh request ID
    pub fn generate() -> Self {
        Self(generate_id("req"))
    }
}

impl WorkerId {
    /// Mint a fresh worker identity
    pub fn generate() -> Self {
        Self(generate_id("worker"))
    }
}
