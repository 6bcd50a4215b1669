//! Type-safe identifier wrappers.
//!
//! Feed identifiers are opaque strings chosen by the upstream source
//! (`train-1`, `TR1234`, ...). Wrapping them in a newtype keeps entity ids
//! from being mixed up with labels or URLs at compile time.

use serde::{Deserialize, Serialize};
use ts_rs::TS;

/// Generates a newtype wrapper around [`String`] with standard derives.
macro_rules! define_id {
    (
        $(#[$meta:meta])*
        $name:ident
    ) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, TS)]
        #[ts(export, export_to = "bindings/")]
        pub struct $name(pub String);

        impl $name {
            /// Wrap an identifier string.
            pub fn new(id: impl Into<String>) -> Self {
                Self(id.into())
            }

            /// Borrow the identifier as a string slice.
            pub fn as_str(&self) -> &str {
                &self.0
            }

            /// Return the inner [`String`] value.
            pub fn into_inner(self) -> String {
                self.0
            }
        }

        impl core::fmt::Display for $name {
            fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl From<&str> for $name {
            fn from(id: &str) -> Self {
                Self(id.to_owned())
            }
        }

        impl From<String> for $name {
            fn from(id: String) -> Self {
                Self(id)
            }
        }

        impl AsRef<str> for $name {
            fn as_ref(&self) -> &str {
                &self.0
            }
        }
    };
}

define_id! {
    /// Stable identifier of a tracked entity (a train) as reported by the feed.
    EntityId
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn id_serializes_as_plain_string() {
        let id = EntityId::from("train-7");
        let json = serde_json::to_string(&id).ok();
        assert_eq!(json.as_deref(), Some("\"train-7\""));
        let restored: Result<EntityId, _> = serde_json::from_str("\"train-7\"");
        assert_eq!(restored.ok(), Some(id));
    }

    #[test]
    fn id_display_matches_inner() {
        let id = EntityId::new("TR1234");
        assert_eq!(id.to_string(), "TR1234");
        assert_eq!(id.as_str(), "TR1234");
    }

    #[test]
    fn ids_order_lexicographically() {
        let mut ids = vec![EntityId::from("b"), EntityId::from("a"), EntityId::from("c")];
        ids.sort();
        let names: Vec<&str> = ids.iter().map(EntityId::as_str).collect();
        assert_eq!(names, vec!["a", "b", "c"]);
    }
}
