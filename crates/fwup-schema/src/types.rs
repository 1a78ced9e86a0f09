//! Identifier newtypes and the revision record.

use serde::{Deserialize, Serialize};
use std::borrow::Borrow;

macro_rules! string_newtype {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(String);

        impl $name {
            /// Wrap a raw string.
            pub fn new(s: impl Into<String>) -> Self {
                Self(s.into())
            }

            /// Return the inner value as a string slice.
            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl AsRef<str> for $name {
            fn as_ref(&self) -> &str {
                &self.0
            }
        }

        impl Borrow<str> for $name {
            fn borrow(&self) -> &str {
                &self.0
            }
        }

        impl PartialEq<str> for $name {
            fn eq(&self, other: &str) -> bool {
                self.0 == other
            }
        }

        impl PartialEq<&str> for $name {
            fn eq(&self, other: &&str) -> bool {
                self.0 == *other
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

string_newtype!(
    /// Content-derived identifier of a tracked revision (a commit hash).
    ///
    /// Opaque: only ever compared for equality, never ordered by time.
    RevisionId
);

string_newtype!(
    /// Logical update channel, e.g. `main`. May contain `/`.
    BranchName
);

string_newtype!(
    /// Name of a package flavor, e.g. `src` or `mpy_version/6.1`.
    ///
    /// Also used as the directory prefix of the variant's archives.
    VariantName
);

impl RevisionId {
    /// Whether the id can name a file on its own: non-empty, only
    /// `[A-Za-z0-9._-]`, and not `.` or `..`.
    ///
    /// Ids arrive from the network and become archive file names, so
    /// anything else is rejected before it reaches a path.
    pub fn is_file_safe(&self) -> bool {
        !self.0.is_empty()
            && self.0 != "."
            && self.0 != ".."
            && self
                .0
                .bytes()
                .all(|b| b.is_ascii_alphanumeric() || matches!(b, b'.' | b'_' | b'-'))
    }
}

/// A tracked point in source history.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Revision {
    /// Content hash of the history.
    pub id: RevisionId,
    /// Human readable description, `Author <email>: summary`.
    pub summary: String,
    /// Branch the revision was found on.
    pub branch: BranchName,
}

impl Revision {
    /// Create a revision record.
    pub fn new(
        id: impl Into<RevisionId>,
        summary: impl Into<String>,
        branch: impl Into<BranchName>,
    ) -> Self {
        Self {
            id: id.into(),
            summary: summary.into(),
            branch: branch.into(),
        }
    }

    /// `branch - summary`, as shown in listings.
    pub fn pretty(&self) -> String {
        format!("{} - {}", self.branch, self.summary)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn newtypes_serialize_transparently() {
        let id = RevisionId::new("abc123");
        assert_eq!(serde_json::to_string(&id).unwrap(), "\"abc123\"");
        let back: RevisionId = serde_json::from_str("\"abc123\"").unwrap();
        assert_eq!(back, "abc123");
    }

    #[test]
    fn file_safe_revision_ids() {
        assert!(RevisionId::new("abc123").is_file_safe());
        assert!(RevisionId::new("v1.2_rc-3").is_file_safe());

        for bad in ["", ".", "..", "../escape", "/tmp/victim", "a/b", "a\\b", "sha 1"] {
            assert!(!RevisionId::new(bad).is_file_safe(), "{bad:?} accepted");
        }
    }

    #[test]
    fn revision_pretty() {
        let rev = Revision::new("abc123", "Jo <jo@example.com>: fix pump", "main");
        assert_eq!(rev.pretty(), "main - Jo <jo@example.com>: fix pump");
    }
}
