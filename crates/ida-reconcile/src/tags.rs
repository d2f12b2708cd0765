//! The closed error-tag vocabulary.
//!
//! Tag texts are an external contract: downstream analyzers and the repair
//! tools match on them, and the serialized order (timestamp tags last) is
//! relied upon. New tags require a coordinated change in the repair tools.

use std::cmp::Ordering;
use std::fmt;

use serde::{Deserialize, Serialize};

/// A store as named in tag texts.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Store {
    Filesystem,
    Nextcloud,
    Ida,
    Metax,
    Replication,
}

impl Store {
    pub fn label(&self) -> &'static str {
        match self {
            Store::Filesystem => "filesystem",
            Store::Nextcloud => "Nextcloud",
            Store::Ida => "IDA",
            Store::Metax => "Metax",
            Store::Replication => "replication",
        }
    }
}

/// One discrepancy kind.
///
/// Pair variants always hold their stores in the vocabulary order; use the
/// constructors on [`ErrorTag`] rather than building pairs by hand.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum ErrorTag {
    Missing(Store),
    TypeMismatch(Store, Store),
    SizeMismatch(Store, Store),
    ModifiedMismatch(Store, Store),
    FrozenMismatch,
    ChecksumMismatch,
    PidMismatch,
}

/// Store pairs appearing in size / modification tags, in vocabulary order.
const FILE_PAIRS: [(Store, Store); 6] = [
    (Store::Filesystem, Store::Nextcloud),
    (Store::Filesystem, Store::Ida),
    (Store::Filesystem, Store::Metax),
    (Store::Nextcloud, Store::Ida),
    (Store::Nextcloud, Store::Metax),
    (Store::Ida, Store::Metax),
];

/// Store pairs appearing in type tags.
const TYPE_PAIRS: [(Store, Store); 6] = [
    (Store::Filesystem, Store::Nextcloud),
    (Store::Filesystem, Store::Ida),
    (Store::Filesystem, Store::Metax),
    (Store::Nextcloud, Store::Ida),
    (Store::Nextcloud, Store::Metax),
    (Store::Replication, Store::Ida),
];

impl ErrorTag {
    /// Every tag in the vocabulary.
    pub fn vocabulary() -> Vec<ErrorTag> {
        let mut out = Vec::new();
        for s in [
            Store::Filesystem,
            Store::Nextcloud,
            Store::Ida,
            Store::Metax,
            Store::Replication,
        ] {
            out.push(ErrorTag::Missing(s));
        }
        for (a, b) in TYPE_PAIRS {
            out.push(ErrorTag::TypeMismatch(a, b));
        }
        for (a, b) in FILE_PAIRS {
            out.push(ErrorTag::SizeMismatch(a, b));
        }
        out.push(ErrorTag::SizeMismatch(Store::Replication, Store::Ida));
        for (a, b) in FILE_PAIRS {
            out.push(ErrorTag::ModifiedMismatch(a, b));
        }
        out.push(ErrorTag::FrozenMismatch);
        out.push(ErrorTag::ChecksumMismatch);
        out.push(ErrorTag::PidMismatch);
        out
    }

    /// Size tag for two stores given in either order.
    pub fn size(a: Store, b: Store) -> Option<ErrorTag> {
        if (a, b) == (Store::Ida, Store::Replication)
            || (a, b) == (Store::Replication, Store::Ida)
        {
            return Some(ErrorTag::SizeMismatch(Store::Replication, Store::Ida));
        }
        canonical_pair(&FILE_PAIRS, a, b).map(|(x, y)| ErrorTag::SizeMismatch(x, y))
    }

    /// Modification-timestamp tag for two stores given in either order.
    pub fn modified(a: Store, b: Store) -> Option<ErrorTag> {
        canonical_pair(&FILE_PAIRS, a, b).map(|(x, y)| ErrorTag::ModifiedMismatch(x, y))
    }

    /// Type tag for two stores given in either order.
    pub fn node_type(a: Store, b: Store) -> Option<ErrorTag> {
        canonical_pair(&TYPE_PAIRS, a, b).map(|(x, y)| ErrorTag::TypeMismatch(x, y))
    }

    /// Parse a tag text. Anything outside the vocabulary is rejected.
    pub fn parse(text: &str) -> Result<ErrorTag, UnknownErrorTag> {
        ErrorTag::vocabulary()
            .into_iter()
            .find(|t| t.to_string() == text)
            .ok_or_else(|| UnknownErrorTag(text.to_string()))
    }

    /// Tags naming a timestamp; these sort after all other tags.
    pub fn is_timestamp(&self) -> bool {
        matches!(self, ErrorTag::ModifiedMismatch(..) | ErrorTag::FrozenMismatch)
    }

    /// Triggers a modification-timestamp repair.
    pub fn is_modification_timestamp(&self) -> bool {
        matches!(self, ErrorTag::ModifiedMismatch(..))
    }

    /// Triggers a frozen-timestamp repair.
    pub fn is_frozen_timestamp(&self) -> bool {
        matches!(self, ErrorTag::FrozenMismatch)
    }
}

fn canonical_pair(pairs: &[(Store, Store)], a: Store, b: Store) -> Option<(Store, Store)> {
    pairs
        .iter()
        .copied()
        .find(|&(x, y)| (x, y) == (a, b) || (x, y) == (b, a))
}

impl fmt::Display for ErrorTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ErrorTag::Missing(s) => write!(f, "Node does not exist in {}", s.label()),
            ErrorTag::TypeMismatch(a, b) => {
                write!(f, "Node type different for {} and {}", a.label(), b.label())
            }
            ErrorTag::SizeMismatch(a, b) => {
                write!(f, "Node size different for {} and {}", a.label(), b.label())
            }
            ErrorTag::ModifiedMismatch(a, b) => write!(
                f,
                "Node modification timestamp different for {} and {}",
                a.label(),
                b.label()
            ),
            ErrorTag::FrozenMismatch => {
                f.write_str("Node frozen timestamp different for IDA and Metax")
            }
            ErrorTag::ChecksumMismatch => f.write_str("Node checksum different for IDA and Metax"),
            ErrorTag::PidMismatch => f.write_str("Node pid different for IDA and Metax"),
        }
    }
}

// Ascending by text, except that timestamp tags sort after every other tag.
// Downstream analyzers depend on this order.
impl Ord for ErrorTag {
    fn cmp(&self, other: &Self) -> Ordering {
        self.is_timestamp()
            .cmp(&other.is_timestamp())
            .then_with(|| self.to_string().cmp(&other.to_string()))
    }
}

impl PartialOrd for ErrorTag {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl TryFrom<String> for ErrorTag {
    type Error = UnknownErrorTag;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        ErrorTag::parse(&s)
    }
}

impl From<ErrorTag> for String {
    fn from(t: ErrorTag) -> Self {
        t.to_string()
    }
}

/// A tag text outside the closed vocabulary.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnknownErrorTag(pub String);

impl fmt::Display for UnknownErrorTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "unknown error tag '{}'", self.0)
    }
}

impl std::error::Error for UnknownErrorTag {}
