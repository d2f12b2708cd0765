//! Normalized node paths: the sole join key between the four stores.
//!
//! Every collector maps its native path into `frozen/<rel>` or
//! `staging/<rel>`. The frozen/staging split is decided from the raw
//! filesystem or webstore path alone; registry and catalog paths are always
//! frozen.
//!
//! Paths are case-sensitive and byte-exact. Ordering is plain lexicographic
//! ordering of the full normalized string.

use std::fmt;

use serde::{Deserialize, Serialize};

const FROZEN_PREFIX: &str = "frozen/";
const STAGING_PREFIX: &str = "staging/";
const WEBSTORE_ROOT: &str = "files/";

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// A raw path that cannot be mapped to a normalized node path.
///
/// Always fatal for the collector that produced it: a row the normalizer does
/// not understand indicates a corrupt store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PathError {
    /// Normalized path lacks the `frozen/` or `staging/` prefix.
    MissingArea { raw: String },
    /// Area prefix present but nothing after it.
    EmptyRelative { raw: String },
    /// Raw project path is outside both the frozen and staging roots.
    OutsideProject { project: String, raw: String },
    /// Webstore path does not start with `files/`.
    NotUnderFilesRoot { raw: String },
}

impl fmt::Display for PathError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::MissingArea { raw } => {
                write!(f, "path '{raw}' has no frozen/ or staging/ prefix")
            }
            Self::EmptyRelative { raw } => write!(f, "path '{raw}' has an empty relative part"),
            Self::OutsideProject { project, raw } => {
                write!(f, "path '{raw}' is outside the areas of project '{project}'")
            }
            Self::NotUnderFilesRoot { raw } => {
                write!(f, "webstore path '{raw}' is not under files/")
            }
        }
    }
}

impl std::error::Error for PathError {}

// ---------------------------------------------------------------------------
// NodePath
// ---------------------------------------------------------------------------

/// Logical sub-namespace of a project.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Area {
    Frozen,
    Staging,
}

impl Area {
    pub fn as_str(&self) -> &'static str {
        match self {
            Area::Frozen => "frozen",
            Area::Staging => "staging",
        }
    }
}

/// Normalized path `frozen/<rel>` or `staging/<rel>`.
///
/// `rel` is non-empty and has no leading slash.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct NodePath(String);

impl NodePath {
    /// Validate an already-normalized path string.
    pub fn parse(s: impl Into<String>) -> Result<Self, PathError> {
        let s = s.into();
        let rel = s
            .strip_prefix(FROZEN_PREFIX)
            .or_else(|| s.strip_prefix(STAGING_PREFIX))
            .ok_or_else(|| PathError::MissingArea { raw: s.clone() })?;
        if rel.is_empty() || rel.starts_with('/') {
            return Err(PathError::EmptyRelative { raw: s });
        }
        Ok(Self(s))
    }

    /// Join an area and a relative path. Leading slashes on `rel` are dropped.
    pub fn new(area: Area, rel: &str) -> Result<Self, PathError> {
        let rel = rel.trim_start_matches('/');
        let raw = format!("{}/{}", area.as_str(), rel);
        if rel.is_empty() {
            return Err(PathError::EmptyRelative { raw });
        }
        Ok(Self(raw))
    }

    pub fn frozen(rel: &str) -> Result<Self, PathError> {
        Self::new(Area::Frozen, rel)
    }

    pub fn staging(rel: &str) -> Result<Self, PathError> {
        Self::new(Area::Staging, rel)
    }

    pub fn area(&self) -> Area {
        if self.0.starts_with(FROZEN_PREFIX) {
            Area::Frozen
        } else {
            Area::Staging
        }
    }

    pub fn is_frozen(&self) -> bool {
        self.area() == Area::Frozen
    }

    /// Path relative to the area root.
    pub fn rel(&self) -> &str {
        match self.area() {
            Area::Frozen => &self.0[FROZEN_PREFIX.len()..],
            Area::Staging => &self.0[STAGING_PREFIX.len()..],
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for NodePath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl TryFrom<String> for NodePath {
    type Error = PathError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        Self::parse(s)
    }
}

impl From<NodePath> for String {
    fn from(p: NodePath) -> Self {
        p.0
    }
}

// ---------------------------------------------------------------------------
// Project layout: raw <-> normalized
// ---------------------------------------------------------------------------

/// How one project's areas are named in the filesystem and webstore.
///
/// Frozen area root is `<project>`, staging area root is
/// `<project><staging_suffix>`. The webstore keeps both under `files/`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PathLayout {
    project: String,
    staging_suffix: String,
}

impl PathLayout {
    pub fn new(project: impl Into<String>, staging_suffix: impl Into<String>) -> Self {
        Self {
            project: project.into(),
            staging_suffix: staging_suffix.into(),
        }
    }

    pub fn project(&self) -> &str {
        &self.project
    }

    fn staging_root(&self) -> String {
        format!("{}{}", self.project, self.staging_suffix)
    }

    /// Normalize a path relative to the project's `files/` directory
    /// (`<project>+/a/b` or `<project>/a/b`).
    ///
    /// Returns `Ok(None)` for the bare area roots, which are not nodes.
    pub fn normalize_subpath(&self, raw: &str) -> Result<Option<NodePath>, PathError> {
        let staging_root = self.staging_root();

        // Staging is checked first: `<project>+` starts with `<project>`.
        for (root, area) in [
            (staging_root.as_str(), Area::Staging),
            (self.project.as_str(), Area::Frozen),
        ] {
            if raw == root || raw == format!("{root}/") {
                return Ok(None);
            }
            if let Some(rest) = raw.strip_prefix(root) {
                if let Some(rel) = rest.strip_prefix('/') {
                    return NodePath::new(area, rel).map(Some);
                }
            }
        }

        Err(PathError::OutsideProject {
            project: self.project.clone(),
            raw: raw.to_string(),
        })
    }

    /// Normalize a webstore cache path (`files/<project>+/a/b`).
    ///
    /// The `files` root row itself normalizes to `None`, like the area roots.
    pub fn normalize_webstore(&self, raw: &str) -> Result<Option<NodePath>, PathError> {
        if raw == "files" {
            return Ok(None);
        }
        let sub = raw
            .strip_prefix(WEBSTORE_ROOT)
            .ok_or_else(|| PathError::NotUnderFilesRoot {
                raw: raw.to_string(),
            })?;
        self.normalize_subpath(sub)
    }

    /// Inverse of [`normalize_webstore`](Self::normalize_webstore):
    /// `frozen/<r>` -> `files/<project>/<r>`, `staging/<r>` ->
    /// `files/<project><suffix>/<r>`.
    pub fn webstore_path(&self, path: &NodePath) -> String {
        let root = match path.area() {
            Area::Frozen => self.project.clone(),
            Area::Staging => self.staging_root(),
        };
        format!("{WEBSTORE_ROOT}{root}/{}", path.rel())
    }

    /// Inverse of [`normalize_subpath`](Self::normalize_subpath).
    pub fn subpath(&self, path: &NodePath) -> String {
        let root = match path.area() {
            Area::Frozen => self.project.clone(),
            Area::Staging => self.staging_root(),
        };
        format!("{root}/{}", path.rel())
    }
}

/// Registry and catalog store frozen files by their area-relative path
/// (`/a/b` or `a/b`); both always land in the frozen area.
pub fn frozen_from_stored(stored: &str) -> Result<NodePath, PathError> {
    NodePath::frozen(stored)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn layout() -> PathLayout {
        PathLayout::new("2000123", "+")
    }

    #[test]
    fn staging_and_frozen_subpaths_normalize() {
        let l = layout();
        assert_eq!(
            l.normalize_subpath("2000123+/a/b.dat").unwrap().unwrap().as_str(),
            "staging/a/b.dat"
        );
        assert_eq!(
            l.normalize_subpath("2000123/a/b.dat").unwrap().unwrap().as_str(),
            "frozen/a/b.dat"
        );
    }

    #[test]
    fn area_roots_are_not_nodes() {
        let l = layout();
        assert_eq!(l.normalize_subpath("2000123").unwrap(), None);
        assert_eq!(l.normalize_subpath("2000123+").unwrap(), None);
        assert_eq!(l.normalize_webstore("files").unwrap(), None);
        assert_eq!(l.normalize_webstore("files/2000123+").unwrap(), None);
    }

    #[test]
    fn foreign_project_prefix_is_rejected() {
        let l = layout();
        assert!(matches!(
            l.normalize_subpath("20001234/a"),
            Err(PathError::OutsideProject { .. })
        ));
        assert!(matches!(
            l.normalize_subpath("2000123-/a"),
            Err(PathError::OutsideProject { .. })
        ));
    }

    #[test]
    fn webstore_requires_files_root() {
        let l = layout();
        assert!(matches!(
            l.normalize_webstore("cache/2000123/a"),
            Err(PathError::NotUnderFilesRoot { .. })
        ));
    }

    #[test]
    fn webstore_round_trip_both_areas() {
        let l = layout();
        for raw in ["files/2000123+/x.dat", "files/2000123/dir/y z.dat"] {
            let p = l.normalize_webstore(raw).unwrap().unwrap();
            assert_eq!(l.webstore_path(&p), raw);
        }
    }

    #[test]
    fn multi_char_staging_suffix() {
        let l = PathLayout::new("P", "_staging");
        let p = l.normalize_subpath("P_staging/q").unwrap().unwrap();
        assert_eq!(p.as_str(), "staging/q");
        assert_eq!(l.subpath(&p), "P_staging/q");
    }

    #[test]
    fn parse_validates_prefix_and_rel() {
        assert!(NodePath::parse("frozen/a").is_ok());
        assert!(NodePath::parse("frozen/").is_err());
        assert!(NodePath::parse("frozen//a").is_err());
        assert!(NodePath::parse("other/a").is_err());
    }

    #[test]
    fn stored_paths_land_in_frozen() {
        assert_eq!(frozen_from_stored("/a/b").unwrap().as_str(), "frozen/a/b");
        assert_eq!(frozen_from_stored("a/b").unwrap().as_str(), "frozen/a/b");
        assert!(frozen_from_stored("/").is_err());
    }

    #[test]
    fn rel_and_area_accessors() {
        let p = NodePath::staging("x/y").unwrap();
        assert_eq!(p.area(), Area::Staging);
        assert_eq!(p.rel(), "x/y");
        assert!(!p.is_frozen());
    }
}
