//! Which config keys each tool actually reads.
//!
//! "Consumed pointers" are JSON Pointer prefixes. A leaf under any consumed
//! prefix is consumed; every other leaf is reported as unused for that tool.
//! Keep these lists in step with the reads in `settings` and `secrets`.

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ToolMode {
    Audit,
    RepairTimestamps,
    PurgeOrphans,
}

impl ToolMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            ToolMode::Audit => "AUDIT",
            ToolMode::RepairTimestamps => "REPAIR_TIMESTAMPS",
            ToolMode::PurgeOrphans => "PURGE_ORPHANS",
        }
    }
}

pub fn consumed_pointers(mode: ToolMode) -> &'static [&'static str] {
    match mode {
        ToolMode::Audit => AUDIT,
        ToolMode::RepairTimestamps => REPAIR_TIMESTAMPS,
        ToolMode::PurgeOrphans => PURGE_ORPHANS,
    }
}

static AUDIT: &[&str] = &[
    "/project_user_prefix",
    "/staging_folder_suffix",
    "/storage",
    "/database",
    "/catalog",
    "/audit",
];

// The repairer addresses the webstore by normalized path through the service
// API, so it never needs the storage layout or the database.
static REPAIR_TIMESTAMPS: &[&str] = &["/service", "/catalog"];

static PURGE_ORPHANS: &[&str] = &[
    "/project_user_prefix",
    "/staging_folder_suffix",
    "/database",
];
