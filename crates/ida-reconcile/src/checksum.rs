//! Checksum normalization.
//!
//! Stores disagree on checksum spelling (`sha256:ABCD…`, `SHA256:abcd…`,
//! bare hex). Every checksum is compared as lowercase hex with any
//! algorithm tag stripped; equality after normalization is byte-exact.

/// Strip an `<algorithm>:` tag, trim and lowercase. Empty input yields `None`.
pub fn normalize_checksum(raw: &str) -> Option<String> {
    let s = raw.trim();
    let hex = match s.split_once(':') {
        Some((_algorithm, value)) => value.trim(),
        None => s,
    };
    if hex.is_empty() {
        return None;
    }
    Some(hex.to_ascii_lowercase())
}
