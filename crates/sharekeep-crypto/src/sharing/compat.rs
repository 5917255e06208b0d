//! Pre-versioning SSS parts.
//!
//! The first SSS parts handed out were the bare 32-byte `y` values without
//! the leading share index. Those are recognised purely by length, so this is
//! the only place that heuristic is allowed to live.

use zeroize::Zeroizing;

/// Decoded length of an untagged, pre-versioning part.
pub const UNVERSIONED_PART_LEN: usize = 32;

/// Share index carried by the server-held part.
pub const STORED_PART_TAG: u8 = 0x01;

/// Share index carried by the tenant-held part.
pub const PROJECT_PART_TAG: u8 = 0x02;

/// Which half of a split key a part is.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PartKind {
    Stored,
    Project,
}

impl PartKind {
    pub fn tag(self) -> u8 {
        match self {
            Self::Stored => STORED_PART_TAG,
            Self::Project => PROJECT_PART_TAG,
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            Self::Stored => "stored",
            Self::Project => "project",
        }
    }
}

/// Prepend the share index to a part that predates versioning.
///
/// Parts of any other length are returned unchanged.
pub fn tag_unversioned_part(part: Zeroizing<Vec<u8>>, kind: PartKind) -> Zeroizing<Vec<u8>> {
    if part.len() != UNVERSIONED_PART_LEN {
        return part;
    }

    let mut tagged = Zeroizing::new(Vec::with_capacity(UNVERSIONED_PART_LEN + 1));
    tagged.push(kind.tag());
    tagged.extend_from_slice(&part);
    tagged
}
