//! Channel identities and their allocation.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use crate::error::{ChannelError, Result};

/// Largest identity a channel can hold.
pub const MAX_CHANNEL_ID: u32 = u32::MAX;

/// Unique numeric handle of a connected process within one shared store.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct ChannelId(u32);

impl ChannelId {
    pub const fn new(id: u32) -> Self {
        Self(id)
    }

    pub const fn get(self) -> u32 {
        self.0
    }
}

impl From<u32> for ChannelId {
    fn from(id: u32) -> Self {
        Self(id)
    }
}

impl std::fmt::Display for ChannelId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::str::FromStr for ChannelId {
    type Err = std::num::ParseIntError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        s.parse().map(ChannelId)
    }
}

/// Pick an identity not present in `taken`.
///
/// In the common case this is one past the current maximum, so identities
/// grow monotonically. Once the maximum reaches [`MAX_CHANNEL_ID`] the
/// allocator wraps and returns the smallest free identity instead.
///
/// # Errors
///
/// [`ChannelError::IdentitySpaceExhausted`] if every identity up to and
/// including [`MAX_CHANNEL_ID`] is taken.
pub fn allocate(taken: &BTreeSet<ChannelId>) -> Result<ChannelId> {
    match taken.last() {
        None => Ok(ChannelId(0)),
        Some(max) if max.0 < MAX_CHANNEL_ID => Ok(ChannelId(max.0 + 1)),
        Some(_) => lowest_free(taken).ok_or(ChannelError::IdentitySpaceExhausted),
    }
}

/// Smallest identity missing from `taken`, scanning upward from zero.
fn lowest_free(taken: &BTreeSet<ChannelId>) -> Option<ChannelId> {
    let mut candidate: u64 = 0;
    for id in taken {
        if u64::from(id.0) > candidate {
            break;
        }
        candidate = u64::from(id.0) + 1;
    }
    u32::try_from(candidate).ok().map(ChannelId)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ids(values: &[u32]) -> BTreeSet<ChannelId> {
        values.iter().copied().map(ChannelId).collect()
    }

    #[test]
    fn empty_directory_starts_at_zero() {
        assert_eq!(allocate(&ids(&[])).unwrap(), ChannelId(0));
    }

    #[test]
    fn allocates_past_the_maximum() {
        assert_eq!(allocate(&ids(&[0, 1, 2])).unwrap(), ChannelId(3));
        // Gaps below the maximum are not reused before wrapping.
        assert_eq!(allocate(&ids(&[4, 9])).unwrap(), ChannelId(10));
    }

    #[test]
    fn wraps_to_lowest_free_identity() {
        let taken = ids(&[0, 1, 3, MAX_CHANNEL_ID]);
        assert_eq!(allocate(&taken).unwrap(), ChannelId(2));

        let taken = ids(&[1, MAX_CHANNEL_ID]);
        assert_eq!(allocate(&taken).unwrap(), ChannelId(0));

        let taken = ids(&[0, 1, 2, MAX_CHANNEL_ID]);
        assert_eq!(allocate(&taken).unwrap(), ChannelId(3));
    }

    #[test]
    fn lowest_free_reports_exhaustion() {
        // A full 32-bit directory cannot be built in a test, but the scan's
        // terminal case can be checked directly.
        let taken = ids(&[0, 1, 2]);
        assert_eq!(lowest_free(&taken), Some(ChannelId(3)));

        let taken: BTreeSet<ChannelId> = ids(&[MAX_CHANNEL_ID]);
        assert_eq!(lowest_free(&taken), Some(ChannelId(0)));
    }

    #[test]
    fn display_and_parse() {
        let id = ChannelId::new(42);
        assert_eq!(id.to_string(), "42");
        assert_eq!("42".parse::<ChannelId>().unwrap(), id);
        assert!("-1".parse::<ChannelId>().is_err());
    }

    #[test]
    fn serializes_as_plain_number() {
        let json = serde_json::to_string(&ChannelId::new(7)).unwrap();
        assert_eq!(json, "7");
        let back: ChannelId = serde_json::from_str("7").unwrap();
        assert_eq!(back, ChannelId::new(7));
    }
}
