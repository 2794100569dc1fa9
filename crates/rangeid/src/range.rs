use core::ops::RangeInclusive;

use serde::{Deserialize, Serialize};

use crate::{Error, Result};

/// A closed interval `[from, to]` of eligible identifiers, optionally named.
///
/// Ranges may overlap. An overlap simply widens the union of eligible
/// identifiers; the allocator never hands out the same identifier twice
/// because it checks candidates against consumption, not against ranges.
///
/// # Example
///
/// ```
/// use rangeid::Range;
///
/// let range = Range::named(50_000, 50_099, "sales")?;
/// assert!(range.contains(50_042));
/// assert_eq!(range.size(), 100);
/// # Ok::<(), rangeid::Error>(())
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Range {
    pub from: u32,
    pub to: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
}

impl Range {
    /// Creates an unnamed range, rejecting `from > to` and ranges that start
    /// at zero.
    pub fn new(from: u32, to: u32) -> Result<Self> {
        let range = Self {
            from,
            to,
            name: None,
        };
        range.validate()?;
        Ok(range)
    }

    /// Creates a named range. See [`Range::new`].
    pub fn named(from: u32, to: u32, name: impl Into<String>) -> Result<Self> {
        let mut range = Self::new(from, to)?;
        range.name = Some(name.into());
        Ok(range)
    }

    /// Returns `true` if `id` lies inside this range.
    pub const fn contains(&self, id: u32) -> bool {
        id >= self.from && id <= self.to
    }

    /// Number of identifiers in the range. Zero for an inverted range.
    pub const fn size(&self) -> u64 {
        if self.from > self.to {
            0
        } else {
            (self.to - self.from) as u64 + 1
        }
    }

    /// Identifiers of the range in ascending order.
    pub fn ids(&self) -> RangeInclusive<u32> {
        self.from..=self.to
    }

    /// Checks the range invariant `0 < from <= to`.
    pub fn validate(&self) -> Result<()> {
        if self.from == 0 || self.from > self.to {
            return Err(Error::InvalidRange {
                from: self.from,
                to: self.to,
            });
        }
        Ok(())
    }
}

/// Validates a caller-supplied range set before it enters an allocation.
///
/// The set must be non-empty and every range must satisfy
/// [`Range::validate`].
pub fn validate_ranges(ranges: &[Range]) -> Result<()> {
    if ranges.is_empty() {
        return Err(Error::EmptyRanges);
    }
    ranges.iter().try_for_each(Range::validate)
}

/// Returns `true` if any of `ranges` contains `id`.
pub fn ranges_contain(ranges: &[Range], id: u32) -> bool {
    ranges.iter().any(|range| range.contains(id))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_inverted_and_zero_based_ranges() {
        assert!(matches!(
            Range::new(10, 5),
            Err(Error::InvalidRange { from: 10, to: 5 })
        ));
        assert!(matches!(Range::new(0, 5), Err(Error::InvalidRange { .. })));
        assert!(Range::new(7, 7).is_ok());
    }

    #[test]
    fn validate_ranges_requires_at_least_one() {
        assert!(matches!(validate_ranges(&[]), Err(Error::EmptyRanges)));

        let inverted = Range {
            from: 9,
            to: 3,
            name: None,
        };
        assert!(validate_ranges(&[Range::new(1, 2).unwrap(), inverted]).is_err());
    }

    #[test]
    fn size_counts_both_bounds() {
        assert_eq!(Range::new(1, 1).unwrap().size(), 1);
        assert_eq!(Range::new(1, 10).unwrap().size(), 10);
        assert_eq!(Range::new(1, u32::MAX).unwrap().size(), u64::from(u32::MAX));
    }

    #[test]
    fn name_is_omitted_from_json_when_absent() {
        let json = serde_json::to_string(&Range::new(1, 5).unwrap()).unwrap();
        assert_eq!(json, r#"{"from":1,"to":5}"#);

        let named: Range = serde_json::from_str(r#"{"from":1,"to":5,"name":"a"}"#).unwrap();
        assert_eq!(named.name.as_deref(), Some("a"));
    }
}
