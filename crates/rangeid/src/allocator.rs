//! Pure computation of candidate identifiers.
//!
//! Nothing here performs I/O. Every function can be called repeatedly against
//! a stale snapshot of consumption; the result is only a *candidate* until an
//! optimistic update commits it.
//!
//! `consumed` is always the ascending, duplicate-free list the ledger keeps
//! for a storage key. Values outside every range are ignored.

use crate::Range;

/// Sentinel returned when no range yields a free identifier.
///
/// Zero is never allocatable because ranges start at one or above.
pub const EXHAUSTED: u32 = 0;

/// Returns the first free identifier, trying `ranges` in the given order and
/// each range in ascending order.
///
/// Ranges are not sorted: caller order establishes priority. Returns
/// [`EXHAUSTED`] when every range is fully consumed or `ranges` is empty.
///
/// # Example
///
/// ```
/// use rangeid::{Range, find_first_available};
///
/// let ranges = [Range::new(1, 5)?];
/// assert_eq!(find_first_available(&ranges, &[1, 2, 3]), 4);
/// assert_eq!(find_first_available(&ranges, &[1, 2, 3, 4, 5]), 0);
/// # Ok::<(), rangeid::Error>(())
/// ```
pub fn find_first_available(ranges: &[Range], consumed: &[u32]) -> u32 {
    ranges
        .iter()
        .find_map(|range| first_free_in(range, consumed))
        .unwrap_or(EXHAUSTED)
}

/// Returns one candidate per range, in input order, with [`EXHAUSTED`] for a
/// range that has no free slot.
///
/// Each range is scanned independently, so overlapping ranges may yield the
/// same candidate.
///
/// # Example
///
/// ```
/// use rangeid::{Range, find_available_per_range};
///
/// let ranges = [Range::new(1, 2)?, Range::new(10, 11)?];
/// assert_eq!(find_available_per_range(&ranges, &[1, 10]), vec![2, 11]);
/// # Ok::<(), rangeid::Error>(())
/// ```
pub fn find_available_per_range(ranges: &[Range], consumed: &[u32]) -> Vec<u32> {
    ranges
        .iter()
        .map(|range| first_free_in(range, consumed).unwrap_or(EXHAUSTED))
        .collect()
}

/// Narrows `ranges` to the single range containing `required`.
///
/// When ranges overlap, the first containing range in input order wins. The
/// result is empty if no range contains `required`.
///
/// # Example
///
/// ```
/// use rangeid::{Range, restrict_to_containing};
///
/// let ranges = [Range::new(1, 10)?, Range::new(20, 30)?];
/// assert_eq!(restrict_to_containing(&ranges, 25), vec![Range::new(20, 30)?]);
/// assert!(restrict_to_containing(&ranges, 15).is_empty());
/// # Ok::<(), rangeid::Error>(())
/// ```
pub fn restrict_to_containing(ranges: &[Range], required: u32) -> Vec<Range> {
    ranges
        .iter()
        .find(|range| range.contains(required))
        .cloned()
        .into_iter()
        .collect()
}

/// Walks `consumed` alongside the range instead of probing every value, so
/// the cost is bounded by the consumed ids inside the range.
fn first_free_in(range: &Range, consumed: &[u32]) -> Option<u32> {
    debug_assert!(
        consumed.is_sorted(),
        "consumption must be kept in ascending order"
    );

    let mut candidate = range.from.max(1);
    if candidate > range.to {
        return None;
    }

    let start = consumed.partition_point(|&id| id < candidate);
    for &id in &consumed[start..] {
        if id > candidate {
            break;
        }
        if id == candidate {
            if candidate == range.to {
                return None;
            }
            candidate += 1;
        }
    }

    Some(candidate)
}
