//! Capacity and usage reporting over a ledger.
//!
//! The declared ranges of a ledger never restrict allocation. They are used
//! here to tell an application how close it is to running out, and which
//! consumed ids lie outside what it declared.

use crate::{Consumption, ConsumptionLedger, Range, ranges_contain};

/// How much of a set of ranges is consumed under one storage key.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RangeUsage {
    /// Number of ids the ranges span, counting overlaps once per range.
    pub capacity: u64,
    /// Consumed ids that fall inside at least one range.
    pub consumed: u64,
    pub remaining: u64,
}

impl RangeUsage {
    /// Computes usage of `ranges` given the ascending `consumed` list of a
    /// storage key.
    ///
    /// # Example
    ///
    /// ```
    /// use rangeid::{Range, RangeUsage};
    ///
    /// let usage = RangeUsage::compute(&[Range::new(1, 100)?], &[1, 2, 500]);
    /// assert_eq!(usage.capacity, 100);
    /// assert_eq!(usage.consumed, 2);
    /// assert_eq!(usage.remaining, 98);
    /// # Ok::<(), rangeid::Error>(())
    /// ```
    pub fn compute(ranges: &[Range], consumed: &[u32]) -> Self {
        let capacity = ranges.iter().map(Range::size).sum::<u64>();
        let consumed = consumed
            .iter()
            .filter(|&&id| ranges_contain(ranges, id))
            .count() as u64;
        Self {
            capacity,
            consumed,
            remaining: capacity.saturating_sub(consumed),
        }
    }

    /// Consumption at which an application should be warned.
    ///
    /// Small capacities warn close to full, large ones keep at least 25 ids in
    /// reserve: `max(min(0.95 * capacity, capacity - 5), capacity - 25)`.
    pub fn warning_level(&self) -> f64 {
        let capacity = self.capacity as f64;
        (capacity * 0.95).min(capacity - 5.0).max(capacity - 25.0)
    }

    pub fn should_warn(&self) -> bool {
        self.capacity > 0 && self.consumed as f64 >= self.warning_level()
    }
}

/// Consumed ids lying outside the ledger's declared ranges, per key.
///
/// Nested keys are checked against [`StorageKey::eligible_ranges`], so ids in
/// the reserved nested range of an owned object are not reported. Keys
/// without any out-of-range id are omitted. A ledger without declared ranges
/// reports nothing.
///
/// [`StorageKey::eligible_ranges`]: crate::StorageKey::eligible_ranges
pub fn out_of_range(ledger: &ConsumptionLedger) -> Consumption {
    if ledger.ranges().is_empty() {
        return Consumption::new();
    }
    ledger
        .iter()
        .filter_map(|(key, ids)| {
            let eligible = key.eligible_ranges(ledger.ranges());
            let outside: Vec<u32> = ids
                .iter()
                .copied()
                .filter(|&id| !ranges_contain(&eligible, id))
                .collect();
            (!outside.is_empty()).then(|| (key.clone(), outside))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::StorageKey;

    fn usage(capacity: u32, consumed: u32) -> RangeUsage {
        let ids: Vec<u32> = (1..=consumed).collect();
        RangeUsage::compute(&[Range::new(1, capacity).unwrap()], &ids)
    }

    #[test]
    fn warning_level_scales_with_capacity() {
        // 0.95 * 10 = 9.5, 10 - 5 = 5 → 5; floor 10 - 25 = -15
        assert_eq!(usage(10, 0).warning_level(), 5.0);
        // 0.95 * 200 = 190, 200 - 5 = 195 → 190; floor 175
        assert_eq!(usage(200, 0).warning_level(), 190.0);
        // 0.95 * 1000 = 950; floor 975 wins
        assert_eq!(usage(1000, 0).warning_level(), 975.0);
    }

    #[test]
    fn warns_when_reaching_level() {
        assert!(!usage(10, 4).should_warn());
        assert!(usage(10, 5).should_warn());
        assert!(!usage(1000, 974).should_warn());
        assert!(usage(1000, 975).should_warn());
    }

    #[test]
    fn empty_ranges_never_warn() {
        let usage = RangeUsage::compute(&[], &[1, 2, 3]);
        assert_eq!(usage.capacity, 0);
        assert_eq!(usage.consumed, 0);
        assert!(!usage.should_warn());
    }

    #[test]
    fn reports_ids_outside_declared_ranges() {
        let mut ledger = ConsumptionLedger::default();
        ledger.set_ranges(vec![Range::new(50_000, 50_099).unwrap()]);
        let table = StorageKey::object("table");
        let fields = StorageKey::nested("table", 50_000);
        let foreign_fields = StorageKey::nested("table", 18);

        ledger.insert(&table, 50_000);
        ledger.insert(&table, 70_000);
        ledger.insert(&fields, 1);
        ledger.insert(&foreign_fields, 1);
        ledger.insert(&foreign_fields, 50_001);

        let outside = out_of_range(&ledger);
        assert_eq!(outside.get(&table), Some(&vec![70_000]));
        assert!(!outside.contains_key(&fields));
        assert_eq!(outside.get(&foreign_fields), Some(&vec![1]));
    }

    #[test]
    fn undeclared_ranges_report_nothing() {
        let mut ledger = ConsumptionLedger::default();
        ledger.insert(&StorageKey::object("table"), 7);
        assert!(out_of_range(&ledger).is_empty());
    }
}
