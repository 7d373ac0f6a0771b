//! Redistribution of historical time-of-day energy into newly defined bands.
//!
//! Every old band spreads its energy uniformly over its own hours, and each new band
//! receives the part of it falling into the hours they share.

use std::collections::BTreeMap;

use crate::{
    band::{Band, BandLabel},
    clock::HOURS_PER_DAY,
    overlap::{Segment, overlap_all},
    prelude::*,
};

/// Redistributed values below this magnitude are reported as exact zero.
pub const SNAP_EPSILON: f64 = 1e-9;

/// Tolerance for the historical shares adding up to 100%, in percentage points.
const SHARE_TOLERANCE: f64 = 1e-3;

/// Tolerance for the partition report, in hours.
const PARTITION_TOLERANCE: f64 = 1e-9;

/// Energy per old band, e.g. in kVAh.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct HistoricalAllocation(BTreeMap<BandLabel, f64>);

impl FromIterator<(BandLabel, f64)> for HistoricalAllocation {
    fn from_iter<T: IntoIterator<Item = (BandLabel, f64)>>(iter: T) -> Self {
        Self(iter.into_iter().collect())
    }
}

impl HistoricalAllocation {
    /// Split the total by percentage shares.
    pub fn from_shares(total: f64, shares: &BTreeMap<BandLabel, f64>) -> Self {
        let share_sum: f64 = shares.values().sum();
        if (share_sum - 100.0).abs() > SHARE_TOLERANCE {
            warn!(share_sum, "historical shares do not add up to 100%");
        }
        shares.iter().map(|(label, share)| (*label, total * share / 100.0)).collect()
    }

    pub fn get(&self, label: BandLabel) -> f64 {
        self.0.get(&label).copied().unwrap_or_default()
    }

    pub fn total(&self) -> f64 {
        self.0.values().sum()
    }
}

/// Energy per new band.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct RedistributedAllocation(BTreeMap<BandLabel, f64>);

impl RedistributedAllocation {
    pub fn get(&self, label: BandLabel) -> f64 {
        self.0.get(&label).copied().unwrap_or_default()
    }

    pub fn total(&self) -> f64 {
        self.0.values().sum()
    }

    pub fn iter(&self) -> impl Iterator<Item = (BandLabel, f64)> + '_ {
        self.0.iter().map(|(label, quantity)| (*label, *quantity))
    }
}

/// Redistribute the historical energy of the old bands over the new bands.
///
/// Each old band contributes `quantity × overlap / duration` to every new band it
/// overlaps. Old bands without duration contribute nothing. The new bands are expected
/// to partition the day: gaps lose energy, and overlapping new bands count it twice.
#[instrument(skip_all)]
pub fn redistribute(
    old_bands: &[Band],
    historical: &HistoricalAllocation,
    new_bands: &[Band],
) -> RedistributedAllocation {
    let mut accumulated: BTreeMap<BandLabel, f64> =
        new_bands.iter().map(|band| (band.label, 0.0)).collect();

    for old_band in old_bands {
        let old_duration = old_band.duration();
        if old_duration <= 0.0 {
            debug!(label = %old_band.label, "the old band covers no hours, skipping");
            continue;
        }
        let quantity = historical.get(old_band.label);
        for old_interval in &old_band.intervals {
            for new_band in new_bands {
                let overlap = overlap_all(*old_interval, &new_band.intervals);
                if overlap <= 0.0 {
                    continue;
                }
                let contribution = quantity * overlap / old_duration;
                debug!(
                    old = %old_band.label,
                    new = %new_band.label,
                    interval = %old_interval,
                    overlap,
                    contribution,
                    "contributing"
                );
                *accumulated.entry(new_band.label).or_default() += contribution;
            }
        }
    }

    RedistributedAllocation(
        accumulated.into_iter().map(|(label, quantity)| (label, snap(quantity))).collect(),
    )
}

fn snap(quantity: f64) -> f64 {
    if quantity.abs() < SNAP_EPSILON { 0.0 } else { quantity }
}

/// How well a set of bands covers the day.
#[derive(Copy, Clone, Debug, Default, PartialEq)]
pub struct PartitionReport {
    /// Hours covered by at least one band.
    pub covered_hours: f64,

    /// Hours covered by no band.
    pub gap_hours: f64,

    /// Hours covered more than once, counted once per extra band.
    pub overlap_hours: f64,
}

impl PartitionReport {
    pub fn of(bands: &[Band]) -> Self {
        let segments: Vec<Segment> = bands
            .iter()
            .flat_map(|band| band.intervals.iter())
            .flat_map(|interval| interval.segments())
            .filter(|segment| segment.len() > 0.0)
            .collect();

        let mut bounds: Vec<f64> = segments
            .iter()
            .flat_map(|segment| [segment.start, segment.end])
            .chain([0.0, HOURS_PER_DAY])
            .collect();
        bounds.sort_by(f64::total_cmp);
        bounds.dedup();

        let mut report = Self::default();
        for piece in bounds.windows(2) {
            let piece = Segment::new(piece[0], piece[1]);
            let midpoint = (piece.start + piece.end) / 2.0;
            let depth = segments
                .iter()
                .filter(|segment| segment.start <= midpoint && midpoint < segment.end)
                .count();
            if depth == 0 {
                report.gap_hours += piece.len();
            } else {
                report.covered_hours += piece.len();
                report.overlap_hours += piece.len() * (depth - 1) as f64;
            }
        }
        report
    }

    pub fn is_partition(&self) -> bool {
        self.gap_hours < PARTITION_TOLERANCE && self.overlap_hours < PARTITION_TOLERANCE
    }
}

/// Warn when the bands leave gaps or overlap, the redistribution itself is unaffected.
pub fn check_partition(bands: &[Band]) -> PartitionReport {
    let report = PartitionReport::of(bands);
    if report.is_partition() {
        debug!("the new bands partition the day");
    } else {
        warn!(
            gap_hours = report.gap_hours,
            overlap_hours = report.overlap_hours,
            "the new bands do not partition the day, energy will be lost or double-counted"
        );
    }
    report
}

#[cfg(test)]
mod tests {
    use approx::assert_abs_diff_eq;

    use super::*;

    fn bands(definitions: &[(BandLabel, &str)]) -> Vec<Band> {
        definitions.iter().map(|(label, ranges)| Band::parse_lenient(*label, ranges)).collect()
    }

    fn old_bands() -> Vec<Band> {
        bands(&[
            (BandLabel::A, "22:00-06:00"),
            (BandLabel::B, "06:00-09:00,12:00-18:00"),
            (BandLabel::C, "09:00-12:00"),
            (BandLabel::D, "18:00-22:00"),
        ])
    }

    fn shares(values: [f64; 4]) -> BTreeMap<BandLabel, f64> {
        BandLabel::ALL.into_iter().zip(values).collect()
    }

    #[test]
    fn from_shares_ok() {
        let historical =
            HistoricalAllocation::from_shares(1000.0, &shares([10.0, 20.0, 30.0, 40.0]));
        assert_abs_diff_eq!(historical.get(BandLabel::A), 100.0);
        assert_abs_diff_eq!(historical.get(BandLabel::D), 400.0);
        assert_abs_diff_eq!(historical.total(), 1000.0);
    }

    #[test]
    fn exact_cover_takes_everything() {
        let old = bands(&[(BandLabel::A, "00:00-06:00")]);
        let historical: HistoricalAllocation = [(BandLabel::A, 1200.0)].into_iter().collect();
        let new = bands(&[(BandLabel::A, "00:00-06:00"), (BandLabel::B, "06:00-00:00")]);
        let redistributed = redistribute(&old, &historical, &new);
        assert_abs_diff_eq!(redistributed.get(BandLabel::A), 1200.0);
        assert_abs_diff_eq!(redistributed.get(BandLabel::B), 0.0);
    }

    #[test]
    fn wrapping_old_band_splits_by_hours() {
        let old = bands(&[(BandLabel::A, "22:00-06:00")]);
        let historical: HistoricalAllocation = [(BandLabel::A, 800.0)].into_iter().collect();
        let new = bands(&[(BandLabel::A, "00:00-06:00"), (BandLabel::D, "17:00-00:00")]);
        let redistributed = redistribute(&old, &historical, &new);
        assert_abs_diff_eq!(redistributed.get(BandLabel::A), 600.0);
        assert_abs_diff_eq!(redistributed.get(BandLabel::D), 200.0);
    }

    #[test]
    fn identical_bands_conserve_quantities() {
        let historical = HistoricalAllocation::from_shares(500_000.0, &shares([25.0; 4]));
        let new = bands(&[
            (BandLabel::A, "22:00-06:00"),
            (BandLabel::B, "06:00-09:00;12:00-18:00"),
            (BandLabel::C, "09:00-12:00"),
            (BandLabel::D, "18:00-22:00"),
        ]);
        let redistributed = redistribute(&old_bands(), &historical, &new);
        for label in BandLabel::ALL {
            assert_abs_diff_eq!(redistributed.get(label), 125_000.0, epsilon = 1e-6);
        }
    }

    #[test]
    fn zero_duration_old_band_contributes_nothing() {
        let old = bands(&[(BandLabel::A, "not-a-range"), (BandLabel::B, "00:00-12:00")]);
        let historical: HistoricalAllocation =
            [(BandLabel::A, 1000.0), (BandLabel::B, 50.0)].into_iter().collect();
        let new = bands(&[(BandLabel::A, "00:00-00:00")]);
        let redistributed = redistribute(&old, &historical, &new);
        assert_abs_diff_eq!(redistributed.get(BandLabel::A), 50.0);
    }

    #[test]
    fn tiny_values_snap_to_zero() {
        let old = bands(&[(BandLabel::A, "00:00-06:00")]);
        let historical: HistoricalAllocation = [(BandLabel::A, 1e-12)].into_iter().collect();
        let new = bands(&[(BandLabel::A, "00:00-06:00")]);
        let redistributed = redistribute(&old, &historical, &new);
        assert_eq!(redistributed.get(BandLabel::A), 0.0);
        assert!(redistributed.get(BandLabel::A).is_sign_positive());
    }

    #[test]
    fn malformed_new_band_receives_nothing() {
        let historical = HistoricalAllocation::from_shares(1000.0, &shares([25.0; 4]));
        let new = bands(&[(BandLabel::A, "not-a-range"), (BandLabel::B, "00:00-00:00")]);
        let redistributed = redistribute(&old_bands(), &historical, &new);
        assert_abs_diff_eq!(redistributed.get(BandLabel::A), 0.0);
        assert_abs_diff_eq!(redistributed.get(BandLabel::B), 1000.0, epsilon = 1e-9);
    }

    #[test]
    fn gaps_lose_and_overlaps_double_count() {
        let historical = HistoricalAllocation::from_shares(2400.0, &shares([25.0; 4]));
        let gappy = bands(&[(BandLabel::A, "00:00-12:00")]);
        let total = redistribute(&old_bands(), &historical, &gappy).total();
        assert!(total < 2400.0);

        let doubled = bands(&[(BandLabel::A, "00:00-00:00"), (BandLabel::B, "00:00-00:00")]);
        let total = redistribute(&old_bands(), &historical, &doubled).total();
        assert_abs_diff_eq!(total, 4800.0, epsilon = 1e-9);
    }

    #[test]
    fn end_to_end_scenario() {
        let historical = HistoricalAllocation::from_shares(
            500_000.0,
            &shares([33.541412, 34.476496, 6.837052, 25.14506]),
        );
        let new = bands(&[
            (BandLabel::A, "00:00-06:00"),
            (BandLabel::B, "06:00-09:00"),
            (BandLabel::C, "09:00-17:00"),
            (BandLabel::D, "17:00-00:00"),
        ]);
        let redistributed = redistribute(&old_bands(), &historical, &new);

        // The fixed shares add up to 100.00002%.
        assert_abs_diff_eq!(redistributed.total(), historical.total(), epsilon = 1e-6);
        assert_abs_diff_eq!(redistributed.total(), 500_000.0, epsilon = 0.2);
        assert!((redistributed.get(BandLabel::C) - historical.get(BandLabel::C)).abs() > 1.0);

        let old_a = historical.get(BandLabel::A);
        let old_b = historical.get(BandLabel::B);
        let old_c = historical.get(BandLabel::C);
        let old_d = historical.get(BandLabel::D);
        assert_abs_diff_eq!(redistributed.get(BandLabel::A), old_a * 6.0 / 8.0, epsilon = 1e-6);
        assert_abs_diff_eq!(redistributed.get(BandLabel::B), old_b * 3.0 / 9.0, epsilon = 1e-6);
        assert_abs_diff_eq!(
            redistributed.get(BandLabel::C),
            old_c + old_b * 5.0 / 9.0,
            epsilon = 1e-6
        );
        assert_abs_diff_eq!(
            redistributed.get(BandLabel::D),
            old_d + old_b / 9.0 + old_a * 2.0 / 8.0,
            epsilon = 1e-6
        );
    }

    #[test]
    fn partition_report_ok() {
        let report = PartitionReport::of(&old_bands());
        assert!(report.is_partition());
        assert_abs_diff_eq!(report.covered_hours, 24.0);
    }

    #[test]
    fn partition_report_finds_gaps_and_overlaps() {
        let report = PartitionReport::of(&bands(&[
            (BandLabel::A, "00:00-06:00"),
            (BandLabel::B, "05:00-09:00"),
            (BandLabel::C, "not-a-range"),
            (BandLabel::D, "20:00-00:00"),
        ]));
        assert!(!report.is_partition());
        assert_abs_diff_eq!(report.covered_hours, 13.0);
        assert_abs_diff_eq!(report.gap_hours, 11.0);
        assert_abs_diff_eq!(report.overlap_hours, 1.0);
    }

    #[test]
    fn check_partition_does_not_change_results() {
        let new = bands(&[(BandLabel::A, "00:00-12:00")]);
        let report = check_partition(&new);
        assert_abs_diff_eq!(report.gap_hours, 12.0);
    }
}
