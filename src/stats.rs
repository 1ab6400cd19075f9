//! Aggregations over decoded ledger records.
//!
//! Everything here is pure: callers fetch (usually cached) record snapshots
//! and derive numbers from them. Rows with unparsable cells never make it
//! into a `BidRecord`, so no skipping logic lives at this level.

use std::collections::HashMap;

use crate::types::{BidRecord, MaterialStats, Unit};

struct MaterialAcc {
    /// Units with occurrence counts, in first-seen order.
    units: Vec<(Unit, usize)>,
    prices: Vec<f64>,
}

impl MaterialAcc {
    fn new() -> Self {
        Self {
            units: Vec::new(),
            prices: Vec::new(),
        }
    }

    fn add(&mut self, unit: Unit, price: f64) {
        match self.units.iter_mut().find(|(u, _)| *u == unit) {
            Some((_, count)) => *count += 1,
            None => self.units.push((unit, 1)),
        }
        self.prices.push(price);
    }

    /// The unit with the highest count. Ties go to the earliest seen.
    fn most_common_unit(&self) -> Unit {
        let mut best = self.units[0];
        for candidate in &self.units[1..] {
            if candidate.1 > best.1 {
                best = *candidate;
            }
        }
        best.0
    }
}

/// Per-material pricing stats, one entry per distinct material in
/// first-seen order.
pub fn compute_material_stats(records: &[BidRecord]) -> Vec<MaterialStats> {
    let mut accs: Vec<(String, MaterialAcc)> = Vec::new();
    for record in records {
        let idx = match accs.iter().position(|(name, _)| *name == record.material) {
            Some(i) => i,
            None => {
                accs.push((record.material.clone(), MaterialAcc::new()));
                accs.len() - 1
            }
        };
        accs[idx].1.add(record.unit, record.price);
    }

    accs.into_iter()
        .map(|(material, acc)| {
            let average = acc.prices.iter().sum::<f64>() / acc.prices.len() as f64;
            MaterialStats {
                material,
                most_common_unit: acc.most_common_unit(),
                observed_units: acc.units.iter().map(|(u, _)| *u).collect(),
                average_price: average,
                price_samples: acc.prices,
            }
        })
        .collect()
}

/// Sum of bid totals per contractor.
pub fn compute_contractor_totals(records: &[BidRecord]) -> HashMap<String, f64> {
    let mut totals: HashMap<String, f64> = HashMap::new();
    for record in records {
        *totals.entry(record.contractor.clone()).or_insert(0.0) += record.total;
    }
    totals
}

/// Sum over all contractors.
pub fn grand_total(totals: &HashMap<String, f64>) -> f64 {
    totals.values().sum()
}

/// The contractor with the smallest total. Names are scanned in sorted
/// order with a strict comparison, so a tie goes to the alphabetically
/// first contractor. None when there are no bids.
pub fn rank_lowest_bidder(totals: &HashMap<String, f64>) -> Option<(String, f64)> {
    let mut names: Vec<&String> = totals.keys().collect();
    names.sort();

    let mut lowest: Option<(String, f64)> = None;
    for name in names {
        let total = totals[name];
        match &lowest {
            Some((_, best)) if total >= *best => {}
            _ => lowest = Some((name.clone(), total)),
        }
    }
    lowest
}
