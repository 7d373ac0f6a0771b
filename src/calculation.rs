use std::collections::BTreeMap;

use crate::{
    band::{Band, BandLabel},
    decimal,
    error::Error,
    prelude::*,
    redistribution::{HistoricalAllocation, RedistributedAllocation, check_partition, redistribute},
    tariff::{BillingInput, BillingSummary, Tariff},
};

/// Inputs of a single landed-rate calculation.
#[derive(Clone, Debug)]
pub struct Request {
    pub billing: BillingInput,

    /// New band range strings, parsed leniently.
    pub new_ranges: BTreeMap<BandLabel, String>,

    /// Warn when the new bands do not partition the day.
    pub check_partition: bool,
}

#[derive(Clone, Debug)]
pub struct Calculation {
    pub historical: HistoricalAllocation,
    pub new_bands: Vec<Band>,
    pub redistributed: RedistributedAllocation,
    pub summary: BillingSummary,
}

#[instrument(skip_all)]
pub fn calculate(
    tariff: &Tariff,
    old_bands: &[Band],
    shares: &BTreeMap<BandLabel, f64>,
    request: &Request,
) -> Result<Calculation, Error> {
    let units = decimal::to_f64(&request.billing.units_kvah).ok_or_else(|| Error::NonFinite {
        what: "total energy",
        value: request.billing.units_kvah.to_string(),
    })?;
    let historical = HistoricalAllocation::from_shares(units, shares);

    let new_bands: Vec<Band> = request
        .new_ranges
        .iter()
        .map(|(label, ranges)| Band::parse_lenient(*label, ranges))
        .collect();
    if request.check_partition {
        check_partition(&new_bands);
    }

    let redistributed = redistribute(old_bands, &historical, &new_bands);
    let summary = tariff.bill(&request.billing, &redistributed)?;
    info!(landed_rate = %summary.landed_rate.round(4), "calculated");

    Ok(Calculation { historical, new_bands, redistributed, summary })
}
