use std::{cmp::min, collections::BTreeMap};

use bigdecimal::{BigDecimal, Zero};
use serde::Deserialize;

use crate::{
    band::BandLabel,
    decimal::{self, decimal},
    error::Error,
    prelude::*,
    redistribution::RedistributedAllocation,
};

/// One tier of the bulk consumption rebate.
#[derive(Clone, Debug, PartialEq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RebateTier {
    /// Upper bound of the tier in kVAh, the last tier is unbounded.
    #[serde(default, deserialize_with = "decimal::deserialize_option")]
    pub up_to: Option<BigDecimal>,

    /// Rebate per kVAh within the tier.
    #[serde(deserialize_with = "decimal::deserialize")]
    pub rate: BigDecimal,
}

/// Rebate per kWh consumed above the threshold.
///
/// Linear on both sides of the threshold: consumption below it turns into a surcharge
/// unless `clamp` is set.
#[derive(Clone, Debug, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct IncrementalRebate {
    #[serde(deserialize_with = "decimal::deserialize")]
    pub threshold_kwh: BigDecimal,

    #[serde(deserialize_with = "decimal::deserialize")]
    pub rate: BigDecimal,

    /// Never surcharge below the threshold.
    pub clamp: bool,
}

impl Default for IncrementalRebate {
    fn default() -> Self {
        Self { threshold_kwh: decimal(4_044_267, 0), rate: decimal(75, 2), clamp: false }
    }
}

#[derive(Clone, Debug, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Tariff {
    /// Per kVA of maximum demand.
    #[serde(deserialize_with = "decimal::deserialize")]
    pub demand_charge_rate: BigDecimal,

    /// Per kVAh.
    #[serde(deserialize_with = "decimal::deserialize")]
    pub fuel_adjustment_rate: BigDecimal,

    /// Per kWh.
    #[serde(deserialize_with = "decimal::deserialize")]
    pub tax_on_sale_rate: BigDecimal,

    #[serde(deserialize_with = "decimal::deserialize")]
    pub electricity_duty_percent: BigDecimal,

    /// kWh per kVAh.
    #[serde(deserialize_with = "decimal::deserialize")]
    pub power_factor: BigDecimal,

    #[serde(deserialize_with = "decimal::deserialize")]
    pub prompt_payment_discount_percent: BigDecimal,

    pub incremental_rebate: IncrementalRebate,

    pub bulk_rebate: Vec<RebateTier>,
}

impl Default for Tariff {
    fn default() -> Self {
        Self {
            demand_charge_rate: decimal(600, 0),
            fuel_adjustment_rate: decimal(5, 1),
            tax_on_sale_rate: decimal(18, 2),
            electricity_duty_percent: decimal(75, 1),
            power_factor: decimal(997, 3),
            prompt_payment_discount_percent: decimal(1, 0),
            incremental_rebate: IncrementalRebate::default(),
            bulk_rebate: vec![
                RebateTier { up_to: Some(decimal(900_000, 0)), rate: decimal(7, 2) },
                RebateTier { up_to: Some(decimal(5_000_000, 0)), rate: decimal(9, 2) },
                RebateTier { up_to: None, rate: decimal(11, 2) },
            ],
        }
    }
}

/// Monthly figures the bill is computed from.
#[derive(Clone, Debug)]
pub struct BillingInput {
    pub units_kvah: BigDecimal,
    pub max_demand_kva: BigDecimal,

    /// Base energy rate per kVAh.
    pub energy_rate: BigDecimal,

    /// Time-of-day surcharge per kVAh of the band, negative for a discount.
    pub multipliers: BTreeMap<BandLabel, BigDecimal>,
}

#[derive(Clone, Debug, PartialEq)]
pub struct TodLine {
    pub label: BandLabel,
    pub units: BigDecimal,
    pub multiplier: BigDecimal,
    pub charge: BigDecimal,
}

/// Billing components. Rebates and discounts are negative.
#[derive(Clone, Debug, PartialEq)]
pub struct BillingSummary {
    pub demand_charge: BigDecimal,
    pub energy_charge: BigDecimal,
    pub tod_lines: Vec<TodLine>,
    pub tod_charge: BigDecimal,
    pub fuel_adjustment: BigDecimal,
    pub electricity_duty: BigDecimal,
    pub tax_on_sale: BigDecimal,
    pub bulk_rebate: BigDecimal,
    pub incremental_rebate: BigDecimal,
    pub prompt_payment_discount: BigDecimal,
    pub total: BigDecimal,
    pub net_kwh: BigDecimal,

    /// Per kWh, zero when there is no net energy.
    pub landed_rate: BigDecimal,
}

pub fn calculate_tod_charge<'a>(lines: impl Iterator<Item = &'a TodLine>) -> BigDecimal {
    lines.map(|line| line.charge.clone()).sum()
}

impl Tariff {
    /// Cumulative tiered rebate on the total kVAh, as a negative amount.
    pub fn bulk_consumption_rebate(&self, units: &BigDecimal) -> BigDecimal {
        let mut rebate = BigDecimal::zero();
        let mut lower = BigDecimal::zero();
        for tier in &self.bulk_rebate {
            let upper = tier.up_to.as_ref().map_or(units, |up_to| min(units, up_to));
            if upper > &lower {
                rebate += (upper - &lower) * &tier.rate;
            }
            match &tier.up_to {
                Some(up_to) if units > up_to => lower = up_to.clone(),
                _ => break,
            }
        }
        -rebate
    }

    /// Rebate on the kWh above the threshold, negative when earned.
    pub fn incremental_consumption_rebate(&self, kwh: &BigDecimal) -> BigDecimal {
        let rebate = &self.incremental_rebate;
        let excess = kwh - &rebate.threshold_kwh;
        if rebate.clamp && excess <= BigDecimal::zero() {
            return BigDecimal::zero();
        }
        -(excess * &rebate.rate)
    }

    /// Fold the redistributed time-of-day energy and the monthly figures into a bill.
    pub fn bill(
        &self,
        input: &BillingInput,
        redistributed: &RedistributedAllocation,
    ) -> Result<BillingSummary, Error> {
        let hundred = BigDecimal::from(100);

        let tod_lines = redistributed
            .iter()
            .map(|(label, units)| {
                let units = decimal::from_f64(units).ok_or_else(|| Error::NonFinite {
                    what: "redistributed energy",
                    value: units.to_string(),
                })?;
                let multiplier =
                    input.multipliers.get(&label).cloned().unwrap_or_else(BigDecimal::zero);
                let charge = &units * &multiplier;
                Ok(TodLine { label, units, multiplier, charge })
            })
            .collect::<Result<Vec<_>, Error>>()?;
        let tod_charge = calculate_tod_charge(tod_lines.iter());

        let demand_charge = &input.max_demand_kva * &self.demand_charge_rate;
        let energy_charge = &input.units_kvah * &input.energy_rate;
        let fuel_adjustment = &input.units_kvah * &self.fuel_adjustment_rate;
        let subtotal = &demand_charge + &energy_charge + &fuel_adjustment + &tod_charge;
        let electricity_duty = &subtotal * &self.electricity_duty_percent / &hundred;

        let net_kwh = &input.units_kvah * &self.power_factor;
        let tax_on_sale = &net_kwh * &self.tax_on_sale_rate;
        let bulk_rebate = self.bulk_consumption_rebate(&input.units_kvah);
        let incremental_rebate = self.incremental_consumption_rebate(&net_kwh);

        let total =
            &subtotal + &electricity_duty + &tax_on_sale + &bulk_rebate + &incremental_rebate;
        let prompt_payment_discount =
            -(&subtotal * &self.prompt_payment_discount_percent / &hundred);
        let landed_rate = if net_kwh > BigDecimal::zero() {
            (&total + &prompt_payment_discount) / &net_kwh
        } else {
            warn!("no net energy, reporting a zero landed rate");
            BigDecimal::zero()
        };
        debug!(%total, %landed_rate, "billed");

        Ok(BillingSummary {
            demand_charge,
            energy_charge,
            tod_lines,
            tod_charge,
            fuel_adjustment,
            electricity_duty,
            tax_on_sale,
            bulk_rebate,
            incremental_rebate,
            prompt_payment_discount,
            total,
            net_kwh,
            landed_rate,
        })
    }
}
