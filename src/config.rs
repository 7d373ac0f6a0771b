use std::{collections::BTreeMap, fs, path::Path};

use bigdecimal::BigDecimal;
use serde::Deserialize;

use crate::{
    band::{Band, BandLabel},
    decimal::{self, decimal},
    error::Error,
    prelude::*,
    tariff::Tariff,
};

/// Settings file, every section falls back to the built-in defaults.
#[derive(Clone, Debug, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    pub tariff: Tariff,

    /// Fixed historical slabs and their share of the consumption.
    pub historical: BTreeMap<BandLabel, HistoricalBand>,

    pub defaults: Defaults,
}

#[derive(Clone, Debug, PartialEq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct HistoricalBand {
    /// `HH:MM-HH:MM` ranges, these are parsed strictly.
    pub ranges: Vec<String>,

    /// Percent of the total consumption.
    pub share: f64,
}

/// Values used when the command line or the reference table does not provide one.
#[derive(Clone, Debug, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Defaults {
    /// Total consumption in kVAh.
    #[serde(deserialize_with = "decimal::deserialize")]
    pub units: BigDecimal,

    /// Maximum demand in kVA.
    #[serde(deserialize_with = "decimal::deserialize")]
    pub max_demand: BigDecimal,

    /// Energy rate per kVAh.
    #[serde(deserialize_with = "decimal::deserialize")]
    pub energy_rate: BigDecimal,

    pub seasonal_energy_rates: SeasonalEnergyRates,

    pub new_ranges: BTreeMap<BandLabel, String>,

    #[serde(deserialize_with = "decimal::deserialize_map")]
    pub multipliers: BTreeMap<BandLabel, BigDecimal>,
}

/// Energy rates used by the reference table template.
#[derive(Clone, Debug, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SeasonalEnergyRates {
    #[serde(deserialize_with = "decimal::deserialize")]
    pub jan_mar: BigDecimal,

    #[serde(deserialize_with = "decimal::deserialize")]
    pub apr_dec: BigDecimal,
}

impl Default for SeasonalEnergyRates {
    fn default() -> Self {
        Self { jan_mar: decimal(868, 2), apr_dec: decimal(890, 2) }
    }
}

impl Default for Defaults {
    fn default() -> Self {
        Self {
            units: decimal(500_000, 0),
            max_demand: decimal(13_500, 0),
            energy_rate: decimal(868, 2),
            seasonal_energy_rates: SeasonalEnergyRates::default(),
            new_ranges: [
                (BandLabel::A, "00:00-06:00"),
                (BandLabel::B, "06:00-09:00"),
                (BandLabel::C, "09:00-17:00"),
                (BandLabel::D, "17:00-00:00"),
            ]
            .into_iter()
            .map(|(label, ranges)| (label, ranges.to_string()))
            .collect(),
            multipliers: [
                (BandLabel::A, decimal(0, 0)),
                (BandLabel::B, decimal(0, 0)),
                (BandLabel::C, decimal(-217, 2)),
                (BandLabel::D, decimal(217, 2)),
            ]
            .into_iter()
            .collect(),
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            tariff: Tariff::default(),
            historical: default_historical(),
            defaults: Defaults::default(),
        }
    }
}

fn default_historical() -> BTreeMap<BandLabel, HistoricalBand> {
    [
        (BandLabel::A, &["22:00-06:00"][..], 33.541412),
        (BandLabel::B, &["06:00-09:00", "12:00-18:00"][..], 34.476496),
        (BandLabel::C, &["09:00-12:00"][..], 6.837052),
        (BandLabel::D, &["18:00-22:00"][..], 25.14506),
    ]
    .into_iter()
    .map(|(label, ranges, share)| {
        let ranges = ranges.iter().map(ToString::to_string).collect();
        (label, HistoricalBand { ranges, share })
    })
    .collect()
}

impl Config {
    /// Load the settings file, or use the built-in defaults without one.
    #[instrument(skip_all)]
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let Some(path) = path else {
            debug!("no configuration file, using the defaults");
            return Ok(Self::default());
        };
        info!(path = %path.display(), "loading the configuration…");
        let text = fs::read_to_string(path)
            .with_context(|| format!("failed to read `{}`", path.display()))?;
        toml::from_str(&text).with_context(|| format!("failed to parse `{}`", path.display()))
    }

    pub fn old_bands(&self) -> Result<Vec<Band>, Error> {
        self.historical
            .iter()
            .map(|(label, band)| {
                let intervals =
                    band.ranges.iter().map(|range| range.parse()).collect::<Result<_, _>>()?;
                Ok(Band::new(*label, intervals))
            })
            .collect()
    }

    pub fn shares(&self) -> BTreeMap<BandLabel, f64> {
        self.historical.iter().map(|(label, band)| (*label, band.share)).collect()
    }
}
