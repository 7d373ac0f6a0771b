use std::{
    collections::BTreeMap,
    io::{BufRead, Cursor, Read, Write},
    sync::LazyLock,
};

use bigdecimal::BigDecimal;
use csv::StringRecord;
use serde::{Deserialize, Serialize};

use crate::{
    band::BandLabel,
    calculation::Request,
    config::Config,
    decimal,
    prelude::*,
    tariff::{BillingInput, BillingSummary, Tariff},
};

pub const MONTHS: [&str; 12] = [
    "January",
    "February",
    "March",
    "April",
    "May",
    "June",
    "July",
    "August",
    "September",
    "October",
    "November",
    "December",
];

/// One month of the yearly reference table.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ReferenceRow {
    #[serde(rename = "Month")]
    pub month: String,

    /// Whether the month takes part in the calculation.
    #[serde(rename = "Calc")]
    pub calc: bool,

    #[serde(rename = "MaxDemand_kVA", with = "decimal")]
    pub max_demand_kva: BigDecimal,

    #[serde(rename = "Units_kVAh", with = "decimal")]
    pub units_kvah: BigDecimal,

    #[serde(rename = "EnergyRate", with = "decimal")]
    pub energy_rate: BigDecimal,

    #[serde(rename = "DC_rate", with = "decimal")]
    pub demand_charge_rate: BigDecimal,

    #[serde(rename = "FAC_rate", with = "decimal")]
    pub fuel_adjustment_rate: BigDecimal,

    #[serde(rename = "ToS_rate", with = "decimal")]
    pub tax_on_sale_rate: BigDecimal,

    #[serde(rename = "ED_percent", with = "decimal")]
    pub electricity_duty_percent: BigDecimal,

    /// Historical share of each slab for the month, in percent.
    #[serde(rename = "ToD_ratio_A")]
    pub ratio_a: f64,

    #[serde(rename = "ToD_ratio_B")]
    pub ratio_b: f64,

    #[serde(rename = "ToD_ratio_C")]
    pub ratio_c: f64,

    #[serde(rename = "ToD_ratio_D")]
    pub ratio_d: f64,

    #[serde(rename = "ToD_mul_A", with = "decimal")]
    pub multiplier_a: BigDecimal,

    #[serde(rename = "ToD_mul_B", with = "decimal")]
    pub multiplier_b: BigDecimal,

    #[serde(rename = "ToD_mul_C", with = "decimal")]
    pub multiplier_c: BigDecimal,

    #[serde(rename = "ToD_mul_D", with = "decimal")]
    pub multiplier_d: BigDecimal,

    #[serde(rename = "NewRange_A")]
    pub new_range_a: String,

    #[serde(rename = "NewRange_B")]
    pub new_range_b: String,

    #[serde(rename = "NewRange_C")]
    pub new_range_c: String,

    #[serde(rename = "NewRange_D")]
    pub new_range_d: String,
}

static EXPECTED_HEADERS: LazyLock<StringRecord> = LazyLock::new(|| {
    StringRecord::from(vec![
        "Month",
        "Calc",
        "MaxDemand_kVA",
        "Units_kVAh",
        "EnergyRate",
        "DC_rate",
        "FAC_rate",
        "ToS_rate",
        "ED_percent",
        "ToD_ratio_A",
        "ToD_ratio_B",
        "ToD_ratio_C",
        "ToD_ratio_D",
        "ToD_mul_A",
        "ToD_mul_B",
        "ToD_mul_C",
        "ToD_mul_D",
        "NewRange_A",
        "NewRange_B",
        "NewRange_C",
        "NewRange_D",
    ])
});

impl ReferenceRow {
    /// Default row for the month, the energy rate depends on the season.
    pub fn template(month: &str, config: &Config) -> Self {
        let defaults = &config.defaults;
        let tariff = &config.tariff;
        let energy_rate = if MONTHS[..3].contains(&month) {
            defaults.seasonal_energy_rates.jan_mar.clone()
        } else {
            defaults.seasonal_energy_rates.apr_dec.clone()
        };
        let shares = config.shares();
        let ratio = |label: BandLabel| shares.get(&label).copied().unwrap_or_default();
        let multiplier =
            |label: BandLabel| defaults.multipliers.get(&label).cloned().unwrap_or_default();
        let new_range =
            |label: BandLabel| defaults.new_ranges.get(&label).cloned().unwrap_or_default();
        Self {
            month: month.to_string(),
            calc: false,
            max_demand_kva: defaults.max_demand.clone(),
            units_kvah: defaults.units.clone(),
            energy_rate,
            demand_charge_rate: tariff.demand_charge_rate.clone(),
            fuel_adjustment_rate: tariff.fuel_adjustment_rate.clone(),
            tax_on_sale_rate: tariff.tax_on_sale_rate.clone(),
            electricity_duty_percent: tariff.electricity_duty_percent.clone(),
            ratio_a: ratio(BandLabel::A),
            ratio_b: ratio(BandLabel::B),
            ratio_c: ratio(BandLabel::C),
            ratio_d: ratio(BandLabel::D),
            multiplier_a: multiplier(BandLabel::A),
            multiplier_b: multiplier(BandLabel::B),
            multiplier_c: multiplier(BandLabel::C),
            multiplier_d: multiplier(BandLabel::D),
            new_range_a: new_range(BandLabel::A),
            new_range_b: new_range(BandLabel::B),
            new_range_c: new_range(BandLabel::C),
            new_range_d: new_range(BandLabel::D),
        }
    }

    /// The base tariff with this month's scalar rates.
    pub fn tariff(&self, base: &Tariff) -> Tariff {
        Tariff {
            demand_charge_rate: self.demand_charge_rate.clone(),
            fuel_adjustment_rate: self.fuel_adjustment_rate.clone(),
            tax_on_sale_rate: self.tax_on_sale_rate.clone(),
            electricity_duty_percent: self.electricity_duty_percent.clone(),
            ..base.clone()
        }
    }

    /// Historical shares of the month, these replace the configured ones.
    pub fn shares(&self) -> BTreeMap<BandLabel, f64> {
        [
            (BandLabel::A, self.ratio_a),
            (BandLabel::B, self.ratio_b),
            (BandLabel::C, self.ratio_c),
            (BandLabel::D, self.ratio_d),
        ]
        .into_iter()
        .collect()
    }

    pub fn request(&self, check_partition: bool) -> Request {
        let multipliers: BTreeMap<BandLabel, BigDecimal> = [
            (BandLabel::A, &self.multiplier_a),
            (BandLabel::B, &self.multiplier_b),
            (BandLabel::C, &self.multiplier_c),
            (BandLabel::D, &self.multiplier_d),
        ]
        .into_iter()
        .map(|(label, multiplier)| (label, multiplier.clone()))
        .collect();
        let new_ranges: BTreeMap<BandLabel, String> = [
            (BandLabel::A, &self.new_range_a),
            (BandLabel::B, &self.new_range_b),
            (BandLabel::C, &self.new_range_c),
            (BandLabel::D, &self.new_range_d),
        ]
        .into_iter()
        .map(|(label, ranges)| (label, ranges.clone()))
        .collect();
        Request {
            billing: BillingInput {
                units_kvah: self.units_kvah.clone(),
                max_demand_kva: self.max_demand_kva.clone(),
                energy_rate: self.energy_rate.clone(),
                multipliers,
            },
            new_ranges,
            check_partition,
        }
    }
}

pub fn template(config: &Config) -> Vec<ReferenceRow> {
    MONTHS.iter().map(|month| ReferenceRow::template(month, config)).collect()
}

pub fn read_reference(mut reader: impl BufRead) -> Result<Vec<ReferenceRow>> {
    // Spreadsheet exports may carry title rows above the header, skip them.
    let mut line_buf = String::new();
    loop {
        line_buf.clear();
        if reader.read_line(&mut line_buf).context("failed to read a line")? == 0 {
            bail!("the reference table has no header row");
        }
        if line_buf.starts_with("Month,") {
            break;
        }
    }
    let reader_with_headers = Cursor::new(line_buf).chain(reader);
    let mut csv_reader =
        csv::ReaderBuilder::new().trim(csv::Trim::All).from_reader(reader_with_headers);
    let headers = csv_reader.headers().context("reference headers not found")?.clone();
    ensure!(
        headers == *EXPECTED_HEADERS,
        "unexpected headers in the reference table: {headers:?}, expected: {:?}",
        *EXPECTED_HEADERS
    );
    csv_reader
        .deserialize()
        .enumerate()
        .map(|(index, row)| row.with_context(|| format!("malformed reference row #{}", index + 1)))
        .collect()
}

pub fn write_reference(writer: impl Write, rows: &[ReferenceRow]) -> Result {
    let mut csv_writer = csv::Writer::from_writer(writer);
    for row in rows {
        csv_writer.serialize(row)?;
    }
    csv_writer.flush()?;
    Ok(())
}

/// Billing components of a month, as exported.
#[derive(Debug, Serialize)]
pub struct BillingRow {
    #[serde(rename = "Month")]
    pub month: String,

    #[serde(rename = "DC", serialize_with = "decimal::serialize_cents")]
    pub demand_charge: BigDecimal,

    #[serde(rename = "EC", serialize_with = "decimal::serialize_cents")]
    pub energy_charge: BigDecimal,

    #[serde(rename = "ToD_charge", serialize_with = "decimal::serialize_cents")]
    pub tod_charge: BigDecimal,

    #[serde(rename = "FAC", serialize_with = "decimal::serialize_cents")]
    pub fuel_adjustment: BigDecimal,

    #[serde(rename = "ED", serialize_with = "decimal::serialize_cents")]
    pub electricity_duty: BigDecimal,

    #[serde(rename = "ToS", serialize_with = "decimal::serialize_cents")]
    pub tax_on_sale: BigDecimal,

    #[serde(rename = "BCR", serialize_with = "decimal::serialize_cents")]
    pub bulk_rebate: BigDecimal,

    #[serde(rename = "ICR", serialize_with = "decimal::serialize_cents")]
    pub incremental_rebate: BigDecimal,

    #[serde(rename = "PromptPaymentDisc", serialize_with = "decimal::serialize_cents")]
    pub prompt_payment_discount: BigDecimal,

    #[serde(rename = "Total", serialize_with = "decimal::serialize_cents")]
    pub total: BigDecimal,

    #[serde(rename = "LandedRate", serialize_with = "decimal::serialize_rate")]
    pub landed_rate: BigDecimal,
}

impl BillingRow {
    pub fn new(month: &str, summary: &BillingSummary) -> Self {
        Self {
            month: month.to_string(),
            demand_charge: summary.demand_charge.clone(),
            energy_charge: summary.energy_charge.clone(),
            tod_charge: summary.tod_charge.clone(),
            fuel_adjustment: summary.fuel_adjustment.clone(),
            electricity_duty: summary.electricity_duty.clone(),
            tax_on_sale: summary.tax_on_sale.clone(),
            bulk_rebate: summary.bulk_rebate.clone(),
            incremental_rebate: summary.incremental_rebate.clone(),
            prompt_payment_discount: summary.prompt_payment_discount.clone(),
            total: summary.total.clone(),
            landed_rate: summary.landed_rate.clone(),
        }
    }
}

pub fn write_billing(writer: impl Write, rows: &[BillingRow]) -> Result {
    let mut csv_writer = csv::Writer::from_writer(writer);
    for row in rows {
        csv_writer.serialize(row)?;
    }
    csv_writer.flush()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use approx::assert_abs_diff_eq;

    use super::*;
    use crate::{calculation::calculate, decimal::decimal};

    fn template_csv() -> String {
        let mut rows = template(&Config::default());
        rows[0].calc = true;
        let mut buffer = Vec::new();
        write_reference(&mut buffer, &rows).unwrap();
        String::from_utf8(buffer).unwrap()
    }

    #[test]
    fn template_has_seasonal_rates() {
        let rows = template(&Config::default());
        assert_eq!(rows.len(), 12);
        assert_eq!(rows[0].month, "January");
        assert_eq!(rows[2].energy_rate, decimal(868, 2));
        assert_eq!(rows[3].energy_rate, decimal(89, 1));
        assert_eq!(rows[11].new_range_d, "17:00-00:00");
        assert_eq!(rows[11].multiplier_c, decimal(-217, 2));
        assert!(rows.iter().all(|row| !row.calc));
    }

    #[test]
    fn template_header_is_expected() {
        let csv = template_csv();
        let header = csv.lines().next().unwrap();
        assert_eq!(header, EXPECTED_HEADERS.iter().collect::<Vec<_>>().join(","));
    }

    #[test]
    fn read_written_template() {
        let rows = read_reference(template_csv().as_bytes()).unwrap();
        assert_eq!(rows.len(), 12);
        assert!(rows[0].calc);
        assert_eq!(rows[0].units_kvah, BigDecimal::from(500_000));
        assert_eq!(rows[0].multiplier_d, decimal(217, 2));
    }

    #[test]
    fn read_skips_title_rows() {
        let csv = format!("Yearly landed rate,,\n\n{}", template_csv());
        assert_eq!(read_reference(csv.as_bytes()).unwrap().len(), 12);
    }

    #[test]
    fn read_rejects_unexpected_headers() {
        let csv = "Month,Calc,Units\nJanuary,true,1000\n";
        assert!(read_reference(csv.as_bytes()).is_err());
    }

    #[test]
    fn read_rejects_missing_header() {
        assert!(read_reference("January,true\n".as_bytes()).is_err());
    }

    #[test]
    fn read_rejects_malformed_numbers() {
        let csv = template_csv().replacen("500000", "lots", 1);
        assert!(read_reference(csv.as_bytes()).is_err());
    }

    #[test]
    fn row_overrides_tariff_rates() {
        let mut row = ReferenceRow::template("May", &Config::default());
        row.demand_charge_rate = BigDecimal::from(650);
        let tariff = row.tariff(&Tariff::default());
        assert_eq!(tariff.demand_charge_rate, BigDecimal::from(650));
        assert_eq!(tariff.bulk_rebate, Tariff::default().bulk_rebate);
    }

    #[test]
    fn template_carries_historical_shares() {
        let row = ReferenceRow::template("July", &Config::default());
        assert_eq!(row.shares(), Config::default().shares());
    }

    #[test]
    fn row_ratios_drive_the_old_units() {
        let config = Config::default();
        let mut row = ReferenceRow::template("July", &config);
        row.ratio_a = 100.0;
        row.ratio_b = 0.0;
        row.ratio_c = 0.0;
        row.ratio_d = 0.0;
        let calculation = calculate(
            &row.tariff(&config.tariff),
            &config.old_bands().unwrap(),
            &row.shares(),
            &row.request(false),
        )
        .unwrap();
        assert_abs_diff_eq!(calculation.historical.get(BandLabel::A), 500_000.0);
        assert_abs_diff_eq!(calculation.historical.get(BandLabel::B), 0.0);
        // Old slab A is 22:00-06:00, new slab A is 00:00-06:00 and new slab D ends at midnight.
        assert_abs_diff_eq!(calculation.redistributed.get(BandLabel::A), 375_000.0, epsilon = 1e-6);
        assert_abs_diff_eq!(calculation.redistributed.get(BandLabel::D), 125_000.0, epsilon = 1e-6);
    }

    #[test]
    fn row_request_ok() {
        let mut row = ReferenceRow::template("May", &Config::default());
        row.new_range_b = "06:00-09:00|12:00-13:00".to_string();
        let request = row.request(false);
        assert_eq!(request.new_ranges[&BandLabel::B], "06:00-09:00|12:00-13:00");
        assert_eq!(request.billing.multipliers[&BandLabel::C], decimal(-217, 2));
        assert_eq!(request.billing.energy_rate, decimal(89, 1));
    }

    #[test]
    fn write_billing_rounds() {
        let summary = BillingSummary {
            demand_charge: BigDecimal::from(8_100_000),
            energy_charge: decimal(4_340_000_004, 3),
            tod_lines: Vec::new(),
            tod_charge: decimal(-12_346, 3),
            fuel_adjustment: BigDecimal::from(250_000),
            electricity_duty: decimal(1_005, 1),
            tax_on_sale: BigDecimal::from(0),
            bulk_rebate: BigDecimal::from(-35_000),
            incremental_rebate: BigDecimal::from(0),
            prompt_payment_discount: decimal(-1, 0),
            total: decimal(123_456_789, 4),
            net_kwh: BigDecimal::from(1),
            landed_rate: decimal(2_712_345_678, 8),
        };
        let mut buffer = Vec::new();
        write_billing(&mut buffer, &[BillingRow::new("March", &summary)]).unwrap();
        let csv = String::from_utf8(buffer).unwrap();
        let mut lines = csv.lines();
        assert_eq!(
            lines.next().unwrap(),
            "Month,DC,EC,ToD_charge,FAC,ED,ToS,BCR,ICR,PromptPaymentDisc,Total,LandedRate",
        );
        assert_eq!(
            lines.next().unwrap(),
            "March,8100000.00,4340000.00,-12.35,250000.00,100.50,0.00,-35000.00,0.00,-1.00,\
             12345.68,27.1235",
        );
    }
}
