use bigdecimal::BigDecimal;
use comfy_table::{Attribute, Cell, CellAlignment, Color, Table, modifiers, presets};

use crate::{calculation::Calculation, tariff::BillingSummary};

fn new_table() -> Table {
    let mut table = Table::new();
    table.load_preset(presets::UTF8_FULL_CONDENSED).apply_modifier(modifiers::UTF8_ROUND_CORNERS);
    table.enforce_styling();
    table
}

fn amount_cell(amount: &BigDecimal) -> Cell {
    let zero = BigDecimal::from(0);
    Cell::new(format!("{:.2}", amount.round(2))).set_alignment(CellAlignment::Right).fg(
        if *amount < zero {
            Color::Green
        } else if *amount > zero {
            Color::Reset
        } else {
            Color::DarkGrey
        },
    )
}

fn units_cell(units: f64) -> Cell {
    Cell::new(format!("{units:.2}")).set_alignment(CellAlignment::Right)
}

/// Redistributed consumption and ToD charge per new band.
#[must_use]
pub fn build_tod_table(calculation: &Calculation) -> Table {
    let mut table = new_table();
    table.set_header(vec!["Band", "Range", "Old units", "New units", "Multiplier", "ToD charge"]);
    for (band, line) in calculation.new_bands.iter().zip(&calculation.summary.tod_lines) {
        let range = if band.intervals.is_empty() {
            Cell::new("none").fg(Color::Red)
        } else {
            Cell::new(band.ranges())
        };
        table.add_row(vec![
            Cell::new(band.label).add_attribute(Attribute::Bold),
            range,
            units_cell(calculation.historical.get(band.label)).add_attribute(Attribute::Dim),
            units_cell(calculation.redistributed.get(band.label)),
            Cell::new(&line.multiplier).set_alignment(CellAlignment::Right),
            amount_cell(&line.charge),
        ]);
    }
    table.add_row(vec![
        Cell::new("Total").add_attribute(Attribute::Bold),
        Cell::new(""),
        units_cell(calculation.historical.total()).add_attribute(Attribute::Dim),
        units_cell(calculation.redistributed.total()),
        Cell::new(""),
        amount_cell(&calculation.summary.tod_charge).add_attribute(Attribute::Bold),
    ]);
    table
}

/// Named billing components followed by the landed rate.
#[must_use]
pub fn build_breakdown_table(summary: &BillingSummary) -> Table {
    let mut table = new_table();
    table.set_header(vec!["Component", "Amount"]);
    for (name, amount) in [
        ("Demand charge", &summary.demand_charge),
        ("Energy charge", &summary.energy_charge),
        ("ToD charge", &summary.tod_charge),
        ("Fuel adjustment", &summary.fuel_adjustment),
        ("Electricity duty", &summary.electricity_duty),
        ("Tax on sale", &summary.tax_on_sale),
        ("Bulk consumption rebate", &summary.bulk_rebate),
        ("Incremental consumption rebate", &summary.incremental_rebate),
        ("Total", &summary.total),
        ("Prompt payment discount", &summary.prompt_payment_discount),
    ] {
        table.add_row(vec![Cell::new(name), amount_cell(amount)]);
    }
    table.add_row(vec![
        Cell::new("Net kWh").add_attribute(Attribute::Dim),
        Cell::new(format!("{:.2}", summary.net_kwh.round(2))).set_alignment(CellAlignment::Right),
    ]);
    table.add_row(vec![
        Cell::new("Landed rate").add_attribute(Attribute::Bold),
        Cell::new(format!("{:.4}", summary.landed_rate.round(4)))
            .set_alignment(CellAlignment::Right)
            .add_attribute(Attribute::Bold),
    ]);
    table
}

#[must_use]
pub fn build_yearly_table(months: &[(String, BillingSummary)]) -> Table {
    let mut table = new_table();
    table.set_header(vec!["Month", "Net kWh", "ToD charge", "Rebates", "Total", "Landed rate"]);
    for (month, summary) in months {
        let rebates = &summary.bulk_rebate + &summary.incremental_rebate;
        table.add_row(vec![
            Cell::new(month),
            Cell::new(format!("{:.2}", summary.net_kwh.round(2)))
                .set_alignment(CellAlignment::Right),
            amount_cell(&summary.tod_charge),
            amount_cell(&rebates),
            amount_cell(&summary.total),
            Cell::new(format!("{:.4}", summary.landed_rate.round(4)))
                .set_alignment(CellAlignment::Right)
                .add_attribute(Attribute::Bold),
        ]);
    }
    table
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        calculation::{Request, calculate},
        config::Config,
        tariff::BillingInput,
    };

    fn default_calculation() -> Calculation {
        let config = Config::default();
        let request = Request {
            billing: BillingInput {
                units_kvah: config.defaults.units.clone(),
                max_demand_kva: config.defaults.max_demand.clone(),
                energy_rate: config.defaults.energy_rate.clone(),
                multipliers: config.defaults.multipliers.clone(),
            },
            new_ranges: config.defaults.new_ranges.clone(),
            check_partition: false,
        };
        calculate(&config.tariff, &config.old_bands().unwrap(), &config.shares(), &request).unwrap()
    }

    #[test]
    fn tod_table_has_a_row_per_band_and_a_total() {
        let table = build_tod_table(&default_calculation());
        assert_eq!(table.row_count(), 5);
    }

    #[test]
    fn breakdown_table_ends_with_landed_rate() {
        let calculation = default_calculation();
        let rendered = build_breakdown_table(&calculation.summary).to_string();
        assert!(rendered.contains("Landed rate"));
        assert!(rendered.contains("8100000.00"));
    }

    #[test]
    fn yearly_table_has_a_row_per_month() {
        let summary = default_calculation().summary;
        let months = vec![("January".to_string(), summary.clone()), ("May".to_string(), summary)];
        let table = build_yearly_table(&months);
        assert_eq!(table.row_count(), 2);
        let rendered = table.to_string();
        assert!(rendered.contains("Net kWh"));
        assert!(rendered.contains("498500.00"));
    }
}
