mod band;
mod calculation;
mod clock;
mod config;
mod decimal;
mod error;
mod overlap;
mod prelude;
mod redistribution;
mod reference;
mod tables;
mod tariff;

use std::{
    collections::BTreeMap,
    fs::File,
    io::{self, BufReader},
    path::PathBuf,
};

use bigdecimal::BigDecimal;
use clap::{Args, Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use crate::{
    band::BandLabel,
    calculation::{Request, calculate},
    config::Config,
    prelude::*,
    reference::{BillingRow, read_reference, write_billing, write_reference},
    tables::{build_breakdown_table, build_tod_table, build_yearly_table},
    tariff::BillingInput,
};

/// Landed unit rate of an electricity bill under new time-of-day slabs.
/// Redistributes the historical slab consumption over the new slabs by overlap,
/// then sums the tariff components into a final rate per kWh.
#[derive(Parser, Debug)]
#[command(version, long_about, propagate_version = true)]
struct LandedRate {
    /// TOML file overriding the built-in tariff and defaults.
    #[arg(long, global = true, env = "LANDED_RATE_CONFIG")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Calculate the landed rate of a single bill.
    Calculate(CalculateArgs),

    /// Calculate every checked month of a yearly reference table.
    Yearly(YearlyArgs),

    /// Write a default yearly reference table.
    Template(TemplateArgs),
}

#[derive(Args, Debug)]
struct CalculateArgs {
    /// Total consumption, in kVAh.
    #[arg(long)]
    units: Option<BigDecimal>,

    /// Maximum demand, in kVA.
    #[arg(long)]
    max_demand: Option<BigDecimal>,

    /// Base energy rate, per kVAh.
    #[arg(long)]
    energy_rate: Option<BigDecimal>,

    #[command(flatten)]
    slabs: SlabArgs,

    #[command(flatten)]
    multipliers: MultiplierArgs,

    /// Warn when the new slabs leave gaps or overlap each other.
    #[arg(long)]
    check_partition: bool,
}

#[derive(Args, Debug)]
struct SlabArgs {
    #[arg(long, long_help = slab_help(BandLabel::A))]
    slab_a: Option<String>,
    #[arg(long, long_help = slab_help(BandLabel::B))]
    slab_b: Option<String>,
    #[arg(long, long_help = slab_help(BandLabel::C))]
    slab_c: Option<String>,
    #[arg(long, long_help = slab_help(BandLabel::D))]
    slab_d: Option<String>,
}

fn slab_help(label: BandLabel) -> String {
    format!(
        "New time range of slab {label}, such as `22:00-06:00`. \
         Several ranges may be separated by `,`, `|` or `;`, and a range ending before it starts \
         wraps past midnight. Ranges that do not parse are skipped with a warning. \
         Falls back to the configured default."
    )
}

#[derive(Args, Debug)]
struct MultiplierArgs {
    /// ToD surcharge of slab A per kVAh, negative for a rebate.
    #[arg(long, allow_negative_numbers = true)]
    multiplier_a: Option<BigDecimal>,
    /// ToD surcharge of slab B per kVAh, negative for a rebate.
    #[arg(long, allow_negative_numbers = true)]
    multiplier_b: Option<BigDecimal>,
    /// ToD surcharge of slab C per kVAh, negative for a rebate.
    #[arg(long, allow_negative_numbers = true)]
    multiplier_c: Option<BigDecimal>,
    /// ToD surcharge of slab D per kVAh, negative for a rebate.
    #[arg(long, allow_negative_numbers = true)]
    multiplier_d: Option<BigDecimal>,
}

#[derive(Args, Debug)]
struct YearlyArgs {
    /// Reference table CSV, as written by `template`.
    reference_csv: PathBuf,

    /// Write the monthly billing components to this CSV file.
    #[arg(long)]
    output: Option<PathBuf>,

    /// Warn when the new slabs leave gaps or overlap each other.
    #[arg(long)]
    check_partition: bool,
}

#[derive(Args, Debug)]
struct TemplateArgs {
    /// Write to this file instead of the standard output.
    #[arg(long)]
    output: Option<PathBuf>,
}

impl CalculateArgs {
    fn into_request(self, config: &Config) -> Request {
        let defaults = &config.defaults;
        let mut new_ranges = defaults.new_ranges.clone();
        for (label, ranges) in [
            (BandLabel::A, self.slabs.slab_a),
            (BandLabel::B, self.slabs.slab_b),
            (BandLabel::C, self.slabs.slab_c),
            (BandLabel::D, self.slabs.slab_d),
        ] {
            if let Some(ranges) = ranges {
                new_ranges.insert(label, ranges);
            }
        }
        let mut multipliers: BTreeMap<BandLabel, BigDecimal> = defaults.multipliers.clone();
        for (label, multiplier) in [
            (BandLabel::A, self.multipliers.multiplier_a),
            (BandLabel::B, self.multipliers.multiplier_b),
            (BandLabel::C, self.multipliers.multiplier_c),
            (BandLabel::D, self.multipliers.multiplier_d),
        ] {
            if let Some(multiplier) = multiplier {
                multipliers.insert(label, multiplier);
            }
        }
        Request {
            billing: BillingInput {
                units_kvah: self.units.unwrap_or_else(|| defaults.units.clone()),
                max_demand_kva: self.max_demand.unwrap_or_else(|| defaults.max_demand.clone()),
                energy_rate: self.energy_rate.unwrap_or_else(|| defaults.energy_rate.clone()),
                multipliers,
            },
            new_ranges,
            check_partition: self.check_partition,
        }
    }
}

fn main() -> Result {
    tracing_subscriber::fmt()
        .without_time()
        .compact()
        .with_writer(io::stderr)
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let args = LandedRate::parse();
    let config = Config::load(args.config.as_deref())?;
    let old_bands = config.old_bands().context("invalid historical slab ranges")?;

    match args.command {
        Command::Calculate(args) => {
            let request = args.into_request(&config);
            let calculation = calculate(&config.tariff, &old_bands, &config.shares(), &request)?;
            println!("{}", build_tod_table(&calculation));
            println!("{}", build_breakdown_table(&calculation.summary));
        }

        Command::Yearly(args) => {
            let file = File::open(&args.reference_csv)
                .with_context(|| format!("failed to open `{}`", args.reference_csv.display()))?;
            let rows = read_reference(BufReader::new(file))?;
            info!(n_rows = rows.len(), "loaded the reference table");
            let mut months = Vec::new();
            for row in rows.iter().filter(|row| row.calc) {
                let tariff = row.tariff(&config.tariff);
                let request = row.request(args.check_partition);
                let calculation = calculate(&tariff, &old_bands, &row.shares(), &request)
                    .with_context(|| format!("failed to calculate {}", row.month))?;
                months.push((row.month.clone(), calculation.summary));
            }
            if months.is_empty() {
                info!("no months are checked for calculation");
                return Ok(());
            }
            println!("{}", build_yearly_table(&months));
            if let Some(output) = args.output {
                let billing: Vec<BillingRow> =
                    months.iter().map(|(month, summary)| BillingRow::new(month, summary)).collect();
                let file = File::create(&output)
                    .with_context(|| format!("failed to create `{}`", output.display()))?;
                write_billing(file, &billing)?;
                info!(path = %output.display(), "written the billing components");
            }
        }

        Command::Template(args) => {
            let rows = reference::template(&config);
            match args.output {
                Some(output) => {
                    let file = File::create(&output)
                        .with_context(|| format!("failed to create `{}`", output.display()))?;
                    write_reference(file, &rows)?;
                    info!(path = %output.display(), "written the template");
                }
                None => write_reference(io::stdout().lock(), &rows)?,
            }
        }
    }

    Ok(())
}
