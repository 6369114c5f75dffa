use std::path::PathBuf;

use anyhow::{Context, Result};
use chrono::NaiveDate;
use clap::{Parser, Subcommand};
use tracing::info;
use tracing_subscriber::EnvFilter;

use data::batch::BatchSummary;
use data::data_brokers::finnhub::{FinnhubData, Frequency, Statement};
use data::data_brokers::polygon::{PolygonData, Timespan};
use data::store::DataFolder;

mod config;
mod data;
mod universe;
mod utils;

#[derive(Parser, Debug)]
#[command(
    name = "mdarchive",
    about = "Archive Polygon price bars and Finnhub fundamentals as JSON files"
)]
struct Cli {
    /// Settings file; `APP__*` environment variables override it.
    #[arg(long, global = true, default_value = "config.toml")]
    config: PathBuf,

    /// Comma-separated tickers. Defaults to the configured universe.
    #[arg(long, global = true, value_delimiter = ',')]
    tickers: Option<Vec<String>>,

    /// Archive root. Defaults to `general.data_folder`.
    #[arg(long, global = true)]
    data_folder: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Daily (or other timespan) OHLCV bars from Polygon.
    Bars {
        /// Start date (YYYY-MM-DD).
        #[arg(long)]
        start: Option<String>,
        /// End date (YYYY-MM-DD). Defaults to today.
        #[arg(long)]
        end: Option<String>,
        /// minute, hour, day, week, month, quarter or year.
        #[arg(long)]
        timespan: Option<String>,
    },
    /// Standardized financial statements from Finnhub.
    Financials {
        /// Statement codes: ic, bs, cf.
        #[arg(long, value_delimiter = ',')]
        statements: Option<Vec<String>>,
        /// annual and/or quarterly.
        #[arg(long, value_delimiter = ',')]
        frequencies: Option<Vec<String>>,
    },
    /// Financials as reported in filings.
    FinancialsReported {
        #[arg(long, value_delimiter = ',')]
        frequencies: Option<Vec<String>>,
    },
    /// Company profiles.
    Profiles,
    /// Dividend history.
    Dividends {
        #[arg(long)]
        from: Option<String>,
        #[arg(long)]
        to: Option<String>,
    },
    /// Everything above, with configured defaults.
    All,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();
    let settings = config::Settings::new(&cli.config).context("Failed to load configuration")?;
    let tickers = universe::resolve(&settings.universe.tickers, cli.tickers.as_deref());
    let folder = DataFolder::new(
        cli.data_folder
            .clone()
            .unwrap_or_else(|| PathBuf::from(&settings.general.data_folder)),
    )
    .context("Failed to create data folder")?;
    info!("Companies: {} tickers", tickers.len());

    let summary = match cli.command {
        Command::Bars {
            start,
            end,
            timespan,
        } => {
            let polygon = PolygonData::from_settings(&settings.polygon, folder.clone())?;
            let (start, end, timespan) = bar_window(&settings.polygon, start, end, timespan)?;
            polygon
                .download_multiple_tickers(&tickers, start, end, timespan)
                .await
        }
        Command::Financials {
            statements,
            frequencies,
        } => {
            let finnhub = finnhub(&settings, &folder)?;
            let statements = parse_or_all(
                statements.as_ref().unwrap_or(&settings.finnhub.statements),
                &Statement::ALL,
            )?;
            let frequencies = parse_or_all(
                frequencies.as_ref().unwrap_or(&settings.finnhub.frequencies),
                &Frequency::ALL,
            )?;
            finnhub
                .download_multiple_companies_financials(&tickers, &statements, &frequencies)
                .await
        }
        Command::FinancialsReported { frequencies } => {
            let finnhub = finnhub(&settings, &folder)?;
            let frequencies = parse_or_all(
                frequencies.as_ref().unwrap_or(&settings.finnhub.frequencies),
                &Frequency::ALL,
            )?;
            finnhub
                .download_multiple_companies_financials_as_reported(&tickers, &frequencies)
                .await
        }
        Command::Profiles => {
            finnhub(&settings, &folder)?
                .download_multiple_companies_profiles(&tickers)
                .await
        }
        Command::Dividends { from, to } => {
            let (from, to) = dividend_range(
                from.or_else(|| settings.finnhub.dividends_from.clone()),
                to.or_else(|| settings.finnhub.dividends_to.clone()),
            )?;
            finnhub(&settings, &folder)?
                .download_multiple_companies_dividends(&tickers, from, to)
                .await
        }
        Command::All => run_all(&settings, &folder, &tickers).await?,
    };

    println!("{}", summary.report());
    println!(
        "\nFinal results: {} files saved, {} failed, under {}",
        summary.successful.len(),
        summary.failed.len(),
        folder.root().display()
    );
    Ok(())
}

fn finnhub(settings: &config::Settings, folder: &DataFolder) -> Result<FinnhubData> {
    Ok(FinnhubData::from_settings(
        &settings.finnhub,
        folder.clone(),
        settings.general.skip_existing,
    )?)
}

async fn run_all(
    settings: &config::Settings,
    folder: &DataFolder,
    tickers: &[String],
) -> Result<BatchSummary> {
    let polygon = PolygonData::from_settings(&settings.polygon, folder.clone())?;
    let finnhub = finnhub(settings, folder)?;
    let (start, end, timespan) = bar_window(&settings.polygon, None, None, None)?;
    let statements = parse_or_all(&settings.finnhub.statements, &Statement::ALL)?;
    let frequencies = parse_or_all(&settings.finnhub.frequencies, &Frequency::ALL)?;
    let (from, to) = dividend_range(
        settings.finnhub.dividends_from.clone(),
        settings.finnhub.dividends_to.clone(),
    )?;

    let mut summary = polygon
        .download_multiple_tickers(tickers, start, end, timespan)
        .await;
    summary.merge(
        finnhub
            .download_multiple_companies_financials(tickers, &statements, &frequencies)
            .await,
    );
    summary.merge(
        finnhub
            .download_multiple_companies_financials_as_reported(tickers, &frequencies)
            .await,
    );
    summary.merge(finnhub.download_multiple_companies_profiles(tickers).await);
    summary.merge(
        finnhub
            .download_multiple_companies_dividends(tickers, from, to)
            .await,
    );
    Ok(summary)
}

/// Resolves the bar request window from CLI flags, then config; end defaults to today
fn bar_window(
    settings: &config::PolygonApi,
    start: Option<String>,
    end: Option<String>,
    timespan: Option<String>,
) -> Result<(NaiveDate, NaiveDate, Timespan)> {
    let start = start.unwrap_or_else(|| settings.start_date.clone());
    let start = utils::parse_date(&start).with_context(|| format!("Invalid start date {start}"))?;
    let end = match end.or_else(|| settings.end_date.clone()) {
        Some(end) => utils::parse_date(&end).with_context(|| format!("Invalid end date {end}"))?,
        None => utils::today(),
    };
    anyhow::ensure!(start <= end, "Start date {start} is after end date {end}");
    let timespan = timespan
        .as_deref()
        .unwrap_or(&settings.timespan)
        .parse::<Timespan>()?;
    Ok((start, end, timespan))
}

/// Parses a statement or frequency list; a list with no entries means every variant
fn parse_or_all<T>(values: &[String], all: &[T]) -> Result<Vec<T>>
where
    T: std::str::FromStr<Err = data::DataError> + Copy,
{
    let parsed = values
        .iter()
        .map(|v| v.trim())
        .filter(|v| !v.is_empty())
        .map(|v| v.parse::<T>().map_err(anyhow::Error::from))
        .collect::<Result<Vec<_>>>()?;
    Ok(if parsed.is_empty() { all.to_vec() } else { parsed })
}

/// Validates the optional dividend bounds once, before any request goes out
fn dividend_range(
    from: Option<String>,
    to: Option<String>,
) -> Result<(Option<NaiveDate>, Option<NaiveDate>)> {
    let parse = |value: Option<String>, which: &str| -> Result<Option<NaiveDate>> {
        value
            .map(|v| {
                utils::parse_date(v.trim())
                    .with_context(|| format!("Invalid dividends {which} date {v}"))
            })
            .transpose()
    };
    let (from, to) = (parse(from, "from")?, parse(to, "to")?);
    if let (Some(from), Some(to)) = (from, to) {
        anyhow::ensure!(from <= to, "Dividends from {from} is after to {to}");
    }
    Ok((from, to))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn polygon_settings(end_date: Option<&str>) -> config::PolygonApi {
        config::PolygonApi {
            api_key: "k".into(),
            base_url: "https://api.polygon.io".into(),
            timespan: "day".into(),
            start_date: "2021-01-01".into(),
            end_date: end_date.map(str::to_string),
            page_limit: 1000,
        }
    }

    #[test]
    fn cli_parses_global_tickers_after_subcommand() {
        let cli = Cli::try_parse_from([
            "mdarchive",
            "bars",
            "--start",
            "2024-01-01",
            "--tickers",
            "AAPL,MSFT",
        ])
        .unwrap();

        assert_eq!(cli.tickers.unwrap(), vec!["AAPL", "MSFT"]);
        assert!(matches!(cli.command, Command::Bars { start: Some(_), .. }));
    }

    #[test]
    fn cli_splits_financials_lists() {
        let cli = Cli::try_parse_from([
            "mdarchive",
            "financials",
            "--statements",
            "ic,cf",
            "--frequencies",
            "quarterly",
        ])
        .unwrap();

        match cli.command {
            Command::Financials {
                statements,
                frequencies,
            } => {
                assert_eq!(statements.unwrap(), vec!["ic", "cf"]);
                assert_eq!(frequencies.unwrap(), vec!["quarterly"]);
            }
            other => panic!("unexpected command {other:?}"),
        }
    }

    #[test]
    fn bar_window_prefers_flags_over_config() {
        let settings = polygon_settings(Some("2025-09-15"));

        let (start, end, timespan) = bar_window(&settings, None, None, None).unwrap();
        assert_eq!(start.to_string(), "2021-01-01");
        assert_eq!(end.to_string(), "2025-09-15");
        assert_eq!(timespan, Timespan::Day);

        let (start, _, timespan) =
            bar_window(&settings, Some("2024-06-01".into()), None, Some("week".into())).unwrap();
        assert_eq!(start.to_string(), "2024-06-01");
        assert_eq!(timespan, Timespan::Week);
    }

    #[test]
    fn bar_window_rejects_inverted_range() {
        let settings = polygon_settings(Some("2020-01-01"));
        assert!(bar_window(&settings, None, None, None).is_err());
    }

    #[test]
    fn parse_or_all_reports_bad_entries() {
        let ok = parse_or_all(&[" annual".to_string()], &Frequency::ALL).unwrap();
        assert_eq!(ok, vec![Frequency::Annual]);
        assert!(parse_or_all(&["ic".to_string(), "zz".to_string()], &Statement::ALL).is_err());
    }

    #[test]
    fn empty_lists_mean_every_variant() {
        assert_eq!(
            parse_or_all(&[], &Statement::ALL).unwrap(),
            Statement::ALL.to_vec()
        );
        assert_eq!(
            parse_or_all(&[String::new(), " ".to_string()], &Frequency::ALL).unwrap(),
            vec![Frequency::Annual, Frequency::Quarterly]
        );
    }

    #[test]
    fn dividend_range_is_checked_up_front() {
        let err = dividend_range(Some("2020/01/01".into()), None).unwrap_err();
        assert!(err.to_string().contains("Invalid dividends from date 2020/01/01"));
        assert!(dividend_range(None, Some("2024-13-01".into())).is_err());
        assert!(dividend_range(Some("2024-02-01".into()), Some("2024-01-01".into())).is_err());

        let (from, to) = dividend_range(Some("2020-01-01".into()), None).unwrap();
        assert_eq!(from, NaiveDate::from_ymd_opt(2020, 1, 1));
        assert_eq!(to, None);
    }
}
