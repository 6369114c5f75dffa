use chrono::{Days, NaiveDate};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use tracing::{debug, info};

use super::{require_key, ApiAuth, ApiClient, JsonApi};
use crate::config::PolygonApi;
use crate::data::batch::{BatchSummary, Outcome, Progress};
use crate::data::store::{DataFolder, PRICE_BARS};
use crate::data::DataError;
use crate::utils;

/// Aggregate bar width; the multiplier is always 1.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Timespan {
    Minute,
    Hour,
    Day,
    Week,
    Month,
    Quarter,
    Year,
}

impl Timespan {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Minute => "minute",
            Self::Hour => "hour",
            Self::Day => "day",
            Self::Week => "week",
            Self::Month => "month",
            Self::Quarter => "quarter",
            Self::Year => "year",
        }
    }
}

impl FromStr for Timespan {
    type Err = DataError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "minute" => Ok(Self::Minute),
            "hour" => Ok(Self::Hour),
            "day" | "daily" => Ok(Self::Day),
            "week" | "weekly" => Ok(Self::Week),
            "month" | "monthly" => Ok(Self::Month),
            "quarter" => Ok(Self::Quarter),
            "year" => Ok(Self::Year),
            other => Err(DataError::unsupported("timespan", other)),
        }
    }
}

impl fmt::Display for Timespan {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Serialize for Timespan {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

/// One aggregate exactly as Polygon sends it.
#[derive(Debug, Clone, Deserialize)]
pub struct RawAggregate {
    /// Window start, epoch milliseconds
    pub t: i64,
    pub o: f64,
    pub h: f64,
    pub l: f64,
    pub c: f64,
    #[serde(default)]
    pub v: f64,
}

#[derive(Debug, Deserialize)]
struct AggregatesPage {
    status: Option<String>,
    message: Option<String>,
    error: Option<String>,
    #[serde(default)]
    results: Vec<RawAggregate>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PriceBar {
    pub date: NaiveDate,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: f64,
}

/// What lands on disk for one ticker and date range.
#[derive(Debug, Serialize)]
pub struct PriceHistory {
    pub symbol: String,
    pub timeframe: Timespan,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    pub timestamp: String,
    pub data: Vec<PriceBar>,
}

impl TryFrom<&RawAggregate> for PriceBar {
    type Error = DataError;

    fn try_from(raw: &RawAggregate) -> Result<Self, Self::Error> {
        let date = utils::date_from_millis(raw.t)
            .ok_or_else(|| DataError::Api(format!("bar timestamp out of range: {}", raw.t)))?;
        Ok(Self {
            date,
            open: raw.o,
            high: raw.h,
            low: raw.l,
            close: raw.c,
            volume: raw.v,
        })
    }
}

pub fn file_name(symbol: &str, timespan: Timespan, start: NaiveDate, end: NaiveDate) -> String {
    format!(
        "{symbol}_{timespan}_{}_to_{}.json",
        utils::compact_date(start),
        utils::compact_date(end)
    )
}

/// Price-bar downloader backed by Polygon's aggregates endpoint
pub struct PolygonData<C = ApiClient> {
    api: C,
    folder: DataFolder,
    page_limit: usize,
}

impl PolygonData<ApiClient> {
    pub fn from_settings(settings: &PolygonApi, folder: DataFolder) -> Result<Self, DataError> {
        let key = require_key(&settings.api_key, "Polygon", "POLYGON")?;
        let api = ApiClient::new(
            &settings.base_url,
            ApiAuth::Query {
                name: "apiKey".to_string(),
                value: key,
            },
        )?;
        Ok(Self::new(api, folder, settings.page_limit))
    }
}

impl<C: JsonApi> PolygonData<C> {
    pub fn new(api: C, folder: DataFolder, page_limit: usize) -> Self {
        Self {
            api,
            folder,
            page_limit: page_limit.max(1),
        }
    }

    async fn fetch_page(
        &self,
        symbol: &str,
        timespan: Timespan,
        from: NaiveDate,
        to: NaiveDate,
    ) -> Result<Vec<RawAggregate>, DataError> {
        let path = format!("/v2/aggs/ticker/{symbol}/range/1/{timespan}/{from}/{to}");
        let query = [
            ("limit", self.page_limit.to_string()),
            ("sort", "asc".to_string()),
        ];
        let json = self.api.get_json(&path, &query).await?;
        let page: AggregatesPage = serde_json::from_value(json)?;

        match page.status.as_deref() {
            Some("OK") | Some("DELAYED") => Ok(page.results),
            status => Err(DataError::Api(format!(
                "{} (status {})",
                page.message
                    .or(page.error)
                    .unwrap_or_else(|| "Unknown error".to_string()),
                status.unwrap_or("missing")
            ))),
        }
    }

    /// Walks `[start, end]` page by page, moving the cursor one day past the
    /// last bar of each full page. Stops as soon as the cursor would not advance.
    pub async fn fetch_bars(
        &self,
        symbol: &str,
        timespan: Timespan,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<Vec<RawAggregate>, DataError> {
        let mut all_bars = Vec::new();
        let mut cursor = start;

        loop {
            let page = self.fetch_page(symbol, timespan, cursor, end).await?;
            let Some(last) = page.last() else {
                break;
            };
            let last_date = utils::date_from_millis(last.t)
                .ok_or_else(|| DataError::Api(format!("bar timestamp out of range: {}", last.t)))?;
            let page_len = page.len();
            all_bars.extend(page);
            debug!(
                "{symbol}: fetched {page_len} records up to {last_date}, total {}",
                all_bars.len()
            );

            if page_len < self.page_limit {
                break;
            }
            // The cursor only moves forward; bars stamped before it (weekly
            // bars start on Sunday) would otherwise replay the same page.
            match last_date.checked_add_days(Days::new(1)) {
                Some(next) if next > cursor && next <= end => cursor = next,
                _ => break,
            }
        }

        Ok(all_bars)
    }

    pub fn file_exists(
        &self,
        symbol: &str,
        start: NaiveDate,
        end: NaiveDate,
        timespan: Timespan,
    ) -> bool {
        self.folder
            .exists(PRICE_BARS, &file_name(symbol, timespan, start, end))
    }

    /// Fetches every page for `symbol`, normalizes the bars and archives them.
    pub async fn get_stock_data(
        &self,
        symbol: &str,
        start: NaiveDate,
        end: NaiveDate,
        timespan: Timespan,
    ) -> Result<PriceHistory, DataError> {
        let raw = self.fetch_bars(symbol, timespan, start, end).await?;
        let data = raw
            .iter()
            .map(PriceBar::try_from)
            .collect::<Result<Vec<_>, _>>()?;

        let history = PriceHistory {
            symbol: symbol.to_string(),
            timeframe: timespan,
            start_date: start,
            end_date: end,
            timestamp: utils::fetched_at(),
            data,
        };

        let name = file_name(symbol, timespan, start, end);
        let path = self.folder.save(PRICE_BARS, &name, &history)?;
        info!(
            "Saved {} total records for {symbol} to {}",
            history.data.len(),
            path.display()
        );
        Ok(history)
    }

    pub async fn download_multiple_tickers(
        &self,
        tickers: &[String],
        start: NaiveDate,
        end: NaiveDate,
        timespan: Timespan,
    ) -> BatchSummary {
        info!("Date range: {start} to {end}, timespan: {timespan}");
        let mut progress = Progress::new("price bar", tickers.len());
        let mut summary = BatchSummary::default();

        for ticker in tickers {
            progress.step(&format!("Processing {ticker}..."));
            let result = if self.file_exists(ticker, start, end, timespan) {
                Ok(Outcome::Skipped)
            } else {
                self.get_stock_data(ticker, start, end, timespan)
                    .await
                    .map(|_| Outcome::Saved)
            };
            summary.record(ticker.clone(), result);
        }

        summary
    }
}
