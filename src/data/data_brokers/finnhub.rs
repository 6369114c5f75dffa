use chrono::NaiveDate;
use serde::Serialize;
use serde_json::Value;
use std::fmt;
use std::str::FromStr;
use tracing::info;

use super::{require_key, ApiAuth, ApiClient, JsonApi};
use crate::config::FinnhubApi;
use crate::data::batch::{BatchSummary, Outcome, Progress};
use crate::data::store::{
    DataFolder, COMPANY_PROFILES, DIVIDENDS, FINANCIALS, FINANCIALS_AS_REPORTED,
};
use crate::data::DataError;
use crate::utils;

/// Financial statement kind, sent to the API by its short code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Statement {
    #[serde(rename = "ic")]
    Income,
    #[serde(rename = "bs")]
    Balance,
    #[serde(rename = "cf")]
    CashFlow,
}

impl Statement {
    pub const ALL: [Statement; 3] = [Self::Income, Self::Balance, Self::CashFlow];

    pub fn code(self) -> &'static str {
        match self {
            Self::Income => "ic",
            Self::Balance => "bs",
            Self::CashFlow => "cf",
        }
    }

    /// Name used in archive file names
    pub fn file_label(self) -> &'static str {
        match self {
            Self::Income => "income",
            Self::Balance => "balance",
            Self::CashFlow => "cashflow",
        }
    }
}

impl FromStr for Statement {
    type Err = DataError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "ic" | "income" => Ok(Self::Income),
            "bs" | "balance" => Ok(Self::Balance),
            "cf" | "cashflow" => Ok(Self::CashFlow),
            other => Err(DataError::unsupported("statement", other)),
        }
    }
}

impl fmt::Display for Statement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Frequency {
    Annual,
    Quarterly,
}

impl Frequency {
    pub const ALL: [Frequency; 2] = [Self::Annual, Self::Quarterly];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Annual => "annual",
            Self::Quarterly => "quarterly",
        }
    }
}

impl FromStr for Frequency {
    type Err = DataError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "annual" => Ok(Self::Annual),
            "quarterly" => Ok(Self::Quarterly),
            other => Err(DataError::unsupported("frequency", other)),
        }
    }
}

impl fmt::Display for Frequency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Serialize)]
pub struct FinancialsRecord {
    pub symbol: String,
    pub statement: Statement,
    pub frequency: Frequency,
    pub timestamp: String,
    pub data: Value,
}

#[derive(Debug, Serialize)]
pub struct ReportedFinancialsRecord {
    pub symbol: String,
    pub frequency: Frequency,
    pub timestamp: String,
    pub data: Value,
}

/// Envelope for per-symbol documents tagged by `data_type`
#[derive(Debug, Serialize)]
pub struct SymbolRecord {
    pub symbol: String,
    pub data_type: &'static str,
    pub timestamp: String,
    pub data: Value,
}

pub fn financials_file(statement: Statement, symbol: &str, frequency: Frequency) -> String {
    format!(
        "financials_{}_{symbol}_{frequency}.json",
        statement.file_label()
    )
}

pub fn financials_as_reported_file(symbol: &str, frequency: Frequency) -> String {
    format!("FinancialsAsReported_{symbol}_{frequency}.json")
}

pub fn company_profile_file(symbol: &str) -> String {
    format!("company_profile_{symbol}.json")
}

pub fn dividends_file(symbol: &str) -> String {
    format!("dividends_{symbol}.json")
}

/// Fundamentals downloader for the Finnhub REST API
pub struct FinnhubData<C = ApiClient> {
    api: C,
    folder: DataFolder,
    skip_existing: bool,
}

impl FinnhubData<ApiClient> {
    pub fn from_settings(
        settings: &FinnhubApi,
        folder: DataFolder,
        skip_existing: bool,
    ) -> Result<Self, DataError> {
        let key = require_key(&settings.api_key, "Finnhub", "FINNHUB")?;
        let api = ApiClient::new(
            &settings.base_url,
            ApiAuth::Header {
                name: "X-Finnhub-Token".to_string(),
                value: key,
            },
        )?;
        Ok(Self::new(api, folder, skip_existing))
    }
}

impl<C: JsonApi> FinnhubData<C> {
    pub fn new(api: C, folder: DataFolder, skip_existing: bool) -> Self {
        Self {
            api,
            folder,
            skip_existing,
        }
    }

    fn already_saved(&self, category: &str, file_name: &str) -> bool {
        self.skip_existing && self.folder.exists(category, file_name)
    }

    fn save<T: Serialize>(
        &self,
        category: &str,
        file_name: &str,
        record: &T,
    ) -> Result<(), DataError> {
        let path = self.folder.save(category, file_name, record)?;
        info!("Saved {file_name} to {}", path.display());
        Ok(())
    }

    pub async fn get_financials(
        &self,
        statement: Statement,
        symbol: &str,
        frequency: Frequency,
    ) -> Result<FinancialsRecord, DataError> {
        info!("Fetching {statement} financials for {symbol} ({frequency})...");
        let query = [
            ("symbol", symbol.to_string()),
            ("statement", statement.code().to_string()),
            ("freq", frequency.to_string()),
        ];
        let data = self.api.get_json("/stock/financials", &query).await?;

        let record = FinancialsRecord {
            symbol: symbol.to_string(),
            statement,
            frequency,
            timestamp: utils::fetched_at(),
            data,
        };
        self.save(
            FINANCIALS,
            &financials_file(statement, symbol, frequency),
            &record,
        )?;
        Ok(record)
    }

    pub async fn get_financials_as_reported(
        &self,
        symbol: &str,
        frequency: Frequency,
    ) -> Result<ReportedFinancialsRecord, DataError> {
        info!("Fetching as-reported financials for {symbol} ({frequency})...");
        let query = [("symbol", symbol.to_string()), ("freq", frequency.to_string())];
        let data = self
            .api
            .get_json("/stock/financials-reported", &query)
            .await?;

        let record = ReportedFinancialsRecord {
            symbol: symbol.to_string(),
            frequency,
            timestamp: utils::fetched_at(),
            data,
        };
        self.save(
            FINANCIALS_AS_REPORTED,
            &financials_as_reported_file(symbol, frequency),
            &record,
        )?;
        Ok(record)
    }

    pub async fn get_company_profile(&self, symbol: &str) -> Result<SymbolRecord, DataError> {
        info!("Fetching company profile for {symbol}...");
        let query = [("symbol", symbol.to_string())];
        let data = self.api.get_json("/stock/profile", &query).await?;

        let record = SymbolRecord {
            symbol: symbol.to_string(),
            data_type: "company_profile",
            timestamp: utils::fetched_at(),
            data,
        };
        self.save(COMPANY_PROFILES, &company_profile_file(symbol), &record)?;
        Ok(record)
    }

    /// Omitted bounds are left to the provider.
    pub async fn get_dividends(
        &self,
        symbol: &str,
        from: Option<NaiveDate>,
        to: Option<NaiveDate>,
    ) -> Result<SymbolRecord, DataError> {
        info!("Fetching dividends for {symbol}...");
        let mut query = vec![("symbol", symbol.to_string())];
        if let Some(from) = from {
            query.push(("from", from.to_string()));
        }
        if let Some(to) = to {
            query.push(("to", to.to_string()));
        }
        let data = self.api.get_json("/stock/dividend", &query).await?;

        let record = SymbolRecord {
            symbol: symbol.to_string(),
            data_type: "dividends",
            timestamp: utils::fetched_at(),
            data,
        };
        self.save(DIVIDENDS, &dividends_file(symbol), &record)?;
        Ok(record)
    }

    pub async fn download_multiple_companies_financials(
        &self,
        tickers: &[String],
        statements: &[Statement],
        frequencies: &[Frequency],
    ) -> BatchSummary {
        info!("Statement types: {statements:?}, frequencies: {frequencies:?}");
        let total = tickers.len() * statements.len() * frequencies.len();
        let mut progress = Progress::new("financials", total);
        let mut summary = BatchSummary::default();

        for symbol in tickers {
            info!("--- Processing {symbol} ---");
            for &statement in statements {
                for &frequency in frequencies {
                    let label = format!("{symbol}_{statement}_{frequency}");
                    progress.step(&format!("{symbol} - {statement} - {frequency}"));

                    let result = if self.already_saved(
                        FINANCIALS,
                        &financials_file(statement, symbol, frequency),
                    ) {
                        Ok(Outcome::Skipped)
                    } else {
                        self.get_financials(statement, symbol, frequency)
                            .await
                            .map(|_| Outcome::Saved)
                    };
                    summary.record(label, result);
                }
            }
        }

        summary
    }

    pub async fn download_multiple_companies_financials_as_reported(
        &self,
        tickers: &[String],
        frequencies: &[Frequency],
    ) -> BatchSummary {
        info!("Frequencies: {frequencies:?}");
        let total = tickers.len() * frequencies.len();
        let mut progress = Progress::new("as-reported financials", total);
        let mut summary = BatchSummary::default();

        for symbol in tickers {
            info!("--- Processing {symbol} ---");
            for &frequency in frequencies {
                progress.step(&format!("{symbol} - {frequency}"));
                let result = if self.already_saved(
                    FINANCIALS_AS_REPORTED,
                    &financials_as_reported_file(symbol, frequency),
                ) {
                    Ok(Outcome::Skipped)
                } else {
                    self.get_financials_as_reported(symbol, frequency)
                        .await
                        .map(|_| Outcome::Saved)
                };
                summary.record(format!("{symbol}_{frequency}"), result);
            }
        }

        summary
    }

    pub async fn download_multiple_companies_profiles(&self, tickers: &[String]) -> BatchSummary {
        let mut progress = Progress::new("company profile", tickers.len());
        let mut summary = BatchSummary::default();

        for symbol in tickers {
            progress.step(&format!("Processing {symbol}..."));
            let result = if self.already_saved(COMPANY_PROFILES, &company_profile_file(symbol)) {
                Ok(Outcome::Skipped)
            } else {
                self.get_company_profile(symbol)
                    .await
                    .map(|_| Outcome::Saved)
            };
            summary.record(format!("{symbol}_profile"), result);
        }

        summary
    }

    pub async fn download_multiple_companies_dividends(
        &self,
        tickers: &[String],
        from: Option<NaiveDate>,
        to: Option<NaiveDate>,
    ) -> BatchSummary {
        let mut progress = Progress::new("dividends", tickers.len());
        let mut summary = BatchSummary::default();

        for symbol in tickers {
            progress.step(&format!("Processing {symbol}..."));
            let result = if self.already_saved(DIVIDENDS, &dividends_file(symbol)) {
                Ok(Outcome::Skipped)
            } else {
                self.get_dividends(symbol, from, to)
                    .await
                    .map(|_| Outcome::Saved)
            };
            summary.record(format!("{symbol}_dividends"), result);
        }

        summary
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::data_brokers::testing::ScriptedApi;
    use serde_json::json;

    fn finnhub(
        responses: Vec<Result<Value, DataError>>,
        skip_existing: bool,
    ) -> (FinnhubData<ScriptedApi>, tempfile::TempDir) {
        let dir = tempfile::tempdir().unwrap();
        let folder = DataFolder::new(dir.path()).unwrap();
        (
            FinnhubData::new(ScriptedApi::new(responses), folder, skip_existing),
            dir,
        )
    }

    fn read(path: std::path::PathBuf) -> Value {
        serde_json::from_str(&std::fs::read_to_string(path).unwrap()).unwrap()
    }

    #[tokio::test]
    async fn financials_are_wrapped_and_named_by_statement() {
        let payload = json!({"symbol": "AAPL", "financials": [{"period": "2024-09-28"}]});
        let (finnhub, dir) = finnhub(vec![Ok(payload.clone())], true);

        finnhub
            .get_financials(Statement::CashFlow, "AAPL", Frequency::Quarterly)
            .await
            .unwrap();

        let calls = finnhub.api.calls.borrow();
        assert_eq!(calls[0].0, "/stock/financials");
        assert_eq!(ScriptedApi::query_value(&calls[0], "statement").as_deref(), Some("cf"));
        assert_eq!(ScriptedApi::query_value(&calls[0], "freq").as_deref(), Some("quarterly"));

        let saved = read(
            dir.path()
                .join("financials")
                .join("financials_cashflow_AAPL_quarterly.json"),
        );
        assert_eq!(saved["statement"], "cf");
        assert_eq!(saved["frequency"], "quarterly");
        assert_eq!(saved["data"], payload);
    }

    #[tokio::test]
    async fn as_reported_and_profile_land_in_their_folders() {
        let (finnhub, dir) = finnhub(
            vec![Ok(json!({"data": []})), Ok(json!({"name": "Apple Inc"}))],
            true,
        );

        finnhub
            .get_financials_as_reported("AAPL", Frequency::Annual)
            .await
            .unwrap();
        finnhub.get_company_profile("AAPL").await.unwrap();

        assert!(dir
            .path()
            .join("financials_as_reported")
            .join("FinancialsAsReported_AAPL_annual.json")
            .exists());
        let profile = read(
            dir.path()
                .join("company_profiles")
                .join("company_profile_AAPL.json"),
        );
        assert_eq!(profile["data_type"], "company_profile");
        assert_eq!(profile["data"]["name"], "Apple Inc");
        assert_eq!(finnhub.api.calls.borrow()[1].0, "/stock/profile");
    }

    #[tokio::test]
    async fn dividends_pass_optional_range() {
        let (finnhub, _dir) = finnhub(vec![Ok(json!([])), Ok(json!([]))], false);

        finnhub.get_dividends("KO", None, None).await.unwrap();
        finnhub
            .get_dividends(
                "KO",
                NaiveDate::from_ymd_opt(2020, 1, 1),
                NaiveDate::from_ymd_opt(2024, 12, 31),
            )
            .await
            .unwrap();

        let calls = finnhub.api.calls.borrow();
        assert_eq!(ScriptedApi::query_value(&calls[0], "from"), None);
        assert_eq!(
            ScriptedApi::query_value(&calls[1], "from").as_deref(),
            Some("2020-01-01")
        );
        assert_eq!(
            ScriptedApi::query_value(&calls[1], "to").as_deref(),
            Some("2024-12-31")
        );
    }

    #[tokio::test]
    async fn financials_batch_counts_every_combination() {
        let mut responses: Vec<Result<Value, DataError>> = (0..3).map(|_| Ok(json!({}))).collect();
        responses.insert(
            1,
            Err(DataError::Status {
                status: 403,
                body: "You don't have access to this resource.".into(),
            }),
        );
        let (finnhub, _dir) = finnhub(responses, true);
        let tickers = vec!["AAPL".to_string(), "MSFT".to_string()];

        let summary = finnhub
            .download_multiple_companies_financials(
                &tickers,
                &[Statement::Income, Statement::Balance],
                &[Frequency::Annual],
            )
            .await;

        assert_eq!(summary.total(), 4);
        assert_eq!(summary.failed, vec!["AAPL_bs_annual"]);
        assert_eq!(
            summary.successful,
            vec!["AAPL_ic_annual", "MSFT_ic_annual", "MSFT_bs_annual"]
        );
    }

    #[tokio::test]
    async fn skip_existing_avoids_refetch() {
        let (finnhub, _dir) = finnhub(vec![Ok(json!({"name": "Microsoft"}))], true);
        finnhub
            .folder
            .save(COMPANY_PROFILES, &company_profile_file("AAPL"), &json!({}))
            .unwrap();

        let tickers = vec!["AAPL".to_string(), "MSFT".to_string()];
        let summary = finnhub.download_multiple_companies_profiles(&tickers).await;

        assert_eq!(summary.skipped, vec!["AAPL_profile"]);
        assert_eq!(summary.successful, vec!["MSFT_profile"]);
        assert_eq!(finnhub.api.calls.borrow().len(), 1);
    }

    #[tokio::test]
    async fn without_skip_existing_files_are_refreshed() {
        let (finnhub, _dir) = finnhub(vec![Ok(json!([{"amount": 0.51}]))], false);
        finnhub
            .folder
            .save(DIVIDENDS, &dividends_file("KO"), &json!({}))
            .unwrap();

        let summary = finnhub
            .download_multiple_companies_dividends(&["KO".to_string()], None, None)
            .await;

        assert_eq!(summary.successful, vec!["KO_dividends"]);
    }

    #[test]
    fn statement_codes_parse_both_ways() {
        assert_eq!("bs".parse::<Statement>().unwrap(), Statement::Balance);
        assert_eq!("cashflow".parse::<Statement>().unwrap(), Statement::CashFlow);
        assert!("xx".parse::<Statement>().is_err());
        assert_eq!(Statement::ALL.map(Statement::code), ["ic", "bs", "cf"]);
        assert!("monthly".parse::<Frequency>().is_err());
    }
}
