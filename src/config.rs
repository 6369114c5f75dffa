use config::{Config, File};
use serde::Deserialize;
use std::path::Path;

#[derive(Debug, Deserialize)]
pub struct Settings {
    pub general: General,
    pub polygon: PolygonApi,
    pub finnhub: FinnhubApi,
    pub universe: Universe,
}

#[derive(Debug, Deserialize)]
pub struct General {
    pub data_folder: String,
    // Whole-file existence check, the only cache we have
    pub skip_existing: bool,
}

#[derive(Debug, Deserialize)]
pub struct PolygonApi {
    pub api_key: String,
    pub base_url: String,
    pub timespan: String,
    pub start_date: String,
    pub end_date: Option<String>,
    pub page_limit: usize,
}

#[derive(Debug, Deserialize)]
pub struct FinnhubApi {
    pub api_key: String,
    pub base_url: String,
    pub statements: Vec<String>,
    pub frequencies: Vec<String>,
    pub dividends_from: Option<String>,
    pub dividends_to: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct Universe {
    pub tickers: Vec<String>,
}

impl Settings {
    /// Layers defaults, the optional TOML file at `path` and `APP__*`
    /// environment variables (a `.env` file is loaded first).
    pub fn new(path: &Path) -> Result<Self, config::ConfigError> {
        dotenv::dotenv().ok();
        Self::builder(path)?
            // Retrieve the api keys from .env
            .add_source(config::Environment::with_prefix("APP").separator("__"))
            .build()?
            .try_deserialize()
    }

    fn builder(
        path: &Path,
    ) -> Result<config::ConfigBuilder<config::builder::DefaultState>, config::ConfigError> {
        Config::builder()
            .set_default("general.data_folder", "market_data")?
            .set_default("general.skip_existing", true)?
            .set_default("polygon.api_key", "")?
            .set_default("polygon.base_url", "https://api.polygon.io")?
            .set_default("polygon.timespan", "day")?
            .set_default("polygon.start_date", "2021-01-01")?
            .set_default("polygon.page_limit", 1000)?
            .set_default("finnhub.api_key", "")?
            .set_default("finnhub.base_url", "https://finnhub.io/api/v1")?
            .set_default("finnhub.statements", vec!["ic", "bs", "cf"])?
            .set_default("finnhub.frequencies", vec!["annual", "quarterly"])?
            .set_default("universe.tickers", Vec::<String>::new())
            .map(|builder| builder.add_source(File::from(path).required(false)))
    }
}
