//! solr-gateway: one-shot Solr query tool
//!
//! Sends a single query through the pooled client and prints the JSON result.

use anyhow::{bail, Result};
use clap::Parser;
use solr_gateway::{config::Settings, query, QueryRequest, SearchClient};
use std::path::PathBuf;
use std::time::Duration;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "solr-gateway", version)]
#[command(about = "Send a query to a Solr collection and print the JSON response")]
#[command(after_help = "ENVIRONMENT VARIABLES:
    SOLR_GATEWAY_SETTINGS_PATH  Path to settings.yml
    SOLR_GATEWAY_URL            Solr base URL
    SOLR_GATEWAY_COLLECTION     Default collection
    SOLR_GATEWAY_USERNAME       Basic auth user
    SOLR_GATEWAY_PASSWORD       Basic auth password
    SOLR_GATEWAY_TOKEN          Bearer token
    RUST_LOG                    Log filter (default: info)")]
struct Args {
    /// Strip Solr query syntax from QUERY first
    #[arg(short, long)]
    sanitize: bool,

    /// Give up after SECS seconds
    #[arg(short, long, value_name = "SECS", value_parser = parse_timeout)]
    timeout: Option<Duration>,

    /// Collection to query. When it is the only positional argument it is
    /// taken as the query and solr.default_collection is used.
    #[arg(value_name = "COLLECTION")]
    collection: String,

    /// Query text
    #[arg(value_name = "QUERY")]
    query: Option<String>,

    /// Extra Solr parameters
    #[arg(value_name = "KEY=VALUE", value_parser = parse_key_val)]
    params: Vec<(String, String)>,
}

impl Args {
    /// Collection (if given) and query text
    fn target(&self) -> (Option<&str>, &str) {
        match &self.query {
            Some(query) => (Some(self.collection.as_str()), query.as_str()),
            None => (None, self.collection.as_str()),
        }
    }
}

fn parse_timeout(value: &str) -> Result<Duration, String> {
    let secs: f64 = value
        .parse()
        .map_err(|_| format!("invalid timeout {:?}", value))?;
    if !secs.is_finite() || secs <= 0.0 {
        return Err(format!(
            "timeout must be a positive number of seconds, got {:?}",
            value
        ));
    }
    Ok(Duration::from_secs_f64(secs))
}

fn parse_key_val(value: &str) -> Result<(String, String), String> {
    match value.split_once('=') {
        Some((key, val)) if !key.is_empty() => Ok((key.to_string(), val.to_string())),
        _ => Err(format!("expected KEY=VALUE, got {:?}", value)),
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    // Load configuration
    let settings = load_settings()?;
    let client = SearchClient::from_settings(&settings)?;

    let (collection, text) = args.target();
    let collection = match collection
        .map(str::to_string)
        .or(settings.solr.default_collection.clone())
    {
        Some(collection) => collection,
        None => bail!("no collection given and solr.default_collection is not set"),
    };

    let q = if args.sanitize {
        let cleaned = query::sanitize(text);
        if !query::is_sanitized(text) {
            info!("Sanitized query {:?} to {:?}", text, cleaned);
        }
        cleaned
    } else {
        text.to_string()
    };

    let request = QueryRequest::new(collection, q).params(args.params.iter().cloned().collect());
    let result = match args.timeout {
        Some(limit) => client.query_with_timeout(&request, limit).await,
        None => client.execute(&request).await,
    };

    match result {
        Ok(result) => {
            println!("{}", serde_json::to_string_pretty(&*result)?);
            Ok(())
        }
        Err(e) => {
            warn!("Query failed ({})", e.kind());
            Err(e.into())
        }
    }
}

/// Load settings from file or use defaults
fn load_settings() -> Result<Settings> {
    // Check for settings file in various locations
    let paths = [
        PathBuf::from("settings.yml"),
        PathBuf::from("config/settings.yml"),
        PathBuf::from("/etc/solr-gateway/settings.yml"),
        dirs::config_dir()
            .map(|p| p.join("solr-gateway/settings.yml"))
            .unwrap_or_default(),
    ];

    // Check environment variable first
    if let Ok(path) = std::env::var("SOLR_GATEWAY_SETTINGS_PATH") {
        let path = PathBuf::from(path);
        if path.exists() {
            info!("Loading settings from: {}", path.display());
            let mut settings = Settings::from_file(&path)?;
            settings.merge_env();
            return Ok(settings);
        }
        warn!("SOLR_GATEWAY_SETTINGS_PATH {} does not exist", path.display());
    }

    // Try each default path
    for path in paths.iter() {
        if path.is_file() {
            info!("Loading settings from: {}", path.display());
            let mut settings = Settings::from_file(path)?;
            settings.merge_env();
            return Ok(settings);
        }
    }

    // Use defaults
    info!("No settings file found, using defaults");
    let mut settings = Settings::default();
    settings.merge_env();
    Ok(settings)
}
