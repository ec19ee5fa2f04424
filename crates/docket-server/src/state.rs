use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, bail};
use docket_core::{AccountService, TaskService};
use docket_core::config::{self, Config};
use docket_core::datastore::{JsonlStore, MemoryStore, Store};
use docket_core::datetime::{SystemClock, resolve_timezone};
use docket_core::suggest::{RuleBasedSuggester, Suggester};
use docket_core::view::ViewOptions;
use tracing::{info, warn};

use crate::auth::{JwtVerifier, StaticTokens, TokenChain, TokenVerifier};
use crate::weather::{OpenWeather, WeatherSource};

#[derive(Debug, Clone)]
pub struct AppState {
    pub service: TaskService,
    pub accounts: AccountService,
    /// Issues the session tokens returned by register and login.
    pub jwt: Arc<JwtVerifier>,
    pub tokens: Arc<dyn TokenVerifier>,
    pub suggester: Arc<dyn Suggester>,
    /// `None` when no `weather.api_key` is configured.
    pub weather: Option<Arc<dyn WeatherSource>>,
}

impl AppState {
    #[tracing::instrument(skip_all)]
    pub fn from_config(cfg: &Config, data_override: Option<&Path>) -> anyhow::Result<Self> {
        let store = open_store(cfg, data_override)?;
        let tz = resolve_timezone(cfg.get("timezone").as_deref());
        let options = ViewOptions {
            cell_limit: cfg
                .get_parsed::<usize>("calendar.cell_limit")?
                .unwrap_or(ViewOptions::default().cell_limit),
        };
        info!(timezone = %tz, cell_limit = options.cell_limit, "configured views");

        let clock = Arc::new(SystemClock);
        let service = TaskService::new(store.clone(), clock.clone(), tz).with_options(options);
        let accounts = AccountService::new(store, clock);
        let jwt = Arc::new(JwtVerifier::from_config(cfg)?);
        let tokens = TokenChain(vec![
            jwt.clone() as Arc<dyn TokenVerifier>,
            Arc::new(StaticTokens::from_config(cfg)),
        ]);

        let weather: Option<Arc<dyn WeatherSource>> =
            match cfg.get("weather.api_key").filter(|k| !k.trim().is_empty()) {
                Some(key) => {
                    let base_url = cfg
                        .get("weather.base_url")
                        .unwrap_or_else(|| "https://api.openweathermap.org".to_string());
                    Some(Arc::new(OpenWeather::new(&base_url, key)?))
                }
                None => {
                    warn!("weather.api_key not set; /api/weather will answer 500");
                    None
                }
            };

        Ok(Self {
            service,
            accounts,
            jwt,
            tokens: Arc::new(tokens),
            suggester: Arc::new(RuleBasedSuggester::new()?),
            weather,
        })
    }
}

fn open_store(cfg: &Config, data_override: Option<&Path>) -> anyhow::Result<Arc<dyn Store>> {
    let kind = cfg.get("store").unwrap_or_else(|| "jsonl".to_string());
    match kind.trim() {
        "memory" => {
            info!("using in-memory store");
            Ok(Arc::new(MemoryStore::new()))
        }
        "jsonl" => {
            let data_dir = config::resolve_data_dir(cfg, data_override)
                .context("failed to resolve data directory")?;
            let store = JsonlStore::open(&data_dir).with_context(|| {
                format!("failed to open datastore at {}", data_dir.display())
            })?;
            Ok(Arc::new(store))
        }
        other => bail!("unknown store kind: {other} (expected jsonl or memory)"),
    }
}
