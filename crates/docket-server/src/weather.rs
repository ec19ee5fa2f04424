use std::fmt::Debug;
use std::time::Duration;

use anyhow::Context;
use chrono::{DateTime, NaiveDate};
use chrono_tz::Tz;
use futures::future::BoxFuture;
use reqwest::Url;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use tracing::{debug, warn};

const HOURLY_ENTRIES: usize = 12;
const DAILY_ENTRIES: usize = 8;
const DEFAULT_UNITS: &str = "metric";

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Coords {
    pub lat: f64,
    pub lon: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OneCallVersion {
    V3,
    V25,
}

impl OneCallVersion {
    fn path(self) -> &'static str {
        match self {
            Self::V3 => "/data/3.0/onecall",
            Self::V25 => "/data/2.5/onecall",
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum WeatherError {
    #[error("Weather API {status}: {body}")]
    Upstream { status: u16, body: String },

    #[error("City not found")]
    CityNotFound,

    #[error("lat/lon or city is required")]
    MissingLocation,

    #[error("weather request failed: {0:#}")]
    Transport(#[from] anyhow::Error),
}

impl WeatherError {
    /// HTTP status to answer with; upstream statuses pass through.
    pub fn status(&self) -> u16 {
        match self {
            Self::Upstream { status, .. } => *status,
            Self::CityNotFound => 404,
            Self::MissingLocation => 400,
            Self::Transport(_) => 500,
        }
    }

    fn is_plan_rejection(&self) -> bool {
        matches!(self, Self::Upstream { status: 400 | 401 | 404, .. })
    }
}

/// Upstream weather provider, one method per endpoint.
pub trait WeatherSource: Debug + Send + Sync {
    fn geocode<'a>(&'a self, city: &'a str) -> BoxFuture<'a, Result<Option<Coords>, WeatherError>>;

    fn one_call<'a>(
        &'a self,
        version: OneCallVersion,
        at: Coords,
        units: &'a str,
    ) -> BoxFuture<'a, Result<Value, WeatherError>>;

    fn current<'a>(&'a self, at: Coords, units: &'a str) -> BoxFuture<'a, Result<Value, WeatherError>>;

    fn forecast<'a>(&'a self, at: Coords, units: &'a str)
    -> BoxFuture<'a, Result<Value, WeatherError>>;
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct WeatherQuery {
    pub lat: Option<f64>,
    pub lon: Option<f64>,
    pub city: Option<String>,
    pub units: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct WeatherReport {
    pub lat: f64,
    pub lon: f64,
    pub units: String,
    pub data: Value,
}

#[tracing::instrument(skip(source, tz))]
pub async fn fetch_weather(
    source: &dyn WeatherSource,
    query: &WeatherQuery,
    tz: Tz,
) -> Result<WeatherReport, WeatherError> {
    let units = query
        .units
        .as_deref()
        .map(str::trim)
        .filter(|u| !u.is_empty())
        .unwrap_or(DEFAULT_UNITS);

    let at = match (query.lat, query.lon) {
        (Some(lat), Some(lon)) => Coords { lat, lon },
        _ => match query.city.as_deref().map(str::trim).filter(|c| !c.is_empty()) {
            Some(city) => source
                .geocode(city)
                .await?
                .ok_or(WeatherError::CityNotFound)?,
            None => return Err(WeatherError::MissingLocation),
        },
    };

    let data = one_call_with_fallback(source, at, units, tz).await?;
    Ok(WeatherReport {
        lat: at.lat,
        lon: at.lon,
        units: units.to_string(),
        data,
    })
}

/// One Call 3.0, then 2.5 when the plan rejects 3.0, then the free current
/// and forecast endpoints mapped into the one-call shape.
async fn one_call_with_fallback(
    source: &dyn WeatherSource,
    at: Coords,
    units: &str,
    tz: Tz,
) -> Result<Value, WeatherError> {
    let err = match source.one_call(OneCallVersion::V3, at, units).await {
        Ok(data) => return Ok(data),
        Err(err) if err.is_plan_rejection() => err,
        Err(err) => return Err(err),
    };
    warn!(error = %err, "one call 3.0 unavailable, trying 2.5");

    let err = match source.one_call(OneCallVersion::V25, at, units).await {
        Ok(data) => return Ok(data),
        Err(err) => err,
    };
    warn!(error = %err, "one call 2.5 unavailable, using current and forecast");

    let (current, forecast) =
        futures::try_join!(source.current(at, units), source.forecast(at, units))?;
    Ok(map_basic(&current, &forecast, tz))
}

/// Maps the free `weather` and `forecast` payloads into
/// `{current, hourly, daily}`. Daily entries group forecast samples by
/// local day in `tz`, keeping the first sample of each day.
pub fn map_basic(current: &Value, forecast: &Value, tz: Tz) -> Value {
    let main = &current["main"];
    let current = json!({
        "temp": main["temp"],
        "feels_like": main["feels_like"],
        "humidity": main["humidity"],
        "pressure": main["pressure"],
        "wind_speed": current["wind"]["speed"],
        "weather": weather_of(current),
    });

    let entries: &[Value] = forecast["list"].as_array().map_or(&[], Vec::as_slice);

    let hourly: Vec<Value> = entries
        .iter()
        .take(HOURLY_ENTRIES)
        .map(|it| {
            json!({
                "dt": it["dt"],
                "temp": it["main"]["temp"],
                "weather": weather_of(it),
            })
        })
        .collect();

    let mut days: Vec<(NaiveDate, Vec<f64>, &Value)> = Vec::new();
    for it in entries {
        let Some(day) = it["dt"]
            .as_i64()
            .and_then(|secs| DateTime::from_timestamp(secs, 0))
            .map(|dt| dt.with_timezone(&tz).date_naive())
        else {
            continue;
        };
        let temp = it["main"]["temp"].as_f64();
        match days.iter_mut().find(|(seen, ..)| *seen == day) {
            Some((_, temps, _)) => temps.extend(temp),
            None => days.push((day, temp.into_iter().collect(), it)),
        }
    }

    let daily: Vec<Value> = days
        .into_iter()
        .take(DAILY_ENTRIES)
        .map(|(_, temps, sample)| {
            let min = temps.iter().copied().reduce(f64::min);
            let max = temps.iter().copied().reduce(f64::max);
            json!({
                "dt": sample["dt"],
                "temp": { "min": min, "max": max },
                "weather": weather_of(sample),
            })
        })
        .collect();

    json!({ "current": current, "hourly": hourly, "daily": daily })
}

fn weather_of(value: &Value) -> Value {
    value
        .get("weather")
        .filter(|w| w.is_array())
        .cloned()
        .unwrap_or_else(|| json!([]))
}

/// OpenWeatherMap over HTTPS.
#[derive(Debug, Clone)]
pub struct OpenWeather {
    client: reqwest::Client,
    base_url: Url,
    api_key: String,
}

impl OpenWeather {
    pub fn new(base_url: &str, api_key: String) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(15))
            .build()
            .context("failed building HTTP client for weather")?;
        let base_url =
            Url::parse(base_url).with_context(|| format!("invalid weather.base_url: {base_url}"))?;
        Ok(Self {
            client,
            base_url,
            api_key,
        })
    }

    fn url(&self, path: &str, params: &[(&str, String)]) -> Result<Url, WeatherError> {
        let mut url = self
            .base_url
            .join(path)
            .with_context(|| format!("invalid weather path {path}"))?;
        url.query_pairs_mut()
            .extend_pairs(params)
            .append_pair("appid", &self.api_key);
        Ok(url)
    }

    async fn fetch_json(&self, path: &str, params: &[(&str, String)]) -> Result<Value, WeatherError> {
        let url = self.url(path, params)?;
        debug!(path, "requesting weather endpoint");

        let response = self
            .client
            .get(url)
            .send()
            .await
            .with_context(|| format!("failed requesting {path}"))?;
        let status = response.status();
        let body = response
            .text()
            .await
            .with_context(|| format!("failed reading {path} response body"))?;

        if !status.is_success() {
            return Err(WeatherError::Upstream {
                status: status.as_u16(),
                body,
            });
        }
        let value = serde_json::from_str(&body)
            .with_context(|| format!("invalid json from {path}"))?;
        Ok(value)
    }
}

fn point(at: Coords, units: &str) -> Vec<(&'static str, String)> {
    vec![
        ("lat", at.lat.to_string()),
        ("lon", at.lon.to_string()),
        ("units", units.to_string()),
    ]
}

impl WeatherSource for OpenWeather {
    fn geocode<'a>(&'a self, city: &'a str) -> BoxFuture<'a, Result<Option<Coords>, WeatherError>> {
        Box::pin(async move {
            let found = self
                .fetch_json("/geo/1.0/direct", &[
                    ("q", city.to_string()),
                    ("limit", "1".to_string()),
                ])
                .await?;
            let first = &found[0];
            Ok(first["lat"]
                .as_f64()
                .zip(first["lon"].as_f64())
                .map(|(lat, lon)| Coords { lat, lon }))
        })
    }

    fn one_call<'a>(
        &'a self,
        version: OneCallVersion,
        at: Coords,
        units: &'a str,
    ) -> BoxFuture<'a, Result<Value, WeatherError>> {
        Box::pin(async move {
            let mut params = point(at, units);
            params.push(("exclude", "minutely,alerts".to_string()));
            self.fetch_json(version.path(), &params).await
        })
    }

    fn current<'a>(&'a self, at: Coords, units: &'a str) -> BoxFuture<'a, Result<Value, WeatherError>> {
        Box::pin(async move { self.fetch_json("/data/2.5/weather", &point(at, units)).await })
    }

    fn forecast<'a>(
        &'a self,
        at: Coords,
        units: &'a str,
    ) -> BoxFuture<'a, Result<Value, WeatherError>> {
        Box::pin(async move { self.fetch_json("/data/2.5/forecast", &point(at, units)).await })
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use super::*;

    #[derive(Debug)]
    struct FakeSource {
        v3: Result<Value, u16>,
        v25: Result<Value, u16>,
        calls: Mutex<Vec<&'static str>>,
    }

    impl FakeSource {
        fn new(v3: Result<Value, u16>, v25: Result<Value, u16>) -> Self {
            Self {
                v3,
                v25,
                calls: Mutex::new(vec![]),
            }
        }

        fn record(&self, name: &'static str) {
            self.calls.lock().unwrap().push(name);
        }

        fn calls(&self) -> Vec<&'static str> {
            self.calls.lock().unwrap().clone()
        }
    }

    fn scripted(result: &Result<Value, u16>) -> Result<Value, WeatherError> {
        result.clone().map_err(|status| WeatherError::Upstream {
            status,
            body: "nope".to_string(),
        })
    }

    impl WeatherSource for FakeSource {
        fn geocode<'a>(
            &'a self,
            city: &'a str,
        ) -> BoxFuture<'a, Result<Option<Coords>, WeatherError>> {
            self.record("geocode");
            let found = (city == "Taipei").then_some(Coords {
                lat: 25.03,
                lon: 121.56,
            });
            Box::pin(async move { Ok(found) })
        }

        fn one_call<'a>(
            &'a self,
            version: OneCallVersion,
            _at: Coords,
            _units: &'a str,
        ) -> BoxFuture<'a, Result<Value, WeatherError>> {
            let result = match version {
                OneCallVersion::V3 => {
                    self.record("v3");
                    scripted(&self.v3)
                }
                OneCallVersion::V25 => {
                    self.record("v25");
                    scripted(&self.v25)
                }
            };
            Box::pin(async move { result })
        }

        fn current<'a>(
            &'a self,
            _at: Coords,
            _units: &'a str,
        ) -> BoxFuture<'a, Result<Value, WeatherError>> {
            self.record("current");
            Box::pin(async move {
                Ok(json!({
                    "main": { "temp": 21.5, "feels_like": 22.0, "humidity": 70, "pressure": 1012 },
                    "wind": { "speed": 3.2 },
                    "weather": [{ "main": "Clouds" }],
                }))
            })
        }

        fn forecast<'a>(
            &'a self,
            _at: Coords,
            _units: &'a str,
        ) -> BoxFuture<'a, Result<Value, WeatherError>> {
            self.record("forecast");
            Box::pin(async move { Ok(forecast_fixture()) })
        }
    }

    // 3-hourly samples starting 2026-03-01T00:00Z, temperatures 0..16.
    fn forecast_fixture() -> Value {
        let start = 1_772_323_200_i64;
        let list: Vec<Value> = (0..16)
            .map(|i| {
                json!({
                    "dt": start + i * 3 * 3600,
                    "main": { "temp": i as f64 },
                    "weather": [{ "main": "Clear" }],
                })
            })
            .collect();
        json!({ "list": list })
    }

    fn at_city(city: &str) -> WeatherQuery {
        WeatherQuery {
            city: Some(city.to_string()),
            ..WeatherQuery::default()
        }
    }

    #[tokio::test]
    async fn one_call_3_answers_directly() {
        let source = FakeSource::new(Ok(json!({ "tier": 3 })), Err(500));
        let report = fetch_weather(&source, &at_city("Taipei"), chrono_tz::UTC)
            .await
            .unwrap();

        assert_eq!(report.data["tier"], 3);
        assert_eq!(report.units, "metric");
        assert_eq!(report.lat, 25.03);
        assert_eq!(source.calls(), vec!["geocode", "v3"]);
    }

    #[tokio::test]
    async fn plan_rejection_falls_back_to_2_5() {
        let source = FakeSource::new(Err(401), Ok(json!({ "tier": 25 })));
        let query = WeatherQuery {
            lat: Some(1.0),
            lon: Some(2.0),
            units: Some("imperial".to_string()),
            ..WeatherQuery::default()
        };
        let report = fetch_weather(&source, &query, chrono_tz::UTC).await.unwrap();

        assert_eq!(report.data["tier"], 25);
        assert_eq!(report.units, "imperial");
        assert_eq!(source.calls(), vec!["v3", "v25"]);
    }

    #[tokio::test]
    async fn both_one_calls_failing_uses_basic_endpoints() {
        let source = FakeSource::new(Err(404), Err(500));
        let report = fetch_weather(&source, &at_city("Taipei"), chrono_tz::UTC)
            .await
            .unwrap();

        assert_eq!(report.data["current"]["temp"], 21.5);
        assert_eq!(report.data["current"]["wind_speed"], 3.2);
        let mut calls = source.calls();
        calls.sort();
        assert_eq!(calls, vec!["current", "forecast", "geocode", "v25", "v3"]);
    }

    #[tokio::test]
    async fn other_upstream_errors_pass_through() {
        let source = FakeSource::new(Err(429), Ok(json!({})));
        let err = fetch_weather(&source, &at_city("Taipei"), chrono_tz::UTC)
            .await
            .unwrap_err();

        assert_eq!(err.status(), 429);
        assert_eq!(source.calls(), vec!["geocode", "v3"]);
    }

    #[tokio::test]
    async fn unknown_city_and_missing_location() {
        let source = FakeSource::new(Ok(json!({})), Ok(json!({})));
        let err = fetch_weather(&source, &at_city("Atlantis"), chrono_tz::UTC)
            .await
            .unwrap_err();
        assert_eq!(err.status(), 404);

        let err = fetch_weather(&source, &WeatherQuery::default(), chrono_tz::UTC)
            .await
            .unwrap_err();
        assert_eq!(err.status(), 400);
    }

    #[test]
    fn basic_mapping_groups_forecast_by_local_day() {
        let data = map_basic(&json!({}), &forecast_fixture(), chrono_tz::UTC);

        assert_eq!(data["hourly"].as_array().unwrap().len(), 12);
        let daily = data["daily"].as_array().unwrap();
        assert_eq!(daily.len(), 2);
        assert_eq!(daily[0]["temp"]["min"], 0.0);
        assert_eq!(daily[0]["temp"]["max"], 7.0);
        assert_eq!(daily[1]["temp"]["min"], 8.0);
        assert_eq!(daily[1]["temp"]["max"], 15.0);
        assert_eq!(data["current"]["weather"], json!([]));
    }

    #[test]
    fn basic_mapping_respects_timezone() {
        // UTC+8 shifts the day boundary to 16:00Z, splitting the samples
        // 0..5 / 6..13 / 14..15.
        let tz: Tz = "Asia/Taipei".parse().unwrap();
        let data = map_basic(&json!({}), &forecast_fixture(), tz);
        let daily = data["daily"].as_array().unwrap();

        assert_eq!(daily.len(), 3);
        assert_eq!(daily[0]["temp"]["max"], 5.0);
        assert_eq!(daily[1]["temp"]["min"], 6.0);
        assert_eq!(daily[2]["temp"]["min"], 14.0);
    }
}
