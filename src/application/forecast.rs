//! Demonstration weather forecast service served behind the response cache.

use rand::Rng;
use serde::{Deserialize, Serialize};
use time::{Date, Duration, OffsetDateTime, format_description::FormatItem, macros::format_description};

use super::error::AppError;

pub const FORECAST_DATE_FORMAT: &[FormatItem<'static>] =
    format_description!("[year]-[month]-[day]");

const SUMMARIES: [&str; 10] = [
    "Freezing",
    "Bracing",
    "Chilly",
    "Cool",
    "Mild",
    "Warm",
    "Balmy",
    "Hot",
    "Sweltering",
    "Scorching",
];

const DEFAULT_DAYS: u8 = 5;
const MIN_TEMPERATURE_C: i32 = -20;
const MAX_TEMPERATURE_C: i32 = 55;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WeatherForecast {
    pub date: String,
    pub temperature_c: i32,
    pub temperature_f: i32,
    pub summary: String,
}

impl WeatherForecast {
    fn new(date: Date, temperature_c: i32, summary: &str) -> Result<Self, AppError> {
        let date = date
            .format(FORECAST_DATE_FORMAT)
            .map_err(|err| AppError::unexpected(format!("failed to format forecast date: {err}")))?;
        Ok(Self {
            date,
            temperature_c,
            temperature_f: fahrenheit(temperature_c),
            summary: summary.to_string(),
        })
    }
}

/// Truncating conversion, so 1°C reports as 33°F.
pub fn fahrenheit(celsius: i32) -> i32 {
    32 + (f64::from(celsius) / 0.5556) as i32
}

/// Produces random forecasts for the days following today.
#[derive(Debug, Clone)]
pub struct ForecastService {
    days: u8,
}

impl Default for ForecastService {
    fn default() -> Self {
        Self { days: DEFAULT_DAYS }
    }
}

impl ForecastService {
    pub fn forecast(&self) -> Result<Vec<WeatherForecast>, AppError> {
        self.forecast_from(OffsetDateTime::now_utc().date())
    }

    pub fn forecast_from(&self, today: Date) -> Result<Vec<WeatherForecast>, AppError> {
        let mut rng = rand::thread_rng();
        (1..=i64::from(self.days))
            .map(|offset| {
                let date = today
                    .checked_add(Duration::days(offset))
                    .ok_or_else(|| AppError::unexpected("forecast date out of range"))?;
                let temperature_c = rng.gen_range(MIN_TEMPERATURE_C..MAX_TEMPERATURE_C);
                let summary = SUMMARIES[rng.gen_range(0..SUMMARIES.len())];
                WeatherForecast::new(date, temperature_c, summary)
            })
            .collect()
    }
}
