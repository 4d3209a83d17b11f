use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use chrono::{DateTime, NaiveDate, NaiveTime, Utc};
use chrono_tz::Tz;
use clap::Parser;

use crate::history::{HistoryQuery, parse_date, parse_time_of_day};
use crate::ranking::DEFAULT_TOP_N;

#[derive(Parser, Clone, Debug)]
#[clap(name = "bidding-board", about = "Pre-market auction board for the terminal")]
pub struct CliParams {
    /// Base URL of the bidding data service
    #[clap(
        long = "api-base",
        env = "BIDDING_API_BASE",
        default_value = "http://localhost:5000"
    )]
    pub api_base: String,

    /// Date of the initial history query (YYYY-MM-DD); defaults to today
    #[clap(long = "date", value_parser = parse_date)]
    pub date: Option<NaiveDate>,

    /// Start of the initial history query (HH:MM:SS)
    #[clap(long = "start", value_parser = parse_time_of_day, default_value = "09:15:00")]
    pub start: NaiveTime,

    /// End of the initial history query (HH:MM:SS)
    #[clap(long = "end", value_parser = parse_time_of_day, default_value = "09:25:00")]
    pub end: NaiveTime,

    /// Market time zone used for the realtime window and the clock
    #[clap(long = "timezone", env = "BIDDING_TZ", default_value = "Asia/Shanghai")]
    pub timezone: ConfiguredTimeZone,

    /// File holding the persisted login flag
    #[clap(long = "session-file", default_value = "bidding_session.json")]
    pub session_file: PathBuf,

    /// Log file; the terminal itself is owned by the UI
    #[clap(long = "log-file", env = "BIDDING_LOG_FILE", default_value = "bidding_board.log")]
    pub log_file: PathBuf,

    /// Realtime polling interval while inside the auction window (e.g., 1s, 500ms)
    #[clap(long = "poll-interval", value_name = "DURATION", default_value = "1s")]
    pub poll_interval: DurationSpec,

    /// Step interval of historical playback
    #[clap(long = "playback-interval", value_name = "DURATION", default_value = "500ms")]
    pub playback_interval: DurationSpec,

    /// Number of bars on each ranking chart
    #[clap(long = "top", default_value_t = DEFAULT_TOP_N)]
    pub top: usize,
}

impl CliParams {
    /// The query issued at startup. Falls back to the default window when the
    /// configured start is after the end.
    pub fn initial_query(&self) -> HistoryQuery {
        let date = self.date.unwrap_or_else(|| self.timezone.today());
        HistoryQuery::new(date, self.start, self.end).unwrap_or_else(|err| {
            tracing::warn!(error = %err, "invalid initial query window, using 09:15-09:25");
            HistoryQuery {
                date,
                start: NaiveTime::from_hms_opt(9, 15, 0).unwrap_or_default(),
                end: NaiveTime::from_hms_opt(9, 25, 0).unwrap_or_default(),
            }
        })
    }

    pub fn top_n(&self) -> usize {
        self.top.max(1)
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct ConfiguredTimeZone(Tz);

impl ConfiguredTimeZone {
    pub fn now(&self) -> DateTime<Tz> {
        Utc::now().with_timezone(&self.0)
    }

    pub fn today(&self) -> NaiveDate {
        self.now().date_naive()
    }

    pub fn time_of_day(&self) -> NaiveTime {
        self.now().time()
    }
}

impl Default for ConfiguredTimeZone {
    fn default() -> Self {
        ConfiguredTimeZone(chrono_tz::Asia::Shanghai)
    }
}

impl FromStr for ConfiguredTimeZone {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        s.trim()
            .parse::<Tz>()
            .map(ConfiguredTimeZone)
            .map_err(|_| format!("unknown time zone `{}`", s.trim()))
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct DurationSpec(Duration);

impl DurationSpec {
    pub fn as_duration(&self) -> Duration {
        self.0
    }
}

impl FromStr for DurationSpec {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let duration = parse_duration_spec(s)?;
        Ok(DurationSpec(duration))
    }
}

fn parse_duration_spec(input: &str) -> Result<Duration, String> {
    let trimmed = input.trim();
    if trimmed.is_empty() {
        return Err("duration spec cannot be empty (examples: 500ms, 1s, 2m)".to_string());
    }
    let split_idx = trimmed
        .find(|c: char| !c.is_ascii_digit() && c != '.')
        .ok_or_else(|| "duration spec must end with a unit like ms, s, m, or h".to_string())?;
    if split_idx == 0 {
        return Err("duration spec must start with a number (examples: 500ms, 1s)".to_string());
    }
    let (value_part, unit_part) = trimmed.split_at(split_idx);
    let value: f64 = value_part.parse().map_err(|_| {
        format!(
            "invalid numeric portion `{}` in duration spec `{}`",
            value_part, trimmed
        )
    })?;
    let unit = unit_part.trim().to_lowercase();
    let millis_multiplier = match unit.as_str() {
        "ms" | "msec" | "millis" | "milliseconds" => 1.0,
        "s" | "sec" | "secs" | "second" | "seconds" => 1_000.0,
        "m" | "min" | "mins" | "minute" | "minutes" => 60.0 * 1_000.0,
        "h" | "hr" | "hrs" | "hour" | "hours" => 60.0 * 60.0 * 1_000.0,
        other => {
            return Err(format!(
                "unsupported duration unit `{}` (use ms, s, m, or h)",
                other
            ));
        }
    };
    let millis = value * millis_multiplier;
    if !millis.is_finite() || millis <= 0.0 {
        return Err(format!("duration must be positive: `{}`", trimmed));
    }
    if millis > 24.0 * 60.0 * 60.0 * 1_000.0 {
        return Err(format!("duration `{}` is too large", trimmed));
    }
    Ok(Duration::from_micros((millis * 1_000.0).round() as u64))
}
