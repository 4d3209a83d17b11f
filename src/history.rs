use std::collections::HashMap;
use std::fmt;

use chrono::{NaiveDate, NaiveTime};

use crate::format::{hhmmss_param, timeline_label};
use crate::row::Row;

pub const TRANSPORT_FAILURE_MESSAGE: &str = "接口请求失败，请检查后端服务是否启动";
pub const EMPTY_RESULT_MESSAGE: &str = "没有查询到数据，请检查日期和时间段是否正确！";

const TIME_FORMATS: [&str; 3] = ["%H:%M:%S", "%H:%M", "%H%M%S"];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HistoryQuery {
    pub date: NaiveDate,
    pub start: NaiveTime,
    pub end: NaiveTime,
}

impl HistoryQuery {
    pub fn new(date: NaiveDate, start: NaiveTime, end: NaiveTime) -> Result<Self, String> {
        if start > end {
            return Err(format!(
                "开始时间 {} 晚于结束时间 {}",
                start.format("%H:%M:%S"),
                end.format("%H:%M:%S")
            ));
        }
        Ok(HistoryQuery { date, start, end })
    }

    pub fn parse(date: &str, start: &str, end: &str) -> Result<Self, String> {
        let date = parse_date(date)?;
        let start = parse_time_of_day(start)?;
        let end = parse_time_of_day(end)?;
        HistoryQuery::new(date, start, end)
    }

    pub fn params(&self) -> [(&'static str, String); 3] {
        [
            ("date", self.date.format("%Y-%m-%d").to_string()),
            ("start", hhmmss_param(self.start)),
            ("end", hhmmss_param(self.end)),
        ]
    }

    pub fn label(&self) -> String {
        format!(
            "{} {}-{}",
            self.date.format("%Y-%m-%d"),
            self.start.format("%H:%M:%S"),
            self.end.format("%H:%M:%S")
        )
    }
}

pub fn parse_date(value: &str) -> Result<NaiveDate, String> {
    NaiveDate::parse_from_str(value.trim(), "%Y-%m-%d")
        .map_err(|_| format!("无效日期 `{}` (格式 YYYY-MM-DD)", value.trim()))
}

/// Accepts `HH:MM:SS`, `HH:MM` or `HHMMSS`.
pub fn parse_time_of_day(value: &str) -> Result<NaiveTime, String> {
    let trimmed = value.trim();
    TIME_FORMATS
        .iter()
        .find_map(|fmt| NaiveTime::parse_from_str(trimmed, fmt).ok())
        .ok_or_else(|| format!("无效时间 `{trimmed}` (格式 HH:MM:SS)"))
}

/// Snapshots of one historical window, ordered by the server's timeline.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct HistoryDataset {
    snapshots: HashMap<String, Vec<Row>>,
    timeline: Vec<String>,
}

impl HistoryDataset {
    pub fn new(snapshots: HashMap<String, Vec<Row>>, timeline: Vec<String>) -> Self {
        HistoryDataset {
            snapshots,
            timeline,
        }
    }

    pub fn timeline(&self) -> &[String] {
        &self.timeline
    }

    pub fn len(&self) -> usize {
        self.timeline.len()
    }

    pub fn is_empty(&self) -> bool {
        self.timeline.is_empty()
    }

    /// Rows of the snapshot at `index`; a timeline key without data yields
    /// an empty slice.
    pub fn rows_at(&self, index: usize) -> &[Row] {
        self.timeline
            .get(index)
            .and_then(|key| self.snapshots.get(key))
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    pub fn label_at(&self, index: usize) -> Option<String> {
        self.timeline.get(index).map(|key| timeline_label(key))
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HistoryError {
    /// Connection, timeout or undecodable body. The detail only goes to logs.
    Transport(String),
    /// The server answered with an `error` field.
    Server(String),
}

impl fmt::Display for HistoryError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HistoryError::Transport(_) => f.write_str(TRANSPORT_FAILURE_MESSAGE),
            HistoryError::Server(message) => f.write_str(message),
        }
    }
}

impl std::error::Error for HistoryError {}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HistoryStatus {
    Idle,
    Loading,
    Ready,
    Empty,
    Failed(HistoryError),
}

impl HistoryStatus {
    pub fn message(&self) -> Option<String> {
        match self {
            HistoryStatus::Idle | HistoryStatus::Ready => None,
            HistoryStatus::Loading => Some("数据加载中...".to_string()),
            HistoryStatus::Empty => Some(EMPTY_RESULT_MESSAGE.to_string()),
            HistoryStatus::Failed(err) => Some(err.to_string()),
        }
    }

    pub fn is_error(&self) -> bool {
        matches!(self, HistoryStatus::Empty | HistoryStatus::Failed(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn named(name: &str) -> Row {
        Row {
            name: Some(name.to_string()),
            ..Row::default()
        }
    }

    #[test]
    fn query_params_use_compact_times() {
        let query = HistoryQuery::parse("2025-07-18", "09:15:00", "09:25").unwrap();
        let params = query.params();
        assert_eq!(params[0], ("date", "2025-07-18".to_string()));
        assert_eq!(params[1], ("start", "091500".to_string()));
        assert_eq!(params[2], ("end", "092500".to_string()));
        assert_eq!(query.label(), "2025-07-18 09:15:00-09:25:00");
    }

    #[test]
    fn query_rejects_bad_input() {
        assert!(HistoryQuery::parse("2025-13-01", "09:15:00", "09:25:00").is_err());
        assert!(HistoryQuery::parse("2025-07-18", "9点", "09:25:00").is_err());
        assert!(HistoryQuery::parse("2025-07-18", "09:30:00", "09:25:00").is_err());
        assert!(HistoryQuery::parse("2025-07-18", "092000", "092000").is_ok());
    }

    #[test]
    fn rows_follow_the_timeline() {
        let mut snapshots = HashMap::new();
        snapshots.insert("091500".to_string(), vec![named("A")]);
        snapshots.insert("091501".to_string(), vec![named("B"), named("C")]);
        let dataset = HistoryDataset::new(
            snapshots,
            vec![
                "091500".to_string(),
                "091501".to_string(),
                "091502".to_string(),
            ],
        );
        assert_eq!(dataset.len(), 3);
        assert_eq!(dataset.rows_at(1).len(), 2);
        assert!(dataset.rows_at(2).is_empty());
        assert!(dataset.rows_at(9).is_empty());
        assert_eq!(dataset.label_at(2).as_deref(), Some("09:15:02"));
        assert_eq!(dataset.label_at(3), None);
    }

    #[test]
    fn error_messages_follow_the_taxonomy() {
        let server = HistoryError::Server("no data".to_string());
        assert_eq!(server.to_string(), "no data");
        let transport = HistoryError::Transport("connection refused".to_string());
        assert_eq!(transport.to_string(), TRANSPORT_FAILURE_MESSAGE);
        assert_eq!(
            HistoryStatus::Empty.message().as_deref(),
            Some(EMPTY_RESULT_MESSAGE)
        );
        assert!(HistoryStatus::Failed(server).is_error());
        assert_eq!(HistoryStatus::Ready.message(), None);
    }
}
