use chrono::{DateTime, Datelike, NaiveTime, TimeZone};

const WEEKDAY_LABELS: [&str; 7] = ["一", "二", "三", "四", "五", "六", "日"];
const YI: f64 = 1e8;
const WAN: f64 = 1e4;

/// Sign of a percentage-change field, used to pick display colors.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChangeTone {
    Up,
    Down,
    Flat,
}

impl ChangeTone {
    pub fn of(value: Option<f64>) -> Self {
        match value {
            Some(v) if v > 0.0 => ChangeTone::Up,
            Some(v) if v < 0.0 => ChangeTone::Down,
            _ => ChangeTone::Flat,
        }
    }
}

/// Chart labels always use 亿, with two decimals.
pub fn format_amount_yi(amount: Option<f64>) -> String {
    match amount {
        Some(value) if value.is_finite() => format!("{:.2}亿", value / YI),
        _ => "-".to_string(),
    }
}

/// Table amounts pick the unit from the magnitude: 亿, 万, then plain 元.
pub fn format_amount(amount: Option<f64>) -> String {
    let Some(value) = amount.filter(|v| v.is_finite()) else {
        return "-".to_string();
    };
    let magnitude = value.abs();
    if magnitude >= YI {
        format!("{:.2}亿", value / YI)
    } else if magnitude >= WAN {
        format!("{:.2}万", value / WAN)
    } else {
        format!("{value}元")
    }
}

pub fn format_percent(value: Option<f64>) -> String {
    match value {
        Some(v) if v.is_finite() => format!("{v}%"),
        _ => "-".to_string(),
    }
}

/// Formats a count of seconds as `HH:MM:SS`; hours are not wrapped.
pub fn format_hms(total_secs: u64) -> String {
    let hours = total_secs / 3600;
    let minutes = (total_secs % 3600) / 60;
    let seconds = total_secs % 60;
    format!("{hours:02}:{minutes:02}:{seconds:02}")
}

/// Query parameter form of a time of day (`09:15:00` -> `091500`).
pub fn hhmmss_param(time: NaiveTime) -> String {
    time.format("%H%M%S").to_string()
}

/// Timeline keys arrive as `HHMMSS`; anything else is shown untouched.
pub fn timeline_label(key: &str) -> String {
    if key.len() == 6 && key.bytes().all(|b| b.is_ascii_digit()) {
        format!("{}:{}:{}", &key[0..2], &key[2..4], &key[4..6])
    } else {
        key.to_string()
    }
}

pub fn clock_line<Tz: TimeZone>(now: &DateTime<Tz>) -> String
where
    Tz::Offset: std::fmt::Display,
{
    let weekday = WEEKDAY_LABELS[now.weekday().num_days_from_monday() as usize];
    format!(
        "{} 星期{} {}",
        now.format("%Y-%m-%d"),
        weekday,
        now.format("%H:%M:%S")
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{FixedOffset, TimeZone};

    #[test]
    fn amount_yi_handles_missing_and_zero() {
        assert_eq!(format_amount_yi(None), "-");
        assert_eq!(format_amount_yi(Some(f64::NAN)), "-");
        assert_eq!(format_amount_yi(Some(0.0)), "0.00亿");
        assert_eq!(format_amount_yi(Some(123_456_789.0)), "1.23亿");
    }

    #[test]
    fn amount_picks_unit_by_magnitude() {
        assert_eq!(format_amount(Some(250_000_000.0)), "2.50亿");
        assert_eq!(format_amount(Some(56_700.0)), "5.67万");
        assert_eq!(format_amount(Some(5000.0)), "5000元");
        assert_eq!(format_amount(Some(12.5)), "12.5元");
        assert_eq!(format_amount(Some(-30_000_000.0)), "-3000.00万");
        assert_eq!(format_amount(None), "-");
    }

    #[test]
    fn hms_pads_each_component() {
        assert_eq!(format_hms(0), "00:00:00");
        assert_eq!(format_hms(61), "00:01:01");
        assert_eq!(format_hms(9 * 3600 + 15 * 60), "09:15:00");
    }

    #[test]
    fn timeline_label_expands_compact_keys() {
        assert_eq!(timeline_label("091502"), "09:15:02");
        assert_eq!(timeline_label("09:15:02"), "09:15:02");
        assert_eq!(timeline_label("0915"), "0915");
    }

    #[test]
    fn hhmmss_param_strips_separators() {
        let time = NaiveTime::from_hms_opt(9, 25, 0).unwrap();
        assert_eq!(hhmmss_param(time), "092500");
    }

    #[test]
    fn clock_line_uses_chinese_weekday() {
        let tz = FixedOffset::east_opt(8 * 3600).unwrap();
        // 2025-07-18 is a Friday.
        let now = tz.with_ymd_and_hms(2025, 7, 18, 9, 15, 3).unwrap();
        assert_eq!(clock_line(&now), "2025-07-18 星期五 09:15:03");
    }

    #[test]
    fn change_tone_follows_sign() {
        assert_eq!(ChangeTone::of(Some(1.2)), ChangeTone::Up);
        assert_eq!(ChangeTone::of(Some(-0.1)), ChangeTone::Down);
        assert_eq!(ChangeTone::of(Some(0.0)), ChangeTone::Flat);
        assert_eq!(ChangeTone::of(None), ChangeTone::Flat);
    }
}
