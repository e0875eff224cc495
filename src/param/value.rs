use std::fmt::Display;

use chrono::{NaiveDate, NaiveDateTime, TimeDelta, Timelike};

/// The semantic value bound to a parameter.
///
/// A value is always interpreted through the [`ParamKind`](super::ParamKind)
/// of the descriptor it is bound to: the same `DateTime` renders as
/// `2014-09-13T09` for a date-hour parameter and as `2014-09-13T0900` for a
/// date-minute parameter.
#[derive(Debug, Clone, PartialEq)]
pub enum ParamValue {
    Str(String),
    Bool(bool),
    Int(i64),
    Float(f64),
    Date(NaiveDate),
    DateTime(NaiveDateTime),
    TimeDelta(TimeDelta),
    Json(serde_json::Value),
}

impl ParamValue {
    /// Short name of the variant, used in error messages.
    pub fn type_name(&self) -> &'static str {
        match self {
            ParamValue::Str(_) => "string",
            ParamValue::Bool(_) => "bool",
            ParamValue::Int(_) => "int",
            ParamValue::Float(_) => "float",
            ParamValue::Date(_) => "date",
            ParamValue::DateTime(_) => "datetime",
            ParamValue::TimeDelta(_) => "timedelta",
            ParamValue::Json(_) => "json",
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            ParamValue::Str(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            ParamValue::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_int(&self) -> Option<i64> {
        match self {
            ParamValue::Int(i) => Some(*i),
            _ => None,
        }
    }

    pub fn as_float(&self) -> Option<f64> {
        match self {
            ParamValue::Float(f) => Some(*f),
            ParamValue::Int(i) => Some(*i as f64),
            _ => None,
        }
    }

    pub fn as_date(&self) -> Option<NaiveDate> {
        match self {
            ParamValue::Date(d) => Some(*d),
            ParamValue::DateTime(dt) => Some(dt.date()),
            _ => None,
        }
    }

    pub fn as_datetime(&self) -> Option<NaiveDateTime> {
        match self {
            ParamValue::DateTime(dt) => Some(*dt),
            _ => None,
        }
    }

    pub fn as_duration(&self) -> Option<TimeDelta> {
        match self {
            ParamValue::TimeDelta(td) => Some(*td),
            _ => None,
        }
    }

    pub fn as_json(&self) -> Option<&serde_json::Value> {
        match self {
            ParamValue::Json(v) => Some(v),
            _ => None,
        }
    }
}

/// Kind-independent rendering, used when a value is shown outside of a
/// descriptor (errors, logs).
impl Display for ParamValue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ParamValue::Str(s) => f.write_str(s),
            ParamValue::Bool(b) => write!(f, "{b}"),
            ParamValue::Int(i) => write!(f, "{i}"),
            ParamValue::Float(x) => write!(f, "{x}"),
            ParamValue::Date(d) => write!(f, "{}", d.format(DATE)),
            ParamValue::DateTime(dt) => write!(f, "{}", dt.format("%Y-%m-%dT%H%M%S")),
            ParamValue::TimeDelta(td) => f.write_str(&render_timedelta(*td)),
            ParamValue::Json(v) => write!(f, "{v}"),
        }
    }
}

macro_rules! impl_from {
    ($($ty:ty => $variant:ident),* $(,)?) => {
        $(
            impl From<$ty> for ParamValue {
                fn from(value: $ty) -> Self {
                    ParamValue::$variant(value.into())
                }
            }
        )*
    };
}

impl_from! {
    String => Str,
    &str => Str,
    bool => Bool,
    i64 => Int,
    f64 => Float,
    NaiveDate => Date,
    NaiveDateTime => DateTime,
    TimeDelta => TimeDelta,
    serde_json::Value => Json,
}

pub(crate) const DATE: &str = "%Y-%m-%d";
pub(crate) const MONTH: &str = "%Y-%m";

pub(crate) fn parse_bool(text: &str) -> Result<bool, String> {
    match text.trim().to_ascii_lowercase().as_str() {
        "true" | "1" => Ok(true),
        "false" | "0" => Ok(false),
        other => Err(format!("expected true or false, found '{other}'")),
    }
}

pub(crate) fn parse_date(text: &str) -> Result<NaiveDate, String> {
    NaiveDate::parse_from_str(text.trim(), DATE).map_err(|e| e.to_string())
}

/// Parses `YYYY-MM`, the date is pinned to the first day of the month.
/// Years outside `0..=9999` carry a sign, as chrono renders them.
pub(crate) fn parse_month(text: &str) -> Result<NaiveDate, String> {
    let first = format!("{}-01", text.trim());
    NaiveDate::parse_from_str(&first, DATE).map_err(|e| e.to_string())
}

/// Parses `YYYY-MM-DDTHH` or, when `minutes` is set, `YYYY-MM-DDTHHMM`.
pub(crate) fn parse_date_time(text: &str, minutes: bool) -> Result<NaiveDateTime, String> {
    let (date, time) = text
        .trim()
        .split_once('T')
        .ok_or_else(|| "missing 'T' separator".to_string())?;

    let date = parse_date(date)?;
    let width = if minutes { 4 } else { 2 };

    if time.len() != width || !time.bytes().all(|b| b.is_ascii_digit()) {
        return Err(format!("expected {width} digits after 'T', found '{time}'"));
    }

    let hour = time[..2].parse::<u32>().map_err(|e| e.to_string())?;
    let minute = match minutes {
        true => time[2..].parse::<u32>().map_err(|e| e.to_string())?,
        false => 0,
    };

    date.and_hms_opt(hour, minute, 0)
        .ok_or_else(|| "time out of range".to_string())
}

pub(crate) fn truncate_to_hour(dt: NaiveDateTime) -> Option<NaiveDateTime> {
    dt.date().and_hms_opt(dt.hour(), 0, 0)
}

pub(crate) fn truncate_to_minute(dt: NaiveDateTime) -> Option<NaiveDateTime> {
    dt.date().and_hms_opt(dt.hour(), dt.minute(), 0)
}

/// Renders a duration as `"<w> w <d> d <h> h <m> m <s> s"`.
pub(crate) fn render_timedelta(td: TimeDelta) -> String {
    let total = td.num_seconds();
    let days = total / 86_400;
    let rest = total % 86_400;

    format!(
        "{} w {} d {} h {} m {} s",
        days / 7,
        days % 7,
        rest / 3600,
        (rest % 3600) / 60,
        rest % 60,
    )
}

/// Accepts three spellings: the rendered form (`"1 w 2 d 3 h"`, units may be
/// spelled out), ISO 8601 durations (`"P1W"`, `"P2DT3H"`) and a bare number
/// of seconds.
pub(crate) fn parse_timedelta(text: &str) -> Result<TimeDelta, String> {
    let text = text.trim();

    if text.is_empty() {
        return Err("empty duration".to_string());
    }

    if text.bytes().all(|b| b.is_ascii_digit()) {
        let secs = text.parse::<i64>().map_err(|e| e.to_string())?;
        return seconds(secs);
    }

    if let Some(iso) = text.strip_prefix('P') {
        return parse_iso_duration(iso);
    }

    parse_unit_duration(text)
}

fn seconds(secs: i64) -> Result<TimeDelta, String> {
    TimeDelta::try_seconds(secs).ok_or_else(|| "duration out of range".to_string())
}

fn unit_seconds(unit: &str) -> Option<i64> {
    match unit {
        "w" | "week" | "weeks" => Some(604_800),
        "d" | "day" | "days" => Some(86_400),
        "h" | "hour" | "hours" => Some(3600),
        "m" | "min" | "minute" | "minutes" => Some(60),
        "s" | "sec" | "second" | "seconds" => Some(1),
        _ => None,
    }
}

fn parse_unit_duration(text: &str) -> Result<TimeDelta, String> {
    let mut total: i64 = 0;
    let mut chars = text.chars().peekable();
    let mut matched = false;

    loop {
        while chars.next_if(|c| c.is_whitespace() || *c == ',').is_some() {}

        if chars.peek().is_none() {
            break;
        }

        let mut number = String::new();
        while let Some(c) = chars.next_if(char::is_ascii_digit) {
            number.push(c);
        }

        while chars.next_if(|c| c.is_whitespace()).is_some() {}

        let mut unit = String::new();
        while let Some(c) = chars.next_if(char::is_ascii_alphabetic) {
            unit.push(c.to_ascii_lowercase());
        }

        if number.is_empty() || unit.is_empty() {
            return Err(format!("can't read duration '{text}'"));
        }

        let amount = number.parse::<i64>().map_err(|e| e.to_string())?;
        let scale = unit_seconds(&unit).ok_or_else(|| format!("unknown unit '{unit}'"))?;

        total = amount
            .checked_mul(scale)
            .and_then(|secs| total.checked_add(secs))
            .ok_or_else(|| "duration out of range".to_string())?;
        matched = true;
    }

    match matched {
        true => seconds(total),
        false => Err(format!("can't read duration '{text}'")),
    }
}

fn parse_iso_duration(iso: &str) -> Result<TimeDelta, String> {
    let mut total: i64 = 0;
    let mut number = String::new();
    let mut in_time = false;
    let mut matched = false;
    let mut time_matched = false;

    for c in iso.chars() {
        match c {
            '0'..='9' => number.push(c),
            'T' if in_time => return Err("repeated 'T' designator".to_string()),
            'T' if number.is_empty() => in_time = true,
            _ => {
                let scale = match (c, in_time) {
                    ('W', false) => 604_800,
                    ('D', false) => 86_400,
                    ('H', true) => 3600,
                    ('M', true) => 60,
                    ('S', true) => 1,
                    _ => return Err(format!("unsupported ISO 8601 designator '{c}'")),
                };

                let amount = number
                    .parse::<i64>()
                    .map_err(|_| format!("missing number before '{c}'"))?;

                total = amount
                    .checked_mul(scale)
                    .and_then(|secs| total.checked_add(secs))
                    .ok_or_else(|| "duration out of range".to_string())?;
                number.clear();
                matched = true;
                time_matched |= in_time;
            }
        }
    }

    if in_time && !time_matched {
        return Err(format!("'T' without a time component in 'P{iso}'"));
    }

    if !number.is_empty() || !matched {
        return Err(format!("can't read ISO 8601 duration 'P{iso}'"));
    }

    seconds(total)
}
