//! Typed, named inputs of a task type.
//!
//! A [`Parameter`] describes one input: its name, its [`ParamKind`] (which
//! owns the string parser and serializer), whether it takes part in the
//! task's identity and an optional default. The string form of a value is
//! what ends up in `task_id` and on the wire, so every kind guarantees that
//! `parse(serialize(v)) == v` for the values it accepts.

mod registry;
mod value;

use std::sync::Arc;

use chrono::{Datelike, TimeDelta};

use crate::core::ArcStr;
use crate::error::ParameterError;

pub use registry::ParamRegistry;
pub use value::ParamValue;

use value::{
    DATE, MONTH, parse_bool, parse_date, parse_date_time, parse_month, parse_timedelta,
    truncate_to_hour, truncate_to_minute,
};

/// User-provided parser and serializer pair for parameter kinds not covered
/// by the builtin ones.
pub trait Codec: Send + Sync {
    /// Human readable name of the kind, shown in errors.
    fn name(&self) -> &str;

    fn parse(&self, text: &str) -> anyhow::Result<ParamValue>;

    fn serialize(&self, value: &ParamValue) -> String;

    /// Whether an already typed value can be bound as-is.
    #[inline]
    fn accepts(&self, _: &ParamValue) -> bool {
        true
    }
}

/// The semantic type of a parameter.
#[derive(Clone)]
pub enum ParamKind {
    Str,
    Bool,
    Int,
    Float,
    Date,
    DateHour,
    DateMinute,
    Month,
    TimeDelta,
    /// A string restricted to a fixed set of choices.
    Choice(Arc<[ArcStr]>),
    /// A JSON array.
    List,
    /// A JSON object.
    Dict,
    Custom(Arc<dyn Codec>),
}

impl ParamKind {
    pub fn choice<I, S>(choices: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<ArcStr>,
    {
        ParamKind::Choice(choices.into_iter().map(Into::into).collect())
    }

    pub fn custom(codec: impl Codec + 'static) -> Self {
        ParamKind::Custom(Arc::new(codec))
    }

    pub fn name(&self) -> &str {
        match self {
            ParamKind::Str => "string",
            ParamKind::Bool => "bool",
            ParamKind::Int => "int",
            ParamKind::Float => "float",
            ParamKind::Date => "date",
            ParamKind::DateHour => "date-hour",
            ParamKind::DateMinute => "date-minute",
            ParamKind::Month => "month",
            ParamKind::TimeDelta => "timedelta",
            ParamKind::Choice(_) => "choice",
            ParamKind::List => "list",
            ParamKind::Dict => "dict",
            ParamKind::Custom(codec) => codec.name(),
        }
    }

    fn parse(&self, text: &str) -> Result<ParamValue, String> {
        let value = match self {
            ParamKind::Str => ParamValue::Str(text.to_string()),
            ParamKind::Bool => ParamValue::Bool(parse_bool(text)?),
            ParamKind::Int => ParamValue::Int(text.trim().parse().map_err(|e| format!("{e}"))?),
            ParamKind::Float => {
                ParamValue::Float(text.trim().parse().map_err(|e| format!("{e}"))?)
            }
            ParamKind::Date => ParamValue::Date(parse_date(text)?),
            ParamKind::DateHour => ParamValue::DateTime(parse_date_time(text, false)?),
            ParamKind::DateMinute => ParamValue::DateTime(parse_date_time(text, true)?),
            ParamKind::Month => ParamValue::Date(parse_month(text)?),
            ParamKind::TimeDelta => ParamValue::TimeDelta(parse_timedelta(text)?),
            ParamKind::Choice(choices) => match choices.iter().any(|c| &**c == text) {
                true => ParamValue::Str(text.to_string()),
                false => return Err(format!("not one of [{}]", choices.join(", "))),
            },
            ParamKind::List => match serde_json::from_str(text).map_err(|e| e.to_string())? {
                json @ serde_json::Value::Array(_) => ParamValue::Json(json),
                _ => return Err("expected a JSON array".to_string()),
            },
            ParamKind::Dict => match serde_json::from_str(text).map_err(|e| e.to_string())? {
                json @ serde_json::Value::Object(_) => ParamValue::Json(json),
                _ => return Err("expected a JSON object".to_string()),
            },
            ParamKind::Custom(codec) => codec.parse(text).map_err(|e| format!("{e:#}"))?,
        };

        Ok(value)
    }

    fn serialize(&self, value: &ParamValue) -> String {
        match (self, value) {
            (ParamKind::Custom(codec), value) => codec.serialize(value),
            (ParamKind::Date, ParamValue::Date(d)) => d.format(DATE).to_string(),
            (ParamKind::Month, ParamValue::Date(d)) => d.format(MONTH).to_string(),
            (ParamKind::DateHour, ParamValue::DateTime(dt)) => {
                dt.format("%Y-%m-%dT%H").to_string()
            }
            (ParamKind::DateMinute, ParamValue::DateTime(dt)) => {
                dt.format("%Y-%m-%dT%H%M").to_string()
            }
            (_, value) => value.to_string(),
        }
    }

    /// Binds an already typed value. A rejected value is handed back.
    fn coerce(&self, value: ParamValue) -> Result<ParamValue, ParamValue> {
        match (self, value) {
            (ParamKind::Str, value @ ParamValue::Str(_)) => Ok(value),
            (ParamKind::Bool, value @ ParamValue::Bool(_)) => Ok(value),
            (ParamKind::Int, value @ ParamValue::Int(_)) => Ok(value),
            (ParamKind::Float, value @ ParamValue::Float(_)) => Ok(value),
            (ParamKind::Float, ParamValue::Int(i)) => Ok(ParamValue::Float(i as f64)),
            (ParamKind::Date, value @ ParamValue::Date(_)) => Ok(value),
            (ParamKind::Month, ParamValue::Date(d)) => d
                .with_day0(0)
                .map(ParamValue::Date)
                .ok_or(ParamValue::Date(d)),
            (ParamKind::DateHour, ParamValue::DateTime(dt)) => truncate_to_hour(dt)
                .map(ParamValue::DateTime)
                .ok_or(ParamValue::DateTime(dt)),
            (ParamKind::DateMinute, ParamValue::DateTime(dt)) => truncate_to_minute(dt)
                .map(ParamValue::DateTime)
                .ok_or(ParamValue::DateTime(dt)),
            // Only whole, non-negative seconds survive the string rendering.
            (ParamKind::TimeDelta, ParamValue::TimeDelta(td))
                if td >= TimeDelta::zero() && td.subsec_nanos() == 0 =>
            {
                Ok(ParamValue::TimeDelta(td))
            }
            (ParamKind::List, value @ ParamValue::Json(serde_json::Value::Array(_))) => Ok(value),
            (ParamKind::Dict, value @ ParamValue::Json(serde_json::Value::Object(_))) => {
                Ok(value)
            }
            (ParamKind::Custom(codec), value) if codec.accepts(&value) => Ok(value),
            (_, value) => Err(value),
        }
    }
}

impl std::fmt::Debug for ParamKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ParamKind::Choice(choices) => f.debug_tuple("Choice").field(choices).finish(),
            ParamKind::Custom(codec) => write!(f, "Custom({})", codec.name()),
            other => f.write_str(other.name()),
        }
    }
}

/// Declares one typed, named input of a task type.
///
/// ```rust
/// use tsumiki::{ParamKind, Parameter};
///
/// let date = Parameter::new("date", ParamKind::Date);
/// let label = Parameter::new("label", ParamKind::Str)
///     .insignificant()
///     .default("nightly");
///
/// assert!(date.is_mandatory());
/// assert!(!label.is_significant());
/// ```
#[derive(Clone, Debug)]
pub struct Parameter {
    name: ArcStr,
    kind: ParamKind,
    significant: bool,
    default: Option<ParamValue>,
    description: Option<ArcStr>,
}

impl Parameter {
    pub fn new(name: impl Into<ArcStr>, kind: ParamKind) -> Self {
        Self {
            name: name.into(),
            kind,
            significant: true,
            default: None,
            description: None,
        }
    }

    /// Excludes the parameter from `task_id`. It still has to be supplied
    /// unless it has a default.
    pub fn insignificant(mut self) -> Self {
        self.significant = false;
        self
    }

    /// Sets the default value. A string default is parsed with the kind's
    /// parser when the owning task type is built.
    pub fn default(mut self, value: impl Into<ParamValue>) -> Self {
        self.default = Some(value.into());
        self
    }

    pub fn description(mut self, text: impl Into<ArcStr>) -> Self {
        self.description = Some(text.into());
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub(crate) fn name_arc(&self) -> &ArcStr {
        &self.name
    }

    pub fn kind(&self) -> &ParamKind {
        &self.kind
    }

    pub fn is_significant(&self) -> bool {
        self.significant
    }

    pub fn is_mandatory(&self) -> bool {
        self.default.is_none()
    }

    pub fn default_value(&self) -> Option<&ParamValue> {
        self.default.as_ref()
    }

    pub fn get_description(&self) -> Option<&str> {
        self.description.as_deref()
    }

    /// Parses the string form of a value.
    pub fn parse(&self, text: &str) -> Result<ParamValue, ParameterError> {
        self.kind
            .parse(text)
            .map_err(|reason| ParameterError::Parse {
                param: self.name.clone(),
                kind: self.kind.name().into(),
                value: text.to_string(),
                reason,
            })
    }

    /// Renders a bound value to its string form.
    pub fn serialize(&self, value: &ParamValue) -> String {
        self.kind.serialize(value)
    }

    /// Converts an input value into the value bound to this parameter.
    ///
    /// Values of the semantic type are taken as they are, strings given to a
    /// non-string parameter go through the parser.
    pub fn normalize(&self, value: ParamValue) -> Result<ParamValue, ParameterError> {
        match (&self.kind, value) {
            (ParamKind::Str, value) => self.coerce(value),
            (_, ParamValue::Str(text)) => self.parse(&text),
            (_, value) => self.coerce(value),
        }
    }

    fn coerce(&self, value: ParamValue) -> Result<ParamValue, ParameterError> {
        self.kind
            .coerce(value)
            .map_err(|value| ParameterError::WrongType {
                param: self.name.clone(),
                expected: self.kind.name().into(),
                found: value.type_name(),
            })
    }

    /// Validates and normalizes the declared default.
    pub(crate) fn checked(mut self) -> Result<Self, ParameterError> {
        if let Some(default) = self.default.take() {
            let value = self
                .normalize(default)
                .map_err(|e| ParameterError::InvalidDefault {
                    param: self.name.clone(),
                    reason: e.to_string(),
                })?;
            self.default = Some(value);
        }

        Ok(self)
    }
}
