//! The flat string form of a task.
//!
//! A task crosses a process boundary as its family plus a mapping from every
//! parameter name to the parameter's string rendering. The receiving side
//! resolves the family to a [`TaskType`] and parses the strings back, which
//! yields a task equal to the one that was sent.

use std::collections::BTreeMap;
use std::sync::Arc;

use serde::{Deserialize, Serialize, Serializer};

use crate::error::{ParameterError, WireError};
use crate::param::ParamValue;
use crate::task::{InstanceCache, Task, TaskType};

/// Serializable description of a task.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct TaskSpec {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub namespace: Option<String>,
    pub name: String,
    #[serde(default)]
    pub params: BTreeMap<String, String>,
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub external: bool,
}

impl TaskSpec {
    pub fn to_json(&self) -> Result<String, WireError> {
        Ok(serde_json::to_string(self)?)
    }

    pub fn from_json(json: &str) -> Result<Self, WireError> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn to_cbor(&self) -> Result<Vec<u8>, WireError> {
        let mut buffer = Vec::new();
        ciborium::into_writer(self, &mut buffer)
            .map_err(|e| WireError::CborEncode(e.to_string()))?;
        Ok(buffer)
    }

    pub fn from_cbor(bytes: &[u8]) -> Result<Self, WireError> {
        ciborium::from_reader(bytes).map_err(|e| WireError::CborDecode(e.to_string()))
    }
}

impl TaskType {
    /// Builds a task from string renderings of its parameter values.
    ///
    /// Every string is parsed by its parameter's parser. Absent names take
    /// their default, absent mandatory names and unknown names are errors.
    pub fn from_str_params<I, K, V>(
        self: &Arc<Self>,
        cache: &InstanceCache,
        params: I,
    ) -> Result<Arc<Task>, ParameterError>
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: AsRef<str>,
    {
        self.instantiate(cache, str_values(params))
    }
}

/// String inputs always go through the parser of non-string parameters.
pub(crate) fn str_values<I, K, V>(params: I) -> impl Iterator<Item = (K, ParamValue)>
where
    I: IntoIterator<Item = (K, V)>,
    K: AsRef<str>,
    V: AsRef<str>,
{
    params
        .into_iter()
        .map(|(name, text)| (name, ParamValue::Str(text.as_ref().to_string())))
}

impl Task {
    /// Every parameter, significant or not, mapped to its string rendering.
    pub fn to_str_params(&self) -> BTreeMap<String, String> {
        self.ty
            .params
            .names()
            .zip(&self.rendered)
            .map(|(name, text)| (name.to_string(), text.clone()))
            .collect()
    }

    pub fn to_spec(&self) -> TaskSpec {
        TaskSpec {
            namespace: self.ty.namespace.as_deref().map(str::to_string),
            name: self.ty.name.to_string(),
            params: self.to_str_params(),
            external: self.ty.key.external,
        }
    }

    fn check_transient(&self) -> Result<(), WireError> {
        match self.has_transient() {
            true => Err(WireError::Transient(self.task_id.clone())),
            false => Ok(()),
        }
    }

    pub fn to_json(&self) -> Result<String, WireError> {
        self.check_transient()?;
        self.to_spec().to_json()
    }

    pub fn to_cbor(&self) -> Result<Vec<u8>, WireError> {
        self.check_transient()?;
        self.to_spec().to_cbor()
    }
}

/// Serializes as a [`TaskSpec`]. Fails while transient hooks are attached.
impl Serialize for Task {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.check_transient().map_err(serde::ser::Error::custom)?;
        self.to_spec().serialize(serializer)
    }
}

#[cfg(test)]
mod tests {
    use chrono::{NaiveDate, TimeDelta};

    use super::*;
    use crate::param::{Codec, ParamKind, Parameter};

    fn dummy() -> Arc<TaskType> {
        TaskType::builder("DummyTask")
            .param(Parameter::new("param", ParamKind::Str))
            .param(Parameter::new("bool_param", ParamKind::Bool))
            .param(Parameter::new("int_param", ParamKind::Int))
            .param(Parameter::new("float_param", ParamKind::Float))
            .param(Parameter::new("date_param", ParamKind::Date))
            .param(Parameter::new("datehour_param", ParamKind::DateHour))
            .param(Parameter::new("timedelta_param", ParamKind::TimeDelta))
            .param(Parameter::new("list_param", ParamKind::List).default(serde_json::json!([])))
            .param(Parameter::new("insignificant_param", ParamKind::Str).insignificant())
            .build()
            .unwrap()
    }

    fn original(cache: &InstanceCache) -> Arc<Task> {
        let date = NaiveDate::from_ymd_opt(2014, 9, 13).unwrap();

        dummy()
            .instantiate(
                cache,
                [
                    ("param", ParamValue::from("test")),
                    ("bool_param", true.into()),
                    ("int_param", 666i64.into()),
                    ("float_param", 123.456f64.into()),
                    ("date_param", date.into()),
                    ("datehour_param", date.and_hms_opt(9, 0, 0).unwrap().into()),
                    ("timedelta_param", TimeDelta::try_days(44).unwrap().into()),
                    ("list_param", serde_json::json!([1, "two"]).into()),
                    ("insignificant_param", "test".into()),
                ],
            )
            .unwrap()
    }

    #[test]
    fn test_task_to_str_to_task() {
        let task = original(&InstanceCache::new());
        let params = task.to_str_params();

        assert_eq!(params["bool_param"], "true");
        assert_eq!(params["timedelta_param"], "6 w 2 d 0 h 0 m 0 s");
        assert_eq!(params["insignificant_param"], "test");

        let other = task
            .task_type()
            .from_str_params(&InstanceCache::new(), &params)
            .unwrap();
        assert_eq!(task, other);
        assert_eq!(task.param_values(), other.param_values());
    }

    #[test]
    fn test_from_str_applies_defaults() {
        let ty = TaskType::builder("DefaultInsignificantParamTask")
            .param(
                Parameter::new("insignificant_param", ParamKind::Str)
                    .insignificant()
                    .default("value"),
            )
            .param(Parameter::new("necessary_param", ParamKind::Str).insignificant())
            .build()
            .unwrap();

        let cache = InstanceCache::new();
        let params = [("necessary_param", "needed")];
        let original = ty.instantiate(&cache, params).unwrap();
        let other = ty.from_str_params(&InstanceCache::new(), params).unwrap();
        assert_eq!(original, other);

        let err = ty
            .from_str_params(&cache, BTreeMap::<String, String>::new())
            .unwrap_err();
        assert!(matches!(err, ParameterError::Missing { .. }));
    }

    #[test]
    fn test_from_str_rejects_unknown_and_malformed() {
        let cache = InstanceCache::new();
        let mut params = original(&cache).to_str_params();

        params.insert("extra".into(), "1".into());
        let err = dummy().from_str_params(&cache, &params).unwrap_err();
        assert!(matches!(err, ParameterError::Unknown { .. }));

        params.remove("extra");
        params.insert("int_param".into(), "six".into());
        let err = dummy().from_str_params(&cache, &params).unwrap_err();
        assert!(matches!(err, ParameterError::Parse { .. }));
    }

    #[test]
    fn test_spec_json_and_cbor() {
        let task = original(&InstanceCache::new());
        let spec = task.to_spec();

        assert_eq!(spec.name, "DummyTask");
        assert!(!spec.external);

        let json = task.to_json().unwrap();
        assert!(!json.contains("external"));
        assert_eq!(TaskSpec::from_json(&json).unwrap(), spec);

        let cbor = task.to_cbor().unwrap();
        assert_eq!(TaskSpec::from_cbor(&cbor).unwrap(), spec);
    }

    #[test]
    fn test_transient_blocks_encoding() {
        let task = original(&InstanceCache::new());
        task.set_tracking_url_hook(|_| {});

        assert!(matches!(task.to_json(), Err(WireError::Transient(_))));
        assert!(matches!(task.to_cbor(), Err(WireError::Transient(_))));

        let json = task.with_no_transient(|task| task.to_json()).unwrap();
        assert_eq!(TaskSpec::from_json(&json).unwrap(), task.to_spec());
        assert!(task.has_transient());
    }

    #[test]
    fn test_spec_minimal_json() {
        let spec = TaskSpec::from_json(r#"{"name":"ExternalTask"}"#).unwrap();
        assert_eq!(spec.namespace, None);
        assert!(spec.params.is_empty());
        assert!(!spec.external);
    }

    /// Integers written as `0x`-prefixed hexadecimal.
    struct Hex;

    impl Codec for Hex {
        fn name(&self) -> &str {
            "hex"
        }

        fn parse(&self, text: &str) -> anyhow::Result<ParamValue> {
            let digits = text
                .strip_prefix("0x")
                .ok_or_else(|| anyhow::anyhow!("missing 0x prefix"))?;
            Ok(ParamValue::Int(i64::from_str_radix(digits, 16)?))
        }

        fn serialize(&self, value: &ParamValue) -> String {
            match value {
                ParamValue::Int(n) => format!("{n:#x}"),
                other => other.to_string(),
            }
        }

        fn accepts(&self, value: &ParamValue) -> bool {
            matches!(value, ParamValue::Int(_))
        }
    }

    fn assorted() -> Arc<TaskType> {
        TaskType::builder("AssortedTask")
            .namespace("wire")
            .param(Parameter::new("minute", ParamKind::DateMinute))
            .param(Parameter::new("month", ParamKind::Month))
            .param(Parameter::new("dict", ParamKind::Dict))
            .param(Parameter::new("list", ParamKind::List))
            .param(Parameter::new("speed", ParamKind::choice(["fast", "slow"])))
            .param(Parameter::new("mask", ParamKind::custom(Hex)))
            .param(Parameter::new("delta", ParamKind::TimeDelta))
            .build()
            .unwrap()
    }

    #[test]
    fn test_assorted_kinds_roundtrip() {
        let date = NaiveDate::from_ymd_opt(-5, 3, 1).unwrap();

        let task = assorted()
            .instantiate(
                &InstanceCache::new(),
                [
                    ("minute", ParamValue::from(date.and_hms_opt(23, 59, 0).unwrap())),
                    ("month", date.into()),
                    ("dict", serde_json::json!({"b": [1, 2], "a": {"x": null}}).into()),
                    ("list", serde_json::json!(["one", 2, 3.5]).into()),
                    ("speed", "slow".into()),
                    ("mask", 255i64.into()),
                    ("delta", TimeDelta::try_seconds(90_061).unwrap().into()),
                ],
            )
            .unwrap();

        let params = task.to_str_params();
        assert_eq!(params["minute"], "-0005-03-01T2359");
        assert_eq!(params["month"], "-0005-03");
        assert_eq!(params["mask"], "0xff");

        let other = task
            .task_type()
            .from_str_params(&InstanceCache::new(), &params)
            .unwrap();
        assert_eq!(task, other);
        assert_eq!(task.param_values(), other.param_values());
    }

    #[test]
    fn test_canonical_strings_survive_parse() {
        let cases = [
            (ParamKind::DateMinute, "2014-09-13T0930"),
            (ParamKind::DateMinute, "+10000-01-01T0000"),
            (ParamKind::Month, "2014-09"),
            (ParamKind::Month, "+10000-12"),
            (ParamKind::Dict, r#"{"a":1,"b":[true,null]}"#),
            (ParamKind::List, r#"[1,"two",{"three":3}]"#),
            (ParamKind::choice(["fast", "slow"]), "fast"),
            (ParamKind::custom(Hex), "0x1f"),
            (ParamKind::TimeDelta, "1 w 2 d 3 h 4 m 5 s"),
        ];

        for (kind, text) in cases {
            let param = Parameter::new("p", kind);
            let value = param.parse(text).unwrap();
            assert_eq!(param.serialize(&value), text, "{param:?}");
        }
    }

    mod generated {
        use chrono::NaiveDateTime;
        use proptest::prelude::*;

        use super::*;

        fn sampled() -> Arc<TaskType> {
            TaskType::builder("SampledTask")
                .param(Parameter::new("int", ParamKind::Int))
                .param(Parameter::new("float", ParamKind::Float))
                .param(Parameter::new("date", ParamKind::Date))
                .param(Parameter::new("minute", ParamKind::DateMinute))
                .param(Parameter::new("month", ParamKind::Month))
                .param(Parameter::new("delta", ParamKind::TimeDelta))
                .build()
                .unwrap()
        }

        fn day() -> impl Strategy<Value = NaiveDate> {
            (-9999i32..=12_000, 1u32..=12, 1u32..=28)
                .prop_map(|(y, m, d)| NaiveDate::from_ymd_opt(y, m, d).unwrap())
        }

        fn minute() -> impl Strategy<Value = NaiveDateTime> {
            (day(), 0u32..24, 0u32..60)
                .prop_map(|(date, h, m)| date.and_hms_opt(h, m, 0).unwrap())
        }

        proptest! {
            #[test]
            fn test_typed_values_roundtrip(
                int in any::<i64>(),
                float in -1e15f64..1e15,
                date in day(),
                minute in minute(),
                month in day(),
                secs in 0i64..1_000_000_000,
            ) {
                let ty = sampled();
                let task = ty
                    .instantiate(
                        &InstanceCache::new(),
                        [
                            ("int", ParamValue::from(int)),
                            ("float", float.into()),
                            ("date", date.into()),
                            ("minute", minute.into()),
                            ("month", month.into()),
                            ("delta", TimeDelta::try_seconds(secs).unwrap().into()),
                        ],
                    )
                    .unwrap();

                let params = task.to_str_params();
                let other = ty.from_str_params(&InstanceCache::new(), &params).unwrap();

                prop_assert_eq!(&task, &other);
                prop_assert_eq!(task.param_values(), other.param_values());
            }
        }
    }
}
