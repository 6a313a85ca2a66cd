#![forbid(unsafe_code)]

use super::envelope::op_error;
use rg_core::ids::{Specifier, SpecifierError, TestcaseKey, TestcaseKeyError};
use rg_core::model::{TestcaseStatus, TrialStatus};
use serde_json::{Map, Value};

pub(crate) type Args = Map<String, Value>;

fn invalid(message: String) -> Value {
    op_error("INVALID_INPUT", &message)
}

pub(crate) fn require_string(args: &Args, key: &str) -> Result<String, Value> {
    match args.get(key) {
        Some(Value::String(v)) => Ok(v.to_string()),
        Some(Value::Null) | None => Err(invalid(format!("{key} is required"))),
        Some(_) => Err(invalid(format!("{key} must be a string"))),
    }
}

pub(crate) fn optional_string(args: &Args, key: &str) -> Result<Option<String>, Value> {
    match args.get(key) {
        None | Some(Value::Null) => Ok(None),
        Some(Value::String(v)) => Ok(Some(v.to_string())),
        Some(_) => Err(invalid(format!("{key} must be a string"))),
    }
}

/// Absent keeps the stored value, `null` clears it.
pub(crate) fn optional_nullable_string(args: &Args, key: &str) -> Result<Option<Option<String>>, Value> {
    match args.get(key) {
        None => Ok(None),
        Some(Value::Null) => Ok(Some(None)),
        Some(Value::String(v)) => Ok(Some(Some(v.to_string()))),
        Some(_) => Err(invalid(format!("{key} must be a string or null"))),
    }
}

pub(crate) fn optional_i64(args: &Args, key: &str) -> Result<Option<i64>, Value> {
    match args.get(key) {
        None | Some(Value::Null) => Ok(None),
        Some(Value::Number(n)) => n
            .as_i64()
            .map(Some)
            .ok_or_else(|| invalid(format!("{key} must be an integer"))),
        Some(_) => Err(invalid(format!("{key} must be an integer"))),
    }
}

pub(crate) fn require_i64(args: &Args, key: &str) -> Result<i64, Value> {
    optional_i64(args, key)?.ok_or_else(|| invalid(format!("{key} is required")))
}

pub(crate) fn optional_nullable_i64(args: &Args, key: &str) -> Result<Option<Option<i64>>, Value> {
    match args.get(key) {
        None => Ok(None),
        Some(Value::Null) => Ok(Some(None)),
        Some(_) => optional_i64(args, key).map(Some),
    }
}

pub(crate) fn optional_usize(args: &Args, key: &str) -> Result<Option<usize>, Value> {
    match args.get(key) {
        None | Some(Value::Null) => Ok(None),
        Some(Value::Number(n)) => n
            .as_u64()
            .and_then(|v| usize::try_from(v).ok())
            .map(Some)
            .ok_or_else(|| invalid(format!("{key} must be a non-negative integer"))),
        Some(_) => Err(invalid(format!("{key} must be a non-negative integer"))),
    }
}

/// Projects and versions are addressed by integer id or by name; any other
/// JSON type is rejected.
pub(crate) fn require_specifier(args: &Args, key: &str) -> Result<Specifier, Value> {
    let parsed = match args.get(key) {
        Some(Value::Number(n)) => match n.as_i64() {
            Some(id) => Specifier::id(id),
            None => Err(SpecifierError::NonPositiveId),
        },
        Some(Value::String(name)) => Specifier::name(name.as_str()),
        Some(Value::Null) | None => return Err(invalid(format!("{key} is required"))),
        Some(_) => {
            return Err(invalid(format!(
                "invalid {key} specifier: either name or pk should be given"
            )));
        }
    };
    parsed.map_err(|err| {
        let reason = match err {
            SpecifierError::NonPositiveId => "id must be a positive integer",
            SpecifierError::EmptyName => "name must not be empty",
            SpecifierError::TooLong => "name is too long",
        };
        invalid(format!("{key}: {reason}"))
    })
}

pub(crate) fn require_testcase_key(args: &Args, key: &str) -> Result<TestcaseKey, Value> {
    let raw = require_string(args, key)?;
    TestcaseKey::try_new(raw).map_err(|err| {
        let reason = match err {
            TestcaseKeyError::Empty => "must not be empty".to_string(),
            TestcaseKeyError::TooLong => "is too long".to_string(),
            TestcaseKeyError::SurroundingWhitespace => {
                "must not start or end with whitespace".to_string()
            }
            TestcaseKeyError::InvalidChar { ch, index } => {
                format!("contains invalid character {ch:?} at {index}")
            }
        };
        invalid(format!("{key} {reason}"))
    })
}

pub(crate) fn optional_testcase_status(args: &Args, key: &str) -> Result<Option<TestcaseStatus>, Value> {
    let Some(raw) = optional_string(args, key)? else {
        return Ok(None);
    };
    TestcaseStatus::parse(&raw).map(Some).ok_or_else(|| {
        invalid(format!(
            "{key} must be one of passed, failed, todo, candidate, candidate2"
        ))
    })
}

pub(crate) fn optional_trial_status(args: &Args, key: &str) -> Result<Option<TrialStatus>, Value> {
    let Some(raw) = optional_string(args, key)? else {
        return Ok(None);
    };
    TrialStatus::parse(&raw).map(Some).ok_or_else(|| {
        invalid(format!(
            "{key} must be one of compiling, pending, running, failed, passed"
        ))
    })
}

pub(crate) fn require_trial_status(args: &Args, key: &str) -> Result<TrialStatus, Value> {
    optional_trial_status(args, key)?.ok_or_else(|| invalid(format!("{key} is required")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn args(value: Value) -> Args {
        match value {
            Value::Object(map) => map,
            other => panic!("expected object, got {other}"),
        }
    }

    fn code(err: &Value) -> &str {
        err.get("code").and_then(Value::as_str).unwrap_or_default()
    }

    #[test]
    fn specifiers_accept_ids_and_names_only() {
        let a = args(json!({"by_id": 3, "by_name": "P1", "list": [1], "zero": 0, "blank": " "}));
        assert_eq!(require_specifier(&a, "by_id").expect("id"), Specifier::Id(3));
        assert_eq!(
            require_specifier(&a, "by_name").expect("name"),
            Specifier::Name("P1".to_string())
        );
        for key in ["list", "zero", "blank", "missing"] {
            let err = require_specifier(&a, key).expect_err(key);
            assert_eq!(code(&err), "INVALID_INPUT");
        }
    }

    #[test]
    fn nullable_fields_distinguish_absent_from_null() {
        let a = args(json!({"owner": null, "group": 4}));
        assert_eq!(optional_nullable_string(&a, "owner").expect("owner"), Some(None));
        assert_eq!(optional_nullable_string(&a, "other").expect("other"), None);
        assert_eq!(optional_nullable_i64(&a, "group").expect("group"), Some(Some(4)));
    }

    #[test]
    fn statuses_are_validated() {
        let a = args(json!({"ok": "Candidate2", "bad": "done", "num": 1}));
        assert_eq!(
            optional_testcase_status(&a, "ok").expect("ok"),
            Some(TestcaseStatus::Candidate2)
        );
        assert_eq!(code(&optional_testcase_status(&a, "bad").expect_err("bad")), "INVALID_INPUT");
        assert_eq!(code(&optional_trial_status(&a, "num").expect_err("num")), "INVALID_INPUT");
    }
}
