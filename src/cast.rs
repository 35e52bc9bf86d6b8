//! String to typed value conversion.

use crate::error::CastError;
use crate::mask::SecretClassifier;
use crate::types::{TypedValue, ValueType};

const TRUE_SET: &[&str] = &["true", "1", "yes", "y", "t"];
const FALSE_SET: &[&str] = &["false", "0", "no", "n", "f"];

/// Cast a raw string to `ty`. `None` keeps the string unchanged.
///
/// Returns the failure reason on error; see [`cast_entry`] for the keyed form.
pub fn cast_value(raw: &str, ty: Option<ValueType>) -> Result<TypedValue, String> {
    let trimmed = raw.trim();
    match ty {
        None | Some(ValueType::Str) => Ok(TypedValue::Str(raw.to_string())),
        Some(ValueType::Int) => parse_int(trimmed).map(TypedValue::Int),
        Some(ValueType::Float) => trimmed
            .parse::<f64>()
            .map(TypedValue::Float)
            .map_err(|_| "not a valid float".to_string()),
        Some(ValueType::Bool) => parse_bool(trimmed).map(TypedValue::Bool),
        Some(ValueType::List) => Ok(parse_list(trimmed)),
    }
}

/// Cast the value of `key`, producing a [`CastError`] whose value preview is
/// masked when the key is secret.
pub fn cast_entry(
    key: &str,
    raw: &str,
    ty: Option<ValueType>,
    classifier: &SecretClassifier,
) -> Result<TypedValue, CastError> {
    cast_value(raw, ty).map_err(|reason| CastError {
        key: key.to_string(),
        expected: ty.unwrap_or(ValueType::Str),
        value: classifier.preview(key, raw),
        reason,
    })
}

fn parse_int(s: &str) -> Result<i64, String> {
    let (negative, body) = match s.as_bytes().first() {
        Some(b'-') => (true, &s[1..]),
        Some(b'+') => (false, &s[1..]),
        _ => (false, s),
    };
    let lower = body.to_ascii_lowercase();
    let (radix, digits) = if let Some(rest) = lower.strip_prefix("0x") {
        (16, rest)
    } else if let Some(rest) = lower.strip_prefix("0o") {
        (8, rest)
    } else if let Some(rest) = lower.strip_prefix("0b") {
        (2, rest)
    } else {
        (10, lower.as_str())
    };

    // Underscore separators are allowed between digits only.
    if digits.is_empty()
        || digits.starts_with('_')
        || digits.ends_with('_')
        || digits.contains("__")
        || digits.starts_with(['+', '-'])
    {
        return Err("not a valid integer".to_string());
    }
    let cleaned: String = digits.chars().filter(|c| *c != '_').collect();
    let magnitude = i128::from_str_radix(&cleaned, radix)
        .map_err(|_| "not a valid integer".to_string())?;
    let value = if negative { -magnitude } else { magnitude };
    i64::try_from(value).map_err(|_| "integer out of range".to_string())
}

fn parse_bool(s: &str) -> Result<bool, String> {
    let lower = s.to_lowercase();
    if TRUE_SET.contains(&lower.as_str()) {
        Ok(true)
    } else if FALSE_SET.contains(&lower.as_str()) {
        Ok(false)
    } else {
        Err(format!(
            "expected one of {} or {}",
            TRUE_SET.join("/"),
            FALSE_SET.join("/")
        ))
    }
}

fn parse_list(s: &str) -> TypedValue {
    if s.starts_with('[') && s.ends_with(']') {
        if let Ok(serde_json::Value::Array(items)) = serde_json::from_str::<serde_json::Value>(s) {
            return TypedValue::List(items.into_iter().map(TypedValue::from).collect());
        }
    }
    TypedValue::List(
        s.split(',')
            .map(str::trim)
            .filter(|t| !t.is_empty())
            .map(|t| TypedValue::Str(t.to_string()))
            .collect(),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_int_cast() {
        assert_eq!(cast_value("8080", Some(ValueType::Int)), Ok(TypedValue::Int(8080)));
        assert_eq!(cast_value("  42 ", Some(ValueType::Int)), Ok(TypedValue::Int(42)));
        assert_eq!(cast_value("-17", Some(ValueType::Int)), Ok(TypedValue::Int(-17)));
        assert_eq!(cast_value("0x1F", Some(ValueType::Int)), Ok(TypedValue::Int(31)));
        assert_eq!(cast_value("0o17", Some(ValueType::Int)), Ok(TypedValue::Int(15)));
        assert_eq!(cast_value("-0x10", Some(ValueType::Int)), Ok(TypedValue::Int(-16)));
        assert_eq!(cast_value("1_000", Some(ValueType::Int)), Ok(TypedValue::Int(1000)));
        assert!(cast_value("abc", Some(ValueType::Int)).is_err());
        assert!(cast_value("12.5", Some(ValueType::Int)).is_err());
        assert!(cast_value("0x", Some(ValueType::Int)).is_err());
        assert!(cast_value("--5", Some(ValueType::Int)).is_err());
        assert!(cast_value("", Some(ValueType::Int)).is_err());
    }

    #[test]
    fn test_float_cast() {
        assert_eq!(cast_value("1.5", Some(ValueType::Float)), Ok(TypedValue::Float(1.5)));
        assert_eq!(cast_value("1e3", Some(ValueType::Float)), Ok(TypedValue::Float(1000.0)));
        assert_eq!(
            cast_value("inf", Some(ValueType::Float)),
            Ok(TypedValue::Float(f64::INFINITY))
        );
        match cast_value("nan", Some(ValueType::Float)) {
            Ok(TypedValue::Float(f)) => assert!(f.is_nan()),
            other => panic!("unexpected {:?}", other),
        }
        assert!(cast_value("fast", Some(ValueType::Float)).is_err());
    }

    #[test]
    fn test_bool_cast() {
        for raw in ["true", "1", "yes", "y", "t", "TRUE", "Yes", " T "] {
            assert_eq!(cast_value(raw, Some(ValueType::Bool)), Ok(TypedValue::Bool(true)), "{}", raw);
        }
        for raw in ["false", "0", "no", "n", "f", "FALSE", "No"] {
            assert_eq!(cast_value(raw, Some(ValueType::Bool)), Ok(TypedValue::Bool(false)), "{}", raw);
        }
        assert!(cast_value("maybe", Some(ValueType::Bool)).is_err());
    }

    #[test]
    fn test_list_cast_bracketed() {
        assert_eq!(
            cast_value(r#"["a","b"]"#, Some(ValueType::List)),
            Ok(TypedValue::from(vec!["a", "b"]))
        );
        assert_eq!(
            cast_value("[1, 2.5, true]", Some(ValueType::List)),
            Ok(TypedValue::List(vec![
                TypedValue::Int(1),
                TypedValue::Float(2.5),
                TypedValue::Bool(true)
            ]))
        );
    }

    #[test]
    fn test_list_cast_comma_separated() {
        assert_eq!(
            cast_value("10,20,400", Some(ValueType::List)),
            Ok(TypedValue::from(vec!["10", "20", "400"]))
        );
        assert_eq!(
            cast_value(" a , ,b,", Some(ValueType::List)),
            Ok(TypedValue::from(vec!["a", "b"]))
        );
        assert_eq!(cast_value("", Some(ValueType::List)), Ok(TypedValue::List(vec![])));
        // Not valid JSON, so the brackets are kept as part of the tokens.
        assert_eq!(
            cast_value("[a,b]", Some(ValueType::List)),
            Ok(TypedValue::from(vec!["[a", "b]"]))
        );
    }

    #[test]
    fn test_untyped_passes_through() {
        assert_eq!(cast_value(" raw ", None), Ok(TypedValue::Str(" raw ".into())));
    }

    #[test]
    fn test_cast_entry_masks_secret_preview() {
        let classifier = SecretClassifier::new();
        let err = cast_entry("API_KEY_COUNT", "supersecretvalue", Some(ValueType::Int), &classifier)
            .unwrap_err();
        assert!(!err.to_string().contains("supersecretvalue"));
        assert!(err.to_string().contains("API_KEY_COUNT"));

        let err = cast_entry("PORT", "eighty", Some(ValueType::Int), &classifier).unwrap_err();
        assert!(err.to_string().contains("eighty"));
    }
}
