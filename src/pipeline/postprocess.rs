//! Model-response parsing: raw vision-model text → [`TrademarkRecord`].
//!
//! Even with a JSON-only prompt, models wrap answers in ```` ```json ```` fences,
//! prepend a sentence, emit Nice classes as numbers, or leave blank strings
//! where a field is absent. These rules absorb those quirks so only genuinely
//! unusable answers become [`PageError::MalformedResponse`].
//!
//! ## Rule order
//!
//! 1. Strip invisible Unicode (BOM, zero-width spaces)
//! 2. Strip outer code fences
//! 3. Parse; if that fails, retry on the outermost `{…}` span
//! 4. Map lenient field values onto the typed record

use crate::error::PageError;
use crate::model::{BoundingBox, TrademarkRecord};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::Deserialize;
use serde_json::Value;

/// Parse one page's model answer.
pub fn parse_record(page: usize, raw: &str) -> Result<TrademarkRecord, PageError> {
    let cleaned = remove_invisible_chars(raw);
    let body = strip_code_fences(&cleaned);

    let value: Value = match serde_json::from_str(body.trim()) {
        Ok(v) => v,
        Err(first_err) => outer_object(&body)
            .and_then(|span| serde_json::from_str(span).ok())
            .ok_or_else(|| PageError::MalformedResponse {
                page,
                detail: format!("not JSON: {first_err}"),
            })?,
    };

    let value = match value {
        Value::Array(items) => items.into_iter().next().unwrap_or(Value::Null),
        other => other,
    };

    match value {
        Value::Null => Ok(TrademarkRecord::default()),
        Value::Object(_) => {
            let raw: RawRecord =
                serde_json::from_value(value).map_err(|e| PageError::MalformedResponse {
                    page,
                    detail: e.to_string(),
                })?;
            Ok(raw.into_record())
        }
        other => Err(PageError::MalformedResponse {
            page,
            detail: format!("expected a JSON object, got {}", kind(&other)),
        }),
    }
}

// ── Rule 1: Strip invisible Unicode ──────────────────────────────────────────

static RE_INVISIBLE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"[\u{200B}\u{200C}\u{200D}\u{FEFF}\u{00AD}]").unwrap());

fn remove_invisible_chars(input: &str) -> String {
    RE_INVISIBLE.replace_all(input, "").to_string()
}

// ── Rule 2: Strip outer code fences ──────────────────────────────────────────

static RE_OUTER_FENCES: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?s)^```[a-zA-Z]*\s*\n(.*?)\n?```\s*$").unwrap());

fn strip_code_fences(input: &str) -> String {
    match RE_OUTER_FENCES.captures(input.trim()) {
        Some(caps) => caps[1].to_string(),
        None => input.to_string(),
    }
}

// ── Rule 3: Outermost object span ────────────────────────────────────────────

fn outer_object(input: &str) -> Option<&str> {
    let start = input.find('{')?;
    let end = input.rfind('}')?;
    (end > start).then(|| &input[start..=end])
}

fn kind(v: &Value) -> &'static str {
    match v {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

// ── Rule 4: Lenient field mapping ────────────────────────────────────────────

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct RawRecord {
    #[serde(rename = "brandName", alias = "brand_name")]
    brand_name: Option<Value>,
    #[serde(rename = "applicationNumber", alias = "application_number")]
    application_number: Option<Value>,
    #[serde(rename = "filingDate", alias = "filing_date")]
    filing_date: Option<Value>,
    #[serde(rename = "expiryDate", alias = "expiry_date")]
    expiry_date: Option<Value>,
    owner: Option<Value>,
    #[serde(rename = "niceClassification", alias = "nice_classes")]
    nice_classification: Option<Value>,
    colors: Option<Value>,
    description: Option<Value>,
    #[serde(rename = "logo_bounding_box", alias = "logoBoundingBox")]
    logo_bounding_box: Option<Value>,
}

impl RawRecord {
    fn into_record(self) -> TrademarkRecord {
        TrademarkRecord {
            brand_name: text(self.brand_name).unwrap_or_default(),
            application_number: text(self.application_number),
            filing_date: text(self.filing_date),
            expiry_date: text(self.expiry_date),
            owner: text(self.owner),
            nice_classes: nice_classes(self.nice_classification),
            colors: text(self.colors),
            description: text(self.description),
            logo_box: bounding_box(self.logo_bounding_box),
        }
    }
}

/// Trimmed string or number; blanks and anything else become `None`.
fn text(v: Option<Value>) -> Option<String> {
    match v? {
        Value::String(s) => {
            let s = s.trim();
            (!s.is_empty()).then(|| s.to_string())
        }
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

/// Nice classes arrive as `["25", 35]`, `"25, 35"` or a bare number.
fn nice_classes(v: Option<Value>) -> Vec<String> {
    match v {
        Some(Value::Array(items)) => items.into_iter().filter_map(|i| text(Some(i))).collect(),
        Some(Value::String(s)) => s
            .split([',', ';'])
            .map(str::trim)
            .filter(|c| !c.is_empty())
            .map(String::from)
            .collect(),
        Some(n @ Value::Number(_)) => text(Some(n)).into_iter().collect(),
        _ => Vec::new(),
    }
}

/// Four numbers (or numeric strings); anything else means "no logo".
fn bounding_box(v: Option<Value>) -> Option<BoundingBox> {
    let Some(Value::Array(items)) = v else {
        return None;
    };
    let coords: Option<Vec<f64>> = items
        .iter()
        .map(|i| match i {
            Value::Number(n) => n.as_f64(),
            Value::String(s) => s.trim().parse().ok(),
            _ => None,
        })
        .collect();
    BoundingBox::from_slice(&coords?)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_full_record_inside_json_fence() {
        let raw = r#"```json
{
  "brandName": "  ACME ",
  "applicationNumber": "2024/0815",
  "filingDate": "2024-03-01",
  "expiryDate": "2034-03-01",
  "owner": "Acme Corp",
  "niceClassification": ["25", 35],
  "colors": "red, white",
  "description": "Stylised anvil",
  "logo_bounding_box": [100, 200, 300, 400]
}
```"#;
        let rec = parse_record(3, raw).unwrap();
        assert_eq!(rec.brand_name, "ACME");
        assert_eq!(rec.application_number.as_deref(), Some("2024/0815"));
        assert_eq!(rec.nice_classes, vec!["25", "35"]);
        assert_eq!(rec.owner.as_deref(), Some("Acme Corp"));
        let b = rec.logo_box.unwrap();
        assert_eq!((b.ymin, b.xmin, b.ymax, b.xmax), (100.0, 200.0, 300.0, 400.0));
    }

    #[test]
    fn blank_fields_become_absent() {
        let rec = parse_record(1, r#"{"brandName": "", "owner": "   ", "logo_bounding_box": []}"#)
            .unwrap();
        assert_eq!(rec.brand_name(), None);
        assert_eq!(rec.owner, None);
        assert_eq!(rec.logo_box, None);
    }

    #[test]
    fn nice_classes_from_comma_string() {
        let rec = parse_record(1, r#"{"brandName": "X", "niceClassification": "9; 42, "}"#).unwrap();
        assert_eq!(rec.nice_classes, vec!["9", "42"]);
    }

    #[test]
    fn prose_around_object_is_tolerated() {
        let raw = "Here is the record:\n{\"brandName\": \"Zeta\"}\nHope this helps.";
        assert_eq!(parse_record(2, raw).unwrap().brand_name, "Zeta");
    }

    #[test]
    fn array_answer_uses_first_object() {
        let rec = parse_record(2, r#"[{"brandName": "One"}, {"brandName": "Two"}]"#).unwrap();
        assert_eq!(rec.brand_name, "One");
        assert_eq!(parse_record(2, "[]").unwrap(), TrademarkRecord::default());
    }

    #[test]
    fn garbage_is_malformed() {
        let err = parse_record(5, "I cannot read this page.").unwrap_err();
        assert!(matches!(err, PageError::MalformedResponse { page: 5, .. }));

        let err = parse_record(5, "42").unwrap_err();
        assert!(err.to_string().contains("a number"));
    }

    #[test]
    fn bom_is_stripped() {
        let raw = "\u{FEFF}{\"brandName\": \"Bom\"}";
        assert_eq!(parse_record(1, raw).unwrap().brand_name, "Bom");
    }
}
