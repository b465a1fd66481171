//! Comparison semantics between resolved data and criterion literals.

use std::cmp::Ordering;

use chrono::DateTime;
use serde_json::Value;

use segmenter_core::GeoLocation;

use crate::resolver::Datum;
use crate::value::ValueNode;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ComparisonOperator {
    GreaterThan,
    GreaterThanOrEqual,
    LessThan,
    LessThanOrEqual,
}

impl ComparisonOperator {
    pub fn from_key(key: &str) -> Option<Self> {
        match key {
            "gt" => Some(Self::GreaterThan),
            "gte" => Some(Self::GreaterThanOrEqual),
            "lt" => Some(Self::LessThan),
            "lte" => Some(Self::LessThanOrEqual),
            _ => None,
        }
    }

    pub fn key(&self) -> &'static str {
        match self {
            Self::GreaterThan => "gt",
            Self::GreaterThanOrEqual => "gte",
            Self::LessThan => "lt",
            Self::LessThanOrEqual => "lte",
        }
    }

    pub fn accepts(&self, ordering: Ordering) -> bool {
        match self {
            Self::GreaterThan => ordering == Ordering::Greater,
            Self::GreaterThanOrEqual => ordering != Ordering::Less,
            Self::LessThan => ordering == Ordering::Less,
            Self::LessThanOrEqual => ordering != Ordering::Greater,
        }
    }
}

/// Orders `actual` relative to `expected`, or `None` when the two cannot be
/// compared. `now` anchors relative dates.
pub fn compare(actual: &Datum<'_>, expected: &ValueNode, now: i64) -> Option<Ordering> {
    match actual {
        Datum::Json(Value::Number(n)) => {
            let actual = n.as_f64()?;
            match expected {
                ValueNode::Number(e) => actual.partial_cmp(e),
                ValueNode::Date(_) | ValueNode::RelativeDate(_) => {
                    actual.partial_cmp(&(expected.as_instant(now)? as f64))
                }
                _ => None,
            }
        }
        Datum::Json(Value::String(s)) => match expected {
            ValueNode::String(e) => Some(s.as_str().cmp(e.as_str())),
            ValueNode::Date(_) | ValueNode::RelativeDate(_) => {
                let actual = DateTime::parse_from_rfc3339(s).ok()?.timestamp_millis();
                Some(actual.cmp(&expected.as_instant(now)?))
            }
            _ => None,
        },
        Datum::Json(Value::Bool(b)) => match expected {
            ValueNode::Boolean(e) => Some(b.cmp(e)),
            _ => None,
        },
        Datum::Json(_) => None,
        Datum::Date(at) => Some(at.cmp(&expected.as_instant(now)?)),
        Datum::Elapsed { since, now: until } => match expected {
            // Calendar-aware: "elapsed < P1M" holds while `until` has not
            // reached `since + P1M`.
            ValueNode::Duration(duration) => Some(until.cmp(&duration.apply_to(*since))),
            ValueNode::Number(millis) => ((until - since) as f64).partial_cmp(millis),
            _ => None,
        },
        Datum::Location(_) => None,
    }
}

pub fn equals(actual: &Datum<'_>, expected: &ValueNode, now: i64) -> bool {
    compare(actual, expected, now) == Some(Ordering::Equal)
}

/// Applies `test` to each element of an array value, or to the value itself.
pub fn any_element(actual: &Datum<'_>, test: impl Fn(&Datum<'_>) -> bool) -> bool {
    match actual {
        Datum::Json(Value::Array(items)) => items.iter().any(|item| test(&Datum::Json(item))),
        other => test(other),
    }
}

/// Every expected value is present: among the elements of an array value, or
/// equal to a scalar value.
pub fn contains_all(actual: &Datum<'_>, expected: &[ValueNode], now: i64) -> bool {
    expected
        .iter()
        .all(|value| any_element(actual, |item| equals(item, value, now)))
}

pub fn has_prefix(actual: &Datum<'_>, prefix: &str) -> bool {
    any_element(actual, |item| {
        matches!(item, Datum::Json(Value::String(s)) if s.starts_with(prefix))
    })
}

/// Reads a coordinate from a typed location or a `{"lat", "lon"}` object.
pub fn as_location(actual: &Datum<'_>) -> Option<GeoLocation> {
    match actual {
        Datum::Location(location) => Some(*location),
        Datum::Json(value @ Value::Object(_)) => {
            let lat = value.get("lat")?.as_f64()?;
            let lon = value.get("lon")?.as_f64()?;
            GeoLocation::new(lat, lon).ok()
        }
        _ => None,
    }
}
