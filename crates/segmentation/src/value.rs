//! Literal values embedded in criteria.

use chrono::{DateTime, NaiveDate, TimeZone, Utc};
use serde_json::Value;

use segmenter_core::{BadInputError, GeoArea, GeoBox, GeoCircle, GeoLocation, ISO8601Duration};

use crate::context::ParsingContext;

#[derive(Debug, Clone, PartialEq)]
pub enum ValueNode {
    Boolean(bool),
    Number(f64),
    String(String),
    Date(DateTime<Utc>),
    Duration(ISO8601Duration),
    /// Evaluation instant shifted by the duration.
    RelativeDate(ISO8601Duration),
    Geo(GeoArea),
}

impl ValueNode {
    /// The instant this literal denotes, in epoch milliseconds.
    pub fn as_instant(&self, now: i64) -> Option<i64> {
        match self {
            ValueNode::Date(date) => Some(date.timestamp_millis()),
            ValueNode::RelativeDate(duration) => Some(duration.apply_to(now)),
            ValueNode::Number(millis) => Some(*millis as i64),
            _ => None,
        }
    }
}

/// Parses a literal. Bare strings and numbers are coerced to instants or
/// durations when the context's data source holds that kind of value.
pub fn parse_value(json: &Value, ctx: &ParsingContext) -> Result<ValueNode, BadInputError> {
    let source = ctx.source();
    match json {
        Value::Null => Err(ctx.error(
            "null never matches a value; test absence with \"presence\": false",
        )),
        Value::Bool(b) => Ok(ValueNode::Boolean(*b)),
        Value::Number(n) => {
            let number = n
                .as_f64()
                .ok_or_else(|| ctx.error(format!("unsupported number {n}")))?;
            if source.is_date() {
                date_from_millis(number, ctx).map(ValueNode::Date)
            } else if source.is_duration() {
                Ok(ValueNode::Duration(ISO8601Duration::from_millis(number)))
            } else {
                Ok(ValueNode::Number(number))
            }
        }
        Value::String(text) => {
            if source.is_date() {
                match ISO8601Duration::parse(text) {
                    Ok(duration) => Ok(ValueNode::RelativeDate(duration)),
                    Err(_) => parse_date(text, ctx).map(ValueNode::Date),
                }
            } else if source.is_duration() {
                ISO8601Duration::parse(text)
                    .map(ValueNode::Duration)
                    .map_err(|e| e.with_path(ctx.path()))
            } else {
                Ok(ValueNode::String(text.clone()))
            }
        }
        Value::Object(object) => {
            let mut entries = object.iter();
            let (Some((kind, body)), None) = (entries.next(), entries.next()) else {
                return Err(ctx.error("a typed value must have exactly one key"));
            };
            let ctx = ctx.key(kind)?;
            match kind.as_str() {
                "date" => match body {
                    Value::String(text) => parse_date(text, &ctx).map(ValueNode::Date),
                    Value::Number(n) => {
                        date_from_millis(n.as_f64().unwrap_or(f64::NAN), &ctx).map(ValueNode::Date)
                    }
                    _ => Err(ctx.error("date expects an RFC 3339 string or epoch milliseconds")),
                },
                "duration" => match body {
                    Value::Number(n) => Ok(ValueNode::Duration(ISO8601Duration::from_millis(
                        n.as_f64().unwrap_or(0.0),
                    ))),
                    other => ISO8601Duration::parse_value(other)
                        .map(ValueNode::Duration)
                        .map_err(|e| e.with_path(ctx.path())),
                },
                "relativeDate" => ISO8601Duration::parse_value(body)
                    .map(ValueNode::RelativeDate)
                    .map_err(|e| e.with_path(ctx.path())),
                "geocircle" => {
                    parse_geo_circle(body, &ctx).map(|c| ValueNode::Geo(GeoArea::Circle(c)))
                }
                "geobox" => parse_geo_box(body, &ctx).map(|b| ValueNode::Geo(GeoArea::Box(b))),
                other => Err(ctx.error(format!("unknown value type \"{other}\""))),
            }
        }
        Value::Array(_) => Err(ctx.error("expected a single value, got an array")),
    }
}

/// Parses `{"geocircle": ...}` / `{"geobox": ...}` literals only.
pub fn parse_geo_area(json: &Value, ctx: &ParsingContext) -> Result<GeoArea, BadInputError> {
    match parse_value(json, ctx)? {
        ValueNode::Geo(area) => Ok(area),
        _ => Err(ctx.error("expected a geocircle or geobox value")),
    }
}

fn parse_date(text: &str, ctx: &ParsingContext) -> Result<DateTime<Utc>, BadInputError> {
    if let Ok(date) = DateTime::parse_from_rfc3339(text) {
        return Ok(date.with_timezone(&Utc));
    }
    NaiveDate::parse_from_str(text, "%Y-%m-%d")
        .ok()
        .and_then(|day| day.and_hms_opt(0, 0, 0))
        .map(|midnight| midnight.and_utc())
        .ok_or_else(|| ctx.error(format!("invalid date \"{text}\"")))
}

fn date_from_millis(millis: f64, ctx: &ParsingContext) -> Result<DateTime<Utc>, BadInputError> {
    if !millis.is_finite() {
        return Err(ctx.error("invalid epoch milliseconds"));
    }
    Utc.timestamp_millis_opt(millis as i64)
        .single()
        .ok_or_else(|| ctx.error(format!("epoch milliseconds {millis} out of range")))
}

fn number_field(body: &Value, key: &str, ctx: &ParsingContext) -> Result<f64, BadInputError> {
    body.get(key)
        .and_then(Value::as_f64)
        .ok_or_else(|| ctx.error(format!("missing numeric \"{key}\"")))
}

fn parse_location(body: &Value, ctx: &ParsingContext) -> Result<GeoLocation, BadInputError> {
    let lat = number_field(body, "lat", ctx)?;
    let lon = number_field(body, "lon", ctx)?;
    GeoLocation::new(lat, lon).map_err(|e| e.with_path(ctx.path()))
}

fn parse_geo_circle(body: &Value, ctx: &ParsingContext) -> Result<GeoCircle, BadInputError> {
    let center = body
        .get("center")
        .ok_or_else(|| ctx.error("geocircle requires a \"center\""))?;
    let center = parse_location(center, &ctx.key("center")?)?;
    let radius = number_field(body, "radius", ctx)?;
    GeoCircle::new(center, radius).map_err(|e| e.with_path(ctx.path()))
}

fn parse_geo_box(body: &Value, ctx: &ParsingContext) -> Result<GeoBox, BadInputError> {
    GeoBox::new(
        number_field(body, "top", ctx)?,
        number_field(body, "right", ctx)?,
        number_field(body, "bottom", ctx)?,
        number_field(body, "left", ctx)?,
    )
    .map_err(|e| e.with_path(ctx.path()))
}
