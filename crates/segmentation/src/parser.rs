//! Recursive-descent parser turning JSON criteria documents into a
//! [`CriterionNode`] tree.
//!
//! ## Grammar
//!
//! A criterion is a JSON object. Each key contributes one criterion and the
//! criteria of all keys are AND-ed; `{}` matches everything.
//!
//! ```text
//! and / or            [criteria, ...]
//! not                 criteria
//! installation / user criteria                      switch root scope
//! event               criteria                      some event matches
//! lastActivityDate    criteria                      switch to the date source
//! geo                 {"location": criteria, "date": criteria}
//! .a.b                criteria                      switch to custom field a.b
//! presence            true | false                  with optional siblings
//!                                                   "source", "sinceDateComparison",
//!                                                   "elapsedTimeComparison"
//! presence            {"present": bool, "sinceDate": criteria, "elapsedTime": criteria}
//! eq / gt / gte / lt / lte   value
//! any / all           [value, ...]
//! prefix              "string"
//! inside              {"geocircle": ...} | {"geobox": ...}
//! subscriptionStatus  "optIn" | "optOut" | "softOptOut"
//! ```
//!
//! ## Example
//!
//! ```text
//! {"presence": true, "source": "lastActivityDate",
//!  "elapsedTimeComparison": {"lt": "P7D"}}
//! ```
//!
//! matches installations active within the last seven days.

use std::sync::Arc;

use serde_json::{Map, Value};
use tracing::debug;

use segmenter_core::{BadInputError, ParserConfig, SegmenterResult, SubscriptionStatus};

use crate::context::ParsingContext;
use crate::criteria::{Criterion, CriterionNode};
use crate::datasource::{DataSource, SourceKind};
use crate::predicates::ComparisonOperator;
use crate::value::{parse_geo_area, parse_value};

const SOURCE_KEY: &str = "source";
const SINCE_DATE_COMPARISON_KEY: &str = "sinceDateComparison";
const ELAPSED_TIME_COMPARISON_KEY: &str = "elapsedTimeComparison";

/// Keys only meaningful next to `"presence": <bool>`.
const PRESENCE_SIBLINGS: [&str; 3] = [
    SOURCE_KEY,
    SINCE_DATE_COMPARISON_KEY,
    ELAPSED_TIME_COMPARISON_KEY,
];

/// Entry point holding the limits applied to every parsed document.
#[derive(Debug, Clone, Default)]
pub struct SegmentationParser {
    config: ParserConfig,
}

impl SegmentationParser {
    pub fn new(config: ParserConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &ParserConfig {
        &self.config
    }

    pub fn parse_criteria(&self, json: &Value) -> Result<CriterionNode, BadInputError> {
        let root = ParsingContext::new(self.config);
        let node = parse_criteria(json, &root)?;
        let nodes = node.node_count();
        if nodes > self.config.max_nodes {
            return Err(root.error(format!(
                "criteria have {nodes} nodes, more than the limit of {}",
                self.config.max_nodes
            )));
        }
        debug!(nodes, depth = node.depth(), "criteria parsed");
        Ok(node)
    }

    pub fn parse_criteria_str(&self, text: &str) -> SegmenterResult<CriterionNode> {
        let json: Value = serde_json::from_str(text)?;
        Ok(self.parse_criteria(&json)?)
    }
}

/// Parses the criterion at `json`, applying to `ctx`'s data source.
pub fn parse_criteria(json: &Value, ctx: &ParsingContext) -> Result<CriterionNode, BadInputError> {
    let object = json
        .as_object()
        .ok_or_else(|| ctx.error("a criterion must be a JSON object"))?;
    if object.is_empty() {
        return Ok(CriterionNode::new(ctx.clone(), Criterion::MatchAll));
    }

    let presence_shorthand = matches!(object.get("presence"), Some(Value::Bool(_)));
    let mut children = Vec::with_capacity(object.len());
    for (key, value) in object {
        if PRESENCE_SIBLINGS.contains(&key.as_str()) {
            if presence_shorthand {
                continue;
            }
            return Err(ctx.key(key)?.error(format!(
                "\"{key}\" is only allowed next to a boolean \"presence\""
            )));
        }
        children.push(parse_entry(key, value, object, ctx)?);
    }

    if children.len() == 1 {
        Ok(children.remove(0))
    } else {
        Ok(CriterionNode::new(ctx.clone(), Criterion::And(children)))
    }
}

fn parse_entry(
    key: &str,
    value: &Value,
    object: &Map<String, Value>,
    ctx: &ParsingContext,
) -> Result<CriterionNode, BadInputError> {
    let child = ctx.key(key)?;
    let source = ctx.source().clone();

    if let Some(path) = key.strip_prefix('.') {
        return parse_field(path, value, ctx, &child);
    }
    if let Some(operator) = ComparisonOperator::from_key(key) {
        require_value_source(key, ctx, &child)?;
        let value = parse_value(value, &child)?;
        return Ok(leaf(
            child,
            Criterion::Comparison {
                source,
                operator,
                value,
            },
        ));
    }

    match key {
        "and" | "or" => {
            let items = value
                .as_array()
                .ok_or_else(|| child.error(format!("\"{key}\" expects an array of criteria")))?;
            let nodes = items
                .iter()
                .enumerate()
                .map(|(i, item)| child.index(i).and_then(|c| parse_criteria(item, &c)))
                .collect::<Result<Vec<_>, _>>()?;
            let criterion = if key == "and" {
                Criterion::And(nodes)
            } else {
                Criterion::Or(nodes)
            };
            Ok(leaf(child, criterion))
        }
        "not" => {
            let inner = parse_criteria(value, &child)?;
            Ok(leaf(child, Criterion::Not(Box::new(inner))))
        }
        "installation" | "user" => {
            require_root_scope(key, ctx, &child)?;
            let root = if key == "user" {
                DataSource::user()
            } else {
                DataSource::installation()
            };
            parse_criteria(value, &child.with_source(root))
        }
        "event" => {
            require_root_scope(key, ctx, &child)?;
            let inner = parse_criteria(value, &child.with_source(DataSource::event()))?;
            Ok(leaf(child, Criterion::Join(Box::new(inner))))
        }
        "lastActivityDate" => {
            require_user_scope(key, ctx, &child)?;
            let source = DataSource::last_activity_date(source);
            parse_criteria(value, &child.with_source(source))
        }
        "geo" => parse_geo(value, ctx, &child),
        "subscriptionStatus" => {
            require_user_scope(key, ctx, &child)?;
            let name = value
                .as_str()
                .ok_or_else(|| child.error("\"subscriptionStatus\" expects a string"))?;
            let status = SubscriptionStatus::from_name(name).ok_or_else(|| {
                child.error(format!("unknown subscription status \"{name}\""))
            })?;
            Ok(leaf(child, Criterion::SubscriptionStatus { source, status }))
        }
        "presence" => match value {
            Value::Bool(present) => parse_presence_shorthand(*present, object, ctx, child),
            Value::Object(body) => parse_presence_object(body, child),
            _ => Err(child.error("\"presence\" expects a boolean or an object")),
        },
        "eq" => {
            require_value_source(key, ctx, &child)?;
            let value = parse_value(value, &child)?;
            Ok(leaf(child, Criterion::Equality { source, value }))
        }
        "any" | "all" => {
            require_value_source(key, ctx, &child)?;
            let items = value
                .as_array()
                .ok_or_else(|| child.error(format!("\"{key}\" expects an array of values")))?;
            let values = items
                .iter()
                .enumerate()
                .map(|(i, item)| child.index(i).and_then(|c| parse_value(item, &c)))
                .collect::<Result<Vec<_>, _>>()?;
            let criterion = if key == "any" {
                Criterion::Any { source, values }
            } else {
                Criterion::All { source, values }
            };
            Ok(leaf(child, criterion))
        }
        "prefix" => {
            require_value_source(key, ctx, &child)?;
            let prefix = value
                .as_str()
                .ok_or_else(|| child.error("\"prefix\" expects a string"))?
                .to_string();
            Ok(leaf(child, Criterion::Prefix { source, prefix }))
        }
        "inside" => {
            require_value_source(key, ctx, &child)?;
            let area = parse_geo_area(value, &child)?;
            Ok(leaf(child, Criterion::Inside { source, area }))
        }
        other => Err(child.error(format!("unknown criterion key \"{other}\""))),
    }
}

fn leaf(context: ParsingContext, criterion: Criterion) -> CriterionNode {
    CriterionNode::new(context, criterion)
}

fn parse_field(
    path: &str,
    value: &Value,
    ctx: &ParsingContext,
    child: &ParsingContext,
) -> Result<CriterionNode, BadInputError> {
    let segments = split_path(path, child)?;
    let source = field_source(ctx.source(), segments, child)?;
    parse_criteria(value, &child.with_source(source))
}

fn field_source(
    parent: &Arc<DataSource>,
    segments: Vec<String>,
    ctx: &ParsingContext,
) -> Result<Arc<DataSource>, BadInputError> {
    match parent.kind() {
        SourceKind::Installation | SourceKind::User | SourceKind::Event | SourceKind::Field(_) => {
            Ok(DataSource::field(parent.clone(), segments))
        }
        _ => Err(ctx.error(format!(
            "custom fields cannot be read from \"{}\"",
            parent.name()
        ))),
    }
}

fn split_path(path: &str, ctx: &ParsingContext) -> Result<Vec<String>, BadInputError> {
    let segments: Vec<String> = path.split('.').map(str::to_string).collect();
    if segments.iter().any(String::is_empty) {
        return Err(ctx.error(format!("invalid field path \"{path}\"")));
    }
    Ok(segments)
}

/// Resolves a `"source"` path such as `lastActivityDate`, `user.plan` or
/// `profile.age`, relative to the current source unless it names a root.
fn parse_source_path(path: &str, ctx: &ParsingContext) -> Result<Arc<DataSource>, BadInputError> {
    let mut segments = split_path(path, ctx)?;
    let root = match segments[0].as_str() {
        "installation" => Some(DataSource::installation()),
        "user" => Some(DataSource::user()),
        _ => None,
    };
    let base = match root {
        Some(root) => {
            segments.remove(0);
            root
        }
        None => ctx.source().clone(),
    };
    match segments.as_slice() {
        [] => Ok(base),
        [single] if single == "lastActivityDate" => {
            if !matches!(base.kind(), SourceKind::Installation | SourceKind::User) {
                return Err(
                    ctx.error("\"lastActivityDate\" requires an installation or user scope")
                );
            }
            Ok(DataSource::last_activity_date(base))
        }
        _ => field_source(&base, segments, ctx),
    }
}

fn parse_presence_shorthand(
    present: bool,
    object: &Map<String, Value>,
    ctx: &ParsingContext,
    child: ParsingContext,
) -> Result<CriterionNode, BadInputError> {
    let source = match object.get(SOURCE_KEY) {
        Some(Value::String(path)) => parse_source_path(path, &ctx.key(SOURCE_KEY)?)?,
        Some(_) => return Err(ctx.key(SOURCE_KEY)?.error("\"source\" expects a string")),
        None => ctx.source().clone(),
    };
    let since_date = object
        .get(SINCE_DATE_COMPARISON_KEY)
        .map(|json| {
            let sub = ctx.key(SINCE_DATE_COMPARISON_KEY)?;
            sub_comparison(json, &sub, DataSource::presence_since_date(source.clone()))
        })
        .transpose()?;
    let elapsed_time = object
        .get(ELAPSED_TIME_COMPARISON_KEY)
        .map(|json| {
            let sub = ctx.key(ELAPSED_TIME_COMPARISON_KEY)?;
            sub_comparison(json, &sub, DataSource::presence_elapsed_time(source.clone()))
        })
        .transpose()?;
    Ok(leaf(
        child,
        Criterion::Presence {
            source,
            present,
            since_date,
            elapsed_time,
        },
    ))
}

fn parse_presence_object(
    body: &Map<String, Value>,
    child: ParsingContext,
) -> Result<CriterionNode, BadInputError> {
    let source = child.source().clone();
    let mut present = None;
    let mut since_date = None;
    let mut elapsed_time = None;
    for (key, value) in body {
        let sub = child.key(key)?;
        match key.as_str() {
            "present" => {
                present = Some(
                    value
                        .as_bool()
                        .ok_or_else(|| sub.error("\"present\" expects a boolean"))?,
                )
            }
            "sinceDate" => {
                since_date = Some(sub_comparison(
                    value,
                    &sub,
                    DataSource::presence_since_date(source.clone()),
                )?)
            }
            "elapsedTime" => {
                elapsed_time = Some(sub_comparison(
                    value,
                    &sub,
                    DataSource::presence_elapsed_time(source.clone()),
                )?)
            }
            other => return Err(sub.error(format!("unknown presence key \"{other}\""))),
        }
    }
    let present = present.ok_or_else(|| child.error("\"presence\" requires \"present\""))?;
    Ok(leaf(
        child,
        Criterion::Presence {
            source,
            present,
            since_date,
            elapsed_time,
        },
    ))
}

fn sub_comparison(
    json: &Value,
    ctx: &ParsingContext,
    source: Arc<DataSource>,
) -> Result<Box<CriterionNode>, BadInputError> {
    parse_criteria(json, &ctx.with_source(source)).map(Box::new)
}

fn parse_geo(
    value: &Value,
    ctx: &ParsingContext,
    child: &ParsingContext,
) -> Result<CriterionNode, BadInputError> {
    require_user_scope("geo", ctx, child)?;
    let body = value
        .as_object()
        .filter(|body| !body.is_empty())
        .ok_or_else(|| child.error("\"geo\" expects an object with \"location\" and/or \"date\""))?;
    let mut nodes = Vec::with_capacity(body.len());
    for (key, json) in body {
        let sub = child.key(key)?;
        let source = match key.as_str() {
            "location" => DataSource::geo_location(ctx.source().clone()),
            "date" => DataSource::geo_date(ctx.source().clone()),
            other => return Err(sub.error(format!("unknown geo key \"{other}\""))),
        };
        nodes.push(parse_criteria(json, &sub.with_source(source))?);
    }
    if nodes.len() == 1 {
        Ok(nodes.remove(0))
    } else {
        Ok(leaf(child.clone(), Criterion::And(nodes)))
    }
}

fn require_root_scope(
    key: &str,
    ctx: &ParsingContext,
    child: &ParsingContext,
) -> Result<(), BadInputError> {
    if ctx.source().is_root() {
        Ok(())
    } else {
        Err(child.error(format!(
            "\"{key}\" is only allowed at the root of a scope, not under \"{}\"",
            ctx.source()
        )))
    }
}

fn require_user_scope(
    key: &str,
    ctx: &ParsingContext,
    child: &ParsingContext,
) -> Result<(), BadInputError> {
    match ctx.source().kind() {
        SourceKind::Installation | SourceKind::User => Ok(()),
        _ => Err(child.error(format!(
            "\"{key}\" requires an installation or user scope, not \"{}\"",
            ctx.source()
        ))),
    }
}

fn require_value_source(
    key: &str,
    ctx: &ParsingContext,
    child: &ParsingContext,
) -> Result<(), BadInputError> {
    if ctx.source().is_root() {
        Err(child.error(format!(
            "\"{key}\" needs a value to compare, but applies to the \"{}\" scope",
            ctx.source()
        )))
    } else {
        Ok(())
    }
}
