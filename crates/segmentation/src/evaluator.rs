//! Evaluation of a parsed criterion tree against a subject's data.

use chrono::{DateTime, Utc};
use tracing::trace;

use crate::criteria::{Criterion, CriterionNode};
use crate::predicates::{any_element, as_location, compare, contains_all, equals, has_prefix};
use crate::resolver::{DataContext, Resolution, SourceResolver};

/// Walks a criterion tree, pinned to a single evaluation instant so that
/// every relative date and elapsed time in the tree is computed against the
/// same `now`.
pub struct Evaluator<'a> {
    resolver: SourceResolver<'a>,
}

impl<'a> Evaluator<'a> {
    pub fn new(context: &'a dyn DataContext) -> Self {
        Self::at(context, Utc::now())
    }

    pub fn at(context: &'a dyn DataContext, now: DateTime<Utc>) -> Self {
        Self {
            resolver: SourceResolver::new(context, now.timestamp_millis()),
        }
    }

    pub fn now(&self) -> i64 {
        self.resolver.now()
    }

    pub fn evaluate(&self, node: &CriterionNode) -> bool {
        let matched = eval(&self.resolver, node);
        trace!(path = node.context.path(), matched, "criterion evaluated");
        matched
    }
}

/// Evaluates `node` against `context` at the current instant.
pub fn evaluate(node: &CriterionNode, context: &dyn DataContext) -> bool {
    Evaluator::new(context).evaluate(node)
}

fn eval(resolver: &SourceResolver<'_>, node: &CriterionNode) -> bool {
    let now = resolver.now();
    match &node.criterion {
        Criterion::MatchAll => true,
        Criterion::And(children) => children.iter().all(|child| eval(resolver, child)),
        Criterion::Or(children) => children.iter().any(|child| eval(resolver, child)),
        Criterion::Not(child) => !eval(resolver, child),
        Criterion::Join(child) => resolver
            .context()
            .events()
            .iter()
            .any(|event| eval(&resolver.for_event(event), child)),
        Criterion::Equality { source, value } => match resolver.resolve(source) {
            Resolution::Value(observed) => {
                any_element(&observed.datum, |item| equals(item, value, now))
            }
            _ => false,
        },
        Criterion::Any { source, values } => match resolver.resolve(source) {
            Resolution::Value(observed) => values
                .iter()
                .any(|value| any_element(&observed.datum, |item| equals(item, value, now))),
            _ => false,
        },
        Criterion::All { source, values } => match resolver.resolve(source) {
            Resolution::Value(observed) => contains_all(&observed.datum, values, now),
            _ => false,
        },
        Criterion::Comparison {
            source,
            operator,
            value,
        } => match resolver.resolve(source) {
            Resolution::Value(observed) => any_element(&observed.datum, |item| {
                compare(item, value, now).is_some_and(|ordering| operator.accepts(ordering))
            }),
            _ => false,
        },
        Criterion::Prefix { source, prefix } => match resolver.resolve(source) {
            Resolution::Value(observed) => has_prefix(&observed.datum, prefix),
            _ => false,
        },
        Criterion::Inside { source, area } => match resolver.resolve(source) {
            Resolution::Value(observed) => {
                as_location(&observed.datum).is_some_and(|location| area.contains(&location))
            }
            _ => false,
        },
        Criterion::Presence {
            source,
            present,
            since_date,
            elapsed_time,
        } => match resolver.observe(source) {
            None => !present,
            Some(_) if !present => false,
            Some(_) => {
                since_date.as_ref().map_or(true, |child| eval(resolver, child))
                    && elapsed_time.as_ref().map_or(true, |child| eval(resolver, child))
            }
        },
        Criterion::SubscriptionStatus { source, status } => match resolver.resolve(source) {
            Resolution::Scope(record) => record.subscription_status == Some(*status),
            _ => false,
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::SegmentationParser;
    use chrono::{Duration, TimeZone};
    use segmenter_core::{GeoLocation, Record, Subject, SubscriptionStatus};
    use serde_json::{json, Value};

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 5, 20, 12, 0, 0).unwrap()
    }

    fn criteria(json: Value) -> CriterionNode {
        SegmentationParser::default().parse_criteria(&json).unwrap()
    }

    fn matches(json: Value, subject: &Subject) -> bool {
        Evaluator::at(subject, now()).evaluate(&criteria(json))
    }

    fn active_since(days: i64) -> Subject {
        Subject {
            installation: Some(
                Record::default().with_last_activity_date(now() - Duration::days(days)),
            ),
            ..Subject::default()
        }
    }

    fn recent_activity() -> Value {
        json!({
            "presence": true,
            "source": "lastActivityDate",
            "elapsedTimeComparison": {"lt": "P7D"}
        })
    }

    #[test]
    fn test_recent_activity() {
        assert!(matches(recent_activity(), &active_since(3)));
        assert!(!matches(recent_activity(), &active_since(10)));
        assert!(!matches(recent_activity(), &Subject::default()));
    }

    #[test]
    fn test_absent_presence() {
        let absent = json!({"presence": false, "source": "lastActivityDate"});
        assert!(matches(absent.clone(), &Subject::default()));
        assert!(!matches(absent, &active_since(1)));

        // Value tests never match a missing value, negated they always do
        let empty = Subject::default();
        for operator in ["eq", "gt", "gte", "lt", "lte"] {
            assert!(!matches(json!({".age": {operator: 1}}), &empty));
            assert!(matches(json!({"not": {".age": {operator: 1}}}), &empty));
        }
        assert!(!matches(json!({".tags": {"any": ["a"]}}), &empty));
        assert!(!matches(json!({".tags": {"all": []}}), &empty));
        assert!(!matches(json!({".name": {"prefix": ""}}), &empty));
    }

    #[test]
    fn test_boolean_algebra() {
        let subject = Subject {
            installation: Some(Record::default().with_property("age", json!(30))),
            ..Subject::default()
        };
        let adult = json!({".age": {"gte": 18}});
        let senior = json!({".age": {"gte": 65}});
        assert!(matches(adult.clone(), &subject));
        assert!(!matches(senior.clone(), &subject));
        assert!(matches(json!({"not": {"not": adult.clone()}}), &subject));
        assert!(matches(json!({"or": [senior.clone(), adult.clone()]}), &subject));
        assert!(!matches(json!({"and": [senior.clone(), adult.clone()]}), &subject));
        assert!(matches(json!({"and": []}), &subject));
        assert!(!matches(json!({"or": []}), &subject));
        assert!(matches(json!({}), &subject));
        assert_eq!(
            matches(json!({"not": {"or": [senior.clone(), adult.clone()]}}), &subject),
            matches(json!({"and": [{"not": senior}, {"not": adult}]}), &subject)
        );
    }

    #[test]
    fn test_value_operators() {
        let subject = Subject {
            user: Some(
                Record::default()
                    .with_property("tags", json!(["sports", "music"]))
                    .with_property("email", json!("someone@example.com"))
                    .with_property("profile", json!({"plan": "pro"})),
            ),
            ..Subject::default()
        };
        let user = |criterion: Value| json!({"user": criterion});
        assert!(matches(user(json!({".tags": {"eq": "music"}})), &subject));
        assert!(matches(user(json!({".tags": {"any": ["news", "sports"]}})), &subject));
        assert!(!matches(user(json!({".tags": {"all": ["sports", "news"]}})), &subject));
        assert!(matches(user(json!({".tags": {"all": ["sports", "music"]}})), &subject));
        assert!(matches(user(json!({".email": {"prefix": "someone@"}})), &subject));
        assert!(matches(user(json!({".profile": {".plan": {"eq": "pro"}}})), &subject));
        assert!(matches(user(json!({".profile.plan": {"lt": "qro"}})), &subject));
        // installation scope is empty
        assert!(!matches(json!({".tags": {"eq": "music"}}), &subject));
    }

    #[test]
    fn test_last_activity_dates() {
        let subject = active_since(3);
        assert!(matches(json!({"lastActivityDate": {"gt": "-P7D"}}), &subject));
        assert!(!matches(json!({"lastActivityDate": {"lt": "-P7D"}}), &subject));
        assert!(matches(json!({"lastActivityDate": {"gte": "2024-05-01"}}), &subject));
        let day = (now() - Duration::days(3)).timestamp_millis();
        assert!(matches(json!({"lastActivityDate": {"eq": day}}), &subject));
    }

    #[test]
    fn test_field_since_date() {
        let subject = Subject {
            installation: Some(
                Record::default()
                    .with_property("plan", json!("pro"))
                    .with_field_changed_at("plan", now() - Duration::days(2)),
            ),
            ..Subject::default()
        };
        let changed_recently = json!({
            ".plan": {"presence": {"present": true, "sinceDate": {"gt": "-P3D"}}}
        });
        assert!(matches(changed_recently, &subject));
        let changed_long_ago = json!({
            ".plan": {"presence": true, "elapsedTimeComparison": {"gt": "P1W"}}
        });
        assert!(!matches(changed_long_ago, &subject));
    }

    #[test]
    fn test_session_presence() {
        let subject = Subject {
            installation: Some(Record::default().with_presence_since(now() - Duration::minutes(5))),
            ..Subject::default()
        };
        assert!(matches(json!({"presence": true}), &subject));
        assert!(matches(
            json!({"presence": {"present": true, "elapsedTime": {"lt": "PT10M"}}}),
            &subject
        ));
        assert!(!matches(json!({"presence": true}), &active_since(0)));
    }

    #[test]
    fn test_geo() {
        let paris = GeoLocation::new(48.8566, 2.3522).unwrap();
        let subject = Subject {
            installation: Some(
                Record::default().with_location(paris, Some(now() - Duration::hours(1))),
            ),
            ..Subject::default()
        };
        let near = json!({"geo": {"location": {"inside": {
            "geocircle": {"center": {"lat": 48.86, "lon": 2.35}, "radius": 2000}
        }}}});
        assert!(matches(near, &subject));
        let london = json!({"geo": {"location": {"inside": {
            "geobox": {"top": 51.7, "right": 0.3, "bottom": 51.3, "left": -0.5}
        }}}});
        assert!(!matches(london, &subject));
        assert!(matches(json!({"geo": {"date": {"gt": "-PT2H"}}}), &subject));
        assert!(!matches(json!({"geo": {"date": {"gt": "-PT30M"}}}), &subject));
    }

    #[test]
    fn test_event_join() {
        let subject = Subject {
            events: vec![
                Record::default().with_property("type", json!("view")),
                Record::default()
                    .with_property("type", json!("purchase"))
                    .with_property("amount", json!(120)),
            ],
            ..Subject::default()
        };
        assert!(matches(
            json!({"event": {".type": {"eq": "purchase"}, ".amount": {"gt": 100}}}),
            &subject
        ));
        // Both conditions must hold on the same event
        assert!(!matches(
            json!({"event": {".type": {"eq": "view"}, ".amount": {"gt": 100}}}),
            &subject
        ));
        assert!(!matches(json!({"event": {}}), &Subject::default()));
    }

    #[test]
    fn test_subscription_status() {
        let mut record = Record::default();
        record.subscription_status = Some(SubscriptionStatus::OptIn);
        let subject = Subject {
            installation: Some(record),
            ..Subject::default()
        };
        assert!(matches(json!({"subscriptionStatus": "optIn"}), &subject));
        assert!(!matches(json!({"subscriptionStatus": "optOut"}), &subject));
        assert!(!matches(json!({"subscriptionStatus": "optIn"}), &Subject::default()));
    }

    #[test]
    fn test_evaluation_is_deterministic() {
        let subject = active_since(3);
        let node = criteria(recent_activity());
        let evaluator = Evaluator::at(&subject, now());
        let first = evaluator.evaluate(&node);
        assert!((0..10).all(|_| evaluator.evaluate(&node) == first));
        assert_eq!(evaluator.now(), now().timestamp_millis());
    }

    #[test]
    fn test_free_evaluate_uses_current_instant() {
        let node = criteria(recent_activity());
        let recent = Subject {
            installation: Some(
                Record::default().with_last_activity_date(Utc::now() - Duration::days(3)),
            ),
            ..Subject::default()
        };
        let stale = Subject {
            installation: Some(
                Record::default().with_last_activity_date(Utc::now() - Duration::days(10)),
            ),
            ..Subject::default()
        };
        assert!(evaluate(&node, &recent));
        assert!(!evaluate(&node, &stale));
    }

    #[test]
    fn test_nested_and_dotted_fields_share_change_date() {
        let subject = Subject {
            installation: Some(
                Record::default()
                    .with_property("profile", json!({"age": 42}))
                    .with_field_changed_at("profile", now() - Duration::days(30))
                    .with_field_changed_at("profile.age", now() - Duration::days(1)),
            ),
            ..Subject::default()
        };
        let recent = json!({"presence": true, "elapsedTimeComparison": {"lt": "P7D"}});
        let dotted = matches(json!({".profile.age": recent.clone()}), &subject);
        let nested = matches(json!({".profile": {".age": recent}}), &subject);
        assert!(dotted);
        assert_eq!(dotted, nested);
        assert!(!matches(
            json!({".profile": {"presence": true, "elapsedTimeComparison": {"lt": "P7D"}}}),
            &subject
        ));
    }
}
