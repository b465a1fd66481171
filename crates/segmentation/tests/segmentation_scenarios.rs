//! End-to-end scenarios: subjects deserialized from JSON, criteria parsed
//! from JSON text, evaluated at a fixed instant.

#[cfg(test)]
mod tests {
    use chrono::{DateTime, Utc};
    use segmenter_core::{ParserConfig, SegmenterError, Subject};
    use segmenter_segmentation::{Evaluator, SegmentationEngine, SegmentationParser};
    use serde_json::json;

    fn now() -> DateTime<Utc> {
        "2024-06-15T09:30:00Z".parse().unwrap()
    }

    fn subject(json: serde_json::Value) -> Subject {
        serde_json::from_value(json).unwrap()
    }

    fn matches(criteria: &str, subject: &Subject) -> bool {
        let node = SegmentationParser::default()
            .parse_criteria_str(criteria)
            .unwrap();
        Evaluator::at(subject, now()).evaluate(&node)
    }

    #[test]
    fn test_recently_active_installations() {
        let criteria = r#"{
            "presence": true,
            "source": "lastActivityDate",
            "elapsedTimeComparison": {"lt": "P7D"}
        }"#;
        let recent = subject(json!({"installation": {"lastActivityDate": "2024-06-12T09:30:00Z"}}));
        let stale = subject(json!({"installation": {"lastActivityDate": "2024-06-05T09:30:00Z"}}));
        let unknown = subject(json!({"installation": {}}));
        assert!(matches(criteria, &recent));
        assert!(!matches(criteria, &stale));
        assert!(!matches(criteria, &unknown));
    }

    #[test]
    fn test_opted_in_french_speakers_who_purchased() {
        let criteria = r#"{
            "subscriptionStatus": "optIn",
            ".lang": {"any": ["fr", "fr-CA"]},
            "event": {".type": {"eq": "purchase"}, ".date": {"gte": {"date": "2024-06-01"}}}
        }"#;
        let buyer = subject(json!({
            "installation": {
                "subscriptionStatus": "optIn",
                "properties": {"lang": "fr"}
            },
            "events": [
                {"properties": {"type": "purchase", "date": "2024-06-10T00:00:00Z"}}
            ]
        }));
        assert!(matches(criteria, &buyer));

        let old_buyer = subject(json!({
            "installation": {
                "subscriptionStatus": "optIn",
                "properties": {"lang": "fr"}
            },
            "events": [
                {"properties": {"type": "purchase", "date": "2024-05-10T00:00:00Z"}}
            ]
        }));
        assert!(!matches(criteria, &old_buyer));
    }

    #[test]
    fn test_user_scope_and_geo() {
        let criteria = r#"{
            "user": {".tier": {"eq": "gold"}},
            "geo": {"location": {"inside": {
                "geobox": {"top": 49, "right": 3, "bottom": 48, "left": 2}
            }}}
        }"#;
        let parisian = subject(json!({
            "installation": {"location": {"lat": 48.85, "lon": 2.35}},
            "user": {"properties": {"tier": "gold"}}
        }));
        let anonymous = subject(json!({
            "installation": {"location": {"lat": 48.85, "lon": 2.35}}
        }));
        assert!(matches(criteria, &parisian));
        assert!(!matches(criteria, &anonymous));
    }

    #[test]
    fn test_bad_input_carries_location() {
        let err = SegmentationParser::default()
            .parse_criteria_str(r#"{"or": [{".age": {"gt": 1}}, {".age": {"between": [1, 2]}}]}"#)
            .unwrap_err();
        let SegmenterError::BadInput(err) = err else {
            panic!("expected bad input, got {err:?}");
        };
        assert_eq!(err.path, r#"$.or[1][".age"].between"#);
        assert!(err.to_string().contains("between"));
    }

    #[test]
    fn test_engine_batch_is_consistent() {
        let engine = SegmentationEngine::new(ParserConfig::default());
        let week = engine
            .register_segment("active 7d", &json!({"lastActivityDate": {"gte": "-P7D"}}))
            .unwrap();
        let month = engine
            .register_segment("active 1M", &json!({"lastActivityDate": {"gte": "-P1M"}}))
            .unwrap();
        let dormant = engine
            .register_segment("dormant", &json!({"not": {"lastActivityDate": {"gte": "-P1M"}}}))
            .unwrap();

        let active = subject(json!({"installation": {"lastActivityDate": "2024-06-01T00:00:00Z"}}));
        let memberships = engine.evaluate_subject_at(&active, now());
        assert_eq!(memberships, vec![month]);
        assert!(!memberships.contains(&week));
        assert!(!memberships.contains(&dormant));

        let never = subject(json!({}));
        assert_eq!(engine.evaluate_subject_at(&never, now()), vec![dormant]);
    }
}
