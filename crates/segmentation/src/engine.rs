//! Segment registry: parses criteria once, then evaluates subjects against
//! every registered segment.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde_json::Value;
use tracing::{debug, info};
use uuid::Uuid;

use segmenter_core::{BadInputError, ParserConfig};

use crate::criteria::CriterionNode;
use crate::evaluator::Evaluator;
use crate::parser::SegmentationParser;
use crate::resolver::DataContext;

#[derive(Debug, Clone)]
pub struct Segment {
    pub id: Uuid,
    pub name: String,
    pub criteria: CriterionNode,
    /// The criteria document as registered.
    pub source: Value,
    pub created_at: DateTime<Utc>,
}

pub struct SegmentationEngine {
    parser: SegmentationParser,
    segments: DashMap<Uuid, Arc<Segment>>,
}

impl SegmentationEngine {
    pub fn new(config: ParserConfig) -> Self {
        Self {
            parser: SegmentationParser::new(config),
            segments: DashMap::new(),
        }
    }

    /// Parses `criteria` and registers it under a fresh id. Nothing is
    /// registered when parsing fails.
    pub fn register_segment(
        &self,
        name: impl Into<String>,
        criteria: &Value,
    ) -> Result<Uuid, BadInputError> {
        let name = name.into();
        let node = self.parser.parse_criteria(criteria)?;
        let segment = Segment {
            id: Uuid::new_v4(),
            name,
            criteria: node,
            source: criteria.clone(),
            created_at: Utc::now(),
        };
        let id = segment.id;
        info!(
            segment_id = %id,
            name = %segment.name,
            nodes = segment.criteria.node_count(),
            "segment registered"
        );
        self.segments.insert(id, Arc::new(segment));
        Ok(id)
    }

    /// Ids of the segments `context` belongs to right now.
    pub fn evaluate_subject(&self, context: &dyn DataContext) -> Vec<Uuid> {
        self.evaluate_subject_at(context, Utc::now())
    }

    /// Ids of the segments `context` belongs to at `now`. Every segment is
    /// evaluated against the same instant.
    pub fn evaluate_subject_at(&self, context: &dyn DataContext, now: DateTime<Utc>) -> Vec<Uuid> {
        let evaluator = Evaluator::at(context, now);
        let memberships: Vec<Uuid> = self
            .segments
            .iter()
            .filter(|entry| evaluator.evaluate(&entry.value().criteria))
            .map(|entry| *entry.key())
            .collect();
        debug!(
            segments = self.segments.len(),
            matched = memberships.len(),
            "subject evaluated"
        );
        memberships
    }

    pub fn get_segment(&self, id: &Uuid) -> Option<Arc<Segment>> {
        self.segments.get(id).map(|s| s.value().clone())
    }

    pub fn list_segments(&self) -> Vec<Arc<Segment>> {
        self.segments.iter().map(|s| s.value().clone()).collect()
    }

    pub fn remove_segment(&self, id: &Uuid) -> Option<Arc<Segment>> {
        let removed = self.segments.remove(id).map(|(_, segment)| segment);
        if removed.is_some() {
            info!(segment_id = %id, "segment removed");
        }
        removed
    }
}

impl Default for SegmentationEngine {
    fn default() -> Self {
        Self::new(ParserConfig::default())
    }
}
