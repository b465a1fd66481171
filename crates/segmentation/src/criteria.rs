//! Parsed criterion tree.

use std::sync::Arc;

use segmenter_core::{GeoArea, SubscriptionStatus};

use crate::context::ParsingContext;
use crate::datasource::DataSource;
use crate::predicates::ComparisonOperator;
use crate::value::ValueNode;

/// One criterion of a segmentation rule. Nodes are built once by the parser
/// and never mutated; `context` records where in the document they came
/// from.
#[derive(Debug, Clone, PartialEq)]
pub struct CriterionNode {
    pub context: ParsingContext,
    pub criterion: Criterion,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Criterion {
    MatchAll,
    And(Vec<CriterionNode>),
    Or(Vec<CriterionNode>),
    Not(Box<CriterionNode>),
    Equality {
        source: Arc<DataSource>,
        value: ValueNode,
    },
    Any {
        source: Arc<DataSource>,
        values: Vec<ValueNode>,
    },
    All {
        source: Arc<DataSource>,
        values: Vec<ValueNode>,
    },
    Comparison {
        source: Arc<DataSource>,
        operator: ComparisonOperator,
        value: ValueNode,
    },
    Prefix {
        source: Arc<DataSource>,
        prefix: String,
    },
    Inside {
        source: Arc<DataSource>,
        area: GeoArea,
    },
    Presence {
        source: Arc<DataSource>,
        present: bool,
        /// Applies to `presence.sinceDate` below `source`.
        since_date: Option<Box<CriterionNode>>,
        /// Applies to `presence.elapsedTime` below `source`.
        elapsed_time: Option<Box<CriterionNode>>,
    },
    /// Matches when at least one of the subject's events matches.
    Join(Box<CriterionNode>),
    SubscriptionStatus {
        source: Arc<DataSource>,
        status: SubscriptionStatus,
    },
}

impl CriterionNode {
    pub fn new(context: ParsingContext, criterion: Criterion) -> Self {
        Self { context, criterion }
    }

    pub fn children(&self) -> Vec<&CriterionNode> {
        match &self.criterion {
            Criterion::And(children) | Criterion::Or(children) => children.iter().collect(),
            Criterion::Not(child) | Criterion::Join(child) => vec![child.as_ref()],
            Criterion::Presence {
                since_date,
                elapsed_time,
                ..
            } => since_date
                .iter()
                .chain(elapsed_time.iter())
                .map(|child| child.as_ref())
                .collect(),
            _ => Vec::new(),
        }
    }

    pub fn node_count(&self) -> usize {
        1 + self
            .children()
            .into_iter()
            .map(CriterionNode::node_count)
            .sum::<usize>()
    }

    pub fn depth(&self) -> usize {
        1 + self
            .children()
            .into_iter()
            .map(CriterionNode::depth)
            .max()
            .unwrap_or(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use segmenter_core::ParserConfig;

    fn leaf() -> CriterionNode {
        CriterionNode::new(
            ParsingContext::new(ParserConfig::default()),
            Criterion::MatchAll,
        )
    }

    #[test]
    fn test_counts() {
        let ctx = ParsingContext::new(ParserConfig::default());
        let presence = CriterionNode::new(
            ctx.clone(),
            Criterion::Presence {
                source: ctx.source().clone(),
                present: true,
                since_date: Some(Box::new(leaf())),
                elapsed_time: None,
            },
        );
        let tree = CriterionNode::new(
            ctx,
            Criterion::And(vec![
                leaf(),
                CriterionNode::new(leaf().context, Criterion::Not(Box::new(presence))),
            ]),
        );
        assert_eq!(tree.node_count(), 5);
        assert_eq!(tree.depth(), 4);
        assert_eq!(leaf().depth(), 1);
    }

    #[test]
    fn test_tree_is_shareable() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<CriterionNode>();
    }
}
