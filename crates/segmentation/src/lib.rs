//! Audience segmentation: parses JSON criteria into a typed tree and
//! evaluates it against installation, user and event data.

pub mod context;
pub mod criteria;
pub mod datasource;
pub mod engine;
pub mod evaluator;
pub mod parser;
pub mod predicates;
pub mod resolver;
pub mod value;

pub use context::ParsingContext;
pub use criteria::{Criterion, CriterionNode};
pub use datasource::{DataSource, SourceKind};
pub use engine::{Segment, SegmentationEngine};
pub use evaluator::{evaluate, Evaluator};
pub use parser::{parse_criteria, SegmentationParser};
pub use predicates::ComparisonOperator;
pub use resolver::{DataContext, Datum, SourceResolver};
pub use value::ValueNode;
