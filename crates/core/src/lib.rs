pub mod config;
pub mod duration;
pub mod error;
pub mod geo;
pub mod types;

pub use config::{AppConfig, ParserConfig};
pub use duration::ISO8601Duration;
pub use error::{BadInputError, SegmenterError, SegmenterResult};
pub use geo::{GeoArea, GeoBox, GeoCircle, GeoLocation};
pub use types::{Record, Subject, SubscriptionStatus};
