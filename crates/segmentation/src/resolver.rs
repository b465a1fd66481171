//! Resolution of data-source chains against a subject's data.

use chrono::{DateTime, Utc};
use serde_json::Value;
use tracing::trace;

use segmenter_core::{GeoLocation, Record, Subject};

use crate::datasource::{DataSource, SourceKind};

/// Read-only view of a subject's data. The engine never mutates it.
pub trait DataContext {
    fn installation(&self) -> Option<&Record>;
    fn user(&self) -> Option<&Record>;
    fn events(&self) -> &[Record];
}

impl DataContext for Subject {
    fn installation(&self) -> Option<&Record> {
        self.installation.as_ref()
    }

    fn user(&self) -> Option<&Record> {
        self.user.as_ref()
    }

    fn events(&self) -> &[Record] {
        &self.events
    }
}

/// A resolved value.
#[derive(Debug, Clone, PartialEq)]
pub enum Datum<'a> {
    Json(&'a Value),
    /// Epoch milliseconds.
    Date(i64),
    /// Time between two instants, kept as endpoints so that it can be
    /// compared against calendar durations.
    Elapsed {
        since: i64,
        now: i64,
    },
    Location(GeoLocation),
}

#[derive(Debug, Clone, PartialEq)]
pub struct Observed<'a> {
    pub datum: Datum<'a>,
    /// When the value was last set, in epoch milliseconds, if known.
    pub changed_at: Option<i64>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Resolution<'a> {
    /// No value: missing scope, unknown field, `null`, or a parent that did
    /// not resolve to something this source can read from.
    Absent,
    Scope(&'a Record),
    Value(Observed<'a>),
}

/// Resolves data sources leaf to root: a source first resolves its parent,
/// then reads its own field out of whatever the parent resolved to.
#[derive(Clone, Copy)]
pub struct SourceResolver<'a> {
    context: &'a dyn DataContext,
    event: Option<&'a Record>,
    now: i64,
}

impl<'a> SourceResolver<'a> {
    pub fn new(context: &'a dyn DataContext, now: i64) -> Self {
        Self {
            context,
            event: None,
            now,
        }
    }

    /// Resolver in which the `event` scope is bound to `event`.
    pub fn for_event(&self, event: &'a Record) -> Self {
        Self {
            event: Some(event),
            ..*self
        }
    }

    pub fn context(&self) -> &'a dyn DataContext {
        self.context
    }

    pub fn now(&self) -> i64 {
        self.now
    }

    pub fn resolve(&self, source: &DataSource) -> Resolution<'a> {
        let resolution = match source.kind() {
            SourceKind::Installation => scope(self.context.installation()),
            SourceKind::User => scope(self.context.user()),
            SourceKind::Event => scope(self.event),
            SourceKind::LastActivityDate => match self.resolve_parent(source) {
                Resolution::Scope(record) => date(record.last_activity_date),
                _ => Resolution::Absent,
            },
            SourceKind::Field(_) => self.resolve_field(source),
            SourceKind::PresenceSinceDate => match self.parent_changed_at(source) {
                Some(since) => Resolution::Value(Observed {
                    datum: Datum::Date(since),
                    changed_at: Some(since),
                }),
                None => Resolution::Absent,
            },
            SourceKind::PresenceElapsedTime => match self.parent_changed_at(source) {
                Some(since) => Resolution::Value(Observed {
                    datum: Datum::Elapsed {
                        since,
                        now: self.now,
                    },
                    changed_at: Some(since),
                }),
                None => Resolution::Absent,
            },
            SourceKind::GeoLocation => match self.resolve_parent(source) {
                Resolution::Scope(Record {
                    location: Some(location),
                    location_date,
                    ..
                }) => Resolution::Value(Observed {
                    datum: Datum::Location(*location),
                    changed_at: location_date.map(|at| at.timestamp_millis()),
                }),
                _ => Resolution::Absent,
            },
            SourceKind::GeoDate => match self.resolve_parent(source) {
                Resolution::Scope(record) => date(record.location_date),
                _ => Resolution::Absent,
            },
        };
        if resolution == Resolution::Absent {
            trace!(source = %source, "data source resolved to no value");
        }
        resolution
    }

    /// Resolves `source` for a presence test. A scope is present while it has
    /// an active session, and changed when that session started.
    pub fn observe(&self, source: &DataSource) -> Option<Observed<'a>> {
        match self.resolve(source) {
            Resolution::Value(observed) => Some(observed),
            Resolution::Scope(record) => record.presence_since.map(|since| {
                let since = since.timestamp_millis();
                Observed {
                    datum: Datum::Date(since),
                    changed_at: Some(since),
                }
            }),
            Resolution::Absent => None,
        }
    }

    fn resolve_parent(&self, source: &DataSource) -> Resolution<'a> {
        match source.parent() {
            Some(parent) => self.resolve(parent),
            None => Resolution::Absent,
        }
    }

    fn parent_changed_at(&self, source: &DataSource) -> Option<i64> {
        source
            .parent()
            .and_then(|parent| self.observe(parent))
            .and_then(|observed| observed.changed_at)
    }

    /// Reads a field from the scope the field chain starts at. Nested
    /// `Field` sources are flattened into one dotted path so that the change
    /// date does not depend on how the path was split.
    fn resolve_field(&self, source: &DataSource) -> Resolution<'a> {
        let mut segments: Vec<String> = Vec::new();
        let mut current = source;
        while let SourceKind::Field(path) = current.kind() {
            segments.splice(0..0, path.iter().cloned());
            match current.parent() {
                Some(parent) => current = parent.as_ref(),
                None => return Resolution::Absent,
            }
        }
        match self.resolve(current) {
            Resolution::Scope(record) => match record.field(segments.as_slice()) {
                Some(value) => Resolution::Value(Observed {
                    datum: Datum::Json(value),
                    changed_at: record
                        .field_changed_at(&segments.join("."))
                        .map(|at| at.timestamp_millis()),
                }),
                None => Resolution::Absent,
            },
            _ => Resolution::Absent,
        }
    }
}

fn scope(record: Option<&Record>) -> Resolution<'_> {
    record.map_or(Resolution::Absent, Resolution::Scope)
}

fn date<'a>(at: Option<DateTime<Utc>>) -> Resolution<'a> {
    match at {
        Some(at) => {
            let millis = at.timestamp_millis();
            Resolution::Value(Observed {
                datum: Datum::Date(millis),
                changed_at: Some(millis),
            })
        }
        None => Resolution::Absent,
    }
}
