//! Data sources: named paths from a root scope (installation, user, event)
//! down to the value a criterion tests.
//!
//! A source only knows its parent, never its children. Parents are built
//! first and are immutable, so following `parent` always reaches a root.

use std::fmt;
use std::sync::Arc;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SourceKind {
    Installation,
    User,
    /// The event currently being joined.
    Event,
    LastActivityDate,
    /// A custom field, relative to the parent scope or field.
    Field(Vec<String>),
    /// When the presence-tested parent last changed.
    PresenceSinceDate,
    /// Time elapsed since the presence-tested parent last changed.
    PresenceElapsedTime,
    GeoLocation,
    GeoDate,
}

#[derive(Debug, Clone, PartialEq)]
pub struct DataSource {
    kind: SourceKind,
    parent: Option<Arc<DataSource>>,
}

impl DataSource {
    pub fn installation() -> Arc<Self> {
        Self::root(SourceKind::Installation)
    }

    pub fn user() -> Arc<Self> {
        Self::root(SourceKind::User)
    }

    pub fn event() -> Arc<Self> {
        Self::root(SourceKind::Event)
    }

    pub fn last_activity_date(parent: Arc<Self>) -> Arc<Self> {
        Self::child(SourceKind::LastActivityDate, parent)
    }

    pub fn field(parent: Arc<Self>, path: Vec<String>) -> Arc<Self> {
        Self::child(SourceKind::Field(path), parent)
    }

    pub fn presence_since_date(parent: Arc<Self>) -> Arc<Self> {
        Self::child(SourceKind::PresenceSinceDate, parent)
    }

    pub fn presence_elapsed_time(parent: Arc<Self>) -> Arc<Self> {
        Self::child(SourceKind::PresenceElapsedTime, parent)
    }

    pub fn geo_location(parent: Arc<Self>) -> Arc<Self> {
        Self::child(SourceKind::GeoLocation, parent)
    }

    pub fn geo_date(parent: Arc<Self>) -> Arc<Self> {
        Self::child(SourceKind::GeoDate, parent)
    }

    fn root(kind: SourceKind) -> Arc<Self> {
        Arc::new(Self { kind, parent: None })
    }

    fn child(kind: SourceKind, parent: Arc<Self>) -> Arc<Self> {
        Arc::new(Self {
            kind,
            parent: Some(parent),
        })
    }

    pub fn kind(&self) -> &SourceKind {
        &self.kind
    }

    pub fn parent(&self) -> Option<&Arc<DataSource>> {
        self.parent.as_ref()
    }

    pub fn name(&self) -> String {
        match &self.kind {
            SourceKind::Installation => "installation".to_string(),
            SourceKind::User => "user".to_string(),
            SourceKind::Event => "event".to_string(),
            SourceKind::LastActivityDate => "lastActivityDate".to_string(),
            SourceKind::Field(path) => path.join("."),
            SourceKind::PresenceSinceDate => "presence.sinceDate".to_string(),
            SourceKind::PresenceElapsedTime => "presence.elapsedTime".to_string(),
            SourceKind::GeoLocation => "geo.location".to_string(),
            SourceKind::GeoDate => "geo.date".to_string(),
        }
    }

    pub fn is_root(&self) -> bool {
        self.parent.is_none()
    }

    /// The scope this source is ultimately read from.
    pub fn root_source(&self) -> &DataSource {
        let mut current = self;
        while let Some(parent) = &current.parent {
            current = parent;
        }
        current
    }

    /// Values of this source are instants.
    pub fn is_date(&self) -> bool {
        matches!(
            self.kind,
            SourceKind::LastActivityDate | SourceKind::PresenceSinceDate | SourceKind::GeoDate
        )
    }

    /// Values of this source are elapsed durations.
    pub fn is_duration(&self) -> bool {
        self.kind == SourceKind::PresenceElapsedTime
    }

    /// Names from the root down to this source, joined by `.`.
    pub fn path(&self) -> String {
        match &self.parent {
            Some(parent) => format!("{}.{}", parent.path(), self.name()),
            None => self.name(),
        }
    }
}

impl fmt::Display for DataSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.path())
    }
}
