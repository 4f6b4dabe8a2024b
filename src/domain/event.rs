//! Event model carried by the [`crate::domain::event_bus::EventBus`].

use std::fmt;

/// Identifier of a stored link.
pub type LinkId = i64;

/// Closed set of event categories handlers subscribe to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    LinkVisited,
}

impl EventKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::LinkVisited => "link_visited",
        }
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// An immutable event published on the bus.
///
/// Each variant carries its own payload. Events are plain values: publishing
/// clones them once per subscriber and nothing keeps them after dispatch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Event {
    /// A short link was resolved and the client is being redirected.
    LinkVisited { link_id: LinkId },
}

impl Event {
    pub fn link_visited(link_id: LinkId) -> Self {
        Self::LinkVisited { link_id }
    }

    /// Returns the category subscribers are matched against.
    pub fn kind(&self) -> EventKind {
        match self {
            Self::LinkVisited { .. } => EventKind::LinkVisited,
        }
    }
}
