//! Watch events for a single named resource.

/// One change observed on a watched resource.
///
/// Deletion is its own variant carrying the last-known state, so a predicate
/// cannot mistake a deleted object for a live one.
#[derive(Debug, Clone, PartialEq)]
pub enum WatchEvent<T> {
    /// The object was added or modified.
    Updated(T),
    /// The object was deleted; carries its last-known state.
    Deleted(T),
}

impl<T> WatchEvent<T> {
    /// The object carried by this event, live or last-known.
    pub fn object(&self) -> &T {
        match self {
            Self::Updated(obj) | Self::Deleted(obj) => obj,
        }
    }

    /// Consume the event and return its object.
    pub fn into_object(self) -> T {
        match self {
            Self::Updated(obj) | Self::Deleted(obj) => obj,
        }
    }

    /// Returns true for the deletion event.
    pub fn is_deleted(&self) -> bool {
        matches!(self, Self::Deleted(_))
    }

    /// Transform the carried object, keeping the variant.
    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> WatchEvent<U> {
        match self {
            Self::Updated(obj) => WatchEvent::Updated(f(obj)),
            Self::Deleted(obj) => WatchEvent::Deleted(f(obj)),
        }
    }

    /// Like [`WatchEvent::map`] for fallible transforms such as decoding.
    pub fn try_map<U, E>(self, f: impl FnOnce(T) -> Result<U, E>) -> Result<WatchEvent<U>, E> {
        Ok(match self {
            Self::Updated(obj) => WatchEvent::Updated(f(obj)?),
            Self::Deleted(obj) => WatchEvent::Deleted(f(obj)?),
        })
    }
}
