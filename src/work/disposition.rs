/// Verdict returned by an execution unit about the item it just processed.
///
/// Every variant may carry an optional note that is surfaced through the
/// per-item notification hook. The default verdict is [`Disposition::Next`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Disposition {
    /// The item succeeded; drop it and advance to the next one.
    Next(Option<String>),
    /// Re-attempt the identical item on the same worker.
    RetrySame(Option<String>),
    /// Requeue the item at the backlog tail and advance to a different item.
    RetryOther(Option<String>),
    /// Terminal failure for this worker. The item is requeued so another
    /// worker may still attempt it; the pool as a whole continues.
    Abort(Option<String>),
}

impl Default for Disposition {
    fn default() -> Self {
        Disposition::Next(None)
    }
}

impl Disposition {
    pub fn next() -> Self {
        Disposition::Next(None)
    }

    pub fn retry_same() -> Self {
        Disposition::RetrySame(None)
    }

    pub fn retry_other() -> Self {
        Disposition::RetryOther(None)
    }

    pub fn abort(note: impl Into<String>) -> Self {
        Disposition::Abort(Some(note.into()))
    }

    /// Note attached by the execution unit, if any.
    pub fn note(&self) -> Option<&str> {
        match self {
            Disposition::Next(note)
            | Disposition::RetrySame(note)
            | Disposition::RetryOther(note)
            | Disposition::Abort(note) => note.as_deref(),
        }
    }

    /// Whether this verdict terminates the worker that produced it.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Disposition::Abort(_))
    }
}
