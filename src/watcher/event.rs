use std::path::PathBuf;
use std::time::SystemTime;

use notify::EventKind;
use notify::event::{ModifyKind, RenameMode};

/// What happened to a path.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChangeKind {
    Create,
    Modify,
    Delete,
}

/// One filesystem change, before debouncing.
#[derive(Debug, Clone)]
pub struct ChangeEvent {
    pub path: PathBuf,
    pub kind: ChangeKind,
    pub timestamp: SystemTime,
}

impl ChangeKind {
    /// Map a raw notify event kind. Access and metadata-only events map to `None`.
    ///
    /// Renames carry no reliable direction on every backend, so `exists` (the
    /// path's presence after the event) decides between create and delete.
    pub fn from_notify(kind: &EventKind, exists: bool) -> Option<Self> {
        match kind {
            EventKind::Create(_) => Some(Self::Create),
            EventKind::Remove(_) => Some(Self::Delete),
            EventKind::Modify(ModifyKind::Metadata(_)) => None,
            EventKind::Modify(ModifyKind::Name(RenameMode::From)) => Some(Self::Delete),
            EventKind::Modify(ModifyKind::Name(RenameMode::To)) => Some(Self::Create),
            EventKind::Modify(ModifyKind::Name(_)) => {
                Some(if exists { Self::Create } else { Self::Delete })
            }
            EventKind::Modify(_) | EventKind::Any => Some(Self::Modify),
            EventKind::Access(_) | EventKind::Other => None,
        }
    }
}
