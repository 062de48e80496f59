use std::collections::HashMap;
use std::fmt;

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tracing::debug;
use uuid::Uuid;

use crate::blob::Blob;

const HANDLE_SCHEME: &str = "blob:pdfview/";

/// Short-lived reference a renderer uses to reach a blob's bytes.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DisplayHandle(String);

impl DisplayHandle {
    fn mint() -> Self {
        Self(format!("{}{}", HANDLE_SCHEME, Uuid::new_v4()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for DisplayHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Handle table shared between the session, which creates and revokes
/// handles, and the renderer, which resolves them.
#[derive(Default)]
pub struct ObjectUrlRegistry {
    entries: Mutex<HashMap<DisplayHandle, Blob>>,
}

impl ObjectUrlRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn create(&self, blob: &Blob) -> DisplayHandle {
        let handle = DisplayHandle::mint();
        self.entries.lock().insert(handle.clone(), blob.clone());
        debug!(%handle, name = blob.name(), "created display handle");
        handle
    }

    pub fn resolve(&self, handle: &DisplayHandle) -> Option<Blob> {
        self.entries.lock().get(handle).cloned()
    }

    /// Returns false when the handle was already revoked or never existed.
    pub fn revoke(&self, handle: &DisplayHandle) -> bool {
        let removed = self.entries.lock().remove(handle).is_some();
        if removed {
            debug!(%handle, "revoked display handle");
        }
        removed
    }

    pub fn live_handles(&self) -> usize {
        self.entries.lock().len()
    }
}
