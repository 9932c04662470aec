//! Resumable drafts of the registration form
//!
//! Only non-sensitive data is persisted: password fields are blanked before every
//! write, so a restored draft always needs the credentials re-entered.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::form::{FormData, StepKind};
use crate::store::{KeyValueStore, StoreError};

pub const DRAFT_KEY: &str = "registration.draft";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Draft {
    pub saved_at: DateTime<Utc>,
    pub current_step: StepKind,
    pub completed: Vec<StepKind>,
    pub data: FormData,
}

impl Draft {
    pub fn new(current_step: StepKind, completed: Vec<StepKind>, data: &FormData) -> Self {
        Self {
            saved_at: Utc::now(),
            current_step,
            completed,
            data: data.without_credentials(),
        }
    }

    /// True when nothing worth resuming was entered
    pub fn is_blank(&self) -> bool {
        self.completed.is_empty() && self.data == FormData::default()
    }
}

#[derive(Clone)]
pub struct DraftStore {
    store: Arc<dyn KeyValueStore>,
}

impl DraftStore {
    pub fn new(store: Arc<dyn KeyValueStore>) -> Self {
        Self { store }
    }

    pub fn load(&self) -> Result<Option<Draft>, StoreError> {
        self.store.get_as::<Draft>(DRAFT_KEY)
    }

    pub fn save(&self, draft: &Draft) -> Result<(), StoreError> {
        let sanitized = Draft {
            data: draft.data.without_credentials(),
            ..draft.clone()
        };
        self.store.set_as(DRAFT_KEY, &sanitized)
    }

    pub fn clear(&self) -> Result<(), StoreError> {
        self.store.remove(DRAFT_KEY)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::{FileStore, MemoryStore};
    use tempfile::TempDir;

    fn filled() -> FormData {
        FormData {
            first_name: "Ada".to_string(),
            username: "ada_lovelace".to_string(),
            password: "Secure@Pass123".to_string(),
            confirm_password: "Secure@Pass123".to_string(),
            ..Default::default()
        }
    }

    #[test]
    fn test_draft_never_contains_password() {
        let temp_dir = TempDir::new().unwrap();
        let store = Arc::new(FileStore::open(temp_dir.path()).unwrap());
        let drafts = DraftStore::new(store.clone());

        let mut draft = Draft::new(StepKind::Account, vec![StepKind::Personal], &filled());
        // a caller that puts credentials back is still sanitized on write
        draft.data.password = "Secure@Pass123".to_string();
        drafts.save(&draft).unwrap();

        let raw = std::fs::read_to_string(store.path()).unwrap();
        assert!(!raw.contains("Secure@Pass123"));

        let loaded = drafts.load().unwrap().unwrap();
        assert_eq!(loaded.data.username, "ada_lovelace");
        assert!(loaded.data.password.is_empty());
        assert!(loaded.data.confirm_password.is_empty());
        assert_eq!(loaded.current_step, StepKind::Account);
    }

    #[test]
    fn test_clear_removes_draft() {
        let drafts = DraftStore::new(Arc::new(MemoryStore::new()));
        drafts
            .save(&Draft::new(StepKind::Personal, vec![], &filled()))
            .unwrap();
        assert!(drafts.load().unwrap().is_some());
        drafts.clear().unwrap();
        assert!(drafts.load().unwrap().is_none());
    }

    #[test]
    fn test_blank_draft() {
        assert!(Draft::new(StepKind::Personal, vec![], &FormData::default()).is_blank());
        assert!(!Draft::new(StepKind::Personal, vec![], &filled()).is_blank());
    }
}
