use serde::Serialize;
use uuid::Uuid;

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct BatchFailure {
    pub id: Uuid,
    pub reason: String,
}

/// Result of a multi-document operation. Each item succeeds or fails on its
/// own; there is no cross-document atomicity.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct BatchReport<T> {
    pub succeeded: Vec<T>,
    pub failed: Vec<BatchFailure>,
}

impl<T> BatchReport<T> {
    pub fn new() -> Self {
        Self {
            succeeded: Vec::new(),
            failed: Vec::new(),
        }
    }

    pub fn fail(&mut self, id: Uuid, reason: impl Into<String>) {
        self.failed.push(BatchFailure {
            id,
            reason: reason.into(),
        });
    }
}

impl<T> Default for BatchReport<T> {
    fn default() -> Self {
        Self::new()
    }
}
