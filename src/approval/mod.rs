//! Pending remediations waiting for a human decision.

pub mod runtime;

use std::collections::VecDeque;

use crate::actions::RemediationAction;
use crate::error::{RemediationError, Result};

#[derive(Debug, Clone, PartialEq)]
pub struct PendingAction {
    pub id: u64,
    pub action: RemediationAction,
}

/// FIFO of proposed actions. Ids start at 1 and are never reused within
/// a session. Duplicates across probe ticks are kept as separate entries.
#[derive(Debug)]
pub struct ApprovalQueue {
    entries: VecDeque<PendingAction>,
    next_id: u64,
}

impl ApprovalQueue {
    pub fn new() -> Self {
        Self {
            entries: VecDeque::new(),
            next_id: 1,
        }
    }

    /// Queues `action` and returns its id. An action with blank source is
    /// refused.
    pub fn enqueue(&mut self, action: RemediationAction) -> Result<u64> {
        if action.source.trim().is_empty() {
            return Err(RemediationError::InvalidSource {
                line: 1,
                reason: "empty script".to_string(),
            });
        }
        let id = self.next_id;
        self.next_id += 1;
        self.entries.push_back(PendingAction { id, action });
        Ok(id)
    }

    /// Entries in enqueue order.
    pub fn entries(&self) -> impl Iterator<Item = &PendingAction> {
        self.entries.iter()
    }

    pub fn get(&self, id: u64) -> Option<&PendingAction> {
        self.entries.iter().find(|e| e.id == id)
    }

    pub fn oldest_id(&self) -> Option<u64> {
        self.entries.front().map(|e| e.id)
    }

    /// Removes the entry for execution.
    pub fn take(&mut self, id: u64) -> Result<PendingAction> {
        let index = self
            .entries
            .iter()
            .position(|e| e.id == id)
            .ok_or(RemediationError::UnknownEntry(id))?;
        self.entries
            .remove(index)
            .ok_or(RemediationError::UnknownEntry(id))
    }

    /// Discards the entry without running it.
    pub fn reject(&mut self, id: u64) -> Result<RemediationAction> {
        self.take(id).map(|e| e.action)
    }

    /// Drops every pending entry, returning how many there were.
    pub fn clear(&mut self) -> usize {
        let n = self.entries.len();
        self.entries.clear();
        n
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl Default for ApprovalQueue {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::actions::ActionKind;

    fn action(description: &str) -> RemediationAction {
        RemediationAction {
            description: description.to_string(),
            kind: ActionKind::CleanupTemp,
            source: "echo hi\n".to_string(),
        }
    }

    #[test]
    fn test_fifo_with_increasing_ids() {
        let mut q = ApprovalQueue::new();
        assert_eq!(q.enqueue(action("a")).unwrap(), 1);
        assert_eq!(q.enqueue(action("b")).unwrap(), 2);
        assert_eq!(q.enqueue(action("a")).unwrap(), 3);

        let order: Vec<_> = q.entries().map(|e| e.action.description.as_str()).collect();
        assert_eq!(order, vec!["a", "b", "a"]);
        assert_eq!(q.oldest_id(), Some(1));
    }

    #[test]
    fn test_empty_source_refused() {
        let mut q = ApprovalQueue::new();
        let mut blank = action("blank");
        blank.source = "  \n".to_string();
        assert_eq!(
            q.enqueue(blank),
            Err(RemediationError::InvalidSource {
                line: 1,
                reason: "empty script".to_string()
            })
        );
        assert!(q.is_empty());
        // The refused action did not consume an id
        assert_eq!(q.enqueue(action("a")).unwrap(), 1);
    }

    #[test]
    fn test_take_and_reject() {
        let mut q = ApprovalQueue::new();
        q.enqueue(action("a")).unwrap();
        q.enqueue(action("b")).unwrap();

        assert_eq!(q.reject(1).unwrap().description, "a");
        assert_eq!(q.reject(1), Err(RemediationError::UnknownEntry(1)));
        assert_eq!(q.take(2).unwrap().action.description, "b");
        assert!(q.take(2).is_err());
        assert!(q.is_empty());

        // Ids are not reused
        assert_eq!(q.enqueue(action("c")).unwrap(), 3);
    }

    #[test]
    fn test_clear() {
        let mut q = ApprovalQueue::new();
        q.enqueue(action("a")).unwrap();
        q.enqueue(action("b")).unwrap();
        assert_eq!(q.clear(), 2);
        assert_eq!(q.len(), 0);
        assert!(q.get(1).is_none());
    }
}
