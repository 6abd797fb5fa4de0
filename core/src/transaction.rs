//! Grouping several operations into one undo step.
//!
//! While a transaction is open, staged operations are applied immediately
//! but not recorded individually. Committing wraps them into a single
//! [`OperationKind::Transaction`] operation; one undo reverts the whole group.

use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::id::TransactionId;
use crate::operation::{Operation, OperationData, OperationKind, now_millis};

/// A named group of operations.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Transaction {
    pub id: TransactionId,
    pub name: String,
    pub timestamp: i64,
    pub operations: Vec<Operation>,
}

impl Transaction {
    /// Builds a closed transaction, stamping each operation with its id.
    pub fn new(name: impl Into<String>, operations: Vec<Operation>) -> Self {
        let mut txn = Self::open(name.into());
        for op in operations {
            txn.push(op);
        }
        txn
    }

    fn open(name: String) -> Self {
        Self {
            id: TransactionId::new(),
            name,
            timestamp: now_millis(),
            operations: Vec::new(),
        }
    }

    /// Appends an operation, stamping it with this transaction's id.
    pub(crate) fn push(&mut self, mut op: Operation) {
        op.batch_id = Some(self.id);
        self.operations.push(op);
    }

    pub fn is_empty(&self) -> bool {
        self.operations.is_empty()
    }

    /// Wraps the transaction as a single operation for the history.
    pub fn into_operation(self) -> Operation {
        let description = self.name.clone();
        let txn = Arc::new(self);
        Operation::new(
            OperationKind::Transaction,
            OperationData::Transaction(txn.clone()),
            OperationData::Transaction(txn),
            None,
        )
        .with_description(description)
    }
}

/// Misuse of the transaction API.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum TransactionError {
    #[error("transaction '{0}' is already open")]
    AlreadyOpen(String),
    #[error("no transaction is open")]
    NotOpen,
}

/// Tracks the single open transaction.
#[derive(Debug, Default)]
pub struct TransactionCoordinator {
    open: Option<Transaction>,
}

impl TransactionCoordinator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Opens a transaction. Only one may be open at a time.
    pub fn start(&mut self, name: impl Into<String>) -> Result<TransactionId, TransactionError> {
        if let Some(open) = &self.open {
            return Err(TransactionError::AlreadyOpen(open.name.clone()));
        }
        let txn = Transaction::open(name.into());
        let id = txn.id;
        self.open = Some(txn);
        Ok(id)
    }

    /// Stages an operation in the open transaction.
    pub fn stage(&mut self, op: Operation) -> Result<(), TransactionError> {
        let txn = self.open.as_mut().ok_or(TransactionError::NotOpen)?;
        txn.push(op);
        Ok(())
    }

    /// Closes the open transaction and returns it.
    pub fn finish(&mut self) -> Result<Transaction, TransactionError> {
        self.open.take().ok_or(TransactionError::NotOpen)
    }

    pub fn is_open(&self) -> bool {
        self.open.is_some()
    }

    pub fn current(&self) -> Option<&Transaction> {
        self.open.as_ref()
    }

    pub fn current_id(&self) -> Option<TransactionId> {
        self.open.as_ref().map(|t| t.id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::layer::ActiveLayers;

    fn noop() -> Operation {
        Operation::new(
            OperationKind::SetActiveLayer,
            OperationData::SetActive(ActiveLayers::default()),
            OperationData::SetActive(ActiveLayers::default()),
            None,
        )
    }

    #[test]
    fn single_open_transaction() {
        let mut coordinator = TransactionCoordinator::new();
        let id = coordinator.start("Draw").unwrap();
        assert_eq!(coordinator.current_id(), Some(id));
        assert_eq!(
            coordinator.start("Other"),
            Err(TransactionError::AlreadyOpen("Draw".into()))
        );
    }

    #[test]
    fn staged_operations_carry_batch_id() {
        let mut coordinator = TransactionCoordinator::new();
        let id = coordinator.start("Draw").unwrap();
        coordinator.stage(noop()).unwrap();
        coordinator.stage(noop()).unwrap();

        let txn = coordinator.finish().unwrap();
        assert_eq!(txn.operations.len(), 2);
        assert!(txn.operations.iter().all(|op| op.batch_id == Some(id)));
        assert!(!coordinator.is_open());
    }

    #[test]
    fn stage_without_transaction_fails() {
        let mut coordinator = TransactionCoordinator::new();
        assert_eq!(coordinator.stage(noop()), Err(TransactionError::NotOpen));
        assert_eq!(coordinator.finish().unwrap_err(), TransactionError::NotOpen);
    }

    #[test]
    fn wrapped_operation_uses_name() {
        let op = Transaction::new("Paste", vec![noop()]).into_operation();
        assert_eq!(op.kind, OperationKind::Transaction);
        assert_eq!(op.description, "Paste");
        match &op.forward {
            OperationData::Transaction(txn) => assert_eq!(txn.operations.len(), 1),
            other => panic!("unexpected forward data: {other:?}"),
        }
    }
}
