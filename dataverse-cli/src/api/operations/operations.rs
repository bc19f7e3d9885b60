//! Ordered collection of operations

use super::operation::Operation;
use serde::{Deserialize, Serialize};

/// An ordered list of operations, as loaded from an operations file or
/// assembled programmatically.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Operations(Vec<Operation>);

impl Operations {
    pub fn new() -> Self {
        Self(Vec::new())
    }

    pub fn push(&mut self, operation: Operation) {
        self.0.push(operation);
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Operation> {
        self.0.iter()
    }

    /// Split into chunks of at most `size` operations, preserving order.
    pub fn chunked(self, size: usize) -> Vec<Operations> {
        let size = size.max(1);
        self.0
            .chunks(size)
            .map(|chunk| Operations(chunk.to_vec()))
            .collect()
    }
}

impl From<Vec<Operation>> for Operations {
    fn from(operations: Vec<Operation>) -> Self {
        Self(operations)
    }
}

impl FromIterator<Operation> for Operations {
    fn from_iter<I: IntoIterator<Item = Operation>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

impl IntoIterator for Operations {
    type Item = Operation;
    type IntoIter = std::vec::IntoIter<Operation>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.into_iter()
    }
}
