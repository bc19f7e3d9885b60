//! Dataverse Operations Module
//!
//! This module provides a unified interface for Dataverse data operations
//! that can be executed individually or in batches.

pub mod batch;
pub mod operation;
pub mod operations;

pub use batch::{BatchRequest, BatchRequestBuilder, BatchResponseParser};
pub use operation::{Operation, OperationResult};
pub use operations::Operations;
