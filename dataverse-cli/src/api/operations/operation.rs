//! Core Operation types for Dataverse data operations

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;

/// A single data operation that can be executed against Dataverse,
/// individually or as part of a batch.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum Operation {
    /// Create a new record
    Create {
        /// Entity set name (e.g., "contacts", "accounts")
        entity: String,
        /// Record data as JSON
        data: Value,
    },
    /// Update an existing record
    Update {
        /// Entity set name
        entity: String,
        /// Record ID (GUID)
        id: String,
        /// Updated field data as JSON
        data: Value,
    },
    /// Delete a record
    Delete {
        /// Entity set name
        entity: String,
        /// Record ID (GUID)
        id: String,
    },
    /// Upsert operation (create or update based on an alternate key)
    Upsert {
        /// Entity set name
        entity: String,
        /// Alternate key field (e.g., "emailaddress1")
        key_field: String,
        /// Key value to match against
        key_value: String,
        /// Record data as JSON
        data: Value,
    },
    /// Associate records via navigation property (N:N relationships using $ref)
    /// POST /entities(id)/navigation_property/$ref with body {"@odata.id": "target"}
    AssociateRef {
        /// Base entity set name (e.g., "accounts")
        entity: String,
        /// Entity ID (GUID)
        entity_ref: String,
        /// Navigation property name
        navigation_property: String,
        /// Target entity reference (e.g., "/contacts(guid)")
        target_ref: String,
    },
    /// Disassociate records via navigation property (remove N:N relationship)
    /// DELETE /entities(id)/navigation_property(target_id)/$ref
    DisassociateRef {
        /// Base entity set name
        entity: String,
        /// Entity ID (GUID)
        entity_ref: String,
        /// Navigation property name
        navigation_property: String,
        /// Target entity ID (GUID)
        target_id: String,
    },
    /// Invoke an arbitrary Web API action
    /// POST /{name} with the parameters as body
    Action {
        /// Action name (e.g., "WinOpportunity", "Merge")
        name: String,
        /// Action parameters as JSON
        #[serde(default)]
        parameters: Value,
    },
}

/// Caller-facing result of executing an Operation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OperationResult {
    /// The operation that was executed
    pub operation: Operation,
    /// Whether the operation succeeded
    pub success: bool,
    /// Response data (record ID for creates, updated record for updates, etc.)
    pub data: Option<Value>,
    /// Error message if the operation failed
    pub error: Option<String>,
    /// HTTP status code from the response
    pub status_code: Option<u16>,
    /// Response headers that might be useful (e.g., OData-EntityId)
    pub headers: HashMap<String, String>,
}

impl Operation {
    /// Create a new Create operation
    pub fn create(entity: impl Into<String>, data: Value) -> Self {
        Self::Create {
            entity: entity.into(),
            data,
        }
    }

    /// Create a new Update operation
    pub fn update(entity: impl Into<String>, id: impl Into<String>, data: Value) -> Self {
        Self::Update {
            entity: entity.into(),
            id: id.into(),
            data,
        }
    }

    /// Create a new Delete operation
    pub fn delete(entity: impl Into<String>, id: impl Into<String>) -> Self {
        Self::Delete {
            entity: entity.into(),
            id: id.into(),
        }
    }

    /// Create a new Upsert operation
    pub fn upsert(
        entity: impl Into<String>,
        key_field: impl Into<String>,
        key_value: impl Into<String>,
        data: Value,
    ) -> Self {
        Self::Upsert {
            entity: entity.into(),
            key_field: key_field.into(),
            key_value: key_value.into(),
            data,
        }
    }

    /// Create a new Action operation
    pub fn action(name: impl Into<String>, parameters: Value) -> Self {
        Self::Action {
            name: name.into(),
            parameters,
        }
    }

    /// Get the entity set name this operation addresses
    pub fn entity(&self) -> &str {
        match self {
            Self::Create { entity, .. } => entity,
            Self::Update { entity, .. } => entity,
            Self::Delete { entity, .. } => entity,
            Self::Upsert { entity, .. } => entity,
            Self::AssociateRef { entity, .. } => entity,
            Self::DisassociateRef { entity, .. } => entity,
            Self::Action { name, .. } => name,
        }
    }

    /// Get the HTTP method for this operation
    pub fn http_method(&self) -> &'static str {
        match self {
            Self::Create { .. } => "POST",
            Self::Update { .. } => "PATCH",
            Self::Delete { .. } => "DELETE",
            Self::Upsert { .. } => "PATCH", // Upsert uses PATCH with alternate-key addressing
            Self::AssociateRef { .. } => "POST",
            Self::DisassociateRef { .. } => "DELETE",
            Self::Action { .. } => "POST",
        }
    }

    /// Get the operation type as a string
    pub fn operation_type(&self) -> &'static str {
        match self {
            Self::Create { .. } => "create",
            Self::Update { .. } => "update",
            Self::Delete { .. } => "delete",
            Self::Upsert { .. } => "upsert",
            Self::AssociateRef { .. } => "associate_ref",
            Self::DisassociateRef { .. } => "disassociate_ref",
            Self::Action { .. } => "action",
        }
    }
}

impl OperationResult {
    /// Create a new successful result
    pub fn success(operation: Operation, data: Option<Value>) -> Self {
        Self {
            operation,
            success: true,
            data,
            error: None,
            status_code: Some(200),
            headers: HashMap::new(),
        }
    }

    /// Create a new error result
    pub fn error(operation: Operation, error: String, status_code: Option<u16>) -> Self {
        Self {
            operation,
            success: false,
            data: None,
            error: Some(error),
            status_code,
            headers: HashMap::new(),
        }
    }

    /// Check if this result represents a successful operation
    pub fn is_success(&self) -> bool {
        self.success
    }

    /// Get the result data, returning an error if the operation failed
    pub fn into_result(self) -> Result<Value, String> {
        if self.success {
            Ok(self.data.unwrap_or(Value::Null))
        } else {
            Err(self.error.unwrap_or_else(|| "Unknown error".to_string()))
        }
    }
}
