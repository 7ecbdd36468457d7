//! Graph store client used by the batch processor.

use async_trait::async_trait;

use crate::error::GraphError;

#[async_trait]
pub trait GraphClient: Send + Sync {
    /// Create a set of models as one dependency-ordered, all-or-nothing
    /// batch. Returns the number of models written.
    async fn create_models_batch(&self, models: &[String]) -> Result<u64, GraphError>;

    async fn create_or_replace_twin(
        &self,
        twin_id: &str,
        twin: &serde_json::Value,
    ) -> Result<(), GraphError>;

    async fn create_or_replace_relationship(
        &self,
        source_id: &str,
        relationship_id: &str,
        relationship: &serde_json::Value,
    ) -> Result<(), GraphError>;
}

/// `$metadata.$model` of a twin, if present.
pub fn twin_model_id(twin: &serde_json::Value) -> Option<&str> {
    twin.get("$metadata")
        .and_then(|m| m.get("$model"))
        .and_then(|v| v.as_str())
}

/// `$targetId` of a relationship.
pub fn relationship_target_id(relationship: &serde_json::Value) -> Result<&str, GraphError> {
    relationship
        .get("$targetId")
        .and_then(|v| v.as_str())
        .filter(|s| !s.is_empty())
        .ok_or_else(|| GraphError::Invalid {
            kind: "relationship",
            reason: "missing string $targetId".into(),
        })
}

/// `$relationshipName` of a relationship, if present.
pub fn relationship_name(relationship: &serde_json::Value) -> Option<&str> {
    relationship.get("$relationshipName").and_then(|v| v.as_str())
}
