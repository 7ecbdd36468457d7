//! Row models for the graph tables.

use serde::Serialize;
use sqlx::FromRow;
use twingraph_core::types::Timestamp;

/// A row from the `graph_models` table.
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct ModelRow {
    pub id: String,
    pub model: serde_json::Value,
    pub uploaded_at: Timestamp,
}

/// A row from the `graph_twins` table.
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct TwinRow {
    pub id: String,
    pub model_id: Option<String>,
    pub twin: serde_json::Value,
    pub etag: String,
    pub updated_at: Timestamp,
}

/// A row from the `graph_relationships` table.
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct RelationshipRow {
    pub source_id: String,
    pub relationship_id: String,
    pub target_id: String,
    pub name: Option<String>,
    pub relationship: serde_json::Value,
    pub etag: String,
    pub updated_at: Timestamp,
}

/// DTO for upserting a relationship.
#[derive(Debug, Clone)]
pub struct UpsertRelationship<'a> {
    pub source_id: &'a str,
    pub relationship_id: &'a str,
    pub target_id: &'a str,
    pub name: Option<&'a str>,
    pub relationship: &'a serde_json::Value,
}
