//! Repository for the graph tables (`graph_models`, `graph_twins`,
//! `graph_relationships`).
//!
//! All writes are create-or-replace so replaying an import after a crash
//! converges on the same stored state.

use sqlx::PgPool;

use crate::models::graph::{ModelRow, RelationshipRow, TwinRow, UpsertRelationship};

/// Fresh weak etag generated server-side.
const NEW_ETAG: &str = "'W/\"' || gen_random_uuid()::text || '\"'";

/// Provides storage operations for models, twins and relationships.
pub struct GraphRepo;

impl GraphRepo {
    /// Return which of `ids` already exist as models.
    pub async fn existing_model_ids(
        pool: &PgPool,
        ids: &[String],
    ) -> Result<Vec<String>, sqlx::Error> {
        sqlx::query_scalar::<_, String>("SELECT id FROM graph_models WHERE id = ANY($1)")
            .bind(ids)
            .fetch_all(pool)
            .await
    }

    /// Write a batch of models in one transaction, in the given order.
    ///
    /// Either every model is written or none is.
    pub async fn upsert_models(
        pool: &PgPool,
        models: &[(String, serde_json::Value)],
    ) -> Result<u64, sqlx::Error> {
        let mut tx = pool.begin().await?;
        for (id, model) in models {
            sqlx::query(
                "INSERT INTO graph_models (id, model) VALUES ($1, $2) \
                 ON CONFLICT (id) DO UPDATE SET model = EXCLUDED.model, uploaded_at = NOW()",
            )
            .bind(id)
            .bind(model)
            .execute(&mut *tx)
            .await?;
        }
        tx.commit().await?;
        Ok(models.len() as u64)
    }

    pub async fn find_model(pool: &PgPool, id: &str) -> Result<Option<ModelRow>, sqlx::Error> {
        sqlx::query_as::<_, ModelRow>(
            "SELECT id, model, uploaded_at FROM graph_models WHERE id = $1",
        )
        .bind(id)
        .fetch_optional(pool)
        .await
    }

    pub async fn model_exists(pool: &PgPool, id: &str) -> Result<bool, sqlx::Error> {
        sqlx::query_scalar::<_, bool>("SELECT EXISTS (SELECT 1 FROM graph_models WHERE id = $1)")
            .bind(id)
            .fetch_one(pool)
            .await
    }

    pub async fn twin_exists(pool: &PgPool, id: &str) -> Result<bool, sqlx::Error> {
        sqlx::query_scalar::<_, bool>("SELECT EXISTS (SELECT 1 FROM graph_twins WHERE id = $1)")
            .bind(id)
            .fetch_one(pool)
            .await
    }

    /// Create or replace a twin. Returns the new etag.
    pub async fn upsert_twin(
        pool: &PgPool,
        id: &str,
        model_id: Option<&str>,
        twin: &serde_json::Value,
    ) -> Result<String, sqlx::Error> {
        let query = format!(
            "INSERT INTO graph_twins (id, model_id, twin, etag) VALUES ($1, $2, $3, {NEW_ETAG}) \
             ON CONFLICT (id) DO UPDATE SET \
                 model_id = EXCLUDED.model_id, twin = EXCLUDED.twin, \
                 etag = EXCLUDED.etag, updated_at = NOW() \
             RETURNING etag"
        );
        sqlx::query_scalar::<_, String>(&query)
            .bind(id)
            .bind(model_id)
            .bind(twin)
            .fetch_one(pool)
            .await
    }

    pub async fn find_twin(pool: &PgPool, id: &str) -> Result<Option<TwinRow>, sqlx::Error> {
        sqlx::query_as::<_, TwinRow>(
            "SELECT id, model_id, twin, etag, updated_at FROM graph_twins WHERE id = $1",
        )
        .bind(id)
        .fetch_optional(pool)
        .await
    }

    /// Create or replace a relationship. Returns the new etag.
    pub async fn upsert_relationship(
        pool: &PgPool,
        input: &UpsertRelationship<'_>,
    ) -> Result<String, sqlx::Error> {
        let query = format!(
            "INSERT INTO graph_relationships \
                 (source_id, relationship_id, target_id, name, relationship, etag) \
             VALUES ($1, $2, $3, $4, $5, {NEW_ETAG}) \
             ON CONFLICT (source_id, relationship_id) DO UPDATE SET \
                 target_id = EXCLUDED.target_id, name = EXCLUDED.name, \
                 relationship = EXCLUDED.relationship, etag = EXCLUDED.etag, \
                 updated_at = NOW() \
             RETURNING etag"
        );
        sqlx::query_scalar::<_, String>(&query)
            .bind(input.source_id)
            .bind(input.relationship_id)
            .bind(input.target_id)
            .bind(input.name)
            .bind(input.relationship)
            .fetch_one(pool)
            .await
    }

    pub async fn find_relationship(
        pool: &PgPool,
        source_id: &str,
        relationship_id: &str,
    ) -> Result<Option<RelationshipRow>, sqlx::Error> {
        sqlx::query_as::<_, RelationshipRow>(
            "SELECT source_id, relationship_id, target_id, name, relationship, etag, updated_at \
             FROM graph_relationships WHERE source_id = $1 AND relationship_id = $2",
        )
        .bind(source_id)
        .bind(relationship_id)
        .fetch_optional(pool)
        .await
    }
}
