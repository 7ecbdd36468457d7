//! Dependency ordering for DTDL model batches.
//!
//! A model may depend on other models through `extends` and through the
//! `schema` of its `Component` contents. A batch is created dependencies
//! first; anything not resolvable inside the batch must already exist in
//! the store. Full DTDL validation is out of scope here.

use std::collections::{HashMap, HashSet};

/// Prefix of a digital twin model identifier.
pub const DTMI_PREFIX: &str = "dtmi:";

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ModelBatchError {
    #[error("Invalid model at position {index}: {reason}")]
    InvalidModel { index: usize, reason: String },

    #[error("Duplicate model id {0} in batch")]
    DuplicateModel(String),

    #[error("Model {model} depends on {dependency}, which is neither in the batch nor stored")]
    MissingDependency { model: String, dependency: String },

    #[error("Dependency cycle involving {0}")]
    DependencyCycle(String),
}

/// A parsed model line.
#[derive(Debug, Clone, PartialEq)]
pub struct ModelDescriptor {
    pub id: String,
    pub dependencies: Vec<String>,
    pub body: serde_json::Value,
}

/// Parse one raw model line and collect its dependencies.
pub fn parse_model(index: usize, raw: &str) -> Result<ModelDescriptor, ModelBatchError> {
    let body: serde_json::Value =
        serde_json::from_str(raw).map_err(|e| ModelBatchError::InvalidModel {
            index,
            reason: e.to_string(),
        })?;

    let id = body
        .get("@id")
        .and_then(|v| v.as_str())
        .ok_or_else(|| ModelBatchError::InvalidModel {
            index,
            reason: "missing string @id".into(),
        })?
        .to_string();

    let mut dependencies = Vec::new();
    match body.get("extends") {
        Some(serde_json::Value::String(s)) => dependencies.push(s.clone()),
        Some(serde_json::Value::Array(items)) => {
            dependencies.extend(items.iter().filter_map(|v| v.as_str().map(str::to_string)));
        }
        _ => {}
    }
    if let Some(contents) = body.get("contents").and_then(|v| v.as_array()) {
        for item in contents {
            if is_component(item) {
                if let Some(schema) = item.get("schema").and_then(|v| v.as_str()) {
                    dependencies.push(schema.to_string());
                }
            }
        }
    }
    dependencies.retain(|d| d.starts_with(DTMI_PREFIX) && d != &id);
    dependencies.dedup();

    Ok(ModelDescriptor {
        id,
        dependencies,
        body,
    })
}

fn is_component(item: &serde_json::Value) -> bool {
    match item.get("@type") {
        Some(serde_json::Value::String(t)) => t == "Component",
        Some(serde_json::Value::Array(types)) => types.iter().any(|t| t == "Component"),
        _ => false,
    }
}

/// Order a batch so every model comes after the models it depends on.
///
/// `is_stored` reports whether a dependency outside the batch already exists.
/// Ties keep input order.
pub fn order_models(
    models: Vec<ModelDescriptor>,
    is_stored: impl Fn(&str) -> bool,
) -> Result<Vec<ModelDescriptor>, ModelBatchError> {
    let mut index_of: HashMap<String, usize> = HashMap::with_capacity(models.len());
    for (i, m) in models.iter().enumerate() {
        if index_of.insert(m.id.clone(), i).is_some() {
            return Err(ModelBatchError::DuplicateModel(m.id.clone()));
        }
    }

    for m in &models {
        for dep in &m.dependencies {
            if !index_of.contains_key(dep) && !is_stored(dep) {
                return Err(ModelBatchError::MissingDependency {
                    model: m.id.clone(),
                    dependency: dep.clone(),
                });
            }
        }
    }

    // Depth-first post-order over in-batch edges.
    let mut order = Vec::with_capacity(models.len());
    let mut done: HashSet<usize> = HashSet::new();
    let mut visiting: HashSet<usize> = HashSet::new();

    fn visit(
        i: usize,
        models: &[ModelDescriptor],
        index_of: &HashMap<String, usize>,
        done: &mut HashSet<usize>,
        visiting: &mut HashSet<usize>,
        order: &mut Vec<usize>,
    ) -> Result<(), ModelBatchError> {
        if done.contains(&i) {
            return Ok(());
        }
        if !visiting.insert(i) {
            return Err(ModelBatchError::DependencyCycle(models[i].id.clone()));
        }
        for dep in &models[i].dependencies {
            if let Some(&j) = index_of.get(dep) {
                visit(j, models, index_of, done, visiting, order)?;
            }
        }
        visiting.remove(&i);
        done.insert(i);
        order.push(i);
        Ok(())
    }

    for i in 0..models.len() {
        visit(i, &models, &index_of, &mut done, &mut visiting, &mut order)?;
    }

    let mut slots: Vec<Option<ModelDescriptor>> = models.into_iter().map(Some).collect();
    Ok(order
        .into_iter()
        .filter_map(|i| slots[i].take())
        .collect())
}
