//! Shared response envelope types for API handlers.

use serde::Serialize;

/// Paged collection envelope: `{ "value": [...], "nextLink": ... }`.
///
/// `next_link` is the path of the following page, or `null` on the last one.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PagedResponse<T: Serialize> {
    pub value: Vec<T>,
    pub next_link: Option<String>,
}
