//! Request and response types for the fbt-daemon HTTP surface.
//!
//! No business logic lives here; these types are `Serialize`/`Deserialize`
//! so they JSON-encode cleanly via Axum.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResponse {
    pub ok: bool,
    pub service: &'static str,
    pub version: &'static str,
}
