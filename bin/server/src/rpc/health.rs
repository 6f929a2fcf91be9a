//! `Health.Check`.

use axum::Json;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HealthReply {
    pub status: String,
}

pub async fn check() -> Json<HealthReply> {
    Json(HealthReply {
        status: "ok".to_string(),
    })
}
