//! `Reflection.ListOperations`: what this server serves and who may call it.

use axum::{Json, extract::State};
use portcullis_authz::Operation;
use portcullis_store::Database;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::state::AppState;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OperationInfo {
    pub path: String,
    pub tolerated_taints: Vec<String>,
    /// False for ceremony operations when no verifier is configured.
    pub served: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ListOperationsReply {
    pub operations: Vec<OperationInfo>,
}

pub async fn list_operations<D: Database>(
    State(state): State<Arc<AppState<D>>>,
) -> Json<ListOperationsReply> {
    let tolerances = state.authorizer.tolerances();
    let operations = Operation::ALL
        .into_iter()
        .map(|op| OperationInfo {
            path: op.path().to_string(),
            tolerated_taints: tolerances.tolerated(op).to_vec(),
            served: state.verifier.is_some() || !super::is_ceremony(op),
        })
        .collect();
    Json(ListOperationsReply { operations })
}
