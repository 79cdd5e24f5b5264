use std::sync::Arc;

use axum::extract::State;
use axum::routing::post;
use axum::Json;
use axum::Router;
use serde::Deserialize;
use uuid::Uuid;

use crate::error::AppError;
use crate::models::operator::Operator;
use crate::state::AppState;

pub fn router() -> Router<Arc<AppState>> {
    Router::new().route("/operators", post(create_operator).get(list_operators))
}

#[derive(Deserialize)]
pub struct CreateOperatorRequest {
    pub name: String,
}

async fn create_operator(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<CreateOperatorRequest>,
) -> Result<Json<Operator>, AppError> {
    if payload.name.trim().is_empty() {
        return Err(AppError::BadRequest("name cannot be empty".to_string()));
    }

    let operator = Operator {
        id: Uuid::new_v4(),
        name: payload.name,
        active: true,
    };

    state.store.insert_operator(operator.clone());
    Ok(Json(operator))
}

async fn list_operators(State(state): State<Arc<AppState>>) -> Json<Vec<Operator>> {
    Json(state.store.list_operators())
}
