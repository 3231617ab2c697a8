use axum::extract::State;
use axum::Json;

use crate::pricing::Quote;
use crate::AppState;

pub async fn quote(State(state): State<AppState>) -> Json<Quote> {
    Json(state.pricing.quote().await)
}
