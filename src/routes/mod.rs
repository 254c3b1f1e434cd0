use axum::routing::get;
use axum::Router;

use crate::state::AppState;

pub mod health;
pub mod internal;
pub mod payments;
pub mod prerentals;
pub mod rentals;

pub fn v1_router() -> Router<AppState> {
    Router::new()
        .route("/health", get(health::health))
        .merge(rentals::router())
        .merge(payments::router())
        .merge(prerentals::router())
        .merge(internal::router())
}
