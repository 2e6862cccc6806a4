// Export route modules
pub mod research;
pub mod status;

use crate::state::AppState;
use axum::Router;

// Function to configure all routes
pub fn configure(state: AppState) -> Router {
    Router::new()
        .merge(research::routes(state))
        .merge(status::routes())
}
