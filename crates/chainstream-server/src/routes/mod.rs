// Export route modules
pub mod feedback;
pub mod stream;

use crate::state::AppState;
use axum::Router;

// Function to configure all routes
pub fn configure(state: AppState) -> Router {
    Router::new()
        .merge(stream::routes(state))
        .merge(feedback::routes())
}
