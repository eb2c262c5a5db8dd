//! Embedserve — HTTP front end for a single resident embedding model.

pub mod routes;
pub mod state;

pub use routes::build_router;
pub use state::AppState;
