pub mod orders;
pub mod tracking;

// Re-export AppState so handler modules can import it as crate::handlers::AppState
pub use crate::AppState;
