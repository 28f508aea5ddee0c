// Core services
pub mod orders;

// Multi-farmer cart checkout
pub mod checkout;

// Public tracking codes
pub mod tracking;
