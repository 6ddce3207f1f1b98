pub mod adapters;
pub mod errors;
pub mod models;
pub mod policy;
pub mod services;
pub mod state;
pub mod utils;
pub mod validation;

// Re-export commonly used types
pub use errors::{ErrorKind, RideError, RideResult, ValidationError};
pub use models::{Actor, Ride, RideStatus, Role};
pub use policy::{legal_actions, legal_next_states, RideAction};
pub use services::coordinator::{Mutation, MutationOutcome, RideCoordinator};
