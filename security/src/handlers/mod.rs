pub mod security;

pub use security::{configure_routes, SecurityApiState};
