pub mod rate_limiting;
pub mod threat_screening;

pub use rate_limiting::*;
pub use threat_screening::*;
