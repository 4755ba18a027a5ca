//! Token lifecycle management

pub mod lifecycle;

pub use lifecycle::{TokenLifecycle, TokenPhase};
