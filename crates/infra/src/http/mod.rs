//! HTTP execution layer.

mod executor;

pub use executor::RequestExecutor;
