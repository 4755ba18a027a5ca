//! HTTP adapters for the OAuth and social API ports.

mod oauth;
mod social;

pub use oauth::HttpOAuthApi;
pub use social::HttpSocialApi;
