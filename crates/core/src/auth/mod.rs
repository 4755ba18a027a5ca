//! Authorization-flow building blocks: PKCE material and attempt tracking

pub mod attempt;
pub mod pkce;

pub use attempt::AuthorizationAttempt;
pub use pkce::{
    generate_code_challenge, generate_code_verifier, generate_state, validate_state,
    PkceChallenge, CHALLENGE_METHOD,
};
