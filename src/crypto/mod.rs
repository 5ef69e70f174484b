pub mod csrf;
pub mod hashing;
pub mod pkce;
pub mod tokens;
