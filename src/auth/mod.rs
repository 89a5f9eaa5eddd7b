pub mod identity;
pub mod lifecycle;

pub use identity::{AuthIdentity, AuthStore, User};
pub use lifecycle::TokenLifecycle;
