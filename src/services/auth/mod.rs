pub mod error;
pub mod factory;
pub mod gate;
pub mod header;
pub mod metadata;
pub mod policy;
pub mod resolver;
pub mod validator;

#[cfg(test)]
pub(crate) mod test_support;

pub use factory::build_auth_gate;
pub use gate::AuthGate;
pub use policy::AuthorizationPolicy;
pub use validator::ClaimsPrincipal;
