pub mod jwt;
pub mod middleware;

pub use jwt::Role;
#[cfg(test)]
pub use jwt::create_jwt;
pub use middleware::TenantContext;
