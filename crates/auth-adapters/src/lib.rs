//! # Auth Adapters
//!
//! Implementations of `ViewerResolver`. Resolution never fails: anything that
//! cannot be verified is treated as an anonymous viewer.

use domains::models::{AuthContext, UserId};
use domains::traits::ViewerResolver;

#[cfg(feature = "auth-jwt")]
mod jwt;

#[cfg(feature = "auth-jwt")]
pub use jwt::{JwtViewerResolver, ViewerClaims};

/// Treats every request as anonymous. Used when no JWT secret is configured.
#[derive(Debug, Clone, Copy, Default)]
pub struct AnonymousResolver;

impl ViewerResolver for AnonymousResolver {
    fn resolve_viewer_id(&self, _ctx: &AuthContext) -> Option<UserId> {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn anonymous_resolver_ignores_tokens() {
        let ctx = AuthContext::from_authorization_header(Some("Bearer anything"));
        assert_eq!(AnonymousResolver.resolve_viewer_id(&ctx), None);
    }
}
