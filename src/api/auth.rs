//! Bearer-token gate for admin endpoints

use axum::{
    extract::FromRequestParts,
    http::{header, request::Parts},
};

use super::{error::ApiError, state::AppState};
use crate::config::{Principal, Role};

/// A request authenticated as an admin principal
///
/// No token or an unknown token rejects with 401; a known non-admin token
/// rejects with 403.
#[derive(Debug, Clone)]
pub struct AdminPrincipal(pub Principal);

impl AdminPrincipal {
    pub fn name(&self) -> &str {
        &self.0.name
    }
}

impl FromRequestParts<AppState> for AdminPrincipal {
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        let token = bearer_token(parts).ok_or(ApiError::Unauthorized)?;

        let principal = state
            .config
            .auth
            .principals
            .iter()
            .find(|p| p.token == token)
            .ok_or(ApiError::Unauthorized)?;

        if principal.role != Role::Admin {
            tracing::warn!(principal = %principal.name, "Non-admin principal rejected");
            return Err(ApiError::Forbidden(principal.name.clone()));
        }

        Ok(AdminPrincipal(principal.clone()))
    }
}

fn bearer_token(parts: &Parts) -> Option<&str> {
    let value = parts.headers.get(header::AUTHORIZATION)?.to_str().ok()?;
    let (scheme, token) = value.split_once(' ')?;

    if !scheme.eq_ignore_ascii_case("bearer") {
        return None;
    }

    Some(token.trim()).filter(|t| !t.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::Request;

    fn parts_with(auth: Option<&str>) -> Parts {
        let mut builder = Request::builder().uri("/admin/control");
        if let Some(value) = auth {
            builder = builder.header(header::AUTHORIZATION, value);
        }
        builder.body(()).unwrap().into_parts().0
    }

    #[test]
    fn test_bearer_token_parsing() {
        assert_eq!(bearer_token(&parts_with(Some("Bearer abc"))), Some("abc"));
        assert_eq!(bearer_token(&parts_with(Some("bearer  abc "))), Some("abc"));
        assert_eq!(bearer_token(&parts_with(Some("Basic abc"))), None);
        assert_eq!(bearer_token(&parts_with(Some("Bearer "))), None);
        assert_eq!(bearer_token(&parts_with(None)), None);
    }
}
