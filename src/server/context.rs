use axum::async_trait;
use axum::extract::FromRequestParts;
use axum::http::request::Parts;
use skuflow_core_types::{PlanTier, RequestContext};

use crate::errors::ApiError;

pub const TENANT_HEADER: &str = "x-tenant-id";
pub const PLAN_HEADER: &str = "x-plan-tier";

/// Caller capability taken from request headers.
///
/// Missing headers mean an anonymous free-tier caller; an unknown plan tier
/// is rejected.
#[derive(Debug, Clone)]
pub struct Caller(pub RequestContext);

#[async_trait]
impl<S> FromRequestParts<S> for Caller
where
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let header = |name: &str| {
            parts
                .headers
                .get(name)
                .and_then(|value| value.to_str().ok())
                .map(str::trim)
                .filter(|value| !value.is_empty())
        };

        let plan = match header(PLAN_HEADER) {
            Some(raw) => raw
                .parse::<PlanTier>()
                .map_err(|err| ApiError::bad_request(err.to_string()))?,
            None => PlanTier::Free,
        };
        let context = match header(TENANT_HEADER) {
            Some(tenant) => RequestContext::new(tenant, plan),
            None => RequestContext {
                plan,
                ..RequestContext::anonymous()
            },
        };
        Ok(Caller(context))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::Request;

    fn extract(headers: &[(&str, &str)]) -> Result<Caller, ApiError> {
        let mut builder = Request::builder().uri("/scrape");
        for (name, value) in headers {
            builder = builder.header(*name, *value);
        }
        let (mut parts, _) = builder.body(()).unwrap().into_parts();
        tokio_test::block_on(Caller::from_request_parts(&mut parts, &()))
    }

    #[test]
    fn missing_headers_mean_anonymous_free_tier() {
        let Caller(context) = extract(&[]).unwrap();
        assert_eq!(context, RequestContext::anonymous());
    }

    #[test]
    fn headers_build_the_context() {
        let Caller(context) = extract(&[(TENANT_HEADER, "acme"), (PLAN_HEADER, "Premium")]).unwrap();
        assert_eq!(context, RequestContext::new("acme", PlanTier::Premium));
    }

    #[test]
    fn unknown_plan_is_rejected() {
        let err = extract(&[(PLAN_HEADER, "gold")]).unwrap_err();
        assert_eq!(err.status(), axum::http::StatusCode::BAD_REQUEST);
    }
}
