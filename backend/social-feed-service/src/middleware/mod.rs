/// HTTP middleware for the social feed service
///
/// Authentication is delegated to an [`IdentityResolver`]. The middleware stores
/// the resolved [`Identity`] in request extensions; handlers extract it directly.
/// Mapping an identity to a stored user is left to the user service.
use crate::config::AuthConfig;
use crate::error::AppError;
use actix_web::dev::{forward_ready, Service, ServiceRequest, ServiceResponse, Transform};
use actix_web::http::header::HeaderMap;
use actix_web::{Error, FromRequest, HttpMessage, HttpRequest};
use futures::future::LocalBoxFuture;
use jsonwebtoken::{decode, Algorithm, DecodingKey, Validation};
use serde::Deserialize;
use std::future::{ready, Ready};
use std::rc::Rc;
use std::sync::Arc;
use tracing::warn;

/// Caller identity as asserted by the identity provider.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Identity {
    pub subject: String,
    pub email: Option<String>,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub image_url: Option<String>,
}

impl Identity {
    pub fn new(subject: impl Into<String>) -> Self {
        Self {
            subject: subject.into(),
            email: None,
            first_name: None,
            last_name: None,
            image_url: None,
        }
    }
}

pub trait IdentityResolver: Send + Sync {
    fn resolve(&self, headers: &HeaderMap) -> Result<Identity, AppError>;
}

fn bearer_token(headers: &HeaderMap) -> Result<&str, AppError> {
    let header = headers
        .get("Authorization")
        .and_then(|h| h.to_str().ok())
        .ok_or_else(|| AppError::Unauthorized("Missing Authorization header".into()))?;
    header
        .strip_prefix("Bearer ")
        .map(str::trim)
        .filter(|token| !token.is_empty())
        .ok_or_else(|| AppError::Unauthorized("Invalid Authorization scheme".into()))
}

#[derive(Debug, Deserialize)]
struct Claims {
    sub: String,
    #[serde(default)]
    email: Option<String>,
    #[serde(default, alias = "given_name")]
    first_name: Option<String>,
    #[serde(default, alias = "family_name")]
    last_name: Option<String>,
    #[serde(default, alias = "picture")]
    image_url: Option<String>,
}

/// Verifies RS256 bearer tokens issued by the external identity provider.
pub struct JwtIdentityResolver {
    key: Option<DecodingKey>,
    validation: Validation,
}

impl JwtIdentityResolver {
    pub fn from_config(config: &AuthConfig) -> Result<Self, AppError> {
        let key = match &config.jwt_public_key_pem {
            Some(pem) => Some(DecodingKey::from_rsa_pem(pem.as_bytes()).map_err(|e| {
                AppError::Internal(format!("Invalid JWT public key: {}", e))
            })?),
            None => {
                warn!("JWT public key not configured; every authenticated request will be rejected");
                None
            }
        };

        let mut validation = Validation::new(Algorithm::RS256);
        if let Some(issuer) = &config.jwt_issuer {
            validation.set_issuer(&[issuer]);
        }
        match &config.jwt_audience {
            Some(audience) => validation.set_audience(&[audience]),
            None => validation.validate_aud = false,
        }

        Ok(Self { key, validation })
    }
}

impl IdentityResolver for JwtIdentityResolver {
    fn resolve(&self, headers: &HeaderMap) -> Result<Identity, AppError> {
        let token = bearer_token(headers)?;
        let key = self
            .key
            .as_ref()
            .ok_or_else(|| AppError::Unauthorized("Authentication is not configured".into()))?;
        let data = decode::<Claims>(token, key, &self.validation)
            .map_err(|_| AppError::Unauthorized("Invalid or expired token".into()))?;

        let claims = data.claims;
        Ok(Identity {
            subject: claims.sub,
            email: claims.email,
            first_name: claims.first_name,
            last_name: claims.last_name,
            image_url: claims.image_url,
        })
    }
}

/// Actix middleware that resolves the caller identity for every request.
#[derive(Clone)]
pub struct IdentityMiddleware {
    resolver: Arc<dyn IdentityResolver>,
}

impl IdentityMiddleware {
    pub fn new(resolver: Arc<dyn IdentityResolver>) -> Self {
        Self { resolver }
    }
}

impl<S, B> Transform<S, ServiceRequest> for IdentityMiddleware
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error> + 'static,
    S::Future: 'static,
    B: 'static,
{
    type Response = ServiceResponse<B>;
    type Error = Error;
    type InitError = ();
    type Transform = IdentityMiddlewareService<S>;
    type Future = Ready<Result<Self::Transform, Self::InitError>>;

    fn new_transform(&self, service: S) -> Self::Future {
        ready(Ok(IdentityMiddlewareService {
            service: Rc::new(service),
            resolver: self.resolver.clone(),
        }))
    }
}

pub struct IdentityMiddlewareService<S> {
    service: Rc<S>,
    resolver: Arc<dyn IdentityResolver>,
}

impl<S, B> Service<ServiceRequest> for IdentityMiddlewareService<S>
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error> + 'static,
    S::Future: 'static,
    B: 'static,
{
    type Response = ServiceResponse<B>;
    type Error = Error;
    type Future = LocalBoxFuture<'static, Result<Self::Response, Self::Error>>;

    forward_ready!(service);

    fn call(&self, req: ServiceRequest) -> Self::Future {
        let service = self.service.clone();
        let resolved = self.resolver.resolve(req.headers());

        Box::pin(async move {
            let identity = resolved.map_err(Error::from)?;
            req.extensions_mut().insert(identity);
            service.call(req).await
        })
    }
}

impl FromRequest for Identity {
    type Error = Error;
    type Future = Ready<Result<Self, Self::Error>>;

    fn from_request(req: &HttpRequest, _: &mut actix_web::dev::Payload) -> Self::Future {
        ready(
            req.extensions()
                .get::<Identity>()
                .cloned()
                .ok_or_else(|| AppError::Unauthorized("Identity missing".into()).into()),
        )
    }
}
