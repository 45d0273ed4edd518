use crate::error::{AppError, AppResult};
use crate::models::AuthUser;
use crate::utils::JwtService;
use actix_web::http::Method;
use actix_web::{
    Error, HttpMessage, HttpRequest,
    dev::{Service, ServiceRequest, ServiceResponse, Transform, forward_ready},
};
use futures_util::future::LocalBoxFuture;
use std::future::{Ready, ready};

// 公开路由配置
struct PublicRoutes {
    // (方法, 路径模式)，`{}` 匹配任意单个路径段
    routes: Vec<(Method, &'static str)>,
    // 前缀匹配的公开路径（任意方法）
    prefix_paths: Vec<&'static str>,
}

impl PublicRoutes {
    fn new() -> Self {
        Self {
            routes: vec![
                (Method::POST, "/api/v1/auth/register"),
                (Method::POST, "/api/v1/auth/login"),
                (Method::POST, "/api/v1/auth/refresh"),
                (Method::GET, "/api/v1/raffles"),
                (Method::GET, "/api/v1/raffles/{}"),
                (Method::GET, "/api/v1/raffles/{}/availability"),
                (Method::POST, "/api/v1/raffles/{}/participate"),
                (Method::GET, "/api/v1/participations/{}"),
                (Method::POST, "/api/v1/participations/{}/payment-intent"),
                (Method::POST, "/api/v1/participations/{}/confirm-payment"),
                (Method::POST, "/webhook/stripe"),
                (Method::GET, "/swagger-ui"),
                (Method::GET, "/api-docs/openapi.json"),
            ],
            prefix_paths: vec!["/swagger-ui/", "/api-docs/"],
        }
    }

    fn matches(pattern: &str, path: &str) -> bool {
        let mut pattern_segments = pattern.trim_end_matches('/').split('/');
        let mut path_segments = path.trim_end_matches('/').split('/');
        loop {
            match (pattern_segments.next(), path_segments.next()) {
                (None, None) => return true,
                (Some("{}"), Some(segment)) if !segment.is_empty() => {}
                (Some(expected), Some(segment)) if expected == segment => {}
                _ => return false,
            }
        }
    }

    fn is_public(&self, method: &Method, path: &str) -> bool {
        if self.prefix_paths.iter().any(|&prefix| path.starts_with(prefix)) {
            return true;
        }
        self.routes
            .iter()
            .any(|(m, pattern)| m == method && Self::matches(pattern, path))
    }
}

pub struct AuthMiddleware {
    jwt_service: JwtService,
}

impl AuthMiddleware {
    pub fn new(jwt_service: JwtService) -> Self {
        Self { jwt_service }
    }
}

impl<S, B> Transform<S, ServiceRequest> for AuthMiddleware
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error>,
    S::Future: 'static,
    B: 'static,
{
    type Response = ServiceResponse<B>;
    type Error = Error;
    type InitError = ();
    type Transform = AuthMiddlewareService<S>;
    type Future = Ready<Result<Self::Transform, Self::InitError>>;

    fn new_transform(&self, service: S) -> Self::Future {
        ready(Ok(AuthMiddlewareService {
            service,
            jwt_service: self.jwt_service.clone(),
            public_routes: PublicRoutes::new(),
        }))
    }
}

pub struct AuthMiddlewareService<S> {
    service: S,
    jwt_service: JwtService,
    public_routes: PublicRoutes,
}

impl<S, B> Service<ServiceRequest> for AuthMiddlewareService<S>
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error>,
    S::Future: 'static,
    B: 'static,
{
    type Response = ServiceResponse<B>;
    type Error = Error;
    type Future = LocalBoxFuture<'static, Result<Self::Response, Self::Error>>;

    forward_ready!(service);

    fn call(&self, req: ServiceRequest) -> Self::Future {
        // 放行所有 CORS 预检请求
        if req.method() == Method::OPTIONS {
            let fut = self.service.call(req);
            return Box::pin(fut);
        }

        if self.public_routes.is_public(req.method(), req.path()) {
            let fut = self.service.call(req);
            return Box::pin(fut);
        }

        // 提取Authorization header
        let token = req
            .headers()
            .get("Authorization")
            .and_then(|value| value.to_str().ok())
            .and_then(|value| value.strip_prefix("Bearer "));

        let Some(token) = token else {
            let error = AppError::AuthError("Missing access token".to_string());
            return Box::pin(async move { Err(error.into()) });
        };

        match self
            .jwt_service
            .verify_access_token(token)
            .and_then(|claims| claims.auth_user())
        {
            Ok(user) => {
                // 当前用户写入请求扩展
                req.extensions_mut().insert(user);
                let fut = self.service.call(req);
                Box::pin(fut)
            }
            Err(_) => {
                let error = AppError::AuthError("Invalid access token".to_string());
                Box::pin(async move { Err(error.into()) })
            }
        }
    }
}

/// 获取当前登录用户
pub fn current_user(req: &HttpRequest) -> AppResult<AuthUser> {
    req.extensions()
        .get::<AuthUser>()
        .copied()
        .ok_or_else(|| AppError::AuthError("Authentication required".to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pattern_matching() {
        assert!(PublicRoutes::matches("/api/v1/raffles/{}", "/api/v1/raffles/12"));
        assert!(PublicRoutes::matches("/api/v1/raffles/{}", "/api/v1/raffles/12/"));
        assert!(!PublicRoutes::matches("/api/v1/raffles/{}", "/api/v1/raffles"));
        assert!(!PublicRoutes::matches("/api/v1/raffles/{}", "/api/v1/raffles/12/draw"));
        assert!(!PublicRoutes::matches("/api/v1/raffles/{}", "/api/v1/raffles//"));
    }

    #[test]
    fn test_public_routes() {
        let routes = PublicRoutes::new();
        assert!(routes.is_public(&Method::GET, "/api/v1/raffles"));
        assert!(routes.is_public(&Method::GET, "/api/v1/raffles/3/availability"));
        assert!(routes.is_public(&Method::POST, "/api/v1/raffles/3/participate"));
        assert!(routes.is_public(&Method::POST, "/api/v1/auth/refresh"));
        assert!(routes.is_public(&Method::GET, "/api/v1/participations/abc"));
        assert!(routes.is_public(&Method::POST, "/api/v1/participations/abc/confirm-payment"));
        assert!(routes.is_public(&Method::POST, "/webhook/stripe"));
        assert!(routes.is_public(&Method::GET, "/swagger-ui/index.html"));

        // 需要登录
        assert!(!routes.is_public(&Method::POST, "/api/v1/raffles"));
        assert!(!routes.is_public(&Method::PUT, "/api/v1/raffles/3"));
        assert!(!routes.is_public(&Method::POST, "/api/v1/raffles/3/draw"));
        assert!(!routes.is_public(&Method::GET, "/api/v1/raffles/3/participations"));
        assert!(!routes.is_public(&Method::POST, "/api/v1/participations/abc/confirm"));
        assert!(!routes.is_public(&Method::POST, "/api/v1/participations/abc/reject"));
        assert!(!routes.is_public(&Method::GET, "/api/v1/me/raffles"));
    }
}
