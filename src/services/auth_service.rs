use chrono::Utc;
use sea_orm::{ActiveModelTrait, ColumnTrait, DatabaseConnection, EntityTrait, IntoActiveModel, QueryFilter, Set};

use crate::config::AdminConfig;
use crate::entities::{UserRole, user_entity as users};
use crate::error::{AppError, AppResult};
use crate::models::*;
use crate::utils::validation::{collect, validate_email, validate_password, validate_text};
use crate::utils::*;

#[derive(Clone)]
pub struct AuthService {
    pool: DatabaseConnection,
    jwt_service: JwtService,
}

impl AuthService {
    pub fn new(pool: DatabaseConnection, jwt_service: JwtService) -> Self {
        Self { pool, jwt_service }
    }

    async fn find_by_email(&self, email: &str) -> AppResult<Option<users::Model>> {
        Ok(users::Entity::find()
            .filter(users::Column::Email.eq(email))
            .one(&self.pool)
            .await?)
    }

    fn issue_tokens(&self, user: users::Model) -> AppResult<AuthResponse> {
        let access_token = self.jwt_service.generate_access_token(user.id, user.role)?;
        let refresh_token = self.jwt_service.generate_refresh_token(user.id, user.role)?;

        Ok(AuthResponse {
            access_token,
            refresh_token,
            token_type: "Bearer".to_string(),
            expires_in: self.jwt_service.get_access_token_expires_in(),
            user: UserResponse::from(user),
        })
    }

    /// 注册创建者账号
    pub async fn register(&self, request: RegisterRequest) -> AppResult<AuthResponse> {
        let mut errors = Vec::new();
        let email = collect(&mut errors, validate_email("email", &request.email));
        let display_name = collect(
            &mut errors,
            validate_text("display_name", &request.display_name, 2, 80),
        );
        collect(&mut errors, validate_password("password", &request.password));
        let (Some(email), Some(display_name)) = (email, display_name) else {
            return Err(AppError::InvalidFields(errors));
        };
        if !errors.is_empty() {
            return Err(AppError::InvalidFields(errors));
        }

        // 检查邮箱是否已注册
        if self.find_by_email(&email).await?.is_some() {
            return Err(AppError::invalid_field("email", "is already registered"));
        }

        let password_hash = hash_password(&request.password)?;
        let now = Utc::now();
        let user = users::ActiveModel {
            email: Set(email),
            display_name: Set(display_name),
            password_hash: Set(password_hash),
            role: Set(UserRole::Creator),
            created_at: Set(now),
            updated_at: Set(now),
            ..Default::default()
        }
        .insert(&self.pool)
        .await?;

        log::info!("User {} registered", user.id);
        self.issue_tokens(user)
    }

    pub async fn login(&self, request: LoginRequest) -> AppResult<AuthResponse> {
        let email = request.email.trim().to_ascii_lowercase();

        let user = self
            .find_by_email(&email)
            .await?
            .ok_or_else(|| AppError::AuthError("Invalid email or password".to_string()))?;

        // 验证密码
        if !verify_password(&request.password, &user.password_hash)? {
            return Err(AppError::AuthError("Invalid email or password".to_string()));
        }

        self.issue_tokens(user)
    }

    /// 刷新令牌，角色以数据库为准
    pub async fn refresh_token(&self, refresh_token: &str) -> AppResult<AuthResponse> {
        let claims = self.jwt_service.verify_refresh_token(refresh_token)?;
        let user_id = claims.auth_user()?.id;

        let user = users::Entity::find_by_id(user_id)
            .one(&self.pool)
            .await?
            .ok_or_else(|| AppError::AuthError("Invalid token".to_string()))?;

        self.issue_tokens(user)
    }

    /// 启动时按配置创建（或提升）管理员账号
    pub async fn ensure_admin(&self, config: &AdminConfig) -> AppResult<()> {
        let (Some(email), Some(password)) = (config.email.as_deref(), config.password.as_deref())
        else {
            return Ok(());
        };
        let email = validate_email("email", email)
            .map_err(|e| AppError::ConfigError(format!("admin email {}", e.message)))?;

        if let Some(existing) = self.find_by_email(&email).await? {
            if existing.role != UserRole::Admin {
                let mut am = existing.into_active_model();
                am.role = Set(UserRole::Admin);
                am.updated_at = Set(Utc::now());
                am.update(&self.pool).await?;
                log::info!("Promoted {email} to admin");
            }
            return Ok(());
        }

        validate_password("password", password)
            .map_err(|_| AppError::ConfigError("admin password is too weak".to_string()))?;
        let now = Utc::now();
        users::ActiveModel {
            email: Set(email.clone()),
            display_name: Set("Administrator".to_string()),
            password_hash: Set(hash_password(password)?),
            role: Set(UserRole::Admin),
            created_at: Set(now),
            updated_at: Set(now),
            ..Default::default()
        }
        .insert(&self.pool)
        .await?;
        log::info!("Bootstrap admin {email} created");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::test_support::*;

    async fn setup() -> AuthService {
        let db = setup_test_db().await;
        AuthService::new(db, JwtService::new("test-secret", 3600, 86400))
    }

    fn register_request(email: &str) -> RegisterRequest {
        RegisterRequest {
            email: email.to_string(),
            display_name: "Rifas Lola".to_string(),
            password: "Password123".to_string(),
        }
    }

    #[tokio::test]
    async fn test_register_login_refresh() {
        let service = setup().await;

        let registered = service
            .register(register_request(" Lola@Example.com "))
            .await
            .unwrap();
        assert_eq!(registered.user.email, "lola@example.com");
        assert_eq!(registered.user.role, UserRole::Creator);
        assert_eq!(registered.token_type, "Bearer");

        let logged_in = service
            .login(LoginRequest {
                email: "LOLA@example.com".into(),
                password: "Password123".into(),
            })
            .await
            .unwrap();
        assert_eq!(logged_in.user.id, registered.user.id);

        let refreshed = service.refresh_token(&logged_in.refresh_token).await.unwrap();
        assert_eq!(refreshed.user.id, registered.user.id);

        // access token 不能用于刷新
        assert!(service.refresh_token(&logged_in.access_token).await.is_err());
    }

    #[tokio::test]
    async fn test_register_rejects_duplicates_and_weak_passwords() {
        let service = setup().await;
        service.register(register_request("a@example.com")).await.unwrap();

        let err = service
            .register(register_request("a@example.com"))
            .await
            .unwrap_err();
        assert_eq!(err.error_code(), "VALIDATION_ERROR");

        let mut weak = register_request("b@example.com");
        weak.password = "password".into();
        match service.register(weak).await.unwrap_err() {
            AppError::InvalidFields(fields) => assert_eq!(fields[0].field, "password"),
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_login_with_wrong_password() {
        let service = setup().await;
        service.register(register_request("c@example.com")).await.unwrap();

        let err = service
            .login(LoginRequest {
                email: "c@example.com".into(),
                password: "Wrong12345".into(),
            })
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::AuthError(_)));

        let err = service
            .login(LoginRequest {
                email: "nobody@example.com".into(),
                password: "Password123".into(),
            })
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::AuthError(_)));
    }

    #[tokio::test]
    async fn test_ensure_admin() {
        let service = setup().await;
        let config = AdminConfig {
            email: Some("admin@example.com".into()),
            password: Some("AdminPass123".into()),
        };
        service.ensure_admin(&config).await.unwrap();
        // 重复执行不报错
        service.ensure_admin(&config).await.unwrap();

        let admin = service
            .login(LoginRequest {
                email: "admin@example.com".into(),
                password: "AdminPass123".into(),
            })
            .await
            .unwrap();
        assert_eq!(admin.user.role, UserRole::Admin);

        service.register(register_request("promote@example.com")).await.unwrap();
        service
            .ensure_admin(&AdminConfig {
                email: Some("promote@example.com".into()),
                password: Some("AdminPass123".into()),
            })
            .await
            .unwrap();
        let promoted = service
            .login(LoginRequest {
                email: "promote@example.com".into(),
                password: "Password123".into(),
            })
            .await
            .unwrap();
        assert_eq!(promoted.user.role, UserRole::Admin);

        service.ensure_admin(&AdminConfig::default()).await.unwrap();
    }
}
