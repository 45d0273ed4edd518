use actix_web::web;
use utoipa::OpenApi;
use utoipa::{
    Modify,
    openapi::security::{Http, HttpAuthScheme, SecurityScheme},
};
use utoipa_swagger_ui::SwaggerUi;

use crate::entities::{ElementKind, ParticipationStatus, StatusReason, UserRole};
use crate::error::FieldError;
use crate::handlers;
use crate::models::*;

struct SecurityAddon;

impl Modify for SecurityAddon {
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        if let Some(components) = openapi.components.as_mut() {
            components.add_security_scheme(
                "bearer_auth",
                SecurityScheme::Http(Http::new(HttpAuthScheme::Bearer)),
            )
        }
    }
}

#[derive(OpenApi)]
#[openapi(
    paths(
        handlers::auth::register,
        handlers::auth::login,
        handlers::auth::refresh,
        handlers::raffle::list_raffles,
        handlers::raffle::create_raffle,
        handlers::raffle::get_raffle,
        handlers::raffle::update_raffle,
        handlers::raffle::deactivate_raffle,
        handlers::raffle::get_availability,
        handlers::raffle::participate,
        handlers::raffle::list_participations,
        handlers::raffle::publish_result,
        handlers::raffle::draw_result,
        handlers::raffle::list_my_raffles,
        handlers::participation::get_participation,
        handlers::participation::create_payment_intent,
        handlers::participation::confirm_payment,
        handlers::participation::confirm_participation,
        handlers::participation::reject_participation,
    ),
    components(
        schemas(
            RegisterRequest,
            LoginRequest,
            RefreshTokenRequest,
            UserResponse,
            AuthResponse,
            UserRole,
            CreateRaffleRequest,
            UpdateRaffleRequest,
            RaffleQuery,
            RaffleResponse,
            AllocationStats,
            AvailabilityResponse,
            PublishResultRequest,
            RaffleResultResponse,
            ElementKind,
            ParticipateRequest,
            ParticipateResponse,
            ParticipationResponse,
            ParticipationPublicResponse,
            ParticipationQuery,
            RejectParticipationRequest,
            ParticipationStatus,
            StatusReason,
            ParticipationIntentResponse,
            ConfirmPaymentRequest,
            ApiError,
            FieldError,
        )
    ),
    modifiers(&SecurityAddon),
    tags(
        (name = "auth", description = "Authentication API"),
        (name = "raffle", description = "Raffle management and element selection API"),
        (name = "participation", description = "Participation payment and review API"),
    ),
    info(
        title = "SorteoHub Backend API",
        version = "1.0.0",
        description = "SorteoHub raffle backend REST API documentation"
    ),
    servers(
        (url = "/api/v1", description = "Local server")
    )
)]
pub struct ApiDoc;

pub fn swagger_config(cfg: &mut web::ServiceConfig) {
    cfg.service(
        SwaggerUi::new("/swagger-ui/{_:.*}").url("/api-docs/openapi.json", ApiDoc::openapi()),
    )
    .route(
        "/swagger-ui",
        web::get().to(|| async {
            actix_web::HttpResponse::Found()
                .append_header(("Location", "/swagger-ui/"))
                .finish()
        }),
    );
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_openapi_lists_participation_routes() {
        let doc = ApiDoc::openapi();
        assert!(doc.paths.paths.contains_key("/raffles/{id}/participate"));
        assert!(doc.paths.paths.contains_key("/participations/{reference}/confirm-payment"));
        assert!(doc
            .components
            .as_ref()
            .map(|c| c.security_schemes.contains_key("bearer_auth"))
            .unwrap_or(false));
    }
}
