use std::sync::Arc;

use actix_web::http::StatusCode;
use actix_web::{web, App, HttpResponse, HttpServer, Responder};
use uuid::Uuid;

use crate::domain::media::MediaError;
use crate::service::MediaService;

mod dto;

pub use dto::{ChangeStatusRequest, CreateMediaRequest, MediaResponse};

// ============================================================================
// HTTP API - Thin JSON Layer over the Media Service
// ============================================================================

pub async fn serve(service: Arc<MediaService>, addr: &str) -> std::io::Result<()> {
    tracing::info!(%addr, "starting http server");

    HttpServer::new(move || {
        App::new()
            .app_data(web::Data::new(service.clone()))
            .route("/media", web::post().to(create_media))
            .route("/media/{id}", web::get().to(get_media))
            .route("/media/{id}/status", web::patch().to(change_status))
            .route("/health", web::get().to(health))
    })
    .bind(addr)?
    .run()
    .await
}

async fn create_media(
    service: web::Data<Arc<MediaService>>,
    body: web::Json<CreateMediaRequest>,
) -> impl Responder {
    match service.create_media(body.media_type, &body.source).await {
        Ok(media) => HttpResponse::Created().json(MediaResponse::from(media)),
        Err(err) => error_response(&err),
    }
}

async fn get_media(
    service: web::Data<Arc<MediaService>>,
    id: web::Path<Uuid>,
) -> impl Responder {
    match service.get_media(*id).await {
        Ok(media) => HttpResponse::Ok().json(MediaResponse::from(media)),
        Err(err) => error_response(&err),
    }
}

async fn change_status(
    service: web::Data<Arc<MediaService>>,
    id: web::Path<Uuid>,
    body: web::Json<ChangeStatusRequest>,
) -> impl Responder {
    match service.change_status(*id, body.status).await {
        Ok(media) => HttpResponse::Ok().json(MediaResponse::from(media)),
        Err(err) => error_response(&err),
    }
}

async fn health() -> impl Responder {
    HttpResponse::Ok().json(serde_json::json!({ "status": "ok" }))
}

fn status_for(err: &MediaError) -> StatusCode {
    match err {
        MediaError::InvalidArgument(_) => StatusCode::BAD_REQUEST,
        MediaError::NotFound => StatusCode::NOT_FOUND,
        MediaError::Conflict | MediaError::InvalidTransition { .. } => StatusCode::CONFLICT,
        MediaError::Storage(_) | MediaError::Serialization(_) => {
            StatusCode::INTERNAL_SERVER_ERROR
        }
    }
}

fn error_response(err: &MediaError) -> HttpResponse {
    let status = status_for(err);
    if status == StatusCode::INTERNAL_SERVER_ERROR {
        tracing::error!(error = %err, "request failed");
        // Do not leak storage details to clients.
        return HttpResponse::InternalServerError()
            .json(serde_json::json!({ "error": "internal error" }));
    }
    HttpResponse::build(status).json(serde_json::json!({ "error": err.to_string() }))
}
