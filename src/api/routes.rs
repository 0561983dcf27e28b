// API route configuration

use actix_web::web;

use crate::api::handlers;

pub fn configure_routes(cfg: &mut web::ServiceConfig) {
    cfg
        // Health check
        .route("/health", web::get().to(handlers::health_check))
        .service(
            web::scope("/api")
                // Account management
                .route("/accounts", web::get().to(handlers::list_accounts))
                .route("/accounts", web::post().to(handlers::create_account))
                .route("/accounts/{id}", web::get().to(handlers::get_account))
                .route("/accounts/{id}", web::patch().to(handlers::update_account))
                .route("/accounts/{id}", web::delete().to(handlers::delete_account))
                // Ingestion entry points
                .route("/accounts/{id}/upload", web::post().to(handlers::upload_pgn))
                .route(
                    "/accounts/{id}/import/chesscom",
                    web::post().to(handlers::import_chesscom),
                )
                .route(
                    "/accounts/{id}/import/lichess",
                    web::post().to(handlers::import_lichess),
                )
                // Job polling
                .route("/accounts/{id}/jobs", web::get().to(handlers::list_jobs))
                .route(
                    "/accounts/{id}/jobs/{job_id}",
                    web::get().to(handlers::get_job),
                )
                // Game listing
                .route("/accounts/{id}/games", web::get().to(handlers::list_games))
                // Analytics reads
                .route("/analytics/stats", web::get().to(handlers::analytics_stats))
                .route(
                    "/analytics/calendar",
                    web::get().to(handlers::analytics_calendar),
                ),
        );
}
