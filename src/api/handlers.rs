// HTTP request handlers.

use actix_multipart::form::tempfile::TempFile;
use actix_multipart::form::MultipartForm;
use actix_web::{web, HttpResponse, Result};
use uuid::Uuid;

use crate::accounts::AccountError;
use crate::analytics::{self, AnalyticsFilter};
use crate::api::models::*;
use crate::api::server::AppState;
use crate::ingest::EnqueueError;
use crate::model::Account;

fn internal_error(err: anyhow::Error) -> HttpResponse {
    tracing::error!(error = %err, "request failed");
    HttpResponse::InternalServerError().json(ErrorBody::new(
        "INTERNAL_ERROR",
        "An internal error occurred",
    ))
}

fn account_not_found() -> HttpResponse {
    HttpResponse::NotFound().json(ErrorBody::new("ACCOUNT_NOT_FOUND", "Account not found"))
}

async fn load_account(state: &AppState, account_id: i64) -> Result<Option<Account>, HttpResponse> {
    state
        .accounts
        .get_account(account_id)
        .await
        .map_err(internal_error)
}

/// Health check endpoint with a quick database connectivity probe.
pub async fn health_check(state: web::Data<AppState>) -> Result<HttpResponse> {
    let database = match sqlx::query_scalar::<_, bool>("SELECT true")
        .fetch_one(&state.db.pool)
        .await
    {
        Ok(_) => "connected",
        Err(_) => "disconnected",
    };

    Ok(HttpResponse::Ok().json(HealthResponse {
        status: "healthy",
        database,
    }))
}

// ---- accounts -----------------------------------------------------------

pub async fn list_accounts(state: web::Data<AppState>) -> Result<HttpResponse> {
    match state.accounts.list().await {
        Ok(accounts) => {
            let body: Vec<AccountResponse> = accounts
                .into_iter()
                .map(|(account, count)| AccountResponse::from(account, count))
                .collect();
            Ok(HttpResponse::Ok().json(body))
        }
        Err(err) => Ok(internal_error(err)),
    }
}

pub async fn create_account(
    state: web::Data<AppState>,
    payload: web::Json<CreateAccountRequest>,
) -> Result<HttpResponse> {
    let request = payload.into_inner();
    match state
        .accounts
        .create(request.platform, &request.username, request.label.as_deref())
        .await
    {
        Ok((account, count)) => {
            Ok(HttpResponse::Created().json(AccountResponse::from(account, count)))
        }
        Err(err @ AccountError::Duplicate { .. }) => {
            Ok(HttpResponse::Conflict().json(ErrorBody::new("DUPLICATE_ACCOUNT", err.to_string())))
        }
        Err(AccountError::Validation(message)) => Ok(HttpResponse::UnprocessableEntity()
            .json(ErrorBody::new("VALIDATION_FAILED", message))),
        Err(AccountError::ExternalApi(message)) => {
            Ok(HttpResponse::BadGateway().json(ErrorBody::new("EXTERNAL_API_ERROR", message)))
        }
        Err(AccountError::Internal(err)) => Ok(internal_error(err)),
    }
}

pub async fn get_account(
    state: web::Data<AppState>,
    path: web::Path<i64>,
) -> Result<HttpResponse> {
    match state.accounts.get(path.into_inner()).await {
        Ok(Some((account, count))) => {
            Ok(HttpResponse::Ok().json(AccountResponse::from(account, count)))
        }
        Ok(None) => Ok(account_not_found()),
        Err(err) => Ok(internal_error(err)),
    }
}

pub async fn update_account(
    state: web::Data<AppState>,
    path: web::Path<i64>,
    payload: web::Json<UpdateAccountRequest>,
) -> Result<HttpResponse> {
    match state
        .accounts
        .update_label(path.into_inner(), payload.label.as_deref())
        .await
    {
        Ok(Some((account, count))) => {
            Ok(HttpResponse::Ok().json(AccountResponse::from(account, count)))
        }
        Ok(None) => Ok(account_not_found()),
        Err(err) => Ok(internal_error(err)),
    }
}

pub async fn delete_account(
    state: web::Data<AppState>,
    path: web::Path<i64>,
) -> Result<HttpResponse> {
    match state.accounts.delete(path.into_inner()).await {
        Ok(true) => Ok(HttpResponse::NoContent().finish()),
        Ok(false) => Ok(account_not_found()),
        Err(err) => Ok(internal_error(err)),
    }
}

// ---- uploads and imports ------------------------------------------------

#[derive(MultipartForm)]
pub struct UploadForm {
    #[multipart(rename = "file")]
    pub file: TempFile,
}

/// Accepts a PGN upload, stores it under the upload directory and enqueues
/// the import. Responds 202 with the job for progress polling.
pub async fn upload_pgn(
    state: web::Data<AppState>,
    path: web::Path<i64>,
    MultipartForm(form): MultipartForm<UploadForm>,
) -> Result<HttpResponse> {
    let account = match load_account(&state, path.into_inner()).await {
        Ok(Some(account)) => account,
        Ok(None) => return Ok(account_not_found()),
        Err(response) => return Ok(response),
    };

    if form.file.size == 0 {
        return Ok(
            HttpResponse::BadRequest().json(ErrorBody::new("EMPTY_FILE", "File is empty"))
        );
    }
    let original_name = form
        .file
        .file_name
        .clone()
        .unwrap_or_else(|| "upload.pgn".to_string());
    if !original_name.to_lowercase().ends_with(".pgn") {
        return Ok(HttpResponse::BadRequest()
            .json(ErrorBody::new("INVALID_FILE", "File must be a .pgn file")));
    }

    let stored_name = format!("{}_{}", Uuid::new_v4(), original_name);
    let stored_path = state.upload_dir.join(&stored_name);
    if let Err(err) = tokio::fs::copy(form.file.file.path(), &stored_path).await {
        return Ok(internal_error(err.into()));
    }
    tracing::info!(
        file = %stored_name,
        bytes = form.file.size,
        "saved uploaded PGN"
    );

    match state
        .coordinator
        .enqueue_file_import(&account, stored_path, &original_name)
        .await
    {
        Ok(job) => Ok(HttpResponse::Accepted().json(JobResponse::from(job))),
        Err(err) => Ok(internal_error(err)),
    }
}

fn enqueue_response(result: Result<crate::model::Job, EnqueueError>) -> HttpResponse {
    match result {
        Ok(job) => HttpResponse::Accepted().json(JobResponse::from(job)),
        Err(err @ EnqueueError::WrongPlatform { .. }) => {
            HttpResponse::BadRequest().json(ErrorBody::new("WRONG_PLATFORM", err.to_string()))
        }
        Err(err @ EnqueueError::ImportInProgress) => {
            HttpResponse::BadRequest().json(ErrorBody::new("IMPORT_IN_PROGRESS", err.to_string()))
        }
        Err(EnqueueError::Internal(err)) => internal_error(err),
    }
}

pub async fn import_chesscom(
    state: web::Data<AppState>,
    path: web::Path<i64>,
) -> Result<HttpResponse> {
    let account = match load_account(&state, path.into_inner()).await {
        Ok(Some(account)) => account,
        Ok(None) => return Ok(account_not_found()),
        Err(response) => return Ok(response),
    };
    Ok(enqueue_response(
        state.coordinator.enqueue_chesscom_import(&account).await,
    ))
}

pub async fn import_lichess(
    state: web::Data<AppState>,
    path: web::Path<i64>,
) -> Result<HttpResponse> {
    let account = match load_account(&state, path.into_inner()).await {
        Ok(Some(account)) => account,
        Ok(None) => return Ok(account_not_found()),
        Err(response) => return Ok(response),
    };
    Ok(enqueue_response(
        state.coordinator.enqueue_lichess_import(&account).await,
    ))
}

// ---- jobs ---------------------------------------------------------------

pub async fn get_job(
    state: web::Data<AppState>,
    path: web::Path<(i64, i64)>,
) -> Result<HttpResponse> {
    let (account_id, job_id) = path.into_inner();
    match state.coordinator.jobs().get(job_id).await {
        Ok(Some(job)) if job.account_id == account_id => {
            Ok(HttpResponse::Ok().json(JobResponse::from(job)))
        }
        Ok(_) => {
            Ok(HttpResponse::NotFound().json(ErrorBody::new("JOB_NOT_FOUND", "Job not found")))
        }
        Err(err) => Ok(internal_error(err)),
    }
}

pub async fn list_jobs(state: web::Data<AppState>, path: web::Path<i64>) -> Result<HttpResponse> {
    match state.coordinator.jobs().list_by_account(path.into_inner()).await {
        Ok(jobs) => {
            let body: Vec<JobResponse> = jobs.into_iter().map(JobResponse::from).collect();
            Ok(HttpResponse::Ok().json(body))
        }
        Err(err) => Ok(internal_error(err)),
    }
}

// ---- games --------------------------------------------------------------

pub async fn list_games(
    state: web::Data<AppState>,
    path: web::Path<i64>,
    query: web::Query<PageQuery>,
) -> Result<HttpResponse> {
    let account_id = path.into_inner();
    match load_account(&state, account_id).await {
        Ok(Some(_)) => {}
        Ok(None) => return Ok(account_not_found()),
        Err(response) => return Ok(response),
    }

    let page = query.page.unwrap_or(0).max(0);
    let page_size = query.page_size.unwrap_or(50).clamp(1, 200);

    match state
        .coordinator
        .games()
        .list_by_account(account_id, page, page_size)
        .await
    {
        Ok(games) => {
            let body: Vec<GameResponse> = games.into_iter().map(GameResponse::from).collect();
            Ok(HttpResponse::Ok().json(body))
        }
        Err(err) => Ok(internal_error(err)),
    }
}

// ---- analytics ----------------------------------------------------------

fn analytics_filter(query: &AnalyticsQuery) -> AnalyticsFilter {
    AnalyticsFilter {
        account_ids: query.parsed_account_ids(),
        time_control: query.time_control,
        color: query.color,
        from: query.from,
        to: query.to,
    }
}

pub async fn analytics_stats(
    state: web::Data<AppState>,
    query: web::Query<AnalyticsQuery>,
) -> Result<HttpResponse> {
    match analytics::stats(&state.db, &analytics_filter(&query)).await {
        Ok(stats) => Ok(HttpResponse::Ok().json(stats)),
        Err(err) => Ok(internal_error(err)),
    }
}

pub async fn analytics_calendar(
    state: web::Data<AppState>,
    query: web::Query<AnalyticsQuery>,
) -> Result<HttpResponse> {
    match analytics::calendar(&state.db, &analytics_filter(&query)).await {
        Ok(calendar) => Ok(HttpResponse::Ok().json(calendar)),
        Err(err) => Ok(internal_error(err)),
    }
}
