//! HTTP routes for students, courses and enrollments.
//!
//! Everything except `/`, `/health` and `/token` requires a bearer token
//! obtained from `/token`.

use crate::auth::CurrentUser;
use crate::error::{ApiError, ApiResult};
use crate::health::HealthReport;
use crate::telemetry;
use axum::extract::rejection::{FormRejection, JsonRejection, PathRejection};
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::routing::{get, post};
use axum::{middleware, Form, Json, Router};
use model::{
    Authenticator, CollegeStore, Course, CourseInput, Enrollment, EnrollmentInput, RecordId,
    Student, StudentInput, Token,
};
use serde::Deserialize;
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Instant;

#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn CollegeStore>,
    pub auth: Arc<Authenticator>,
    pub started_at: Instant,
}

impl AppState {
    pub fn new(store: Arc<dyn CollegeStore>, auth: Authenticator) -> Self {
        Self {
            store,
            auth: Arc::new(auth),
            started_at: Instant::now(),
        }
    }
}

/// OAuth2 password-flow form. Other form fields are ignored.
#[derive(Debug, Deserialize)]
pub struct LoginForm {
    pub username: String,
    pub password: String,
}

type JsonBody<T> = Result<Json<T>, JsonRejection>;
type IdPath = Result<Path<RecordId>, PathRejection>;

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/", get(home))
        .route("/health", get(health))
        .route("/token", post(login))
        .route("/students", get(list_students).post(create_student))
        .route(
            "/students/:id",
            get(get_student).put(update_student).delete(delete_student),
        )
        .route("/courses", get(list_courses).post(create_course))
        .route(
            "/courses/:id",
            get(get_course).put(update_course).delete(delete_course),
        )
        .route("/enrollments", get(list_enrollments).post(create_enrollment))
        .route(
            "/enrollments/:id",
            get(get_enrollment).delete(delete_enrollment),
        )
        .fallback(not_found)
        .layer(middleware::from_fn(telemetry::log_requests))
        .with_state(state)
}

async fn home() -> Json<Value> {
    Json(json!({ "message": "Welcome to the College Management API!" }))
}

async fn health(State(state): State<AppState>) -> Json<HealthReport> {
    Json(HealthReport::ok(state.started_at.elapsed()))
}

async fn not_found() -> ApiError {
    ApiError::RouteNotFound
}

async fn login(
    State(state): State<AppState>,
    form: Result<Form<LoginForm>, FormRejection>,
) -> ApiResult<Json<Token>> {
    let Form(form) = form?;
    let token = state.auth.login(&form.username, &form.password)?;
    Ok(Json(token))
}

async fn list_students(_user: CurrentUser, State(state): State<AppState>) -> Json<Vec<Student>> {
    Json(state.store.list_students().await)
}

async fn create_student(
    _user: CurrentUser,
    State(state): State<AppState>,
    body: JsonBody<StudentInput>,
) -> ApiResult<(StatusCode, Json<Student>)> {
    let Json(input) = body?;
    let student = state.store.create_student(input).await;
    Ok((StatusCode::CREATED, Json(student)))
}

async fn get_student(
    _user: CurrentUser,
    State(state): State<AppState>,
    id: IdPath,
) -> ApiResult<Json<Student>> {
    let Path(id) = id?;
    Ok(Json(state.store.get_student(id).await?))
}

async fn update_student(
    _user: CurrentUser,
    State(state): State<AppState>,
    id: IdPath,
    body: JsonBody<StudentInput>,
) -> ApiResult<Json<Student>> {
    let Path(id) = id?;
    let Json(input) = body?;
    Ok(Json(state.store.update_student(id, input).await?))
}

async fn delete_student(
    _user: CurrentUser,
    State(state): State<AppState>,
    id: IdPath,
) -> ApiResult<StatusCode> {
    let Path(id) = id?;
    state.store.delete_student(id).await?;
    Ok(StatusCode::NO_CONTENT)
}

async fn list_courses(_user: CurrentUser, State(state): State<AppState>) -> Json<Vec<Course>> {
    Json(state.store.list_courses().await)
}

async fn create_course(
    _user: CurrentUser,
    State(state): State<AppState>,
    body: JsonBody<CourseInput>,
) -> ApiResult<(StatusCode, Json<Course>)> {
    let Json(input) = body?;
    let course = state.store.create_course(input).await;
    Ok((StatusCode::CREATED, Json(course)))
}

async fn get_course(
    _user: CurrentUser,
    State(state): State<AppState>,
    id: IdPath,
) -> ApiResult<Json<Course>> {
    let Path(id) = id?;
    Ok(Json(state.store.get_course(id).await?))
}

async fn update_course(
    _user: CurrentUser,
    State(state): State<AppState>,
    id: IdPath,
    body: JsonBody<CourseInput>,
) -> ApiResult<Json<Course>> {
    let Path(id) = id?;
    let Json(input) = body?;
    Ok(Json(state.store.update_course(id, input).await?))
}

async fn delete_course(
    _user: CurrentUser,
    State(state): State<AppState>,
    id: IdPath,
) -> ApiResult<StatusCode> {
    let Path(id) = id?;
    state.store.delete_course(id).await?;
    Ok(StatusCode::NO_CONTENT)
}

async fn list_enrollments(
    _user: CurrentUser,
    State(state): State<AppState>,
) -> Json<Vec<Enrollment>> {
    Json(state.store.list_enrollments().await)
}

async fn create_enrollment(
    _user: CurrentUser,
    State(state): State<AppState>,
    body: JsonBody<EnrollmentInput>,
) -> ApiResult<(StatusCode, Json<Enrollment>)> {
    let Json(input) = body?;
    let enrollment = state.store.create_enrollment(input).await?;
    Ok((StatusCode::CREATED, Json(enrollment)))
}

async fn get_enrollment(
    _user: CurrentUser,
    State(state): State<AppState>,
    id: IdPath,
) -> ApiResult<Json<Enrollment>> {
    let Path(id) = id?;
    Ok(Json(state.store.get_enrollment(id).await?))
}

async fn delete_enrollment(
    _user: CurrentUser,
    State(state): State<AppState>,
    id: IdPath,
) -> ApiResult<StatusCode> {
    let Path(id) = id?;
    state.store.delete_enrollment(id).await?;
    Ok(StatusCode::NO_CONTENT)
}
