use super::Result;
use super::extract::{Admin, ClientTimezone, Member, SessionHandle};
use crate::admin::{AdminConsole, UserSummary};
use crate::clock::client_day_string;
use crate::codes::{InviteCode, RedeemCode};
use crate::core::Points;
use crate::facade::PointGate;
use crate::identity::{Registration, RegistrationSettings, UserProfile};
use crate::ledger::{
    AccessState, AdjustAction, CheckInReceipt, EffectiveAccess, Leaderboard, LedgerStatus,
    RedeemReceipt,
};
use crate::purge::PurgeReport;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::routing::{delete, get, post};
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tower_http::trace::TraceLayer;

#[derive(Clone)]
pub struct AppState {
    pub gate: Arc<PointGate>,
    pub admin: Arc<AdminConsole>,
}

impl AppState {
    pub fn new(gate: Arc<PointGate>, admin: Arc<AdminConsole>) -> Self {
        Self { gate, admin }
    }
}

pub fn build_router(state: AppState) -> Router {
    let member = Router::new()
        .route("/status", get(status))
        .route("/check-in", post(check_in))
        .route("/access", post(toggle_access))
        .route("/redeem", post(redeem))
        .route("/password", post(change_password))
        .route("/leaderboard", get(leaderboard))
        .route("/access-gate", get(access_gate));

    let admin = Router::new()
        .route("/login", post(admin_login))
        .route("/users", get(list_users))
        .route("/users/:handle", delete(delete_user))
        .route("/users/:handle/points", post(adjust_points))
        .route("/users/:handle/ban", post(set_banned))
        .route("/redeem-codes", get(list_redeem_codes).post(create_redeem_codes))
        .route("/redeem-codes/:code", delete(delete_redeem_code))
        .route("/invite-codes", get(list_invite_codes).post(create_invite_codes))
        .route("/invite-codes/:code", delete(delete_invite_code))
        .route(
            "/settings/registration",
            get(registration_settings).put(set_registration_settings),
        );

    Router::new()
        .route("/health", get(healthcheck))
        .route("/api/register", post(register))
        .nest("/api/me", member)
        .nest("/api/admin", admin)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

#[derive(Debug, Serialize)]
pub struct Health {
    pub status: &'static str,
}

async fn healthcheck() -> Json<Health> {
    Json(Health { status: "ok" })
}

// ---- member routes ----

#[derive(Debug, Serialize)]
pub struct StatusResponse {
    #[serde(flatten)]
    pub status: LedgerStatus,
    /// Calendar day of the client, when it sent its offset
    #[serde(skip_serializing_if = "Option::is_none")]
    pub today: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub next_check_in_day: Option<String>,
}

async fn status(
    State(state): State<AppState>,
    Member(handle): Member,
    ClientTimezone(tz): ClientTimezone,
) -> Result<Json<StatusResponse>> {
    let status = state.gate.ledger().status(&handle).await?;
    let (today, next_check_in_day) = match tz {
        Some(tz) => (
            Some(client_day_string(state.gate.clock().now(), tz)?),
            Some(client_day_string(status.next_check_in_at, tz)?),
        ),
        None => (None, None),
    };
    Ok(Json(StatusResponse {
        status,
        today,
        next_check_in_day,
    }))
}

async fn check_in(State(state): State<AppState>, Member(handle): Member) -> Result<Json<CheckInReceipt>> {
    Ok(Json(state.gate.ledger().check_in(&handle).await?))
}

#[derive(Debug, Deserialize)]
pub struct ToggleAccessRequest {
    pub enabled: bool,
}

async fn toggle_access(
    State(state): State<AppState>,
    Member(handle): Member,
    Json(payload): Json<ToggleAccessRequest>,
) -> Result<Json<AccessState>> {
    Ok(Json(state.gate.ledger().toggle_access(&handle, payload.enabled).await?))
}

#[derive(Debug, Deserialize)]
pub struct RedeemRequest {
    pub code: String,
}

async fn redeem(
    State(state): State<AppState>,
    Member(handle): Member,
    Json(payload): Json<RedeemRequest>,
) -> Result<Json<RedeemReceipt>> {
    Ok(Json(state.gate.ledger().redeem(&handle, &payload.code).await?))
}

#[derive(Deserialize)]
pub struct ChangePasswordRequest {
    #[serde(default)]
    pub current_password: String,
    pub new_password: String,
}

async fn change_password(
    State(state): State<AppState>,
    Member(handle): Member,
    Json(payload): Json<ChangePasswordRequest>,
) -> Result<StatusCode> {
    state
        .gate
        .identity()
        .change_password(&handle, &payload.current_password, &payload.new_password)
        .await?;
    Ok(StatusCode::NO_CONTENT)
}

async fn leaderboard(State(state): State<AppState>, Member(handle): Member) -> Result<Json<Leaderboard>> {
    Ok(Json(state.gate.leaderboard(&handle).await?))
}

/// Never fails for a missing session; reports `NOT_LOGGED_IN` instead.
async fn access_gate(
    State(state): State<AppState>,
    SessionHandle(handle): SessionHandle,
) -> Result<Json<EffectiveAccess>> {
    Ok(Json(state.gate.effective_access(handle.as_deref()).await?))
}

async fn register(
    State(state): State<AppState>,
    Json(payload): Json<Registration>,
) -> Result<(StatusCode, Json<UserProfile>)> {
    let user = state.gate.register(&payload).await?;
    Ok((StatusCode::CREATED, Json(UserProfile::from(&user))))
}

// ---- admin routes ----

#[derive(Deserialize)]
pub struct AdminLoginRequest {
    pub username: String,
    pub password: String,
}

#[derive(Debug, Serialize)]
pub struct AdminLoginResponse {
    pub username: String,
}

async fn admin_login(
    State(state): State<AppState>,
    Json(payload): Json<AdminLoginRequest>,
) -> Result<Json<AdminLoginResponse>> {
    state.admin.login(&payload.username, &payload.password)?;
    Ok(Json(AdminLoginResponse {
        username: payload.username,
    }))
}

async fn list_users(State(state): State<AppState>, _: Admin) -> Result<Json<Vec<UserSummary>>> {
    Ok(Json(state.admin.list_users().await?))
}

#[derive(Debug, Deserialize)]
pub struct AdjustPointsRequest {
    pub action: AdjustAction,
    pub amount: f64,
}

#[derive(Debug, Serialize)]
pub struct PointsResponse {
    pub handle: String,
    pub points: Points,
}

async fn adjust_points(
    State(state): State<AppState>,
    _: Admin,
    Path(handle): Path<String>,
    Json(payload): Json<AdjustPointsRequest>,
) -> Result<Json<PointsResponse>> {
    let points = state.admin.adjust_points(&handle, payload.action, payload.amount).await?;
    Ok(Json(PointsResponse { handle, points }))
}

#[derive(Debug, Deserialize)]
pub struct BanRequest {
    pub banned: bool,
}

async fn set_banned(
    State(state): State<AppState>,
    _: Admin,
    Path(handle): Path<String>,
    Json(payload): Json<BanRequest>,
) -> Result<Json<UserProfile>> {
    let user = state.admin.set_banned(&handle, payload.banned).await?;
    Ok(Json(UserProfile::from(&user)))
}

async fn delete_user(
    State(state): State<AppState>,
    _: Admin,
    Path(handle): Path<String>,
) -> Result<Json<PurgeReport>> {
    Ok(Json(state.admin.delete_user_data(&handle).await?))
}

#[derive(Debug, Deserialize)]
pub struct CreateRedeemCodesRequest {
    pub count: usize,
    pub points: u32,
}

async fn create_redeem_codes(
    State(state): State<AppState>,
    _: Admin,
    Json(payload): Json<CreateRedeemCodesRequest>,
) -> Result<(StatusCode, Json<Vec<RedeemCode>>)> {
    let codes = state.admin.create_redeem_codes(payload.count, payload.points).await?;
    Ok((StatusCode::CREATED, Json(codes)))
}

async fn list_redeem_codes(State(state): State<AppState>, _: Admin) -> Result<Json<Vec<RedeemCode>>> {
    Ok(Json(state.admin.list_redeem_codes().await?))
}

async fn delete_redeem_code(
    State(state): State<AppState>,
    _: Admin,
    Path(code): Path<String>,
) -> Result<StatusCode> {
    state.admin.delete_redeem_code(&code).await?;
    Ok(StatusCode::NO_CONTENT)
}

#[derive(Debug, Deserialize)]
pub struct CreateInviteCodesRequest {
    pub count: usize,
    #[serde(default)]
    pub expires_in_days: Option<u32>,
}

async fn create_invite_codes(
    State(state): State<AppState>,
    _: Admin,
    Json(payload): Json<CreateInviteCodesRequest>,
) -> Result<(StatusCode, Json<Vec<InviteCode>>)> {
    let codes = state.admin.create_invite_codes(payload.count, payload.expires_in_days).await?;
    Ok((StatusCode::CREATED, Json(codes)))
}

async fn list_invite_codes(State(state): State<AppState>, _: Admin) -> Result<Json<Vec<InviteCode>>> {
    Ok(Json(state.admin.list_invite_codes().await?))
}

async fn delete_invite_code(
    State(state): State<AppState>,
    _: Admin,
    Path(code): Path<String>,
) -> Result<StatusCode> {
    state.admin.delete_invite_code(&code).await?;
    Ok(StatusCode::NO_CONTENT)
}

async fn registration_settings(State(state): State<AppState>, _: Admin) -> Result<Json<RegistrationSettings>> {
    Ok(Json(state.admin.registration_settings().await?))
}

async fn set_registration_settings(
    State(state): State<AppState>,
    _: Admin,
    Json(payload): Json<RegistrationSettings>,
) -> Result<Json<RegistrationSettings>> {
    Ok(Json(state.admin.set_registration_enabled(payload.registration_enabled).await?))
}
