use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use anyhow::anyhow;
use axum::{
    Json, Router,
    extract::{Path, Query, Request, State},
    http::{HeaderValue, StatusCode, header},
    middleware::{self, Next},
    response::{IntoResponse, Response},
    routing::{delete, get, post, put},
};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use tower_http::limit::RequestBodyLimitLayer;

use crate::gemini::GeminiClient;
use nutri_core::calendar::{self, WeekDay};
use nutri_core::debug_log::{DebugLog, LogEntry};
use nutri_core::models::{
    AppState, DailyOverview, Meal, NewMeal, ProfileSummary, ShoppingItem, ShoppingListView,
    WaterLog, WeeklyGrid, WeightLog, parse_meal_category, validate_new_meal,
};
use nutri_core::service::{NutriService, needs_estimate};

const BODY_LIMIT: usize = 5 * 1024 * 1024; // 5 MB, room for a whole household document

#[derive(Clone)]
struct ServerState {
    service: Arc<Mutex<NutriService>>,
    advisor: Option<Arc<GeminiClient>>,
    debug_log: Arc<DebugLog>,
    api_key: Option<String>,
}

impl ServerState {
    fn service(&self) -> MutexGuard<'_, NutriService> {
        self.service.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

// --- Request / Response types ---

#[derive(Deserialize)]
struct MealRequest {
    week: Option<u32>,
    day: Option<u8>,
    category: String,
    food: String,
    #[serde(default)]
    amount: String,
    calories: Option<i64>,
}

impl MealRequest {
    fn into_new_meal(self, today: WeekDay) -> Result<NewMeal, ApiError> {
        Ok(NewMeal {
            week: self.week.unwrap_or(today.week),
            day: self.day.unwrap_or(today.day),
            category: parse_meal_category(&self.category).map_err(bad_request)?,
            food: self.food,
            amount: self.amount,
            calories: self.calories,
        })
    }
}

#[derive(Deserialize)]
struct WaterRequest {
    date: Option<String>,
    amount_ml: i64,
}

#[derive(Deserialize)]
struct WeightRequest {
    date: Option<String>,
    weight: f64,
}

#[derive(Deserialize)]
struct DateQuery {
    date: Option<String>,
}

#[derive(Serialize)]
struct TodayResponse {
    date: NaiveDate,
    week: u32,
    day: u8,
    day_name: &'static str,
    timezone: String,
}

#[derive(Serialize)]
struct WeeksResponse {
    weeks: Vec<u32>,
}

#[derive(Serialize)]
struct ExerciseResponse {
    date: NaiveDate,
    completed: bool,
}

#[derive(Serialize)]
struct ErrorResponse {
    error: String,
}

// --- Error handling ---

enum ApiError {
    NotFound(String),
    BadRequest(String),
    Internal(anyhow::Error),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            Self::NotFound(msg) => (StatusCode::NOT_FOUND, msg),
            Self::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg),
            Self::Internal(err) => {
                tracing::error!(error = %format!("{err:#}"), "internal server error");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "Internal server error".to_string(),
                )
            }
        };
        (status, Json(ErrorResponse { error: message })).into_response()
    }
}

impl From<anyhow::Error> for ApiError {
    fn from(err: anyhow::Error) -> Self {
        Self::Internal(err)
    }
}

fn bad_request(err: anyhow::Error) -> ApiError {
    ApiError::BadRequest(format!("{err:#}"))
}

fn resolve_user(svc: &NutriService, user: &str) -> Result<String, ApiError> {
    svc.resolve_user(user)
        .map_err(|e| ApiError::NotFound(format!("{e:#}")))
}

fn parse_date(s: &str) -> Result<NaiveDate, ApiError> {
    NaiveDate::parse_from_str(s, "%Y-%m-%d")
        .map_err(|_| ApiError::BadRequest(format!("Invalid date '{s}'. Use YYYY-MM-DD")))
}

fn date_or_today(svc: &NutriService, date: Option<&str>) -> Result<NaiveDate, ApiError> {
    match date {
        Some(s) => parse_date(s),
        None => Ok(svc.today()),
    }
}

// --- Middleware ---

async fn require_auth(State(state): State<ServerState>, request: Request, next: Next) -> Response {
    if let Some(ref expected_key) = state.api_key {
        let authorized = request
            .headers()
            .get(header::AUTHORIZATION)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.strip_prefix("Bearer "))
            .is_some_and(|token| token == expected_key);

        if !authorized {
            return (
                StatusCode::UNAUTHORIZED,
                Json(ErrorResponse {
                    error: "Invalid or missing API key".to_string(),
                }),
            )
                .into_response();
        }
    }
    next.run(request).await
}

async fn security_headers(request: Request, next: Next) -> Response {
    let mut response = next.run(request).await;
    let headers = response.headers_mut();
    headers.insert(
        "x-content-type-options",
        HeaderValue::from_static("nosniff"),
    );
    headers.insert("x-frame-options", HeaderValue::from_static("DENY"));
    headers.insert(
        "content-security-policy",
        HeaderValue::from_static("default-src 'none'"),
    );
    response
}

// --- AI calls (never under the service lock) ---

const NO_ADVISOR: &str = "No AI API key configured";

async fn estimate_calories(state: &ServerState, food: &str, amount: &str) -> i64 {
    if food.trim().is_empty() || amount.trim().is_empty() {
        return 0;
    }
    let result = match &state.advisor {
        Some(advisor) => advisor.estimate_calories_async(food, amount).await,
        None => Err(anyhow!(NO_ADVISOR)),
    };
    state.service().absorb_estimate(result)
}

async fn suggest_shopping_list(state: &ServerState, meals: &[Meal]) -> Vec<String> {
    if meals.is_empty() {
        return Vec::new();
    }
    let result = match &state.advisor {
        Some(advisor) => advisor.suggest_shopping_list_async(meals).await,
        None => Err(anyhow!(NO_ADVISOR)),
    };
    state.service().absorb_suggestions(result)
}

// --- Document handlers ---

async fn get_state(State(state): State<ServerState>) -> Json<AppState> {
    Json(state.service().snapshot())
}

async fn put_state(State(state): State<ServerState>, Json(doc): Json<AppState>) -> Json<AppState> {
    let mut svc = state.service();
    svc.replace_state(doc);
    Json(svc.snapshot())
}

async fn get_today(State(state): State<ServerState>) -> Json<TodayResponse> {
    let svc = state.service();
    let date = svc.today();
    let slot = calendar::week_day_of(date);
    Json(TodayResponse {
        date,
        week: slot.week,
        day: slot.day,
        day_name: calendar::day_name(slot.day),
        timezone: svc.timezone().to_string(),
    })
}

async fn get_debug_log(State(state): State<ServerState>) -> Json<Vec<LogEntry>> {
    Json(state.debug_log.entries())
}

// --- Meal handlers ---

async fn get_dashboard(
    State(state): State<ServerState>,
    Path(user): Path<String>,
    Query(query): Query<DateQuery>,
) -> Result<Json<DailyOverview>, ApiError> {
    let mut svc = state.service();
    let user = resolve_user(&svc, &user)?;
    let date = date_or_today(&svc, query.date.as_deref())?;
    let day = svc.daily_overview(&user, date).map_err(bad_request)?;
    Ok(Json(day))
}

async fn get_meal_weeks(
    State(state): State<ServerState>,
    Path(user): Path<String>,
) -> Result<Json<WeeksResponse>, ApiError> {
    let mut svc = state.service();
    let user = resolve_user(&svc, &user)?;
    let weeks = svc.meal_weeks(&user).map_err(bad_request)?;
    Ok(Json(WeeksResponse { weeks }))
}

async fn get_week(
    State(state): State<ServerState>,
    Path((user, week)): Path<(String, u32)>,
) -> Result<Json<WeeklyGrid>, ApiError> {
    let mut svc = state.service();
    let user = resolve_user(&svc, &user)?;
    let grid = svc.weekly_grid(&user, week).map_err(bad_request)?;
    Ok(Json(grid))
}

async fn copy_day(
    State(state): State<ServerState>,
    Path((user, week, day)): Path<(String, u32, u8)>,
) -> Result<(StatusCode, Json<Vec<Meal>>), ApiError> {
    let mut svc = state.service();
    let user = resolve_user(&svc, &user)?;
    let copies = svc.copy_day_menu(&user, week, day).map_err(bad_request)?;
    Ok((StatusCode::CREATED, Json(copies)))
}

async fn create_meal(
    State(state): State<ServerState>,
    Path(user): Path<String>,
    Json(req): Json<MealRequest>,
) -> Result<(StatusCode, Json<Meal>), ApiError> {
    let (user, mut new) = {
        let svc = state.service();
        let user = resolve_user(&svc, &user)?;
        (user, req.into_new_meal(svc.current_week_day())?)
    };
    validate_new_meal(&new).map_err(bad_request)?;

    if needs_estimate(&new) {
        new.calories = Some(estimate_calories(&state, &new.food, &new.amount).await);
    }

    let meal = state
        .service()
        .save_meal(&user, new, None)
        .map_err(bad_request)?;
    Ok((StatusCode::CREATED, Json(meal)))
}

async fn update_meal(
    State(state): State<ServerState>,
    Path((user, id)): Path<(String, String)>,
    Json(req): Json<MealRequest>,
) -> Result<Json<Meal>, ApiError> {
    let (user, mut new) = {
        let mut svc = state.service();
        let user = resolve_user(&svc, &user)?;
        svc.find_meal(&user, &id)
            .map_err(bad_request)?
            .ok_or_else(|| ApiError::NotFound(format!("Meal {id} not found")))?;
        (user, req.into_new_meal(svc.current_week_day())?)
    };
    validate_new_meal(&new).map_err(bad_request)?;

    if needs_estimate(&new) {
        new.calories = Some(estimate_calories(&state, &new.food, &new.amount).await);
    }

    let mut svc = state.service();
    // Deleted by someone else while estimating
    if svc.find_meal(&user, &id).map_err(bad_request)?.is_none() {
        return Err(ApiError::NotFound(format!("Meal {id} not found")));
    }
    let meal = svc.save_meal(&user, new, Some(&id)).map_err(bad_request)?;
    Ok(Json(meal))
}

async fn delete_meal(
    State(state): State<ServerState>,
    Path((user, id)): Path<(String, String)>,
) -> Result<StatusCode, ApiError> {
    let mut svc = state.service();
    let user = resolve_user(&svc, &user)?;
    if svc.remove_meal(&user, &id).map_err(bad_request)? {
        Ok(StatusCode::NO_CONTENT)
    } else {
        Err(ApiError::NotFound(format!("Meal {id} not found")))
    }
}

async fn toggle_meal(
    State(state): State<ServerState>,
    Path((user, id)): Path<(String, String)>,
) -> Result<Json<Meal>, ApiError> {
    let mut svc = state.service();
    let user = resolve_user(&svc, &user)?;
    svc.toggle_meal_consumed(&user, &id)
        .map_err(bad_request)?
        .map(Json)
        .ok_or_else(|| ApiError::NotFound(format!("Meal {id} not found")))
}

// --- Water / exercise / weight handlers ---

async fn log_water(
    State(state): State<ServerState>,
    Path(user): Path<String>,
    Json(req): Json<WaterRequest>,
) -> Result<Json<WaterLog>, ApiError> {
    let mut svc = state.service();
    let user = resolve_user(&svc, &user)?;
    let date = date_or_today(&svc, req.date.as_deref())?;
    let log = svc
        .log_water(&user, date, req.amount_ml)
        .map_err(bad_request)?;
    Ok(Json(log))
}

async fn delete_water(
    State(state): State<ServerState>,
    Path((user, date_str)): Path<(String, String)>,
) -> Result<StatusCode, ApiError> {
    let date = parse_date(&date_str)?;
    let mut svc = state.service();
    let user = resolve_user(&svc, &user)?;
    if svc.remove_water_log(&user, date).map_err(bad_request)? {
        Ok(StatusCode::NO_CONTENT)
    } else {
        Err(ApiError::NotFound(format!("No water logged on {date_str}")))
    }
}

async fn toggle_exercise(
    State(state): State<ServerState>,
    Path((user, date_str)): Path<(String, String)>,
) -> Result<Json<ExerciseResponse>, ApiError> {
    let date = parse_date(&date_str)?;
    let mut svc = state.service();
    let user = resolve_user(&svc, &user)?;
    let completed = svc.toggle_exercise(&user, date).map_err(bad_request)?;
    Ok(Json(ExerciseResponse { date, completed }))
}

async fn delete_exercise(
    State(state): State<ServerState>,
    Path((user, date_str)): Path<(String, String)>,
) -> Result<StatusCode, ApiError> {
    let date = parse_date(&date_str)?;
    let mut svc = state.service();
    let user = resolve_user(&svc, &user)?;
    if svc.remove_exercise(&user, date).map_err(bad_request)? {
        Ok(StatusCode::NO_CONTENT)
    } else {
        Err(ApiError::NotFound(format!("No exercise logged on {date_str}")))
    }
}

async fn log_weight(
    State(state): State<ServerState>,
    Path(user): Path<String>,
    Json(req): Json<WeightRequest>,
) -> Result<(StatusCode, Json<WeightLog>), ApiError> {
    let mut svc = state.service();
    let user = resolve_user(&svc, &user)?;
    let date = date_or_today(&svc, req.date.as_deref())?;
    let log = svc
        .log_weight(&user, date, req.weight)
        .map_err(bad_request)?;
    Ok((StatusCode::CREATED, Json(log)))
}

async fn delete_weight(
    State(state): State<ServerState>,
    Path((user, date_str)): Path<(String, String)>,
) -> Result<StatusCode, ApiError> {
    let date = parse_date(&date_str)?;
    let mut svc = state.service();
    let user = resolve_user(&svc, &user)?;
    if svc.remove_weight(&user, date).map_err(bad_request)? {
        Ok(StatusCode::NO_CONTENT)
    } else {
        Err(ApiError::NotFound(format!("No weight entry for {date_str}")))
    }
}

async fn get_profile(
    State(state): State<ServerState>,
    Path(user): Path<String>,
) -> Result<Json<ProfileSummary>, ApiError> {
    let mut svc = state.service();
    let user = resolve_user(&svc, &user)?;
    let profile = svc.profile(&user).map_err(bad_request)?;
    Ok(Json(profile))
}

// --- Shopping handlers ---

async fn get_shopping_weeks(
    State(state): State<ServerState>,
    Path(user): Path<String>,
) -> Result<Json<WeeksResponse>, ApiError> {
    let mut svc = state.service();
    let user = resolve_user(&svc, &user)?;
    let weeks = svc.shopping_weeks(&user).map_err(bad_request)?;
    Ok(Json(WeeksResponse { weeks }))
}

async fn get_shopping_list(
    State(state): State<ServerState>,
    Path((user, week)): Path<(String, u32)>,
) -> Result<Json<ShoppingListView>, ApiError> {
    let mut svc = state.service();
    let user = resolve_user(&svc, &user)?;
    let view = svc.shopping_list(&user, week).map_err(bad_request)?;
    Ok(Json(view))
}

async fn generate_shopping_list(
    State(state): State<ServerState>,
    Path((user, week)): Path<(String, u32)>,
) -> Result<(StatusCode, Json<Vec<ShoppingItem>>), ApiError> {
    let (user, meals) = {
        let mut svc = state.service();
        let user = resolve_user(&svc, &user)?;
        let meals = svc.week_meals(&user, week).map_err(bad_request)?;
        (user, meals)
    };

    let names = suggest_shopping_list(&state, &meals).await;

    let items = state
        .service()
        .replace_shopping_list(&user, week, names)
        .map_err(bad_request)?;
    Ok((StatusCode::CREATED, Json(items)))
}

async fn toggle_shopping_item(
    State(state): State<ServerState>,
    Path((user, id)): Path<(String, String)>,
) -> Result<Json<ShoppingItem>, ApiError> {
    let mut svc = state.service();
    let user = resolve_user(&svc, &user)?;
    svc.toggle_shopping_item(&user, &id)
        .map_err(bad_request)?
        .map(Json)
        .ok_or_else(|| ApiError::NotFound(format!("Shopping item {id} not found")))
}

fn build_router(state: ServerState) -> Router {
    Router::new()
        .route("/api/state", get(get_state).put(put_state))
        .route("/api/today", get(get_today))
        .route("/api/debug-log", get(get_debug_log))
        .route("/api/users/{user}/dashboard", get(get_dashboard))
        .route("/api/users/{user}/weeks", get(get_meal_weeks))
        .route("/api/users/{user}/weeks/{week}", get(get_week))
        .route(
            "/api/users/{user}/weeks/{week}/days/{day}/copy",
            post(copy_day),
        )
        .route("/api/users/{user}/meals", post(create_meal))
        .route(
            "/api/users/{user}/meals/{id}",
            put(update_meal).delete(delete_meal),
        )
        .route("/api/users/{user}/meals/{id}/toggle", post(toggle_meal))
        .route("/api/users/{user}/water", post(log_water))
        .route("/api/users/{user}/water/{date}", delete(delete_water))
        .route(
            "/api/users/{user}/exercise/{date}/toggle",
            post(toggle_exercise),
        )
        .route("/api/users/{user}/exercise/{date}", delete(delete_exercise))
        .route("/api/users/{user}/weight", post(log_weight))
        .route("/api/users/{user}/weight/{date}", delete(delete_weight))
        .route("/api/users/{user}/profile", get(get_profile))
        .route("/api/users/{user}/shopping", get(get_shopping_weeks))
        .route("/api/users/{user}/shopping/{week}", get(get_shopping_list))
        .route(
            "/api/users/{user}/shopping/{week}/generate",
            post(generate_shopping_list),
        )
        .route(
            "/api/users/{user}/shopping/items/{id}/toggle",
            post(toggle_shopping_item),
        )
        .route_layer(middleware::from_fn_with_state(state.clone(), require_auth))
        .layer(RequestBodyLimitLayer::new(BODY_LIMIT))
        .layer(middleware::from_fn(security_headers))
        .with_state(state)
}

// --- Server startup ---

pub struct ServerOptions {
    pub port: u16,
    pub bind: String,
    pub api_key: Option<String>,
    pub new_api_key: bool,
}

/// First and last four characters of the key, or nothing for short keys.
fn mask_key(key: &str) -> String {
    let chars: Vec<char> = key.chars().collect();
    if chars.len() < 8 {
        return "****".to_string();
    }
    let head: String = chars[..4].iter().collect();
    let tail: String = chars[chars.len() - 4..].iter().collect();
    format!("{head}...{tail}")
}

pub async fn start_server(
    service: NutriService,
    advisor: Option<Arc<GeminiClient>>,
    debug_log: Arc<DebugLog>,
    opts: ServerOptions,
) -> anyhow::Result<()> {
    let ServerOptions {
        port,
        bind,
        api_key,
        new_api_key,
    } = opts;

    let state = ServerState {
        service: Arc::new(Mutex::new(service)),
        advisor,
        debug_log,
        api_key: api_key.clone(),
    };

    let app = build_router(state);

    match api_key {
        Some(ref key) if new_api_key => {
            eprintln!("Generated new API key: {key}");
            eprintln!("Include in requests: Authorization: Bearer {key}");
        }
        Some(ref key) => eprintln!(
            "API key: {} (see server_key file in data directory)",
            mask_key(key)
        ),
        None => {
            eprintln!("Warning: Authentication disabled (--no-auth). API is open to anyone.");
        }
    }

    if bind != "127.0.0.1" && bind != "localhost" && api_key.is_none() {
        eprintln!(
            "Warning: Listening on {bind} with no authentication. Any device on your network can access this API."
        );
    }

    let listener = tokio::net::TcpListener::bind(format!("{bind}:{port}")).await?;
    tracing::info!(%bind, port, "server listening");
    eprintln!("Listening on http://{bind}:{port}");
    axum::serve(listener, app).await?;

    Ok(())
}
