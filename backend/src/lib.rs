use std::collections::{HashMap, HashSet};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use axum::extract::{Path, Query, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use draw_core::{Assignment, SeedError, Tier};
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;
use tracing::{info, warn};
use uuid::Uuid;

mod config;

pub use config::Config;

#[derive(Clone)]
pub struct AppState {
    events: Arc<RwLock<HashMap<String, EventRecord>>>,
    config: Arc<Config>,
}

impl Default for AppState {
    fn default() -> Self {
        Self::from_config(Config::default())
    }
}

impl AppState {
    fn from_config(config: Config) -> Self {
        Self {
            events: Arc::new(RwLock::new(HashMap::new())),
            config: Arc::new(config),
        }
    }

    /// Builds state from `config`, loading the snapshot at `persist_path` if one exists.
    pub async fn new(config: Config) -> Self {
        let state = Self::from_config(config);
        if let Some(path) = &state.config.persist_path {
            if let Ok(bytes) = tokio::fs::read(path).await {
                match serde_json::from_slice::<HashMap<String, EventRecord>>(&bytes) {
                    Ok(saved) => {
                        info!(events = saved.len(), path = %path.display(), "loaded snapshot");
                        *state.events.write().await = saved;
                    }
                    Err(err) => warn!(path = %path.display(), "ignoring unreadable snapshot: {err}"),
                }
            }
        }
        state
    }

    pub async fn with_persistence(path: impl Into<PathBuf>) -> Self {
        Self::new(Config {
            persist_path: Some(path.into()),
            ..Config::default()
        })
        .await
    }

    async fn persist(&self) {
        if let Some(path) = &self.config.persist_path {
            let snapshot = {
                let events = self.events.read().await;
                events.clone()
            };
            match serde_json::to_vec_pretty(&snapshot) {
                Ok(json) => {
                    if let Err(err) = tokio::fs::write(path, json).await {
                        warn!(path = %path.display(), "persist error: {err}");
                    }
                }
                Err(err) => warn!("snapshot encode error: {err}"),
            }
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct EventRecord {
    pub id: String,
    pub name: String,
    pub participants: Vec<ParticipantRecord>,
    pub tiers: Vec<Tier>,
    pub assignments: Vec<Assignment>,
    pub created_at: u64,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ParticipantRecord {
    pub id: String,
    pub name: String,
    pub email: Option<String>,
    pub invite_token: String,
    #[serde(default)]
    pub has_drawn: bool,
}

impl EventRecord {
    fn participant_ids(&self) -> Vec<String> {
        self.participants.iter().map(|p| p.id.clone()).collect()
    }

    fn tier_ids(&self) -> Vec<String> {
        draw_core::tier_ids(&self.tiers)
    }

    fn participant_name(&self, id: &str) -> Option<&str> {
        self.participants
            .iter()
            .find(|p| p.id == id)
            .map(|p| p.name.as_str())
    }

    /// One row per tier in tier order. Recipients stay hidden unless `reveal`.
    fn recipients_for(&self, giver_id: &str, reveal: bool) -> Vec<TierRecipient> {
        self.tiers
            .iter()
            .map(|tier| TierRecipient {
                tier_id: tier.id.clone(),
                name: tier.name.clone(),
                budget_cents: tier.budget_cents,
                recipient: reveal
                    .then(|| {
                        self.assignments
                            .iter()
                            .find(|a| a.tier_id == tier.id && a.giver_id == giver_id)
                            .and_then(|a| self.participant_name(&a.recipient_id))
                            .map(str::to_string)
                    })
                    .flatten(),
            })
            .collect()
    }
}

pub fn app(state: AppState) -> Router {
    Router::new()
        .route("/healthz", get(healthz))
        .route("/event", post(create_event))
        .route("/event/:id", get(get_event))
        .route("/event/:id/verify", get(verify_event))
        .route("/admin/reset", post(reset_events))
        .route("/draw/:token", get(get_draw).post(reveal_draw))
        .with_state(state)
}

#[derive(Debug, thiserror::Error)]
enum EventError {
    #[error("invalid admin password")]
    Unauthorized,
    #[error("event not found")]
    EventNotFound,
    #[error("invalid token")]
    InvalidToken,
    #[error("{0}")]
    BadRequest(String),
    #[error("{0}")]
    Conflict(String),
    #[error(transparent)]
    Seed(#[from] SeedError),
}

impl EventError {
    fn status(&self) -> StatusCode {
        match self {
            EventError::Unauthorized => StatusCode::UNAUTHORIZED,
            EventError::EventNotFound | EventError::InvalidToken => StatusCode::NOT_FOUND,
            EventError::BadRequest(_) => StatusCode::BAD_REQUEST,
            EventError::Conflict(_) => StatusCode::CONFLICT,
            EventError::Seed(SeedError::InvalidInput(_)) => StatusCode::BAD_REQUEST,
            EventError::Seed(SeedError::InfeasibleConstraints { .. }) => {
                StatusCode::UNPROCESSABLE_ENTITY
            }
            EventError::Seed(SeedError::GenerationExhausted { .. }) => {
                StatusCode::SERVICE_UNAVAILABLE
            }
            EventError::Seed(SeedError::ConstraintViolation(_)) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }
}

impl IntoResponse for EventError {
    fn into_response(self) -> Response {
        (self.status(), Json(ErrorBody { error: self.to_string() })).into_response()
    }
}

#[derive(Serialize)]
struct ErrorBody {
    error: String,
}

#[derive(Deserialize)]
struct ParticipantRequest {
    name: String,
    email: Option<String>,
}

#[derive(Deserialize)]
struct TierRequest {
    name: Option<String>,
    budget_cents: Option<u32>,
}

#[derive(Deserialize)]
struct CreateEventRequest {
    name: String,
    participants: Vec<ParticipantRequest>,
    tiers: Option<Vec<TierRequest>>,
    gifts_per_person: Option<usize>,
}

#[derive(Deserialize)]
struct SeedParams {
    seed: Option<u64>,
}

/// Admin view of a participant. Never carries the invite token.
#[derive(Clone, Debug, Serialize)]
struct ParticipantView {
    id: String,
    name: String,
    email: Option<String>,
    has_drawn: bool,
}

#[derive(Clone, Debug, Serialize)]
struct EventView {
    id: String,
    name: String,
    participants: Vec<ParticipantView>,
    tiers: Vec<Tier>,
    created_at: u64,
}

impl From<&EventRecord> for EventView {
    fn from(event: &EventRecord) -> Self {
        Self {
            id: event.id.clone(),
            name: event.name.clone(),
            participants: event
                .participants
                .iter()
                .map(|p| ParticipantView {
                    id: p.id.clone(),
                    name: p.name.clone(),
                    email: p.email.clone(),
                    has_drawn: p.has_drawn,
                })
                .collect(),
            tiers: event.tiers.clone(),
            created_at: event.created_at,
        }
    }
}

#[derive(Serialize)]
struct Invite {
    participant_id: String,
    name: String,
    email: Option<String>,
    invite_token: String,
}

#[derive(Serialize)]
struct CreateEventResponse {
    event: EventView,
    invites: Vec<Invite>,
}

#[derive(Serialize)]
struct TierRecipient {
    tier_id: String,
    name: Option<String>,
    budget_cents: u32,
    recipient: Option<String>,
}

#[derive(Serialize)]
struct Me {
    name: String,
    email: Option<String>,
    has_drawn: bool,
}

#[derive(Serialize)]
struct EventSummary {
    id: String,
    name: String,
    tiers: Vec<Tier>,
}

#[derive(Serialize)]
struct MeResponse {
    me: Me,
    event: EventSummary,
    recipients_by_tier: Vec<TierRecipient>,
}

#[derive(Serialize)]
struct DrawResponse {
    ok: bool,
    recipients_by_tier: Vec<TierRecipient>,
}

#[derive(Serialize)]
struct VerifyResponse {
    ok: bool,
    assignments: usize,
}

#[derive(Serialize)]
struct OkResponse {
    ok: bool,
}

fn check_admin(state: &AppState, headers: &HeaderMap) -> Result<(), EventError> {
    let provided = headers
        .get("x-admin-password")
        .and_then(|v| v.to_str().ok())
        .unwrap_or("");
    if provided != state.config.admin_password {
        return Err(EventError::Unauthorized);
    }
    Ok(())
}

fn build_participants(
    requests: Vec<ParticipantRequest>,
) -> Result<Vec<ParticipantRecord>, EventError> {
    let mut names = HashSet::new();
    let mut participants = Vec::with_capacity(requests.len());
    for request in requests {
        let name = request.name.trim();
        if name.is_empty() {
            return Err(EventError::BadRequest("participant name required".into()));
        }
        if !names.insert(name.to_lowercase()) {
            return Err(EventError::Conflict(format!("duplicate participant {name}")));
        }
        participants.push(ParticipantRecord {
            id: Uuid::new_v4().to_string(),
            name: name.to_string(),
            email: request
                .email
                .map(|e| e.trim().to_string())
                .filter(|e| !e.is_empty()),
            invite_token: Uuid::new_v4().to_string(),
            has_drawn: false,
        });
    }
    Ok(participants)
}

/// Explicit tiers win; otherwise `gifts_per_person` numbered tiers with no budget.
/// The requested count is checked against `participants` before any tier is built.
fn build_tiers(
    tiers: Option<Vec<TierRequest>>,
    gifts_per_person: Option<usize>,
    participants: usize,
) -> Result<Vec<Tier>, EventError> {
    let tiers = tiers.filter(|t| !t.is_empty());
    let requested = match (&tiers, gifts_per_person) {
        (Some(tiers), _) => tiers.len(),
        (None, Some(count)) if count > 0 => count,
        _ => {
            return Err(EventError::BadRequest(
                "provide tiers or gifts_per_person > 0".into(),
            ))
        }
    };
    if participants < 2 {
        return Err(SeedError::InvalidInput("need at least 2 participants".into()).into());
    }
    if requested > participants - 1 {
        return Err(SeedError::InfeasibleConstraints {
            tiers: requested,
            participants,
        }
        .into());
    }

    Ok(match tiers {
        Some(tiers) => tiers
            .into_iter()
            .enumerate()
            .map(|(i, t)| Tier {
                id: Uuid::new_v4().to_string(),
                name: Some(
                    t.name
                        .map(|n| n.trim().to_string())
                        .filter(|n| !n.is_empty())
                        .unwrap_or_else(|| format!("Gift {}", i + 1)),
                ),
                budget_cents: t.budget_cents.unwrap_or(0),
            })
            .collect(),
        None => (0..requested)
            .map(|i| Tier::numbered(Uuid::new_v4().to_string(), i))
            .collect(),
    })
}

/// Runs the whole draw again with fresh randomness while the search keeps
/// exhausting its bounds, up to `config.seed_retries` extra times.
fn draw<R: Rng + ?Sized>(
    config: &Config,
    participants: &[String],
    tiers: &[String],
    rng: &mut R,
) -> Result<Vec<Assignment>, SeedError> {
    let mut retries = 0;
    loop {
        match draw_core::generate_with(participants, tiers, &config.seed, rng) {
            Err(err) if err.is_retryable() && retries < config.seed_retries => {
                retries += 1;
                warn!(retries, "draw exhausted, retrying: {err}");
            }
            result => return result,
        }
    }
}

fn now_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}

async fn healthz() -> &'static str {
    "ok"
}

async fn create_event(
    State(state): State<AppState>,
    headers: HeaderMap,
    Query(params): Query<SeedParams>,
    Json(payload): Json<CreateEventRequest>,
) -> Result<impl IntoResponse, EventError> {
    check_admin(&state, &headers)?;

    let name = payload.name.trim();
    if name.is_empty() {
        return Err(EventError::BadRequest("event name required".into()));
    }
    let participants = build_participants(payload.participants)?;
    let tiers = build_tiers(payload.tiers, payload.gifts_per_person, participants.len())?;

    let mut rng = params
        .seed
        .map(ChaCha8Rng::seed_from_u64)
        .unwrap_or_else(ChaCha8Rng::from_entropy);

    let mut event = EventRecord {
        id: Uuid::new_v4().to_string(),
        name: name.to_string(),
        participants,
        tiers,
        assignments: Vec::new(),
        created_at: now_millis(),
    };
    event.assignments = draw(
        &state.config,
        &event.participant_ids(),
        &event.tier_ids(),
        &mut rng,
    )?;

    let response = CreateEventResponse {
        event: EventView::from(&event),
        invites: event
            .participants
            .iter()
            .map(|p| Invite {
                participant_id: p.id.clone(),
                name: p.name.clone(),
                email: p.email.clone(),
                invite_token: p.invite_token.clone(),
            })
            .collect(),
    };
    info!(
        event = %event.id,
        participants = event.participants.len(),
        tiers = event.tiers.len(),
        "event seeded"
    );

    state.events.write().await.insert(event.id.clone(), event);
    state.persist().await;

    Ok((StatusCode::CREATED, Json(response)))
}

async fn get_event(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(event_id): Path<String>,
) -> Result<impl IntoResponse, EventError> {
    check_admin(&state, &headers)?;
    let events = state.events.read().await;
    let event = events.get(&event_id).ok_or(EventError::EventNotFound)?;
    Ok(Json(EventView::from(event)))
}

async fn verify_event(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(event_id): Path<String>,
) -> Result<impl IntoResponse, EventError> {
    check_admin(&state, &headers)?;
    let events = state.events.read().await;
    let event = events.get(&event_id).ok_or(EventError::EventNotFound)?;

    draw_core::verify(&event.participant_ids(), &event.tier_ids(), &event.assignments)
        .map_err(|err| EventError::Conflict(err.to_string()))?;

    Ok(Json(VerifyResponse {
        ok: true,
        assignments: event.assignments.len(),
    }))
}

async fn reset_events(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<impl IntoResponse, EventError> {
    check_admin(&state, &headers)?;
    let removed = {
        let mut events = state.events.write().await;
        let removed = events.len();
        events.clear();
        removed
    };
    info!(removed, "all events reset");
    state.persist().await;
    Ok(Json(OkResponse { ok: true }))
}

fn find_by_token<'a>(
    events: &'a HashMap<String, EventRecord>,
    token: &str,
) -> Option<(&'a EventRecord, &'a ParticipantRecord)> {
    events.values().find_map(|event| {
        event
            .participants
            .iter()
            .find(|p| p.invite_token == token)
            .map(|p| (event, p))
    })
}

async fn get_draw(
    State(state): State<AppState>,
    Path(token): Path<String>,
) -> Result<impl IntoResponse, EventError> {
    let events = state.events.read().await;
    let (event, me) = find_by_token(&events, &token).ok_or(EventError::InvalidToken)?;

    Ok(Json(MeResponse {
        me: Me {
            name: me.name.clone(),
            email: me.email.clone(),
            has_drawn: me.has_drawn,
        },
        event: EventSummary {
            id: event.id.clone(),
            name: event.name.clone(),
            tiers: event.tiers.clone(),
        },
        recipients_by_tier: event.recipients_for(&me.id, me.has_drawn),
    }))
}

async fn reveal_draw(
    State(state): State<AppState>,
    Path(token): Path<String>,
) -> Result<impl IntoResponse, EventError> {
    let (recipients_by_tier, first_reveal) = {
        let mut events = state.events.write().await;
        let participant = events.values_mut().find_map(|event| {
            let index = event
                .participants
                .iter()
                .position(|p| p.invite_token == token)?;
            Some((event, index))
        });
        let (event, index) = participant.ok_or(EventError::InvalidToken)?;

        let first_reveal = !event.participants[index].has_drawn;
        event.participants[index].has_drawn = true;
        let giver_id = event.participants[index].id.clone();
        (event.recipients_for(&giver_id, true), first_reveal)
    };

    if first_reveal {
        state.persist().await;
    }

    Ok(Json(DrawResponse {
        ok: true,
        recipients_by_tier,
    }))
}
