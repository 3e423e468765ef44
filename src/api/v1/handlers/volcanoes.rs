/*
 * Responsibility
 * - /volcanoes, /volcano, /volcanoes/update の handler
 * - 認可は route_layer (access middleware) 側で済んでいる前提。ここでは AuthCtx を受け取るだけ
 * - query / body の検証は認可の後 (未認可の caller には検索語の妥当性すら見せない)
 */
use std::collections::HashMap;

use axum::{
    Json,
    extract::{Query, State, rejection::JsonRejection},
};

use crate::{
    api::v1::{dto::volcanoes::Volcano, extractors::AuthCtxExtractor},
    error::AppError,
    repos::volcano_repo::VolcanoRecord,
    state::AppState,
};

const SEARCH_PARAM: &str = "volcanoname";

fn record_to_response(record: VolcanoRecord) -> Result<Volcano, AppError> {
    let id = record.id.clone();
    Volcano::from_record(record).map_err(|err| {
        tracing::error!(error = %err, id = %id, "stored volcano does not deserialize");
        AppError::Internal
    })
}

fn to_response(records: Vec<VolcanoRecord>) -> Result<Vec<Volcano>, AppError> {
    records.into_iter().map(record_to_response).collect()
}

pub async fn list_volcanoes(
    State(state): State<AppState>,
    AuthCtxExtractor(ctx): AuthCtxExtractor,
) -> Result<Json<Vec<Volcano>>, AppError> {
    let records = state.store.list_all().await?;
    tracing::debug!(subject = ctx.subject(), count = records.len(), "listed volcanoes");

    Ok(Json(to_response(records)?))
}

pub async fn find_volcano(
    State(state): State<AppState>,
    AuthCtxExtractor(ctx): AuthCtxExtractor,
    Query(params): Query<HashMap<String, String>>,
) -> Result<Json<Vec<Volcano>>, AppError> {
    // Query keys match case-insensitively.
    let term = params
        .iter()
        .find(|(key, _)| key.eq_ignore_ascii_case(SEARCH_PARAM))
        .map(|(_, value)| value.as_str())
        .filter(|value| !value.trim().is_empty())
        .ok_or(AppError::not_found("volcano"))?;

    let records = state.store.find_by_name(term).await?;
    tracing::debug!(subject = ctx.subject(), count = records.len(), "searched volcanoes");

    Ok(Json(to_response(records)?))
}

pub async fn update_volcano(
    State(state): State<AppState>,
    AuthCtxExtractor(ctx): AuthCtxExtractor,
    payload: Result<Json<Volcano>, JsonRejection>,
) -> Result<Json<Volcano>, AppError> {
    let Json(volcano) =
        payload.map_err(|rejection| AppError::bad_request("INVALID_JSON", rejection.body_text()))?;

    volcano
        .validate()
        .map_err(|msg| AppError::bad_request("INVALID_VOLCANO", msg))?;

    let record = volcano.into_record().map_err(|err| {
        tracing::error!(error = %err, "volcano does not serialize");
        AppError::Internal
    })?;

    let stored = state.store.upsert(record).await?;
    tracing::info!(
        subject = ctx.subject(),
        id = %stored.id,
        volcano = %stored.volcano_name,
        "volcano stored"
    );

    Ok(Json(record_to_response(stored)?))
}
