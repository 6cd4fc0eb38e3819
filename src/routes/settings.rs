//! Per-company billing configuration.

use axum::{
    Json, Router,
    extract::State,
    routing::{get, put},
};
use uuid::Uuid;

use crate::app::AppContext;
use crate::auth::{SessionClaims, SessionUser};
use crate::billing::{
    BillingHistory, BillingItem, BillingPreview, BillingProfile, BillingSettings,
    CreateItemRequest, HistoryQuery, UpdateItemRequest, UpdateProfileRequest,
};
use crate::error::{ErrorWithContext, Result};
use crate::http::{CreatedResponse, NoContentResponse, PathParams, RouteModule};
use crate::validation::{ValidatedJson, ValidatedQuery, validation_error};

pub struct SettingsRoutes;

impl RouteModule for SettingsRoutes {
    fn routes(&self) -> Router<AppContext> {
        Router::new()
            .route("/", get(get_settings).put(update_profile))
            .route("/items", axum::routing::post(add_item))
            .route("/items/{item_id}", put(update_item).delete(remove_item))
            .route("/history", get(list_history))
            .route("/preview", get(preview))
    }

    fn prefix(&self) -> Option<&str> {
        Some("/api/companies/{id}/billing")
    }
}

/// Resolve the company and check the session may act on its workspace.
async fn authorize(ctx: &AppContext, claims: &SessionClaims, company_id: &str) -> Result<()> {
    let company = ctx.billing.company(company_id).await?;
    claims.ensure_workspace(&company.workspace_id)
}

async fn get_settings(
    State(ctx): State<AppContext>,
    SessionUser(claims): SessionUser,
    PathParams(company_id): PathParams<String>,
) -> Result<Json<BillingSettings>> {
    authorize(&ctx, &claims, &company_id).await?;
    Ok(Json(ctx.billing.billing_settings(&company_id).await?))
}

async fn update_profile(
    State(ctx): State<AppContext>,
    SessionUser(claims): SessionUser,
    PathParams(company_id): PathParams<String>,
    ValidatedJson(request): ValidatedJson<UpdateProfileRequest>,
) -> Result<Json<BillingProfile>> {
    authorize(&ctx, &claims, &company_id).await?;
    let profile = ctx
        .billing
        .update_billing_profile(&company_id, request.into_update())
        .await?;
    Ok(Json(profile))
}

async fn add_item(
    State(ctx): State<AppContext>,
    SessionUser(claims): SessionUser,
    PathParams(company_id): PathParams<String>,
    ValidatedJson(request): ValidatedJson<CreateItemRequest>,
) -> std::result::Result<CreatedResponse<BillingItem>, ErrorWithContext> {
    let item = request.into_new_item().map_err(|e| validation_error(&e))?;
    authorize(&ctx, &claims, &company_id).await?;

    let item = ctx.billing.add_billing_item(&company_id, item).await?;
    let location = format!("/api/companies/{}/billing/items/{}", company_id, item.id);
    Ok(CreatedResponse::new(item, location))
}

async fn update_item(
    State(ctx): State<AppContext>,
    SessionUser(claims): SessionUser,
    PathParams((company_id, item_id)): PathParams<(String, Uuid)>,
    ValidatedJson(request): ValidatedJson<UpdateItemRequest>,
) -> std::result::Result<Json<BillingItem>, ErrorWithContext> {
    let update = request.into_update().map_err(|e| validation_error(&e))?;
    authorize(&ctx, &claims, &company_id).await?;

    let item = ctx
        .billing
        .update_billing_item(&company_id, item_id, update)
        .await?;
    Ok(Json(item))
}

async fn remove_item(
    State(ctx): State<AppContext>,
    SessionUser(claims): SessionUser,
    PathParams((company_id, item_id)): PathParams<(String, Uuid)>,
) -> Result<NoContentResponse> {
    authorize(&ctx, &claims, &company_id).await?;
    ctx.billing.remove_billing_item(&company_id, item_id).await?;
    Ok(NoContentResponse)
}

async fn list_history(
    State(ctx): State<AppContext>,
    SessionUser(claims): SessionUser,
    PathParams(company_id): PathParams<String>,
    ValidatedQuery(query): ValidatedQuery<HistoryQuery>,
) -> Result<Json<Vec<BillingHistory>>> {
    authorize(&ctx, &claims, &company_id).await?;
    Ok(Json(ctx.billing.billing_history(&company_id, query.limit).await?))
}

async fn preview(
    State(ctx): State<AppContext>,
    SessionUser(claims): SessionUser,
    PathParams(company_id): PathParams<String>,
) -> Result<Json<BillingPreview>> {
    authorize(&ctx, &claims, &company_id).await?;
    Ok(Json(ctx.billing.billing_preview(&company_id).await?))
}
