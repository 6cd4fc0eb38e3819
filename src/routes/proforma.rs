//! On-demand proforma generation by an operator.

use axum::{Json, Router, extract::State, routing::post};
use chrono::Utc;
use serde::Deserialize;
use validator::Validate;

use crate::app::AppContext;
use crate::auth::SessionUser;
use crate::billing::ManualProforma;
use crate::error::Result;
use crate::http::RouteModule;
use crate::validation::ValidatedJson;

pub struct ProformaRoutes;

impl RouteModule for ProformaRoutes {
    fn routes(&self) -> Router<AppContext> {
        Router::new().route("/proforma", post(generate_proforma))
    }

    fn prefix(&self) -> Option<&str> {
        Some("/api/billing")
    }
}

#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct ProformaRequest {
    #[validate(length(min = 1, message = "is required"))]
    pub company_id: String,
}

/// `POST /api/billing/proforma`
async fn generate_proforma(
    State(ctx): State<AppContext>,
    SessionUser(claims): SessionUser,
    ValidatedJson(request): ValidatedJson<ProformaRequest>,
) -> Result<Json<ManualProforma>> {
    let company = ctx.billing.company(&request.company_id).await?;
    claims.ensure_workspace(&company.workspace_id)?;

    tracing::info!(
        company_id = %company.id,
        user_id = %claims.sub,
        "Manual proforma requested"
    );

    let proforma = ctx.billing.generate_manual(&company, Utc::now()).await?;
    Ok(Json(proforma))
}
