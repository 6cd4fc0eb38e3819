//! Daily batch trigger for the external scheduler.

use axum::{Json, Router, extract::State, routing::get};
use chrono::Utc;

use crate::app::AppContext;
use crate::auth::CronAuthorized;
use crate::billing::BatchSummary;
use crate::error::Result;
use crate::http::RouteModule;

pub struct CronRoutes;

impl RouteModule for CronRoutes {
    fn routes(&self) -> Router<AppContext> {
        Router::new().route(
            "/subscription-billing",
            get(run_subscription_billing).post(run_subscription_billing),
        )
    }

    fn prefix(&self) -> Option<&str> {
        Some("/api/cron")
    }
}

/// `GET|POST /api/cron/subscription-billing`
async fn run_subscription_billing(
    _auth: CronAuthorized,
    State(ctx): State<AppContext>,
) -> Result<Json<BatchSummary>> {
    let summary = ctx.billing.run_daily(Utc::now()).await?;
    Ok(Json(summary))
}
