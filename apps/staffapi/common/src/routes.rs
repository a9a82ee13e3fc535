use crate::staff::StaffLookup;
use crate::{ServiceError, StaffReport};
use actix_web::{HttpResponse, web};
use chrono::Utc;
use serde::Deserialize;
use serde_json::json;
use std::time::Duration;
use tracing::{error, warn};

/// Shared state handed to every handler
#[derive(Clone)]
pub struct AppState {
    pub staff: StaffLookup,
    pub request_timeout: Duration,
}

#[derive(Debug, Deserialize)]
pub struct StaffQuery {
    channel: Option<String>,
}

pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.route("/", web::get().to(handle_index))
        .route("/health", web::get().to(health_check))
        .route("/staff", web::get().to(handle_staff));
}

async fn handle_index() -> HttpResponse {
    HttpResponse::Ok().finish()
}

async fn health_check() -> HttpResponse {
    HttpResponse::Ok().json(json!({
        "status": "healthy",
        "timestamp": Utc::now()
    }))
}

async fn handle_staff(state: web::Data<AppState>, query: web::Query<StaffQuery>) -> HttpResponse {
    let channel = query.channel.as_deref().unwrap_or_default();

    let lookup = state.staff.lookup_staff(channel);
    match tokio::time::timeout(state.request_timeout, lookup).await {
        Ok(Ok(report)) => HttpResponse::Ok()
            .content_type("text/plain; charset=utf-8")
            .body(render_report(&report)),
        Ok(Err(ServiceError::InvalidChannelName(name))) => {
            warn!("Rejected staff lookup for invalid channel {:?}", name);
            HttpResponse::BadRequest().finish()
        }
        Ok(Err(e)) => {
            error!("Staff lookup for {:?} failed: {}", channel, e);
            HttpResponse::InternalServerError().finish()
        }
        Err(_) => {
            error!(
                "Staff lookup for {:?} timed out after {:?}",
                channel, state.request_timeout
            );
            HttpResponse::InternalServerError().finish()
        }
    }
}

pub fn render_report(report: &StaffReport) -> String {
    if report.staff.is_empty() {
        format!(
            "No staff in #{} ({} chatters)\n",
            report.channel, report.chatter_count
        )
    } else {
        format!(
            "{} staff in #{}: {}\n",
            report.staff.len(),
            report.channel,
            report.staff.join(" ")
        )
    }
}
