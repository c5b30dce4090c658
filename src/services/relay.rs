//! Proxy request relay.
//!
//! Firewalls cannot be reached inbound, so HTTP requests for a firewall's
//! local web interface are parked here and handed to the agent on its next
//! check-in. Delivery is single-attempt: a drained request is never retried.
//! The response travels back through the tunnel session identified by
//! `client_id`, outside this service.

use chrono::{DateTime, Utc};
use sea_orm::sea_query::Expr;
use sea_orm::{
    ActiveEnum, ActiveModelTrait, ColumnTrait, EntityTrait, QueryFilter, QueryOrder, QuerySelect,
    Set, TransactionTrait,
};

use crate::db::DbConn;
use crate::error::{AppError, Result};
use crate::models::prelude::*;
use crate::models::proxy_request::{self, ProxyRequestStatus};
use crate::schemas::EnqueueProxyRequest;

const ALLOWED_METHODS: [&str; 7] = ["GET", "POST", "PUT", "PATCH", "DELETE", "HEAD", "OPTIONS"];

/// Queue an HTTP request for delivery to a firewall's local interface
pub async fn enqueue_proxy_request(
    db: &DbConn,
    firewall_id: i64,
    request: EnqueueProxyRequest,
) -> Result<proxy_request::Model> {
    let method = request.method.trim().to_ascii_uppercase();
    if !ALLOWED_METHODS.contains(&method.as_str()) {
        return Err(AppError::BadRequest(format!(
            "Unsupported HTTP method '{}'",
            request.method
        )));
    }
    if !request.path.starts_with('/') {
        return Err(AppError::BadRequest(
            "Path must start with '/'".to_string(),
        ));
    }
    if !(1..=65535).contains(&request.tunnel_port) {
        return Err(AppError::BadRequest(format!(
            "Invalid tunnel port {}",
            request.tunnel_port
        )));
    }

    if Firewall::find_by_id(firewall_id).one(db).await?.is_none() {
        return Err(AppError::NotFound(format!(
            "Firewall {} not found",
            firewall_id
        )));
    }

    let entry = proxy_request::ActiveModel {
        firewall_id: Set(firewall_id),
        client_id: Set(uuid::Uuid::new_v4().to_string()),
        tunnel_port: Set(request.tunnel_port),
        method: Set(method),
        path: Set(request.path),
        headers: Set(serde_json::to_string(&request.headers)?),
        body: Set(request.body),
        status: Set(ProxyRequestStatus::Pending),
        created_at: Set(Utc::now()),
        delivered_at: Set(None),
        ..Default::default()
    };

    let model = entry.insert(db).await?;
    tracing::debug!(
        firewall_id,
        request_id = model.id,
        client_id = %model.client_id,
        "Proxy request queued"
    );
    Ok(model)
}

/// Take up to `max_batch` pending requests for a firewall, oldest first,
/// and mark them delivered.
pub async fn drain_proxy_requests(
    db: &DbConn,
    firewall_id: i64,
    max_batch: u64,
    now: DateTime<Utc>,
) -> Result<Vec<proxy_request::Model>> {
    if max_batch == 0 {
        return Ok(Vec::new());
    }

    let txn = db.begin().await?;

    let candidates = ProxyRequest::find()
        .filter(proxy_request::Column::FirewallId.eq(firewall_id))
        .filter(proxy_request::Column::Status.eq(ProxyRequestStatus::Pending))
        .order_by_asc(proxy_request::Column::CreatedAt)
        .order_by_asc(proxy_request::Column::Id)
        .limit(max_batch)
        .all(&txn)
        .await?;

    let mut delivered = Vec::with_capacity(candidates.len());
    for candidate in candidates {
        let claimed = ProxyRequest::update_many()
            .col_expr(
                proxy_request::Column::Status,
                Expr::value(ProxyRequestStatus::Delivered.to_value()),
            )
            .col_expr(proxy_request::Column::DeliveredAt, Expr::value(now))
            .filter(proxy_request::Column::Id.eq(candidate.id))
            .filter(proxy_request::Column::Status.eq(ProxyRequestStatus::Pending))
            .exec(&txn)
            .await?;

        if claimed.rows_affected == 1 {
            delivered.push(proxy_request::Model {
                status: ProxyRequestStatus::Delivered,
                delivered_at: Some(now),
                ..candidate
            });
        }
    }

    txn.commit().await?;

    if !delivered.is_empty() {
        tracing::info!(firewall_id, delivered = delivered.len(), "Relayed proxy requests");
    }

    Ok(delivered)
}

/// Delete delivered requests older than `cutoff`
pub async fn purge_delivered_before(db: &DbConn, cutoff: DateTime<Utc>) -> Result<u64> {
    let result = ProxyRequest::delete_many()
        .filter(proxy_request::Column::Status.eq(ProxyRequestStatus::Delivered))
        .filter(proxy_request::Column::DeliveredAt.lt(cutoff))
        .exec(db)
        .await?;

    Ok(result.rows_affected)
}
