//! Audit trail of fleet events.
//!
//! Writing an entry never decides the outcome of the operation being
//! audited: [`AuditService::record`] swallows store failures after logging
//! them.

use chrono::{DateTime, Utc};
use sea_orm::{
    ActiveModelTrait, ColumnTrait, EntityTrait, PaginatorTrait, QueryFilter, QueryOrder,
    QuerySelect, QueryTrait, Set,
};
use serde::{Deserialize, Serialize};

use crate::db::DbConn;
use crate::error::Result;
use crate::models::audit_log::{self, AuditAction, ResourceType};

/// One event to be written to the audit trail
#[derive(Debug, Clone)]
pub struct AuditEvent {
    action: AuditAction,
    resource_type: ResourceType,
    resource_id: Option<String>,
    firewall_id: Option<i64>,
    details: Option<serde_json::Value>,
}

impl AuditEvent {
    pub fn new(action: AuditAction, resource_type: ResourceType) -> Self {
        Self {
            action,
            resource_type,
            resource_id: None,
            firewall_id: None,
            details: None,
        }
    }

    pub fn resource(mut self, id: impl ToString) -> Self {
        self.resource_id = Some(id.to_string());
        self
    }

    pub fn firewall(mut self, firewall_id: i64) -> Self {
        self.firewall_id = Some(firewall_id);
        self
    }

    pub fn details(mut self, details: serde_json::Value) -> Self {
        self.details = Some(details);
        self
    }
}

#[derive(Clone)]
pub struct AuditService {
    db: DbConn,
}

impl AuditService {
    pub fn new(db: DbConn) -> Self {
        Self { db }
    }

    /// Write an entry, failing if the store rejects it
    pub async fn log(&self, event: AuditEvent, error_message: Option<String>) -> Result<()> {
        audit_log::ActiveModel {
            timestamp: Set(Utc::now()),
            firewall_id: Set(event.firewall_id),
            action: Set(event.action.as_str().to_string()),
            resource_type: Set(event.resource_type.as_str().to_string()),
            resource_id: Set(event.resource_id),
            details: Set(event.details.map(|d| d.to_string())),
            success: Set(error_message.is_none()),
            error_message: Set(error_message),
            ..Default::default()
        }
        .insert(&self.db)
        .await?;
        Ok(())
    }

    /// Write a success entry; failures only reach the log
    pub async fn record(&self, event: AuditEvent) {
        let action = event.action;
        if let Err(e) = self.log(event, None).await {
            tracing::warn!(action = action.as_str(), error = %e, "Failed to write audit log entry");
        }
    }
}

/// Filters for listing the audit trail
#[derive(Debug, Clone, Default, Deserialize, utoipa::IntoParams)]
pub struct AuditLogQuery {
    pub page: Option<u64>,
    pub per_page: Option<u64>,
    pub firewall_id: Option<i64>,
    pub action: Option<String>,
    pub resource_type: Option<String>,
    pub success: Option<bool>,
    /// Only entries at or after this instant
    #[param(value_type = Option<String>)]
    pub since: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Serialize, utoipa::ToSchema)]
pub struct AuditLogResponse {
    pub logs: Vec<audit_log::Model>,
    pub total: u64,
    pub page: u64,
    pub per_page: u64,
    pub total_pages: u64,
}

/// Newest entries first, filtered and paginated
pub async fn get_audit_logs(db: &DbConn, query: AuditLogQuery) -> Result<AuditLogResponse> {
    let page = query.page.unwrap_or(1).max(1);
    let per_page = query.per_page.unwrap_or(50).clamp(1, 100);

    let select = audit_log::Entity::find()
        .apply_if(query.firewall_id, |q, id| {
            q.filter(audit_log::Column::FirewallId.eq(id))
        })
        .apply_if(query.action, |q, action| {
            q.filter(audit_log::Column::Action.eq(action))
        })
        .apply_if(query.resource_type, |q, kind| {
            q.filter(audit_log::Column::ResourceType.eq(kind))
        })
        .apply_if(query.success, |q, success| {
            q.filter(audit_log::Column::Success.eq(success))
        })
        .apply_if(query.since, |q, since| {
            q.filter(audit_log::Column::Timestamp.gte(since))
        });

    let total = select.clone().count(db).await?;
    let logs = select
        .order_by_desc(audit_log::Column::Timestamp)
        .order_by_desc(audit_log::Column::Id)
        .offset((page - 1) * per_page)
        .limit(per_page)
        .all(db)
        .await?;

    Ok(AuditLogResponse {
        logs,
        total,
        page,
        per_page,
        total_pages: total.div_ceil(per_page),
    })
}

/// Delete entries older than `days`
pub async fn clear_old_logs(db: &DbConn, days: i64) -> Result<u64> {
    let cutoff = Utc::now() - chrono::Duration::days(days);
    let result = audit_log::Entity::delete_many()
        .filter(audit_log::Column::Timestamp.lt(cutoff))
        .exec(db)
        .await?;
    Ok(result.rows_affected)
}
