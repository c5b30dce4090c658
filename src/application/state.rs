use std::sync::Arc;

use crate::config::fleet::FleetConfig;
use crate::db::DbConn;
use crate::services::audit::AuditService;
use crate::services::checkin::CheckinService;

/// Application state containing all shared resources.
///
/// Nothing here is mutated per request; every check-in re-reads what it
/// needs from the database, so any number of server processes can share
/// one store.
#[derive(Clone)]
pub struct AppState {
    pub db: DbConn,
    pub fleet: Arc<FleetConfig>,
    pub audit: AuditService,
    pub checkin: CheckinService,
}

impl AppState {
    pub fn new(db: DbConn, fleet: FleetConfig) -> Self {
        let fleet = Arc::new(fleet);
        let audit = AuditService::new(db.clone());
        let checkin = CheckinService::new(db.clone(), fleet.clone(), audit.clone());

        Self {
            db,
            fleet,
            audit,
            checkin,
        }
    }
}
