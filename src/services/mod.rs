pub mod audit;
pub mod checkin;
pub mod fleet;
pub mod identity;
pub mod ledger;
pub mod orchestrator;
pub mod relay;
pub mod scheduler;
pub mod telemetry;

pub use audit::AuditService;
pub use checkin::CheckinService;
pub use orchestrator::UpdateOrchestrator;
