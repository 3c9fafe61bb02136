//! Cross-stream correlation analytics.
//!
//! Two engines live here: blocking correlation (which tech streams are
//! holding up which delivery streams, and how bad is it) and
//! deploy↔incident correlation (which production deploys likely caused
//! which incidents).

mod blocking;
mod deploy_incident;
mod severity;
mod store;

pub use blocking::{BlockingCorrelationEngine, CorrelationRecord, BLOCKING_WINDOW_DAYS};
pub use deploy_incident::{
    DeployIncidentCorrelator, DeployIncidentLink, DEFAULT_CORRELATION_WINDOW_MINUTES,
};
pub use severity::{Severity, SeverityRule, SeverityRuleTable};
pub use store::{
    CorrelationStore, LinkStore, MemoryCorrelationStore, MemoryLinkStore,
};
