//! Deploy↔incident correlation.
//!
//! Production deploys and incident occurrences within a short window of
//! each other are probably related. Two passes over a stream's history:
//!
//! - forward: each unlinked production deploy claims the first incident
//!   occurring within the window after it;
//! - backward: each unlinked resolved incident claims the most recent
//!   production deploy within the window before its occurrence.
//!
//! Both passes write to the same link table keyed on (deploy, incident),
//! so a pair is never linked twice and reruns are no-ops.

use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::events::{DeployEvent, EventStore, IncidentPhase};
use crate::types::StreamId;

use super::store::LinkStore;

/// Window within which a deploy and an incident are considered related.
/// Both window ends are inclusive.
pub const DEFAULT_CORRELATION_WINDOW_MINUTES: i64 = 60;

/// A derived association between one production deploy and one incident.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeployIncidentLink {
    pub stream: StreamId,
    pub deploy_subject: String,
    pub deploy_version: String,
    pub deployed_at: DateTime<Utc>,
    pub incident_id: String,
    pub incident_occurred_at: DateTime<Utc>,
}

/// Links production deploys to incidents over the canonical history.
pub struct DeployIncidentCorrelator {
    events: Arc<dyn EventStore>,
    links: Arc<dyn LinkStore>,
    window: Duration,
}

impl DeployIncidentCorrelator {
    pub fn new(events: Arc<dyn EventStore>, links: Arc<dyn LinkStore>) -> Self {
        Self::with_window(events, links, DEFAULT_CORRELATION_WINDOW_MINUTES)
    }

    pub fn with_window(
        events: Arc<dyn EventStore>,
        links: Arc<dyn LinkStore>,
        window_minutes: i64,
    ) -> Self {
        DeployIncidentCorrelator {
            events,
            links,
            window: Duration::minutes(window_minutes),
        }
    }

    /// Runs both correlation passes for one stream over `[from, to]`,
    /// returning the links created in this run.
    pub fn run(
        &self,
        stream: &StreamId,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> crate::events::Result<Vec<DeployIncidentLink>> {
        let mut created = Vec::new();
        self.forward_pass(stream, from, to, &mut created)?;
        self.backward_pass(stream, from, to, &mut created)?;
        Ok(created)
    }

    /// Deploy → incident: the first incident occurring in
    /// `[deployed_at, deployed_at + window]` is attributed to the deploy.
    fn forward_pass(
        &self,
        stream: &StreamId,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
        created: &mut Vec<DeployIncidentLink>,
    ) -> crate::events::Result<()> {
        let deploys = self.events.deploys_between(stream, from, to)?;
        for deploy in deploys.iter().filter(|d| d.is_production()) {
            if self.links.for_deploy(&deploy.subject_key()).is_some() {
                continue;
            }
            let incidents = self.events.incidents_between(
                stream,
                deploy.deployed_at,
                deploy.deployed_at + self.window,
            )?;
            // Ordered by occurrence; the first unlinked incident wins.
            let Some(incident) = incidents
                .iter()
                .find(|i| self.links.for_incident(&i.incident_id).is_none())
            else {
                continue;
            };
            self.record(deploy, &incident.incident_id, incident.occurred_at, created);
        }
        Ok(())
    }

    /// Incident → deploy: a resolved incident is attributed to the most
    /// recent production deploy in `[occurred_at - window, occurred_at]`.
    fn backward_pass(
        &self,
        stream: &StreamId,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
        created: &mut Vec<DeployIncidentLink>,
    ) -> crate::events::Result<()> {
        let incidents = self.events.incidents_between(stream, from, to)?;
        for incident in incidents
            .iter()
            .filter(|i| i.phase == IncidentPhase::Resolved)
        {
            if self.links.for_incident(&incident.incident_id).is_some() {
                continue;
            }
            let deploys = self.events.deploys_between(
                stream,
                incident.occurred_at - self.window,
                incident.occurred_at,
            )?;
            let Some(deploy) = deploys
                .iter()
                .rev()
                .filter(|d| d.is_production())
                .find(|d| self.links.for_deploy(&d.subject_key()).is_none())
            else {
                continue;
            };
            self.record(deploy, &incident.incident_id, incident.occurred_at, created);
        }
        Ok(())
    }

    fn record(
        &self,
        deploy: &DeployEvent,
        incident_id: &str,
        occurred_at: DateTime<Utc>,
        created: &mut Vec<DeployIncidentLink>,
    ) {
        let link = DeployIncidentLink {
            stream: deploy.stream.clone(),
            deploy_subject: deploy.subject_key(),
            deploy_version: deploy.version.clone(),
            deployed_at: deploy.deployed_at,
            incident_id: incident_id.to_string(),
            incident_occurred_at: occurred_at,
        };
        if self.links.upsert(link.clone()) {
            debug!(
                stream = %link.stream,
                version = %link.deploy_version,
                incident = %link.incident_id,
                "deploy/incident link created"
            );
            created.push(link);
        }
    }
}
