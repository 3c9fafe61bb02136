//! Stage-mapping resolution.
//!
//! Provider status names are free-form and per-project ("In Review" in one
//! project is "Code Review" in another). External configuration maps
//! (project key, status name) onto the fixed [`PipelineStage`] vocabulary.
//! The core only reads these mappings; administration of them is an
//! external collaborator.

use std::collections::HashMap;
use std::sync::RwLock;

use serde::{Deserialize, Serialize};

use crate::types::{PipelineStage, ProjectKey};

/// One configured mapping row.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatusMapping {
    pub project: ProjectKey,
    pub status_name: String,
    pub stage: PipelineStage,
    /// Whether time spent in this status counts as active work.
    pub is_active_work: bool,
    /// Display ordering within the project's board.
    pub sort_order: u32,
}

/// Read-only lookup of status mappings.
pub trait StageMappingSource: Send + Sync {
    /// Resolves a provider status to its configured mapping.
    ///
    /// Returns `None` for unmapped statuses; callers record the event with a
    /// null stage rather than dropping it.
    fn resolve(&self, project: &ProjectKey, status_name: &str) -> Option<StatusMapping>;
}

/// Convenience: resolve straight to the stage, ignoring flags.
pub fn resolve_stage(
    source: &dyn StageMappingSource,
    project: &ProjectKey,
    status_name: &str,
) -> Option<PipelineStage> {
    source.resolve(project, status_name).map(|m| m.stage)
}

/// In-memory mapping table.
///
/// Lookup is case-sensitive on the status name, matching how providers
/// deliver it; configuration is expected to list each variant it wants
/// mapped.
#[derive(Debug, Default)]
pub struct StaticStageMappings {
    mappings: RwLock<HashMap<(ProjectKey, String), StatusMapping>>,
}

impl StaticStageMappings {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_mappings(mappings: impl IntoIterator<Item = StatusMapping>) -> Self {
        let table = Self::new();
        for mapping in mappings {
            table.upsert(mapping);
        }
        table
    }

    /// Adds or replaces a mapping row. (Exercised by wiring code and tests;
    /// the computation engines never call this.)
    pub fn upsert(&self, mapping: StatusMapping) {
        let mut map = self.mappings.write().expect("stage mappings poisoned");
        map.insert(
            (mapping.project.clone(), mapping.status_name.clone()),
            mapping,
        );
    }
}

impl StageMappingSource for StaticStageMappings {
    fn resolve(&self, project: &ProjectKey, status_name: &str) -> Option<StatusMapping> {
        let map = self.mappings.read().expect("stage mappings poisoned");
        map.get(&(project.clone(), status_name.to_string())).cloned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn mapping(project: &str, status: &str, stage: PipelineStage, active: bool) -> StatusMapping {
        StatusMapping {
            project: ProjectKey::new(project),
            status_name: status.to_string(),
            stage,
            is_active_work: active,
            sort_order: 0,
        }
    }

    #[test]
    fn resolves_per_project() {
        let table = StaticStageMappings::from_mappings([
            mapping("PAY", "In Review", PipelineStage::CodeReview, true),
            mapping("OPS", "In Review", PipelineStage::Qa, true),
        ]);

        assert_eq!(
            resolve_stage(&table, &ProjectKey::new("PAY"), "In Review"),
            Some(PipelineStage::CodeReview)
        );
        assert_eq!(
            resolve_stage(&table, &ProjectKey::new("OPS"), "In Review"),
            Some(PipelineStage::Qa)
        );
    }

    #[test]
    fn unmapped_status_resolves_to_none() {
        let table = StaticStageMappings::new();
        assert_eq!(
            resolve_stage(&table, &ProjectKey::new("PAY"), "Weird Custom Status"),
            None
        );
    }

    #[test]
    fn upsert_replaces_existing_row() {
        let table = StaticStageMappings::from_mappings([mapping(
            "PAY",
            "QA",
            PipelineStage::Qa,
            true,
        )]);
        table.upsert(mapping("PAY", "QA", PipelineStage::Uat, false));

        let resolved = table.resolve(&ProjectKey::new("PAY"), "QA").unwrap();
        assert_eq!(resolved.stage, PipelineStage::Uat);
        assert!(!resolved.is_active_work);
    }
}
