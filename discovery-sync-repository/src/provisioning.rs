//! Idempotent startup provisioning of the search store.
//!
//! Provisioning runs once before consumption starts. Each step creates its
//! resource only when absent, so repeated startups against the same store
//! leave it unchanged.

use std::time::Duration;

use discovery_sync_shared::IndexNaming;
use serde_json::Value;
use tracing::info;

use crate::config::IndexSettings;
use crate::errors::IndexWriterError;
use crate::interfaces::IndexWriter;
use crate::opensearch::{category_template, lifecycle_policy};

/// Everything that must exist before the engine writes documents.
#[derive(Debug, Clone)]
pub struct ProvisioningPlan {
    pub template_name: String,
    pub template: Value,
    pub policy_name: String,
    pub policy: Value,
    pub index: String,
    pub alias: String,
    /// Deadline applied to each step.
    pub step_timeout: Duration,
}

impl ProvisioningPlan {
    /// Plan provisioning for the index that `naming` resolves to.
    pub fn for_naming(naming: &IndexNaming, settings: &IndexSettings, step_timeout: Duration) -> Self {
        Self {
            template_name: format!("{}-template", naming.alias_name()),
            template: category_template(naming, settings),
            policy_name: settings.policy_name.clone(),
            policy: lifecycle_policy(naming, settings),
            index: naming.index_name(),
            alias: naming.alias_name(),
            step_timeout,
        }
    }
}

/// Run the provisioning plan against `writer`.
///
/// Steps run in order: index template, lifecycle policy, current index,
/// alias, cluster health verification. The first failing step aborts the
/// run.
///
/// # Returns
///
/// * `Ok(())` - The store is ready for writes
/// * `Err(IndexWriterError::ProvisioningError)` - Naming the failed step
pub async fn provision(writer: &dyn IndexWriter, plan: &ProvisioningPlan) -> Result<(), IndexWriterError> {
    let timeout = plan.step_timeout;
    let step = |name: &'static str| move |e: IndexWriterError| IndexWriterError::provisioning(format!("{}: {}", name, e));

    let template_created = writer
        .ensure_index_template(&plan.template_name, &plan.template, timeout)
        .await
        .map_err(step("index template"))?;

    let policy_created = writer
        .ensure_lifecycle_policy(&plan.policy_name, &plan.policy, timeout)
        .await
        .map_err(step("lifecycle policy"))?;

    let index_created = writer
        .ensure_index(&plan.index, timeout)
        .await
        .map_err(step("index"))?;

    writer
        .ensure_alias(&plan.index, &plan.alias, timeout)
        .await
        .map_err(step("alias"))?;

    let health = writer
        .check_health(timeout)
        .await
        .map_err(step("health verification"))?;

    info!(
        template = %plan.template_name,
        template_created,
        policy = %plan.policy_name,
        policy_created,
        index = %plan.index,
        index_created,
        alias = %plan.alias,
        cluster = %health.cluster_name,
        cluster_status = ?health.status,
        "Search store provisioned"
    );
    Ok(())
}
