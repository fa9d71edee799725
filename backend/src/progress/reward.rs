use crate::error::CompletionError;
use crate::progress::model::{CatalogModule, CompletionTarget};

/// Resolves the server-side reward for `target` from its catalog module.
///
/// Rewards absent from the catalog count as zero. An activity id the module
/// does not list is `NotFound`.
pub fn resolve_reward(
    module: &CatalogModule,
    target: &CompletionTarget,
) -> Result<u64, CompletionError> {
    match target.activity_id.as_deref() {
        None => Ok(module.points_reward.unwrap_or(0)),
        Some(activity_id) => module
            .activity(activity_id)
            .map(|a| a.points_reward.unwrap_or(0))
            .ok_or_else(CompletionError::activity_not_found),
    }
}
