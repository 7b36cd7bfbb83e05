use std::sync::Arc;

use tracing::{debug, warn};

use pt_core::{CoreError, CoreResult, ItemName, RecipeSuggestion, RecommendationService};

use crate::state::SessionState;

/// Prompt asking for recipe titles that use the given items.
pub fn build_prompt(names: &[ItemName]) -> String {
    let items = names
        .iter()
        .map(ItemName::as_str)
        .collect::<Vec<_>>()
        .join(", ");
    format!(
        "Suggest recipes I can make with the following pantry items: {items}. \
         Reply with one recipe title per line and nothing else."
    )
}

/// Fetch suggestions for `names` and install them under `generation`.
///
/// An empty pantry clears the list without calling the service. On failure
/// the current list is left untouched.
pub(crate) async fn refresh(
    recommender: &dyn RecommendationService,
    state: &SessionState,
    generation: u64,
    names: &[ItemName],
) -> CoreResult<Arc<Vec<RecipeSuggestion>>> {
    if names.is_empty() {
        return Ok(state.replace_suggestions(generation, Vec::new()));
    }

    let text = recommender
        .complete(&build_prompt(names))
        .await
        .map_err(|err| {
            warn!(error = %err, "recipe suggestions unavailable");
            match err {
                CoreError::RecommendationFailed(_) => err,
                other => CoreError::RecommendationFailed(other.to_string()),
            }
        })?;

    let suggestions = RecipeSuggestion::parse_completion(&text);
    debug!(count = suggestions.len(), generation, "received recipe suggestions");
    Ok(state.replace_suggestions(generation, suggestions))
}
