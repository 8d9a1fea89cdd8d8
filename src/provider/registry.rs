//! Provider selection.

use std::sync::Arc;

use super::{Provider, ProviderError};

/// First provider in `providers` claiming `strategy`
///
/// List order is the precedence order. Several providers claiming the same
/// strategy is not an error; the earliest one wins.
pub fn select_provider<R>(
    providers: &[Arc<dyn Provider<R>>],
    strategy: &str,
) -> Result<Arc<dyn Provider<R>>, ProviderError>
where
    R: Send + Sync,
{
    providers
        .iter()
        .find(|provider| provider.supports_strategy(strategy))
        .map(Arc::clone)
        .ok_or_else(|| ProviderError::NoProvider {
            strategy: strategy.to_string(),
        })
}
