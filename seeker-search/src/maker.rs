//! Tools to build providers from configuration.

use crate::{FixedProvider, NullProvider, SearchProvider, SetupError};
use seeker_settings::SearchProviderConfig;

/// Build the provider described by `config`.
///
/// # Errors
/// If the configuration is not usable.
pub fn make_provider(config: &SearchProviderConfig) -> Result<Box<dyn SearchProvider>, SetupError> {
    let provider: Box<dyn SearchProvider> = match config {
        SearchProviderConfig::Fixed(fixed_config) => FixedProvider::new_boxed(fixed_config)?,
        SearchProviderConfig::Null => Box::new(NullProvider),
    };
    Ok(provider)
}
