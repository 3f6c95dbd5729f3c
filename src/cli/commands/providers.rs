//! Providers command implementation

use crate::providers::ProviderRegistry;
use clap::Args;

/// Arguments for the providers command
#[derive(Args, Debug)]
pub struct ProvidersArgs {}

impl ProvidersArgs {
    /// Print every registered strategy with its description
    pub async fn execute(&self) -> anyhow::Result<i32> {
        let registry = ProviderRegistry::builtin();
        let descriptions = registry.descriptions();
        let width = descriptions.iter().map(|(id, _)| id.len()).max().unwrap_or(0);

        println!("Available strategies:");
        for (id, description) in descriptions {
            println!("  {id:<width$}  {description}");
        }
        Ok(0)
    }
}
