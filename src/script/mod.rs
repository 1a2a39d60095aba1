//! Deploy script collaborators.
//!
//! A [`DeployScript`] produces the declared targets of a run; a
//! [`SecretsLoader`] makes credentials available before the first target is
//! applied. The engine only depends on these traits. [`ManifestScript`] and
//! [`DotenvSecrets`] are the implementations used by the CLI.

mod manifest;
mod secrets;

use async_trait::async_trait;

use crate::error::Result;
use crate::plugin::ProviderRef;
use crate::queue::Declarer;

pub use manifest::ManifestScript;
pub use secrets::DotenvSecrets;

/// A deploy script evaluated once per run.
#[async_trait]
pub trait DeployScript: Send + Sized {
    /// Providers the script uses, loaded eagerly before the first target.
    fn providers(&self) -> Vec<ProviderRef>;

    /// Evaluates the script, declaring targets through `declarer`.
    ///
    /// Declarations end when the returned future completes and every clone
    /// of `declarer` has been dropped.
    async fn run(self, declarer: Declarer) -> Result<()>;
}

/// Loads secrets needed by providers.
#[async_trait]
pub trait SecretsLoader: Send + Sync {
    /// Loads secrets; called once per run, before the first target.
    async fn load(&self) -> Result<()>;
}

/// Secrets loader that does nothing.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoSecrets;

#[async_trait]
impl SecretsLoader for NoSecrets {
    async fn load(&self) -> Result<()> {
        Ok(())
    }
}
