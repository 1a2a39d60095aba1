//! Deploy script backed by the manifest's `targets` list.

use async_trait::async_trait;
use serde_json::Value;
use std::time::Duration;
use tracing::debug;

use crate::config::DeployConfig;
use crate::error::{ConfigError, Result};
use crate::plugin::ProviderRef;
use crate::queue::Declarer;

use super::DeployScript;

/// Declares every manifest target, in manifest order.
#[derive(Debug, Clone)]
pub struct ManifestScript {
    providers: Vec<ProviderRef>,
    targets: Vec<ManifestTarget>,
}

#[derive(Debug, Clone)]
struct ManifestTarget {
    provider: ProviderRef,
    spec: Value,
    delay: Option<Duration>,
}

impl ManifestScript {
    /// Builds the script from a manifest.
    ///
    /// # Errors
    ///
    /// Returns an error if a target names a provider the manifest does not
    /// configure.
    pub fn from_config(config: &DeployConfig) -> Result<Self> {
        let targets = config
            .targets
            .iter()
            .enumerate()
            .map(|(i, target)| -> Result<ManifestTarget> {
                let provider = config.provider_ref(&target.provider).ok_or_else(|| {
                    ConfigError::validation(
                        format!("Target references unknown provider '{}'", target.provider),
                        format!("targets[{i}].provider"),
                    )
                })?;
                Ok(ManifestTarget {
                    provider,
                    spec: target.spec.clone(),
                    delay: target.after_ms.map(Duration::from_millis),
                })
            })
            .collect::<Result<Vec<_>>>()?;

        Ok(Self {
            providers: config.provider_refs(),
            targets,
        })
    }

    /// Number of targets the script declares.
    #[must_use]
    pub fn target_count(&self) -> usize {
        self.targets.len()
    }
}

#[async_trait]
impl DeployScript for ManifestScript {
    fn providers(&self) -> Vec<ProviderRef> {
        self.providers.clone()
    }

    async fn run(self, declarer: Declarer) -> Result<()> {
        for ManifestTarget {
            provider,
            spec,
            delay,
        } in self.targets
        {
            let index = declarer.declare(provider, async move {
                if let Some(delay) = delay {
                    tokio::time::sleep(delay).await;
                }
                Ok(spec)
            })?;
            debug!("Manifest target #{index} declared");
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ConfigParser;
    use crate::queue;

    const MANIFEST: &str = r#"
project:
  name: shop
providers:
  sites:
    hook: "builtin:file"
targets:
  - provider: sites
    after_ms: 30
    spec: { name: slow }
  - provider: sites
    spec: { name: fast }
"#;

    #[tokio::test]
    async fn test_manifest_targets_keep_manifest_order() {
        let config = ConfigParser::new()
            .parse_yaml(MANIFEST, None)
            .expect("parse failed");
        let script = ManifestScript::from_config(&config).expect("script failed");
        assert_eq!(script.target_count(), 2);
        assert_eq!(script.providers().len(), 1);

        let (declarer, mut queue) = queue::channel();
        script.run(declarer).await.expect("run failed");

        let mut names = Vec::new();
        while let Some(declaration) = queue.next().await.expect("queue failed") {
            let target = declaration.resolve().await.expect("resolve failed");
            names.push(target["name"].as_str().unwrap_or_default().to_string());
        }
        assert_eq!(names, vec![String::from("slow"), String::from("fast")]);
    }

    #[test]
    fn test_unknown_provider_rejected() {
        let mut config = ConfigParser::new()
            .parse_yaml(MANIFEST, None)
            .expect("parse failed");
        config.targets[1].provider = String::from("dns");
        assert!(ManifestScript::from_config(&config).is_err());
    }
}
