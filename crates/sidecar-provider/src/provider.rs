// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
use std::collections::HashMap;
use std::pin::Pin;
use std::sync::Arc;

use async_trait::async_trait;
use futures::Stream;
use serde::{Deserialize, Serialize};

use sidecar_config::{Config, ProfileConfig};

use crate::events::StreamEvent;
use crate::message::Message;

pub type EventStream = Pin<Box<dyn Stream<Item = anyhow::Result<StreamEvent>> + Send>>;

/// Schema of one tool offered to the model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolSchema {
    pub name: String,
    pub description: String,
    /// JSON Schema of the input object.
    pub input_schema: serde_json::Value,
}

/// Request sent to a model provider.
#[derive(Debug, Clone, Default)]
pub struct CompletionRequest {
    pub model: String,
    pub system: String,
    pub messages: Vec<Message>,
    pub tools: Vec<ToolSchema>,
}

/// A selectable provider/model pairing resolved from config.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Profile {
    pub name: String,
    pub provider: String,
    pub model: String,
}

impl Profile {
    pub fn from_config(p: &ProfileConfig) -> Self {
        Self {
            name: p.name.clone(),
            provider: p.provider.clone(),
            model: p.model.clone(),
        }
    }
}

#[async_trait]
pub trait Provider: Send + Sync {
    /// Provider name for status display and registry lookup.
    fn name(&self) -> &str;

    /// Open a streaming completion.  The returned stream yields unified
    /// envelope events; dropping it cancels the request best-effort.
    async fn stream(&self, req: CompletionRequest) -> anyhow::Result<EventStream>;
}

/// Registry of wire adapters, keyed by provider name.  Filled by the host at
/// bootstrap; the core resolves thread profiles against it.
#[derive(Default)]
pub struct ProviderRegistry {
    providers: HashMap<String, Arc<dyn Provider>>,
}

impl ProviderRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, provider: Arc<dyn Provider>) {
        self.providers
            .insert(provider.name().to_string(), provider);
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn Provider>> {
        self.providers.get(name).cloned()
    }

    /// Resolve a profile by name against the config, falling back to the
    /// active profile.
    pub fn resolve(
        &self,
        config: &Config,
        profile_name: Option<&str>,
    ) -> anyhow::Result<(Profile, Arc<dyn Provider>)> {
        let pc = match profile_name {
            Some(n) => config
                .profile(n)
                .ok_or_else(|| anyhow::anyhow!("unknown profile: {n}"))?,
            None => config
                .active_profile()
                .ok_or_else(|| anyhow::anyhow!("no profiles configured"))?,
        };
        let provider = self
            .get(&pc.provider)
            .ok_or_else(|| anyhow::anyhow!("no provider registered for '{}'", pc.provider))?;
        Ok((Profile::from_config(pc), provider))
    }
}

// ─── Unit tests ──────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::ScriptedProvider;

    fn config_with_profiles() -> Config {
        serde_yaml::from_str::<Config>(
            r#"
profiles:
  - { name: default, provider: scripted-mock, model: m1 }
  - { name: other, provider: missing, model: m2 }
active_profile: default
"#,
        )
        .unwrap()
    }

    #[test]
    fn resolve_active_profile() {
        let mut reg = ProviderRegistry::new();
        reg.register(Arc::new(ScriptedProvider::always_text("x")));
        let cfg = config_with_profiles();
        let (profile, provider) = reg.resolve(&cfg, None).unwrap();
        assert_eq!(profile.model, "m1");
        assert_eq!(provider.name(), "scripted-mock");
    }

    #[test]
    fn resolve_unregistered_provider_errors() {
        let reg = ProviderRegistry::new();
        let cfg = config_with_profiles();
        let err = match reg.resolve(&cfg, Some("other")) {
            Err(e) => e,
            Ok(_) => panic!("expected resolve to fail"),
        };
        assert!(err.to_string().contains("no provider registered"));
    }

    #[test]
    fn resolve_unknown_profile_errors() {
        let reg = ProviderRegistry::new();
        let cfg = config_with_profiles();
        assert!(reg.resolve(&cfg, Some("nope")).is_err());
    }
}
