//! Plugins contributing action types
//!
//! A plugin is one registration function: it receives its options from the
//! config's `plugins` entry and adds handlers to the registry. Plugins are
//! compiled in and looked up by module name in a [`PluginCatalog`].

use crate::actions::{NodePlugin, StdPlugin};
use crate::config::{ActionOptions, PluginReference};
use crate::error::{ConfigError, RegistryResult, Result};
use crate::runner::ActionRegistry;
use tracing::debug;

/// Name of the plugin that is always loaded
pub const STD_PLUGIN: &str = "std";

/// A set of action types registered together
pub trait Plugin: Send + Sync {
    /// Module name used to reference the plugin from a config
    fn name(&self) -> &str;

    /// Register every action type this plugin provides
    fn register_actions(
        &self,
        options: &ActionOptions,
        registry: &mut ActionRegistry,
    ) -> RegistryResult<()>;
}

/// Plugins available to configs
#[derive(Default)]
pub struct PluginCatalog {
    plugins: Vec<Box<dyn Plugin>>,
}

impl PluginCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Catalog of the plugins shipped with cohesion
    pub fn builtin() -> Self {
        Self::new().with(StdPlugin).with(NodePlugin)
    }

    pub fn with<P: Plugin + 'static>(mut self, plugin: P) -> Self {
        self.plugins.push(Box::new(plugin));
        self
    }

    pub fn get(&self, name: &str) -> Option<&dyn Plugin> {
        self.plugins
            .iter()
            .find(|p| p.name() == name)
            .map(|p| p.as_ref())
    }

    pub fn names(&self) -> Vec<&str> {
        self.plugins.iter().map(|p| p.name()).collect()
    }

    /// Build the registry for an invocation: `std` first, unless referenced
    /// explicitly, then every referenced plugin in order
    pub fn build_registry(&self, references: &[PluginReference]) -> Result<ActionRegistry> {
        let mut registry = ActionRegistry::new();

        if !references.iter().any(|r| r.module == STD_PLUGIN) {
            self.load(STD_PLUGIN, &ActionOptions::new(), &mut registry)?;
        }
        for reference in references {
            self.load(&reference.module, &reference.options, &mut registry)?;
        }

        Ok(registry)
    }

    fn load(&self, name: &str, options: &ActionOptions, registry: &mut ActionRegistry) -> Result<()> {
        let plugin = self
            .get(name)
            .ok_or_else(|| ConfigError::PluginNotFound(name.to_string()))?;

        debug!(plugin = name, "loading plugin");
        plugin.register_actions(options, registry)?;
        Ok(())
    }
}
