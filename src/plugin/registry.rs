//! Capability-based plugin registry

use super::{Gate, GatePlugin, LogNotifier, Notifier, NotifierPlugin, Plugin, PluginInfo, StagePlugin};
use crate::core::config::{PluginKind, PluginsConfig};
use crate::stages::{CommandStage, Stage};
use parking_lot::RwLock;
use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Registered plugin names per capability, sorted
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct PluginListing {
    pub stages: Vec<String>,
    pub gates: Vec<String>,
    pub notifiers: Vec<String>,
}

/// Stage, gate and notifier plugins by name
///
/// Registering a name twice replaces the earlier plugin.
#[derive(Default)]
pub struct PluginRegistry {
    stages: RwLock<HashMap<String, StagePlugin>>,
    gates: RwLock<HashMap<String, GatePlugin>>,
    notifiers: RwLock<HashMap<String, NotifierPlugin>>,
}

fn sorted_names<T: ?Sized>(map: &HashMap<String, Plugin<T>>) -> Vec<String> {
    let mut names: Vec<String> = map.keys().cloned().collect();
    names.sort();
    names
}

impl PluginRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register_stage(&self, info: PluginInfo, stage: Arc<dyn Stage>) {
        debug!("Registering stage plugin: {} {}", info.name, info.version);
        self.stages.write().insert(
            info.name.clone(),
            Plugin {
                info,
                implementation: stage,
            },
        );
    }

    pub fn register_gate(&self, info: PluginInfo, gate: Arc<dyn Gate>) {
        debug!("Registering gate plugin: {} {}", info.name, info.version);
        self.gates.write().insert(
            info.name.clone(),
            Plugin {
                info,
                implementation: gate,
            },
        );
    }

    pub fn register_notifier(&self, info: PluginInfo, notifier: Arc<dyn Notifier>) {
        debug!("Registering notifier plugin: {} {}", info.name, info.version);
        self.notifiers.write().insert(
            info.name.clone(),
            Plugin {
                info,
                implementation: notifier,
            },
        );
    }

    pub fn get_stage_plugin(&self, name: &str) -> Option<StagePlugin> {
        self.stages.read().get(name).cloned()
    }

    pub fn get_gate_plugin(&self, name: &str) -> Option<GatePlugin> {
        self.gates.read().get(name).cloned()
    }

    pub fn get_notifier_plugin(&self, name: &str) -> Option<NotifierPlugin> {
        self.notifiers.read().get(name).cloned()
    }

    pub fn stage_plugin_names(&self) -> Vec<String> {
        sorted_names(&*self.stages.read())
    }

    /// All registered notifiers, in name order
    pub fn notifiers(&self) -> Vec<NotifierPlugin> {
        let notifiers = self.notifiers.read();
        sorted_names(&*notifiers)
            .iter()
            .filter_map(|name| notifiers.get(name).cloned())
            .collect()
    }

    pub fn list_all_plugins(&self) -> PluginListing {
        PluginListing {
            stages: sorted_names(&*self.stages.read()),
            gates: sorted_names(&*self.gates.read()),
            notifiers: sorted_names(&*self.notifiers.read()),
        }
    }

    /// Register the enabled entries of `plugins.yml`
    ///
    /// Stage entries become command-backed stages; notifier entries log.
    /// Returns the number of plugins registered.
    pub fn register_configured(&self, config: &PluginsConfig) -> usize {
        let mut registered = 0;
        for (name, plugin) in &config.plugins {
            if !plugin.enabled {
                debug!("Skipping disabled plugin: {}", name);
                continue;
            }
            let info = PluginInfo::new(name.clone(), plugin.version.clone());
            match plugin.kind {
                PluginKind::Stage => {
                    let Some(ref command) = plugin.command else {
                        warn!("Stage plugin '{}' has no command, skipping", name);
                        continue;
                    };
                    let stage = CommandStage::new(command.clone(), plugin.args.clone()).with_env(plugin.env.clone());
                    self.register_stage(info, Arc::new(stage));
                }
                PluginKind::Notifier => {
                    self.register_notifier(info, Arc::new(LogNotifier::new(name.clone())));
                }
            }
            registered += 1;
        }
        info!("Registered {} configured plugins", registered);
        registered
    }
}

impl std::fmt::Debug for PluginRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PluginRegistry")
            .field("plugins", &self.list_all_plugins())
            .finish()
    }
}
