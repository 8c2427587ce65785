//! Plugins: stage, gate and notifier capabilities
//!
//! A plugin is plain data ([`PluginInfo`]) plus an implementation of one
//! capability trait. The [`PluginRegistry`] keeps one map per capability.

pub mod gate;
pub mod gate_executor;
pub mod gates;
pub mod notifiers;
pub mod registry;

use crate::stages::Stage;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;

pub use gate::{Gate, GateContext, GateResult, Severity, StageSnapshot};
pub use gate_executor::GateExecutor;
pub use notifiers::LogNotifier;
pub use registry::{PluginListing, PluginRegistry};

/// Name and version of a plugin
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PluginInfo {
    pub name: String,
    pub version: String,
}

impl PluginInfo {
    pub fn new(name: impl Into<String>, version: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            version: version.into(),
        }
    }
}

/// A registered capability implementation
pub struct Plugin<T: ?Sized> {
    pub info: PluginInfo,
    pub implementation: Arc<T>,
}

impl<T: ?Sized> Clone for Plugin<T> {
    fn clone(&self) -> Self {
        Self {
            info: self.info.clone(),
            implementation: Arc::clone(&self.implementation),
        }
    }
}

impl<T: ?Sized> std::fmt::Debug for Plugin<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Plugin").field("info", &self.info).finish()
    }
}

pub type StagePlugin = Plugin<dyn Stage>;
pub type GatePlugin = Plugin<dyn Gate>;
pub type NotifierPlugin = Plugin<dyn Notifier>;

/// Notification severity
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum NotificationLevel {
    Info,
    Warning,
    Error,
}

/// A message sent to every registered notifier
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Notification {
    pub title: String,
    pub message: String,
    pub level: NotificationLevel,
    pub metadata: HashMap<String, String>,
}

impl Notification {
    pub fn new(title: impl Into<String>, message: impl Into<String>, level: NotificationLevel) -> Self {
        Self {
            title: title.into(),
            message: message.into(),
            level,
            metadata: HashMap::new(),
        }
    }

    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }
}

/// Delivers notifications somewhere (log, chat, mail)
pub trait Notifier: Send + Sync {
    fn notify(&self, notification: &Notification);
}
