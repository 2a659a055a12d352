//! Registry of named machine configurations.
//!
//! The registry is an explicit value passed to whoever needs it. It is assembled once
//! with [RegistryBuilder] and is read-only afterward, so it can be shared between
//! threads without locking.
//! ```
//! use rs_cnc_kinematics::registry::RegistryBuilder;
//! use rs_cnc_kinematics::parameters::cnc_kinematics::MachineConfiguration;
//!
//! let mut builder = RegistryBuilder::new();
//! builder.register(MachineConfiguration::head_head_bc()).unwrap();
//! let registry = builder.build();
//! assert!(registry.get("HEAD_HEAD_BC").is_ok());
//! assert!(registry.get("MY_MILL").is_err());
//! ```

use std::collections::BTreeMap;
use std::sync::Arc;
use crate::kinematics_error::KinematicsError;
use crate::parameters::cnc_kinematics::MachineConfiguration;

/// Shared, immutable reference to a registered configuration.
pub type ConfigurationHandle = Arc<MachineConfiguration>;

#[derive(Debug, Default)]
pub struct RegistryBuilder {
    configurations: BTreeMap<String, ConfigurationHandle>,
}

impl RegistryBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds the configuration. Names are unique; registering the same name twice
    /// is an error and leaves the first registration in place.
    pub fn register(&mut self, config: MachineConfiguration) -> Result<ConfigurationHandle, KinematicsError> {
        if self.configurations.contains_key(&config.name) {
            return Err(KinematicsError::DuplicateConfiguration(config.name));
        }
        let handle = Arc::new(config);
        self.configurations.insert(handle.name.clone(), handle.clone());
        Ok(handle)
    }

    pub fn build(self) -> ConfigurationRegistry {
        ConfigurationRegistry {
            configurations: self.configurations,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct ConfigurationRegistry {
    configurations: BTreeMap<String, ConfigurationHandle>,
}

impl ConfigurationRegistry {
    /// Registry holding the built-in configurations.
    pub fn with_builtin() -> Self {
        let configurations = MachineConfiguration::builtin()
            .into_iter()
            .map(|config| (config.name.clone(), Arc::new(config)))
            .collect();
        ConfigurationRegistry { configurations }
    }

    pub fn get(&self, name: &str) -> Result<ConfigurationHandle, KinematicsError> {
        self.configurations
            .get(name)
            .cloned()
            .ok_or_else(|| KinematicsError::UnknownConfiguration(name.to_string()))
    }

    /// Registered names, sorted.
    pub fn names(&self) -> Vec<&str> {
        self.configurations.keys().map(|s| s.as_str()).collect()
    }

    pub fn len(&self) -> usize {
        self.configurations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.configurations.is_empty()
    }
}
