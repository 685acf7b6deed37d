//! Facades that turn one command kind into config items.

use serde_json::Value;
use uuid::Uuid;
use vr_types::{ConfigItem, NetworkElementCommand, CONFIG_CACHE_LOCATION};

use crate::error::{DispatchError, DispatchResult};

/// Script that loads a JSON config file dropped in the cache directory.
pub const UPDATE_CONFIG_SCRIPT: &str = "update_config.py";

/// Translates a command of one kind into the config items that represent
/// its effect on the router.
pub trait ConfigItemFacade: Send + Sync {
    fn generate_items(&self, command: &NetworkElementCommand) -> DispatchResult<Vec<ConfigItem>>;
}

/// Writes the command payload as JSON into the cache directory and runs the
/// config loader on it.
#[derive(Debug, Clone)]
pub struct JsonConfigFacade {
    config_type: &'static str,
    file_name: &'static str,
}

impl JsonConfigFacade {
    pub const fn new(config_type: &'static str, file_name: &'static str) -> Self {
        Self {
            config_type,
            file_name,
        }
    }

    pub fn config_type(&self) -> &'static str {
        self.config_type
    }

    /// Payload as JSON, with the `type` key set to the router's config type.
    pub fn render(&self, command: &NetworkElementCommand) -> DispatchResult<String> {
        let mut value = serde_json::to_value(&command.payload)?;
        match &mut value {
            Value::Object(map) => {
                map.insert("type".to_string(), Value::from(self.config_type));
            }
            _ => {
                return Err(DispatchError::internal(format!(
                    "{} payload did not encode as an object",
                    self.config_type
                )))
            }
        }
        Ok(serde_json::to_string(&value)?)
    }
}

impl ConfigItemFacade for JsonConfigFacade {
    fn generate_items(&self, command: &NetworkElementCommand) -> DispatchResult<Vec<ConfigItem>> {
        let destination = format!("{}.{}", self.file_name, Uuid::new_v4());
        let contents = self.render(command)?;
        Ok(vec![
            ConfigItem::file(CONFIG_CACHE_LOCATION, destination.clone(), contents),
            ConfigItem::script(UPDATE_CONFIG_SCRIPT, destination),
        ])
    }
}

/// Runs a single fixed script.
#[derive(Debug, Clone)]
pub struct ScriptFacade {
    script: &'static str,
    args: &'static str,
}

impl ScriptFacade {
    pub const fn new(script: &'static str, args: &'static str) -> Self {
        Self { script, args }
    }
}

impl ConfigItemFacade for ScriptFacade {
    fn generate_items(&self, _command: &NetworkElementCommand) -> DispatchResult<Vec<ConfigItem>> {
        Ok(vec![ConfigItem::script(self.script, self.args)])
    }
}
