//! Config items and execution results.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Directory on the appliance that holds the router scripts.
pub const VR_SCRIPT_DIR: &str = "/opt/cloud/bin";

/// Directory on the appliance where config payloads and aggregate files land.
pub const CONFIG_CACHE_LOCATION: &str = "/var/cache/cloud/";

/// A unit of remote effect on a router.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ConfigItem {
    /// Write `contents` to `path/file_name`.
    File {
        path: String,
        file_name: String,
        contents: String,
    },
    /// Run `script` from the router script directory with `args`.
    Script { script: String, args: String },
}

impl ConfigItem {
    pub fn file(
        path: impl Into<String>,
        file_name: impl Into<String>,
        contents: impl Into<String>,
    ) -> Self {
        ConfigItem::File {
            path: path.into(),
            file_name: file_name.into(),
            contents: contents.into(),
        }
    }

    pub fn script(script: impl Into<String>, args: impl Into<String>) -> Self {
        ConfigItem::Script {
            script: script.into(),
            args: args.into(),
        }
    }

    /// Full destination path of a file item.
    pub fn destination(&self) -> Option<String> {
        match self {
            ConfigItem::File {
                path, file_name, ..
            } => Some(join_path(path, file_name)),
            ConfigItem::Script { .. } => None,
        }
    }

    /// Human-readable description used in per-item answer details.
    pub fn description(&self) -> String {
        match self {
            ConfigItem::File {
                path, file_name, ..
            } => format!("Write file {}", join_path(path, file_name)),
            ConfigItem::Script { script, args } if args.is_empty() => {
                format!("Run script {}", script)
            }
            ConfigItem::Script { script, args } => format!("Run script {} {}", script, args),
        }
    }

    /// Fragment of the aggregate document representing this item.
    pub fn aggregate_form(&self) -> String {
        match self {
            ConfigItem::File {
                path,
                file_name,
                contents,
            } => format!(
                "<file>\n{}\n{}\n</file>\n",
                join_path(path, file_name),
                contents
            ),
            ConfigItem::Script { script, args } => {
                format!("<script>\n{}/{} {}\n</script>\n", VR_SCRIPT_DIR, script, args)
            }
        }
    }
}

impl fmt::Display for ConfigItem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.description())
    }
}

// The appliance is always Linux, so '/' regardless of the host platform.
fn join_path(path: &str, file_name: &str) -> String {
    if path.ends_with('/') {
        format!("{}{}", path, file_name)
    } else {
        format!("{}/{}", path, file_name)
    }
}

/// Outcome of applying a single config item.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecutionResult {
    pub success: bool,
    pub details: String,
}

impl ExecutionResult {
    pub fn ok(details: impl Into<String>) -> Self {
        Self {
            success: true,
            details: details.into(),
        }
    }

    pub fn failed(details: impl Into<String>) -> Self {
        Self {
            success: false,
            details: details.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_file_aggregate_form() {
        let item = ConfigItem::file(CONFIG_CACHE_LOCATION, "ip_associations.json", "{}");
        assert_eq!(
            item.aggregate_form(),
            "<file>\n/var/cache/cloud/ip_associations.json\n{}\n</file>\n"
        );
    }

    #[test]
    fn test_file_path_without_trailing_slash() {
        let item = ConfigItem::file("/tmp", "a.cfg", "x");
        assert_eq!(item.destination().as_deref(), Some("/tmp/a.cfg"));
    }

    #[test]
    fn test_script_aggregate_form() {
        let item = ConfigItem::script("update_config.py", "vm_dhcp_entry.json");
        assert_eq!(
            item.aggregate_form(),
            "<script>\n/opt/cloud/bin/update_config.py vm_dhcp_entry.json\n</script>\n"
        );
        assert_eq!(item.destination(), None);
    }

    #[test]
    fn test_description() {
        assert_eq!(
            ConfigItem::script("checkrouter.sh", "").description(),
            "Run script checkrouter.sh"
        );
        assert_eq!(
            ConfigItem::file("/var/cache/cloud/", "x.json", "{}").to_string(),
            "Write file /var/cache/cloud/x.json"
        );
    }
}
