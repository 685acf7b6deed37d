//! Keystore and certificate provisioning on the router.

use std::time::Duration;
use tracing::info;
use vr_transport::shell::shellquote;
use vr_transport::RemoteExecutor;
use vr_types::{CommandPayload, ConfigItem, NetworkElementCommand};

use crate::answer::Answer;
use crate::error::{DispatchError, DispatchResult};

pub const KEYSTORE_SETUP_SCRIPT: &str = "keystore-setup";
pub const KEYSTORE_IMPORT_SCRIPT: &str = "keystore-cert-import";

/// Agent configuration directory on the router.
pub const KEYSTORE_CONF_DIR: &str = "/usr/local/cloud/systemvm/conf/";

pub const AGENT_PROPERTIES: &str = "agent.properties";
pub const KEYSTORE_FILE: &str = "cloud.jks";
pub const CSR_FILE: &str = "cloud.csr";
pub const CERT_FILE: &str = "cloud.crt";
pub const CA_CERT_FILE: &str = "cloud.ca.crt";
pub const PRIVATE_KEY_FILE: &str = "cloud.key";

/// Certificates arrive over the ssh control channel.
const IMPORT_MODE: &str = "ssh";

fn conf_path(file: &str) -> String {
    format!("{}{}", KEYSTORE_CONF_DIR, file)
}

/// Builds the script item for a keystore or certificate command.
pub fn keystore_item(command: &NetworkElementCommand) -> DispatchResult<ConfigItem> {
    match &command.payload {
        CommandPayload::SetupKeyStore {
            keystore_password,
            validity_days,
        } => {
            if keystore_password.is_empty() {
                return Err(vr_types::ValidationError::EmptyField {
                    field: "keystore_password",
                }
                .into());
            }
            let args = [
                conf_path(AGENT_PROPERTIES),
                conf_path(KEYSTORE_FILE),
                shellquote(keystore_password),
                validity_days.to_string(),
                conf_path(CSR_FILE),
            ]
            .join(" ");
            Ok(ConfigItem::script(KEYSTORE_SETUP_SCRIPT, args))
        }
        CommandPayload::SetupCertificate {
            certificate,
            ca_certificates,
            private_key,
        } => {
            let args = [
                conf_path(AGENT_PROPERTIES),
                conf_path(KEYSTORE_FILE),
                IMPORT_MODE.to_string(),
                conf_path(CERT_FILE),
                shellquote(certificate),
                conf_path(CA_CERT_FILE),
                shellquote(ca_certificates),
                conf_path(PRIVATE_KEY_FILE),
                shellquote(private_key),
            ]
            .join(" ");
            Ok(ConfigItem::script(KEYSTORE_IMPORT_SCRIPT, args))
        }
        _ => Err(DispatchError::unsupported(command.kind())),
    }
}

/// Runs a keystore or certificate command directly, bypassing translation
/// and aggregation.
pub async fn execute_keystore(
    command: &NetworkElementCommand,
    executor: &dyn RemoteExecutor,
    timeout: Duration,
) -> DispatchResult<Answer> {
    let item = keystore_item(command)?;
    info!(
        router = %command.target.name,
        kind = ?command.kind(),
        timeout_secs = timeout.as_secs(),
        "Running keystore command"
    );
    Ok(match executor.apply(&command.target, &item, timeout).await {
        Ok(result) => Answer::from(result),
        Err(e) => Answer::Transport(e.with_commands(vec![command.clone()])),
    })
}
