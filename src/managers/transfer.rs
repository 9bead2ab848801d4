use crate::constants::defaults;
use crate::errors::{BridgeError, BridgeErrorKind};
use crate::managers::session::Session;
use crate::services::logger::Logger;
use crate::utils::shell::{escape_shell_value, posix_file_name, posix_join, posix_parent};
use std::path::{Component, Path, PathBuf};

/// What to send where. Fixed before the first remote call.
#[derive(Clone, PartialEq, Eq)]
pub struct TransferPlan {
    pub local_path: PathBuf,
    pub remote_path: String,
    pub elevate: bool,
    pub elevation_secret: Option<String>,
}

impl std::fmt::Debug for TransferPlan {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TransferPlan")
            .field("local_path", &self.local_path)
            .field("remote_path", &self.remote_path)
            .field("elevate", &self.elevate)
            .field(
                "elevation_secret",
                &self.elevation_secret.as_ref().map(|_| "<redacted>"),
            )
            .finish()
    }
}

impl TransferPlan {
    /// Builds a plan from the send arguments. Relative local paths are taken
    /// from `cwd`; without an explicit remote path the local path's relative
    /// form is placed under `default_dir`.
    pub fn resolve(
        local: &Path,
        explicit_remote: Option<&str>,
        default_dir: Option<&str>,
        elevate: bool,
        elevation_secret: Option<String>,
        cwd: &Path,
    ) -> Result<Self, BridgeError> {
        let local_path = if local.is_absolute() {
            local.to_path_buf()
        } else {
            cwd.join(local)
        };
        ensure_local_file(&local_path)?;
        let explicit_remote = explicit_remote.map(str::trim).filter(|p| !p.is_empty());
        let remote_path = match explicit_remote {
            Some(remote) => remote.to_string(),
            None => {
                let default_dir = default_dir
                    .map(str::trim)
                    .filter(|d| !d.is_empty())
                    .ok_or_else(|| {
                        BridgeError::invalid_params(
                            "remote_path is required and no default path is set for this host",
                        )
                        .with_hint("Use `hostbridge set-path <name> /your/default/path` to configure one.")
                    })?;
                posix_join(default_dir, &relative_form(local, cwd)?)
            }
        };
        Ok(Self {
            local_path,
            remote_path,
            elevate,
            elevation_secret: elevation_secret.filter(|s| !s.is_empty()),
        })
    }

    fn local_name(&self) -> String {
        self.local_path
            .file_name()
            .map(|name| name.to_string_lossy().to_string())
            .unwrap_or_else(|| self.local_path.display().to_string())
    }
}

/// Relative form of a local path, POSIX-joined. Absolute paths below `cwd`
/// keep their cwd-relative part; other absolute paths keep only the file name.
fn relative_form(local: &Path, cwd: &Path) -> Result<String, BridgeError> {
    let relative = if local.is_absolute() {
        match local.strip_prefix(cwd) {
            Ok(rel) => rel.to_path_buf(),
            Err(_) => PathBuf::from(local.file_name().ok_or_else(|| {
                BridgeError::invalid_params(format!("{} has no file name", local.display()))
            })?),
        }
    } else {
        local.to_path_buf()
    };
    let mut parts = Vec::new();
    for component in relative.components() {
        match component {
            Component::Normal(part) => parts.push(part.to_string_lossy().to_string()),
            Component::CurDir | Component::RootDir | Component::Prefix(_) => {}
            Component::ParentDir => {
                return Err(BridgeError::invalid_params(format!(
                    "{} leaves the working directory; pass an explicit remote path",
                    local.display()
                )))
            }
        }
    }
    if parts.is_empty() {
        return Err(BridgeError::invalid_params(format!(
            "{} does not name a file",
            local.display()
        )));
    }
    Ok(parts.join("/"))
}

fn ensure_local_file(local: &Path) -> Result<(), BridgeError> {
    match std::fs::metadata(local) {
        Ok(meta) if meta.is_file() => Ok(()),
        Ok(_) => Err(BridgeError::invalid_params(format!(
            "Local path {} is not a regular file",
            local.display()
        ))),
        Err(_) => Err(BridgeError::local_not_found(format!(
            "Local path not found at {}",
            local.display()
        ))),
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransferReport {
    pub remote_path: String,
    pub staged_at: Option<String>,
    pub bytes: u64,
}

struct RemoteCommand {
    command: String,
    stdin: Option<Vec<u8>>,
}

pub struct TransferOrchestrator {
    logger: Logger,
}

impl TransferOrchestrator {
    pub fn new(logger: &Logger) -> Self {
        Self {
            logger: logger.child("transfer"),
        }
    }

    fn elevated(&self, plan: &TransferPlan, command: String) -> RemoteCommand {
        if !plan.elevate {
            return RemoteCommand {
                command,
                stdin: None,
            };
        }
        match plan.elevation_secret.as_ref() {
            Some(secret) => RemoteCommand {
                command: format!("sudo -S -p '' {}", command),
                stdin: Some(format!("{}\n", secret).into_bytes()),
            },
            None => RemoteCommand {
                command: format!("sudo {}", command),
                stdin: None,
            },
        }
    }

    fn run_step(
        &self,
        session: &mut Session,
        step: RemoteCommand,
        kind: BridgeErrorKind,
        what: &str,
    ) -> Result<(), BridgeError> {
        let output = session
            .run_with_input(&step.command, step.stdin.as_deref())
            .map_err(|err| err.reclassify(kind))?;
        if !output.success() {
            let detail = output.stderr.trim();
            return Err(BridgeError::new(
                kind,
                if detail.is_empty() {
                    format!("{} (exit code {})", what, output.exit_code)
                } else {
                    format!("{}: {}", what, detail)
                },
            ));
        }
        Ok(())
    }

    /// Creates the remote directory, uploads, and (when elevating) moves the
    /// staged file into place. Stops at the first failing step.
    pub fn send(
        &self,
        session: &mut Session,
        plan: &TransferPlan,
        progress: &mut dyn FnMut(&str),
    ) -> Result<TransferReport, BridgeError> {
        ensure_local_file(&plan.local_path)?;
        let remote_dir = posix_parent(&plan.remote_path).ok_or_else(|| {
            BridgeError::invalid_params("Remote path is empty")
        })?;
        self.logger.debug("send", Some(&serde_json::json!({"plan": format!("{:?}", plan)})));

        let mkdir = self.elevated(plan, format!("mkdir -p {}", escape_shell_value(&remote_dir)));
        self.run_step(
            session,
            mkdir,
            BridgeErrorKind::RemoteDirError,
            &format!("Error creating remote directory {}", remote_dir),
        )?;

        let name = plan.local_name();
        session.ensure_not_cancelled()?;
        if !plan.elevate {
            progress(&format!("Uploading {} to {}...", name, plan.remote_path));
            let bytes = session
                .upload(&plan.local_path, &plan.remote_path)
                .map_err(|err| err.reclassify(BridgeErrorKind::UploadError))?;
            progress("Upload complete.");
            return Ok(TransferReport {
                remote_path: plan.remote_path.clone(),
                staged_at: None,
                bytes,
            });
        }

        // Shared staging name: concurrent elevated sends of the same basename collide.
        let staging_name = posix_file_name(&name).unwrap_or(name.as_str()).to_string();
        let staging = posix_join(defaults::STAGING_DIR, &staging_name);
        progress(&format!("Uploading {} to {}...", name, staging));
        let bytes = session
            .upload(&plan.local_path, &staging)
            .map_err(|err| err.reclassify(BridgeErrorKind::UploadError))?;

        session.ensure_not_cancelled()?;
        progress(&format!("Moving file to {} with sudo...", plan.remote_path));
        let mv = self.elevated(
            plan,
            format!(
                "mv {} {}",
                escape_shell_value(&staging),
                escape_shell_value(&plan.remote_path)
            ),
        );
        self.run_step(
            session,
            mv,
            BridgeErrorKind::MoveError,
            &format!("Error moving file to {}", plan.remote_path),
        )
        .map_err(|err| err.with_hint(format!("The uploaded copy was left at {}.", staging)))?;
        progress("File sent successfully.");

        Ok(TransferReport {
            remote_path: plan.remote_path.clone(),
            staged_at: Some(staging),
            bytes,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn relative_form_normalizes_paths() {
        let cwd = Path::new("/home/op/project");
        assert_eq!(relative_form(Path::new("./cfg/app.yml"), cwd).unwrap(), "cfg/app.yml");
        assert_eq!(
            relative_form(Path::new("/home/op/project/cfg/app.yml"), cwd).unwrap(),
            "cfg/app.yml"
        );
        assert_eq!(relative_form(Path::new("/etc/hosts"), cwd).unwrap(), "hosts");
        assert!(relative_form(Path::new("../secret.txt"), cwd).is_err());
    }

    #[test]
    fn plan_debug_redacts_secret() {
        let plan = TransferPlan {
            local_path: PathBuf::from("app.yml"),
            remote_path: "/opt/app/app.yml".to_string(),
            elevate: true,
            elevation_secret: Some("hunter2".to_string()),
        };
        let rendered = format!("{:?}", plan);
        assert!(!rendered.contains("hunter2"));
        assert!(rendered.contains("<redacted>"));
    }
}
