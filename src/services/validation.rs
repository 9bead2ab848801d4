use crate::errors::BridgeError;

#[derive(Clone, Debug, Default)]
pub struct Validation;

impl Validation {
    pub fn new() -> Self {
        Self
    }

    pub fn ensure_string(&self, value: &str, label: &str) -> Result<String, BridgeError> {
        let trimmed = value.trim();
        if trimmed.is_empty() {
            return Err(BridgeError::invalid_params(format!(
                "{} must be a non-empty string",
                label
            )));
        }
        if trimmed.contains('\0') {
            return Err(BridgeError::invalid_params(format!(
                "{} must not contain null bytes",
                label
            )));
        }
        Ok(trimmed.to_string())
    }

    pub fn ensure_optional_string(
        &self,
        value: Option<&str>,
        label: &str,
    ) -> Result<Option<String>, BridgeError> {
        match value {
            None => Ok(None),
            Some(text) if text.trim().is_empty() => Ok(None),
            Some(text) => self.ensure_string(text, label).map(Some),
        }
    }

    /// Host identifiers double as alias file names, so they are restricted to
    /// a conservative character set.
    pub fn ensure_identifier(&self, value: &str, label: &str) -> Result<String, BridgeError> {
        let trimmed = self.ensure_string(value, label)?;
        let valid = trimmed
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.'));
        if !valid || trimmed.starts_with('.') {
            return Err(BridgeError::invalid_params(format!(
                "{} '{}' may only contain letters, digits, '-', '_' and '.'",
                label, trimmed
            ))
            .with_hint("Examples: pi1, garage-pi, lab_node.2"));
        }
        Ok(trimmed)
    }

    pub fn ensure_absolute_remote_path(
        &self,
        value: &str,
        label: &str,
    ) -> Result<String, BridgeError> {
        let trimmed = self.ensure_string(value, label)?;
        if !trimmed.starts_with('/') {
            return Err(BridgeError::invalid_params(format!(
                "{} must be an absolute remote path, got '{}'",
                label, trimmed
            )));
        }
        Ok(trimmed)
    }
}
