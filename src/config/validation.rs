use super::{AppConfig, ConfigError};

/// Validate the full application config, returning an error if any rule is violated.
///
/// # Errors
///
/// Returns [`ConfigError::Validation`] when any configuration invariant is violated.
pub fn validate_config(config: &AppConfig) -> Result<(), ConfigError> {
    validate_upstream(config)?;
    validate_auth(config)?;
    validate_log_level(config)?;
    Ok(())
}

fn validation_err(msg: impl Into<String>) -> ConfigError {
    ConfigError::Validation(msg.into())
}

fn validate_upstream(config: &AppConfig) -> Result<(), ConfigError> {
    let upstream = &config.upstream;
    let parsed = url::Url::parse(&upstream.base_url)
        .map_err(|e| validation_err(format!("upstream.base_url is not a valid URL: {e}")))?;
    if !matches!(parsed.scheme(), "http" | "https") {
        return Err(validation_err(
            "upstream.base_url must use the http or https scheme",
        ));
    }
    if upstream.request_timeout_ms == 0 {
        return Err(validation_err(
            "upstream.request_timeout_ms must be greater than 0",
        ));
    }
    if upstream.message_timeout_ms == 0 {
        return Err(validation_err(
            "upstream.message_timeout_ms must be greater than 0",
        ));
    }
    if upstream.pre_send_delay_ms >= upstream.message_timeout_ms {
        return Err(validation_err(
            "upstream.pre_send_delay_ms must be below upstream.message_timeout_ms",
        ));
    }
    Ok(())
}

fn validate_auth(config: &AppConfig) -> Result<(), ConfigError> {
    let auth = &config.auth;
    if !auth.token_file.is_empty() && auth.token_file_poll_interval_ms == 0 {
        return Err(validation_err(
            "auth.token_file_poll_interval_ms must be greater than 0 when a token file is set",
        ));
    }
    Ok(())
}

fn validate_log_level(config: &AppConfig) -> Result<(), ConfigError> {
    let level = config.features.log_level.to_uppercase();
    match level.as_str() {
        "DEBUG" | "INFO" | "WARNING" | "WARN" | "ERROR" | "CRITICAL" | "DISABLED" => Ok(()),
        other => Err(validation_err(format!(
            "features.log_level '{other}' is not one of DEBUG, INFO, WARNING, ERROR, CRITICAL, DISABLED"
        ))),
    }
}
