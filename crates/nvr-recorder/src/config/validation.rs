use super::*;
use anyhow::{anyhow, Result};
use std::collections::HashSet;

/// Reserved for the application log file `<log_root>/nvr.log`.
pub const RESERVED_SOURCE_NAME: &str = "nvr";

/// Validate the complete configuration
pub fn validate_config(config: &RecorderConfig) -> Result<()> {
    validate_settings(&config.settings)?;
    validate_sources(&config.cameras)?;
    Ok(())
}

fn validate_settings(settings: &GlobalSettings) -> Result<()> {
    if settings.segment_duration.is_zero() {
        return Err(anyhow!("Segment duration must be greater than 0"));
    }

    if settings.segment_duration.subsec_nanos() != 0 {
        return Err(anyhow!(
            "Segment duration must be a whole number of seconds, got: {:?}",
            settings.segment_duration
        ));
    }

    if settings.primary_root.as_os_str().is_empty() || settings.backup_root.as_os_str().is_empty()
    {
        return Err(anyhow!("Storage and backup roots must be set"));
    }

    if settings.primary_root == settings.backup_root {
        return Err(anyhow!(
            "Storage root and backup root must differ: {}",
            settings.primary_root.display()
        ));
    }

    if settings.capture_binary.as_os_str().is_empty() {
        return Err(anyhow!("Capture binary cannot be empty"));
    }

    Ok(())
}

/// Validate all source configurations
fn validate_sources(sources: &[Source]) -> Result<()> {
    if sources.is_empty() {
        return Err(anyhow!("At least one camera must be configured"));
    }

    let mut ids = HashSet::new();
    let mut names = HashSet::new();
    for source in sources {
        validate_source(source)?;

        if !ids.insert(source.id.as_str()) {
            return Err(anyhow!("Duplicate camera ID: {}", source.id));
        }
        // Names key the per-source log file and output directory
        if !names.insert(source.name.as_str()) {
            return Err(anyhow!("Duplicate camera name: {}", source.name));
        }
    }

    Ok(())
}

fn validate_source(source: &Source) -> Result<()> {
    validate_identifier("Camera ID", source.id.as_str())?;
    validate_identifier("Camera name", &source.name)?;

    if source.name == RESERVED_SOURCE_NAME {
        return Err(anyhow!(
            "Camera name '{}' is reserved for the application log",
            RESERVED_SOURCE_NAME
        ));
    }

    Ok(())
}

fn validate_identifier(what: &str, value: &str) -> Result<()> {
    if value.is_empty() {
        return Err(anyhow!("{} cannot be empty", what));
    }

    if value.len() > 64 {
        return Err(anyhow!("{} too long (max 64 characters): {}", what, value));
    }

    // Used as a path component
    if !value
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
    {
        return Err(anyhow!(
            "{} can only contain alphanumeric characters, hyphens, and underscores: {}",
            what,
            value
        ));
    }

    Ok(())
}
