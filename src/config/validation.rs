//! Configuration validation rules.

use crate::config::{ConfigError, DashboardConfig};
use std::collections::HashSet;

/// Validate a configuration before it is applied.
pub fn validate(config: &DashboardConfig) -> Result<(), ConfigError> {
    if config.refresh.default_points == 0 {
        return Err(ConfigError::ValidationError(
            "refresh.default_points must be greater than zero".to_string(),
        ));
    }
    if config.refresh.idle_between_ticks_ms == 0 {
        return Err(ConfigError::ValidationError(
            "refresh.idle_between_ticks_ms must be greater than zero".to_string(),
        ));
    }
    if config.data.base_url.is_empty() {
        return Err(ConfigError::ValidationError(
            "data.base_url must not be empty".to_string(),
        ));
    }

    let mut seen = HashSet::new();
    for widget in &config.widgets {
        if widget.chart.is_empty() {
            return Err(ConfigError::ValidationError(
                "widget declaration is missing a chart id".to_string(),
            ));
        }
        if let Some(points) = widget.points {
            if points == 0 {
                return Err(ConfigError::ValidationError(format!(
                    "widget '{}': points must be greater than zero",
                    widget.chart
                )));
            }
        }
        if widget.after > 0 && widget.before > 0 && widget.before < widget.after {
            return Err(ConfigError::ValidationError(format!(
                "widget '{}': before must not precede after",
                widget.chart
            )));
        }
        let id = if widget.id.is_empty() { &widget.chart } else { &widget.id };
        if !seen.insert((widget.host.clone(), id.clone())) {
            return Err(ConfigError::ValidationError(format!(
                "duplicate widget id '{}'",
                id
            )));
        }
    }
    Ok(())
}
