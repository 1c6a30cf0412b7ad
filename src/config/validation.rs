//! Configuration validation and JSON Schema export

use crate::config::Config;
use crate::utils::errors::{McpError, McpResult};
use schemars::schema_for;
use serde_json::Value;
use url::Url;
use validator::Validate;

/// Validation error
#[derive(Debug, Clone)]
pub struct ValidationError {
    pub path: String,
    pub message: String,
}

impl std::fmt::Display for ValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.path, self.message)
    }
}

impl std::error::Error for ValidationError {}

/// Configuration validator
pub struct ConfigValidator {
    schema: Value,
}

impl ConfigValidator {
    /// Create a new validator with the generated schema
    pub fn new() -> Self {
        let schema = schema_for!(Config);
        Self {
            schema: serde_json::to_value(&schema).unwrap_or_default(),
        }
    }

    /// Get the JSON Schema for the configuration
    pub fn get_schema(&self) -> &Value {
        &self.schema
    }

    /// Export the schema to a JSON string
    pub fn export_schema(&self) -> String {
        serde_json::to_string_pretty(&self.schema).unwrap_or_default()
    }

    /// Validate TOML content on its own, without defaults from elsewhere
    pub fn validate_toml(&self, content: &str) -> Result<(), Vec<ValidationError>> {
        let config: Config = toml::from_str(content).map_err(|e| {
            vec![ValidationError {
                path: "root".to_string(),
                message: format!("TOML parse error: {}", e),
            }]
        })?;

        self.check(&config)
    }

    /// Collect every problem with `config`
    pub fn check(&self, config: &Config) -> Result<(), Vec<ValidationError>> {
        let mut errors = Vec::new();

        if let Err(validation_errors) = config.validate() {
            collect_errors("", &validation_errors, &mut errors);
        }

        self.validate_backend(config, &mut errors);
        self.validate_supervisor(config, &mut errors);

        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }

    /// Validate, folding all problems into one `ConfigError`
    pub fn validate(&self, config: &Config) -> McpResult<()> {
        self.check(config).map_err(|errors| {
            let joined = errors
                .iter()
                .map(|e| e.to_string())
                .collect::<Vec<_>>()
                .join("; ");
            McpError::ConfigError(joined)
        })
    }

    fn validate_backend(&self, config: &Config, errors: &mut Vec<ValidationError>) {
        if let Ok(url) = Url::parse(&config.backend.url) {
            if !matches!(url.scheme(), "http" | "https") {
                errors.push(ValidationError {
                    path: "backend.url".to_string(),
                    message: format!("Unsupported scheme: {}", url.scheme()),
                });
            }
        }
    }

    fn validate_supervisor(&self, config: &Config, errors: &mut Vec<ValidationError>) {
        let supervisor = &config.supervisor;
        if supervisor.health_check_timeout_secs > supervisor.health_check_interval_secs {
            errors.push(ValidationError {
                path: "supervisor.health_check_timeout_secs".to_string(),
                message: "Probe timeout must not exceed the health check interval".to_string(),
            });
        }
    }
}

impl Default for ConfigValidator {
    fn default() -> Self {
        Self::new()
    }
}

fn collect_errors(
    prefix: &str,
    validation_errors: &validator::ValidationErrors,
    errors: &mut Vec<ValidationError>,
) {
    for (field, kind) in validation_errors.errors() {
        let path = if prefix.is_empty() {
            field.to_string()
        } else {
            format!("{}.{}", prefix, field)
        };

        match kind {
            validator::ValidationErrorsKind::Field(field_errors) => {
                for error in field_errors {
                    errors.push(ValidationError {
                        path: path.clone(),
                        message: format!("failed `{}` check", error.code),
                    });
                }
            }
            validator::ValidationErrorsKind::Struct(nested) => {
                collect_errors(&path, nested, errors);
            }
            validator::ValidationErrorsKind::List(items) => {
                for (idx, nested) in items {
                    collect_errors(&format!("{}[{}]", path, idx), nested, errors);
                }
            }
        }
    }
}
