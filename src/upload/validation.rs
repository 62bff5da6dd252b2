//! Pre-flight file validation (size limit, allowed content types).

use serde::{Deserialize, Serialize};

use super::FileUpload;

/// Rules every file must satisfy before it is scheduled for upload
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidationRules {
    /// Maximum file size in bytes (default: 10 MiB)
    #[serde(default = "default_max_size")]
    pub max_size: u64,

    /// Accepted content types (default: `["image/*"]`)
    ///
    /// A pattern containing `*` matches on the main type only (`image/*` accepts
    /// `image/png`); anything else must match exactly.
    #[serde(default = "default_allowed_types")]
    pub allowed_types: Vec<String>,
}

impl Default for ValidationRules {
    fn default() -> Self {
        Self {
            max_size: default_max_size(),
            allowed_types: default_allowed_types(),
        }
    }
}

/// Outcome of validating one file
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidationReport {
    /// True when no rule was violated
    pub is_valid: bool,
    /// One message per violated rule
    pub errors: Vec<String>,
}

impl ValidationRules {
    /// Check `file` against every rule, collecting all violations
    pub fn validate(&self, file: &FileUpload) -> ValidationReport {
        let mut errors = Vec::new();

        if file.size() > self.max_size {
            let limit_mb = (self.max_size as f64 / (1024.0 * 1024.0)).round();
            errors.push(format!("file size must not exceed {limit_mb}MB"));
        }

        if !self.type_allowed(&file.content_type) {
            errors.push("unsupported file type".to_string());
        }

        ValidationReport {
            is_valid: errors.is_empty(),
            errors,
        }
    }

    fn type_allowed(&self, content_type: &str) -> bool {
        self.allowed_types.iter().any(|pattern| {
            if pattern.contains('*') {
                let main_type = pattern.split('/').next().unwrap_or_default();
                content_type.starts_with(main_type)
            } else {
                content_type == pattern
            }
        })
    }
}

fn default_max_size() -> u64 {
    10 * 1024 * 1024
}

fn default_allowed_types() -> Vec<String> {
    vec!["image/*".to_string()]
}
