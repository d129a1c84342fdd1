use crate::error::{render_tera_error, Error, Result};
use std::fs;
use std::path::Path;
use tera::Tera;
use tracing::{debug, warn};

/// Maximum template file size (1MB)
const MAX_TEMPLATE_SIZE: u64 = 1024 * 1024;

/// Context keys defined by the prompt contract
const CONTEXT_VARIABLES: &[&str] = &["directory_name", "files", "git_diff_output", "token_count"];

/// Extra context keys
const OPTIONAL_VARIABLES: &[&str] = &["source_tree", "git_log_output"];

/// Validates user-supplied Tera templates before a run starts.
pub(crate) struct TemplateValidator;

impl TemplateValidator {
    /// Validates an external template file
    ///
    /// Performs the following checks:
    /// 1. File exists and is a regular file
    /// 2. File size is within limits
    /// 3. File is valid UTF-8 and not blank
    /// 4. Template syntax is valid (can be compiled by Tera)
    ///
    /// A template that references none of the context variables is accepted
    /// with a warning.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Io`] if the file is missing or unreadable, and
    /// [`Error::TemplateValidation`] for the remaining checks.
    pub(crate) fn validate_template(path: &Path) -> Result<()> {
        if !path.exists() {
            return Err(Error::io(
                path,
                std::io::Error::new(std::io::ErrorKind::NotFound, "Template file not found"),
            ));
        }

        if !path.is_file() {
            return Err(Error::template_validation(
                path.to_string_lossy(),
                "Path is not a file",
            ));
        }

        let metadata = fs::metadata(path).map_err(|e| Error::io(path, e))?;
        if metadata.len() > MAX_TEMPLATE_SIZE {
            return Err(Error::template_validation(
                path.to_string_lossy(),
                format!(
                    "Template file too large: {} bytes (max: {} bytes)",
                    metadata.len(),
                    MAX_TEMPLATE_SIZE
                ),
            ));
        }

        let content = fs::read_to_string(path).map_err(|e| Error::io(path, e))?;

        if content.trim().is_empty() {
            return Err(Error::template_validation(
                path.to_string_lossy(),
                "Template file is empty",
            ));
        }

        Self::check_syntax(&content, path)?;
        Self::check_variables(&content, path);

        Ok(())
    }

    /// Compiles the template in a throwaway engine.
    fn check_syntax(content: &str, path: &Path) -> Result<()> {
        let mut tera = Tera::default();
        tera.add_raw_template("validation", content).map_err(|e| {
            Error::template_validation(
                path.to_string_lossy(),
                format!("Template syntax error: {}", render_tera_error(&e)),
            )
        })?;
        Ok(())
    }

    /// Logs which context variables the template uses.
    ///
    /// Simple substring heuristic; false positives are harmless here.
    fn check_variables(content: &str, path: &Path) {
        let used: Vec<&str> = CONTEXT_VARIABLES
            .iter()
            .copied()
            .filter(|var| references(content, var))
            .collect();

        if used.is_empty() {
            warn!(
                "Template {} does not reference any of: {}",
                path.display(),
                CONTEXT_VARIABLES.join(", ")
            );
        } else {
            debug!("Template {} uses: {}", path.display(), used.join(", "));
        }

        for var in OPTIONAL_VARIABLES {
            if !references(content, var) {
                debug!("Template does not use optional variable: {}", var);
            }
        }
    }
}

/// True if `var` appears in an expression or loop header.
fn references(content: &str, var: &str) -> bool {
    let patterns = [
        format!("{{{{{var}"),   // {{var
        format!("{{{{ {var}"),  // {{ var
        format!("in {var}"),    // {% for x in var %}
        format!("if {var}"),    // {% if var %}
        format!("{var} |"),     // {{ var | filter }}
        format!("{var}|"),
    ];
    patterns.iter().any(|pattern| content.contains(pattern.as_str()))
}
