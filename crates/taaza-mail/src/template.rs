//! Named template rendering.

use crate::error::{MailError, MailResult};
use handlebars::Handlebars;
use serde_json::Value;
use std::path::Path;
use tracing::{debug, info};

/// Renders a named template against a data map.
#[cfg_attr(test, mockall::automock)]
pub trait TemplateRenderer: Send + Sync {
    /// Render `name` with `data`. Unknown names are an error.
    fn render(&self, name: &str, data: &Value) -> MailResult<String>;
}

const OTP_TEMPLATE: &str = r#"<!DOCTYPE html>
<html>
<body style="font-family: Arial, sans-serif; color: #333;">
  <h2>Hello {{name}},</h2>
  <p>Your one-time password for Taaza is:</p>
  <p style="font-size: 28px; font-weight: bold; letter-spacing: 6px;">{{otp}}</p>
  <p>This code expires in 10 minutes. If you did not request it, ignore this email.</p>
</body>
</html>
"#;

const WELCOME_TEMPLATE: &str = r#"<!DOCTYPE html>
<html>
<body style="font-family: Arial, sans-serif; color: #333;">
  <h2>Welcome to Taaza, {{name}}!</h2>
  <p>Fresh milk delivered to your door, every morning.</p>
  <p><a href="{{app_url}}">Open Taaza</a> to set up your first subscription.</p>
</body>
</html>
"#;

const PROFILE_REMINDER_TEMPLATE: &str = r#"<!DOCTYPE html>
<html>
<body style="font-family: Arial, sans-serif; color: #333;">
  <h2>Hi {{name}},</h2>
  <p>Your Taaza profile is almost ready. Add your delivery address so we can start your deliveries.</p>
  <p><a href="{{profile_url}}">Complete your profile</a></p>
</body>
</html>
"#;

/// Handlebars renderer.
///
/// Ships with `otp`, `welcome`, and `profile-reminder`. Every `<name>.html`
/// in the template directory is registered as `<name>`, replacing a built-in
/// of the same name. Missing variables render empty.
pub struct HandlebarsRenderer {
    registry: Handlebars<'static>,
}

impl HandlebarsRenderer {
    /// Renderer with only the built-in templates.
    pub fn builtin() -> MailResult<Self> {
        let mut registry = Handlebars::new();
        registry.set_strict_mode(false);

        for (name, source) in [
            ("otp", OTP_TEMPLATE),
            ("welcome", WELCOME_TEMPLATE),
            ("profile-reminder", PROFILE_REMINDER_TEMPLATE),
        ] {
            registry
                .register_template_string(name, source)
                .map_err(|e| MailError::Configuration(format!("Invalid template {name}: {e}")))?;
        }

        Ok(Self { registry })
    }

    /// Renderer with the built-ins plus every `.html` file in `dir`.
    ///
    /// A missing directory is not an error.
    pub fn from_dir(dir: impl AsRef<Path>) -> MailResult<Self> {
        let mut renderer = Self::builtin()?;
        let dir = dir.as_ref();

        if !dir.is_dir() {
            info!(dir = %dir.display(), "Template directory not found, using built-in templates");
            return Ok(renderer);
        }

        let entries = std::fs::read_dir(dir).map_err(|e| {
            MailError::Configuration(format!("Cannot read template dir {}: {e}", dir.display()))
        })?;

        for entry in entries.flatten() {
            let path = entry.path();
            if path.extension().and_then(|ext| ext.to_str()) != Some("html") {
                continue;
            }
            let Some(name) = path.file_stem().and_then(|stem| stem.to_str()) else {
                continue;
            };
            renderer
                .registry
                .register_template_file(name, &path)
                .map_err(|e| MailError::Configuration(format!("Invalid template {name}: {e}")))?;
            debug!(template = name, path = %path.display(), "Registered template");
        }

        Ok(renderer)
    }

    /// Returns true if `name` is registered.
    pub fn has_template(&self, name: &str) -> bool {
        self.registry.has_template(name)
    }
}

impl TemplateRenderer for HandlebarsRenderer {
    fn render(&self, name: &str, data: &Value) -> MailResult<String> {
        if !self.registry.has_template(name) {
            return Err(MailError::Render(format!("Unknown template: {name}")));
        }
        self.registry
            .render(name, data)
            .map_err(|e| MailError::Render(format!("Failed to render {name}: {e}")))
    }
}
