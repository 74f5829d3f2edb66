//! Application branding settings.

use serde::{Deserialize, Serialize};

use crate::errors::ValidationError;
use crate::task::non_empty;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AppSettings {
    pub app_name: String,
    pub company_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub logo_url: Option<String>,
    pub primary_color: String,
}

impl Default for AppSettings {
    fn default() -> Self {
        AppSettings {
            app_name: "DMS".to_string(),
            company_name: String::new(),
            logo_url: None,
            primary_color: "#1F6FEB".to_string(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SettingsPatch {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub app_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub company_name: Option<String>,
    /// An empty string removes the logo.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub logo_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub primary_color: Option<String>,
}

fn is_hex_color(s: &str) -> bool {
    s.len() == 7 && s.starts_with('#') && s[1..].chars().all(|c| c.is_ascii_hexdigit())
}

impl AppSettings {
    /// Apply a patch, validating it first so a rejected patch changes nothing.
    pub fn apply(&mut self, patch: SettingsPatch) -> Result<(), ValidationError> {
        let mut err = ValidationError::new();
        if let Some(name) = &patch.app_name {
            if name.trim().is_empty() {
                err.push("appName", "must not be empty");
            }
        }
        if let Some(color) = &patch.primary_color {
            if !is_hex_color(color.trim()) {
                err.push("primaryColor", "must be a #RRGGBB color");
            }
        }
        err.into_result()?;

        if let Some(name) = patch.app_name {
            self.app_name = name.trim().to_string();
        }
        if let Some(company) = patch.company_name {
            self.company_name = company.trim().to_string();
        }
        if patch.logo_url.is_some() {
            self.logo_url = non_empty(patch.logo_url);
        }
        if let Some(color) = patch.primary_color {
            self.primary_color = color.trim().to_uppercase();
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bad_color_changes_nothing() {
        let mut settings = AppSettings::default();
        let patch = SettingsPatch {
            app_name: Some("Plant Ops".into()),
            primary_color: Some("blue".into()),
            ..Default::default()
        };
        let err = settings.apply(patch).unwrap_err();
        assert!(err.has_field("primaryColor"));
        assert_eq!(settings, AppSettings::default());
    }

    #[test]
    fn empty_logo_clears_it() {
        let mut settings = AppSettings {
            logo_url: Some("https://cdn.example.com/logo.png".into()),
            ..Default::default()
        };
        settings
            .apply(SettingsPatch {
                logo_url: Some(String::new()),
                primary_color: Some("#a1b2c3".into()),
                ..Default::default()
            })
            .unwrap();
        assert_eq!(settings.logo_url, None);
        assert_eq!(settings.primary_color, "#A1B2C3");
    }
}
