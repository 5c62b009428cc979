//! Tenant configuration with per-locale option overrides
//!
//! A tenant's configuration is a flat option map loaded by the host once per
//! request. Most options exist in a base form (`co_branding_domain`) and,
//! when the host runs with locale support, in locale-suffixed forms
//! (`co_branding_domain_da`). The base form always wins when present.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tracing::debug;

/// Option names read from the tenant configuration
pub mod keys {
    pub const CO_BRANDING_DOMAIN: &str = "co_branding_domain";
    pub const CONTENT_UNIT_CATEGORY: &str = "content_unit_category";
    pub const TNS_TRACKING_PATH: &str = "tns_tracking_path";
    pub const SHOW_BANNERS: &str = "bp_optional_banners";
    pub const WITHOUT_ADS: &str = "bp_without_ads";
    pub const FULL_SHELL: &str = "bp_full_shell";
    pub const HIDE_SHELL: &str = "bp_hide_shell";
    pub const HIDE_SHELL_ICONS: &str = "bp_hide_shell_icons";
    pub const COMPACT_MENU: &str = "bp_compact_menu";
    pub const HEAD_HOOK: &str = "head_hook";
    pub const API_UID: &str = "wa_api_uid";
    pub const API_SECRET: &str = "wa_api_secret";
    pub const OVERRIDE_SITE_TYPE: &str = "bp_override_site_type";
    pub const SITE_TYPE: &str = "bp_site_type";
    pub const SUB_NAME: &str = "bp_sub_name";
}

/// Hook name used for early injection when the tenant configures none
pub const DEFAULT_HEAD_HOOK: &str = "head";

/// Raw tenant options as stored by the host
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TenantConfig {
    settings: HashMap<String, serde_json::Value>,
}

impl TenantConfig {
    pub fn new(settings: HashMap<String, serde_json::Value>) -> Self {
        Self { settings }
    }

    /// Build a configuration from string pairs
    pub fn from_pairs<I, K, V>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        Self {
            settings: pairs
                .into_iter()
                .map(|(k, v)| (k.into(), serde_json::Value::String(v.into())))
                .collect(),
        }
    }

    /// Parse a JSON object of options
    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }

    /// Get an option as a string (converts scalar non-string types)
    pub fn get_setting(&self, key: &str) -> Option<String> {
        self.settings.get(key).and_then(|v| match v {
            serde_json::Value::String(s) => Some(s.clone()),
            serde_json::Value::Number(n) => Some(n.to_string()),
            serde_json::Value::Bool(b) => Some(b.to_string()),
            _ => None,
        })
    }

    pub fn contains(&self, key: &str) -> bool {
        self.get_setting(key).is_some()
    }
}

/// Host localization system, consulted once when a resolver is built.
pub trait Localization: Send + Sync {
    /// Whether the host runs with locale support. An error means the
    /// localization system is unavailable and is treated as inactive.
    fn is_active(&self) -> Result<bool, Box<dyn std::error::Error + Send + Sync>>;

    /// Locale of the current request, if one can be resolved
    fn current_locale(&self) -> Option<String>;
}

/// Host without locale support
#[derive(Debug, Clone, Copy, Default)]
pub struct NoLocalization;

impl Localization for NoLocalization {
    fn is_active(&self) -> Result<bool, Box<dyn std::error::Error + Send + Sync>> {
        Ok(false)
    }

    fn current_locale(&self) -> Option<String> {
        None
    }
}

/// Host with locale support and a fixed current locale
#[derive(Debug, Clone)]
pub struct FixedLocale(pub String);

impl Localization for FixedLocale {
    fn is_active(&self) -> Result<bool, Box<dyn std::error::Error + Send + Sync>> {
        Ok(true)
    }

    fn current_locale(&self) -> Option<String> {
        Some(self.0.clone())
    }
}

/// Read-only option lookup with locale fallback
#[derive(Debug, Clone)]
pub struct ConfigResolver {
    config: TenantConfig,
    locale_active: bool,
    current_locale: Option<String>,
}

impl ConfigResolver {
    pub fn new(config: TenantConfig, localization: &dyn Localization) -> Self {
        let locale_active = match localization.is_active() {
            Ok(active) => active,
            Err(e) => {
                debug!("Locale detection failed ({}); treating locale support as inactive", e);
                false
            }
        };
        let current_locale = if locale_active {
            localization.current_locale().filter(|l| !l.is_empty())
        } else {
            None
        };

        Self {
            config,
            locale_active,
            current_locale,
        }
    }

    /// Resolver over a host without locale support
    pub fn without_locale(config: TenantConfig) -> Self {
        Self::new(config, &NoLocalization)
    }

    /// Locale that keys cache entries for this request, if locale support is active
    pub fn locale(&self) -> Option<&str> {
        self.current_locale.as_deref()
    }

    /// Resolve an option: the base key first, then `key_<locale>` where the
    /// locale is the explicit one or the request's current locale.
    pub fn resolve(&self, key: &str, locale: Option<&str>) -> Option<String> {
        if let Some(value) = self.config.get_setting(key) {
            return Some(value);
        }
        if !self.locale_active {
            return None;
        }
        let locale = locale
            .filter(|l| !l.is_empty())
            .or(self.current_locale.as_deref())?;
        self.config.get_setting(&format!("{}_{}", key, locale))
    }

    /// Resolve with the request's current locale
    pub fn get(&self, key: &str) -> Option<String> {
        self.resolve(key, None)
    }

    /// Resolve an option, treating an empty value as absent
    pub fn get_non_empty(&self, key: &str) -> Option<String> {
        self.get(key).filter(|v| !v.trim().is_empty())
    }

    /// A flag is set when present with a truthy value
    pub fn flag(&self, key: &str) -> bool {
        match self.get(key) {
            Some(v) => !matches!(
                v.trim().to_ascii_lowercase().as_str(),
                "" | "0" | "false" | "null"
            ),
            None => false,
        }
    }

    /// Hook name the host should bind early injection to
    pub fn head_hook(&self) -> String {
        self.get_non_empty(keys::HEAD_HOOK)
            .unwrap_or_else(|| DEFAULT_HEAD_HOOK.to_owned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct BrokenLocalization;

    impl Localization for BrokenLocalization {
        fn is_active(&self) -> Result<bool, Box<dyn std::error::Error + Send + Sync>> {
            Err("localization plugin not loaded".into())
        }

        fn current_locale(&self) -> Option<String> {
            Some("da".to_owned())
        }
    }

    fn config() -> TenantConfig {
        TenantConfig::from_pairs([
            ("co_branding_domain", "example.com"),
            ("co_branding_domain_da", "example.dk"),
            ("tns_tracking_path_da", "MMK/DA"),
            ("tns_tracking_path_sv", "MMK/SV"),
        ])
    }

    #[test]
    fn test_inactive_locale_uses_base_key_only() {
        let resolver = ConfigResolver::without_locale(config());
        assert_eq!(
            resolver.resolve("co_branding_domain", Some("da")),
            Some("example.com".to_owned())
        );
        assert_eq!(resolver.resolve("tns_tracking_path", Some("da")), None);
        assert_eq!(resolver.resolve("tns_tracking_path", None), None);
        assert_eq!(resolver.locale(), None);
    }

    #[test]
    fn test_base_key_wins_over_locale_suffix() {
        let resolver = ConfigResolver::new(config(), &FixedLocale("da".to_owned()));
        assert_eq!(
            resolver.resolve("co_branding_domain", Some("da")),
            Some("example.com".to_owned())
        );
    }

    #[test]
    fn test_locale_suffix_fallback() {
        let resolver = ConfigResolver::new(config(), &FixedLocale("da".to_owned()));
        // Ambient locale
        assert_eq!(resolver.get("tns_tracking_path"), Some("MMK/DA".to_owned()));
        // Explicit locale overrides the ambient one
        assert_eq!(
            resolver.resolve("tns_tracking_path", Some("sv")),
            Some("MMK/SV".to_owned())
        );
        assert_eq!(resolver.resolve("tns_tracking_path", Some("no")), None);
        assert_eq!(resolver.locale(), Some("da"));
    }

    #[test]
    fn test_failed_locale_detection_is_inactive() {
        let resolver = ConfigResolver::new(config(), &BrokenLocalization);
        assert_eq!(resolver.get("tns_tracking_path"), None);
        assert_eq!(resolver.locale(), None);
    }

    #[test]
    fn test_flags() {
        let config = TenantConfig::from_json(
            r#"{"a": "true", "b": true, "c": "", "d": "false", "e": 0, "f": 1, "g": "on"}"#,
        )
        .unwrap();
        let resolver = ConfigResolver::without_locale(config);
        assert!(resolver.flag("a"));
        assert!(resolver.flag("b"));
        assert!(!resolver.flag("c"));
        assert!(!resolver.flag("d"));
        assert!(!resolver.flag("e"));
        assert!(resolver.flag("f"));
        assert!(resolver.flag("g"));
        assert!(!resolver.flag("missing"));
    }

    #[test]
    fn test_head_hook_default() {
        let resolver = ConfigResolver::without_locale(TenantConfig::default());
        assert_eq!(resolver.head_hook(), DEFAULT_HEAD_HOOK);

        let resolver =
            ConfigResolver::without_locale(TenantConfig::from_pairs([("head_hook", "body_open")]));
        assert_eq!(resolver.head_hook(), "body_open");
    }
}
