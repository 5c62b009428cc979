//! Remote shell request description
//!
//! A [`ShellRequest`] is derived once per page render from the tenant's
//! resolved options. It performs no network or cache access; the URL and the
//! authorization header are pure functions of its fields.

use base64::{Engine as _, engine::general_purpose::STANDARD};

use crate::tenant_config::{ConfigResolver, keys};

/// Path of the external headers endpoint on the tenant's shell host
pub const EXTERNAL_HEADERS_PATH: &str = "/api/v3/external_headers/";

/// What to ask the shell API for
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShellRequest {
    /// Shell host (the tenant's co-branding domain); empty when unconfigured
    pub host: String,
    /// Request the partial shell (no full page chrome)
    pub partial: bool,
    /// Ask the API to leave out ads
    pub without_ads: bool,
    /// Request the compact menu variant
    pub compact_menu: bool,
    /// Site type override sent as `bcm_type`
    pub site_type: Option<String>,
}

impl ShellRequest {
    /// Build the request from resolved tenant options.
    ///
    /// A missing co-branding domain yields an empty host, which fails at fetch
    /// time rather than here.
    pub fn build(resolver: &ConfigResolver) -> Self {
        let site_type = if resolver.flag(keys::OVERRIDE_SITE_TYPE) {
            resolver.get_non_empty(keys::SITE_TYPE)
        } else {
            None
        };

        Self {
            host: resolver
                .get(keys::CO_BRANDING_DOMAIN)
                .map(|d| d.trim().to_owned())
                .unwrap_or_default(),
            partial: !resolver.flag(keys::FULL_SHELL),
            without_ads: resolver.flag(keys::WITHOUT_ADS),
            compact_menu: resolver.flag(keys::COMPACT_MENU),
            site_type,
        }
    }

    /// Remote URL of the external headers endpoint for this request
    pub fn url(&self, scheme: &str) -> String {
        let mut url = format!(
            "{}://{}{}?partial={}",
            scheme, self.host, EXTERNAL_HEADERS_PATH, self.partial
        );
        if self.compact_menu {
            url.push_str("&menu_type=compact");
        }
        url.push_str(&format!("&without_ads={}", self.without_ads));
        if let Some(site_type) = &self.site_type {
            url.push_str("&bcm_type=");
            url.push_str(&urlencoding::encode(site_type));
        }
        url
    }
}

/// Tenant API credentials for the shell host
#[derive(Clone, Default, PartialEq, Eq)]
pub struct Credentials {
    pub uid: String,
    pub secret: String,
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credentials")
            .field("uid", &self.uid)
            .field("secret", &"<redacted>")
            .finish()
    }
}

impl Credentials {
    pub fn new(uid: impl Into<String>, secret: impl Into<String>) -> Self {
        Self {
            uid: uid.into(),
            secret: secret.into(),
        }
    }

    /// Credentials from resolved tenant options; missing parts are empty
    pub fn from_resolver(resolver: &ConfigResolver) -> Self {
        Self {
            uid: resolver.get(keys::API_UID).unwrap_or_default(),
            secret: resolver.get(keys::API_SECRET).unwrap_or_default(),
        }
    }

    /// `Authorization` header value: `Basic base64(uid:secret)`
    pub fn authorization(&self) -> String {
        format!(
            "Basic {}",
            STANDARD.encode(format!("{}:{}", self.uid, self.secret))
        )
    }
}
