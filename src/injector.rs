//! Splicing the shell into a host page
//!
//! A [`ShellContext`] is built once per page render and handed to the two
//! host lifecycle points:
//! - [`ShellContext::early_injection`] in the document head / early body
//! - [`ShellContext::late_injection`] at the end of the body
//!
//! Banner markup is exposed through [`ShellContext::banners`] and
//! [`ShellContext::show_banners`] only; the host decides where ads go.

use regex::{NoExpand, Regex};
use std::borrow::Cow;
use std::sync::LazyLock;

use crate::parser::ShellDocument;
use crate::tenant_config::{ConfigResolver, keys};

/// CSS namespace of the container wrapping header and footer markup
pub const SHELL_NAMESPACE: &str = "bonnier-wrapper";

static TNS_MARKER: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"<div data-tns-path="[^"]*"></div>"#).expect("tns marker pattern")
});

static ICON_LINK: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"<link\b[^>]*\brel="(?:apple-touch-icon|shortcut icon)"[^>]*>"#)
        .expect("icon link pattern")
});

/// Extension points fired while the header container is emitted.
///
/// Anything written to `out` lands at that exact boundary.
pub trait ShellHooks {
    /// Just before the namespaced container opens
    fn before_container(&mut self, _out: &mut String) {}

    /// Just before the header body, after the analytics bar
    fn before_header(&mut self, _out: &mut String) {}
}

/// Hooks that add nothing
#[derive(Debug, Default, Clone, Copy)]
pub struct NoHooks;

impl ShellHooks for NoHooks {}

/// Tenant display choices applied to the parsed shell
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DisplayPolicy {
    pub hide_shell: bool,
    pub hide_icons: bool,
    pub tns_path: Option<String>,
    pub sub_name: String,
    pub content_unit_category: Option<String>,
    pub show_banners: bool,
}

impl DisplayPolicy {
    pub fn from_resolver(resolver: &ConfigResolver) -> Self {
        Self {
            hide_shell: resolver.flag(keys::HIDE_SHELL),
            hide_icons: resolver.flag(keys::HIDE_SHELL_ICONS),
            tns_path: resolver.get_non_empty(keys::TNS_TRACKING_PATH),
            sub_name: resolver.get_non_empty(keys::SUB_NAME).unwrap_or_default(),
            content_unit_category: resolver.get_non_empty(keys::CONTENT_UNIT_CATEGORY),
            show_banners: resolver.flag(keys::SHOW_BANNERS),
        }
    }

    /// Icon links are stripped when the shell is hidden or icons are hidden
    pub fn strips_icons(&self) -> bool {
        self.hide_shell || self.hide_icons
    }
}

/// Per-request shell state passed to both injection points
#[derive(Debug, Clone)]
pub struct ShellContext {
    document: Option<ShellDocument>,
    policy: DisplayPolicy,
}

impl ShellContext {
    pub fn new(document: Option<ShellDocument>, policy: DisplayPolicy) -> Self {
        Self { document, policy }
    }

    /// Context that injects nothing
    pub fn empty() -> Self {
        Self::new(None, DisplayPolicy::default())
    }

    pub fn document(&self) -> Option<&ShellDocument> {
        self.document.as_ref()
    }

    pub fn policy(&self) -> &DisplayPolicy {
        &self.policy
    }

    pub fn is_available(&self) -> bool {
        self.document.is_some()
    }

    pub fn start_tag(&self) -> Option<&str> {
        self.document.as_ref().map(|d| d.start_tag.as_str())
    }

    pub fn end_tag(&self) -> Option<&str> {
        self.document.as_ref().map(|d| d.end_tag.as_str())
    }

    /// Ad/banner markup, if a shell was loaded
    pub fn banners(&self) -> Option<&str> {
        self.document.as_ref().map(|d| d.banners.as_str())
    }

    /// Whether the host should render banners
    pub fn show_banners(&self) -> bool {
        self.policy.show_banners && self.banners().is_some_and(|b| !b.is_empty())
    }

    /// Head markup after icon stripping
    pub fn head(&self) -> Option<Cow<'_, str>> {
        let doc = self.document.as_ref()?;
        if self.policy.strips_icons() {
            Some(ICON_LINK.replace_all(&doc.head, ""))
        } else {
            Some(Cow::Borrowed(doc.head.as_str()))
        }
    }

    /// Analytics-bar prefix with the tracking path override applied
    pub fn analytics_bar(&self) -> Option<Cow<'_, str>> {
        let doc = self.document.as_ref()?;
        let bar = doc.header.analytics_bar.as_str();
        match &self.policy.tns_path {
            Some(path) => {
                let marker = format!(
                    "<div data-tns-path=\"{}\"></div>",
                    escape_attribute(path)
                );
                Some(TNS_MARKER.replace_all(bar, NoExpand(&marker)))
            }
            None => Some(Cow::Borrowed(bar)),
        }
    }

    /// Head / early-body markup: banner category, head, sub-name tag, then
    /// the header container when the shell is visible.
    pub fn early_injection(&self, hooks: &mut dyn ShellHooks) -> String {
        let Some(head) = self.head() else {
            return String::new();
        };

        let mut out = String::new();
        if let Some(category) = &self.policy.content_unit_category {
            out.push_str(&format!(
                "<meta name=\"banner-category\" content=\"{}\">\n",
                escape_attribute(category)
            ));
        }
        out.push_str(&head);
        out.push('\n');
        out.push_str(&format!(
            "<meta name=\"bcm-sub\" content=\"{}\">\n",
            escape_attribute(&self.policy.sub_name)
        ));
        out.push_str(&self.header_injection(hooks));
        out
    }

    /// Namespaced container holding the analytics bar and header body.
    ///
    /// Empty when the shell is hidden or there is no header markup.
    pub fn header_injection(&self, hooks: &mut dyn ShellHooks) -> String {
        if !self.shows_chrome() {
            return String::new();
        }
        let Some(bar) = self.analytics_bar() else {
            return String::new();
        };
        let Some(doc) = self.document.as_ref() else {
            return String::new();
        };

        let mut out = String::new();
        hooks.before_container(&mut out);
        out.push_str(&format!("<div class=\"{}\">\n", SHELL_NAMESPACE));
        out.push_str(&bar);
        hooks.before_header(&mut out);
        out.push_str(&doc.header.body);
        out.push_str("\n</div>\n");
        out
    }

    /// Footer markup in the namespaced container, or nothing
    pub fn late_injection(&self) -> String {
        match self.document.as_ref() {
            Some(doc) if self.shows_chrome() => format!(
                "<div class=\"{}\">\n{}\n</div>\n",
                SHELL_NAMESPACE, doc.footer
            ),
            _ => String::new(),
        }
    }

    fn shows_chrome(&self) -> bool {
        !self.policy.hide_shell
            && self
                .document
                .as_ref()
                .is_some_and(|d| !d.header.body.is_empty())
    }
}

fn escape_attribute(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    for ch in input.chars() {
        match ch {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(ch),
        }
    }
    out
}
