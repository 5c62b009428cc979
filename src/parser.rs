//! Shell document parsing
//!
//! The shell API returns a JSON envelope whose fields are ready-made markup
//! fragments. Parsing is fail-closed: a body that does not deserialize, or
//! lacks any required field, yields no document at all.
//!
//! Two refinements are applied to the header fragment on every parse:
//! - an embedded tag-manager block is moved from the header to the end of
//!   the head fragment
//! - everything before the first `<header` element is split off as the
//!   analytics-bar prefix

use regex::Regex;
use serde::Deserialize;
use std::sync::LazyLock;
use tracing::warn;

use crate::ShellError;

/// Opening marker of the embedded tag-manager block
pub const TAG_MANAGER_BEGIN: &str = "<!-- Google Tag Manager -->";
/// Closing marker of the embedded tag-manager block
pub const TAG_MANAGER_END: &str = "<!-- End Google Tag Manager -->";

static TAG_MANAGER_BLOCK: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(&format!(
        "(?s){}.*?{}",
        regex::escape(TAG_MANAGER_BEGIN),
        regex::escape(TAG_MANAGER_END)
    ))
    .expect("tag manager pattern")
});

static HEADER_START: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"<header[\s>]").expect("header pattern"));

#[derive(Debug, Deserialize)]
struct Envelope {
    html: HtmlFragments,
}

#[derive(Debug, Deserialize)]
struct HtmlFragments {
    start_tag: String,
    end_tag: String,
    head: String,
    body: BodyFragments,
    #[serde(alias = "banners")]
    ad: String,
}

#[derive(Debug, Deserialize)]
struct BodyFragments {
    header: String,
    footer: String,
}

/// Header markup split into the analytics-bar prefix and the header proper
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HeaderFragment {
    /// Markup preceding the `<header>` element; empty when there is none
    pub analytics_bar: String,
    /// The `<header>` element and everything after it
    pub body: String,
}

impl HeaderFragment {
    pub fn split(header: &str) -> Self {
        match HEADER_START.find(header) {
            Some(m) => Self {
                analytics_bar: header[..m.start()].to_owned(),
                body: header[m.start()..].to_owned(),
            },
            None => Self {
                analytics_bar: String::new(),
                body: header.to_owned(),
            },
        }
    }

    pub fn is_empty(&self) -> bool {
        self.analytics_bar.is_empty() && self.body.is_empty()
    }
}

/// A fully parsed shell response
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShellDocument {
    pub start_tag: String,
    pub end_tag: String,
    /// Head markup, with any relocated tag-manager block appended
    pub head: String,
    pub header: HeaderFragment,
    pub footer: String,
    /// Ad/banner markup; never placed by the injector itself
    pub banners: String,
}

impl ShellDocument {
    /// Parse a raw response body, logging and discarding anything malformed
    pub fn parse(raw: &str) -> Option<Self> {
        match Self::try_parse(raw) {
            Ok(doc) => Some(doc),
            Err(e) => {
                warn!("Discarding shell document: {}", e);
                None
            }
        }
    }

    pub fn try_parse(raw: &str) -> Result<Self, ShellError> {
        if raw.trim().is_empty() {
            return Err(ShellError::Malformed("empty response body".to_owned()));
        }
        let envelope: Envelope = serde_json::from_str(raw)?;
        let html = envelope.html;
        let (head, header) = relocate_tag_manager(html.head, html.body.header);

        Ok(Self {
            start_tag: html.start_tag,
            end_tag: html.end_tag,
            head,
            header: HeaderFragment::split(&header),
            footer: html.body.footer,
            banners: html.ad,
        })
    }
}

/// Move the first tag-manager block from `header` to the end of `head`
fn relocate_tag_manager(mut head: String, header: String) -> (String, String) {
    let Some(m) = TAG_MANAGER_BLOCK.find(&header) else {
        return (head, header);
    };
    head.push_str(m.as_str());
    let mut rest = String::with_capacity(header.len() - m.len());
    rest.push_str(&header[..m.start()]);
    rest.push_str(&header[m.end()..]);
    (head, rest)
}
