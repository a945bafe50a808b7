//! Entry-point attribution parsed once when the form is opened.

use serde::{Deserialize, Serialize};
use thiserror::Error;
use url::{Url, form_urlencoded};

use crate::{ClientId, LinkId, SessionId};

const CLIENT_KEYS: &[&str] = &["c", "client_id"];
const LINK_KEYS: &[&str] = &["l", "link_id"];
const SESSION_KEYS: &[&str] = &["sid"];

#[derive(Debug, Error, PartialEq, Eq)]
pub enum AttributionError {
    #[error("entry link has no client id (expected `c` or `client_id`)")]
    MissingClientId,
    #[error("entry URL is not valid: {0}")]
    InvalidUrl(String),
}

/// Campaign tags carried from the ad click to the final submission.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UtmTags {
    #[serde(rename = "utm_source", skip_serializing_if = "Option::is_none")]
    pub source: Option<String>,
    #[serde(rename = "utm_medium", skip_serializing_if = "Option::is_none")]
    pub medium: Option<String>,
    #[serde(rename = "utm_campaign", skip_serializing_if = "Option::is_none")]
    pub campaign: Option<String>,
    #[serde(rename = "utm_content", skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
    #[serde(rename = "utm_term", skip_serializing_if = "Option::is_none")]
    pub term: Option<String>,
}

impl UtmTags {
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.source.is_none()
            && self.medium.is_none()
            && self.campaign.is_none()
            && self.content.is_none()
            && self.term.is_none()
    }
}

/// Identifiers that correlate every write and event of one form session.
///
/// There are no setters: once built the context is shared read-only for the
/// lifetime of the session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AttributionContext {
    client_id: ClientId,
    link_id: Option<LinkId>,
    session_id: Option<SessionId>,
    utm: UtmTags,
}

impl AttributionContext {
    #[must_use]
    pub fn new(client_id: ClientId) -> Self {
        Self {
            client_id,
            link_id: None,
            session_id: None,
            utm: UtmTags::default(),
        }
    }

    #[must_use]
    pub fn with_link(mut self, link_id: LinkId) -> Self {
        self.link_id = Some(link_id);
        self
    }

    #[must_use]
    pub fn with_session(mut self, session_id: SessionId) -> Self {
        self.session_id = Some(session_id);
        self
    }

    #[must_use]
    pub fn with_utm(mut self, utm: UtmTags) -> Self {
        self.utm = utm;
        self
    }

    /// Fill in a session id only when the entry link did not carry one.
    #[must_use]
    pub fn or_session_with(mut self, generate: impl FnOnce() -> SessionId) -> Self {
        if self.session_id.is_none() {
            self.session_id = Some(generate());
        }
        self
    }

    /// Parse a raw query string (`c=...&l=...&utm_source=...`).
    ///
    /// Aliases are tried in order and empty values count as absent, so
    /// `?c=&client_id=abc` resolves to `abc`.
    pub fn from_query(query: &str) -> Result<Self, AttributionError> {
        let query = query.trim_start_matches('?');
        let pairs: Vec<(String, String)> = form_urlencoded::parse(query.as_bytes())
            .map(|(k, v)| (k.into_owned(), v.into_owned()))
            .collect();

        let client_id = lookup(&pairs, CLIENT_KEYS).ok_or(AttributionError::MissingClientId)?;

        Ok(Self {
            client_id: ClientId::new(client_id),
            link_id: lookup(&pairs, LINK_KEYS).map(LinkId::new),
            session_id: lookup(&pairs, SESSION_KEYS).map(SessionId::new),
            utm: UtmTags {
                source: lookup(&pairs, &["utm_source"]),
                medium: lookup(&pairs, &["utm_medium"]),
                campaign: lookup(&pairs, &["utm_campaign"]),
                content: lookup(&pairs, &["utm_content"]),
                term: lookup(&pairs, &["utm_term"]),
            },
        })
    }

    /// Parse the full URL the visitor landed on.
    pub fn from_entry_url(raw: &str) -> Result<Self, AttributionError> {
        let url = Url::parse(raw.trim()).map_err(|e| AttributionError::InvalidUrl(e.to_string()))?;
        Self::from_query(url.query().unwrap_or_default())
    }

    #[must_use]
    pub fn client_id(&self) -> &ClientId {
        &self.client_id
    }

    #[must_use]
    pub fn link_id(&self) -> Option<&LinkId> {
        self.link_id.as_ref()
    }

    #[must_use]
    pub fn session_id(&self) -> Option<&SessionId> {
        self.session_id.as_ref()
    }

    #[must_use]
    pub fn utm(&self) -> &UtmTags {
        &self.utm
    }
}

/// First non-empty value among `keys`, honoring first-occurrence per key.
fn lookup(pairs: &[(String, String)], keys: &[&str]) -> Option<String> {
    keys.iter().find_map(|key| {
        pairs
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.trim())
            .filter(|v| !v.is_empty())
            .map(ToString::to_string)
    })
}
