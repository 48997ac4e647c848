//! Captured resources and the per-session deduplicating set

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};

use super::classify::{ContentHint, content_hint, normalize_url};
use url::Url;

/// Where a URL was first seen
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum DiscoverySource {
    NetworkRequest,
    NetworkResponse,
    InjectedCryptoHook,
    InjectedFetchHook,
    VideoElementMutation,
    PlayerLibraryHook,
}

impl DiscoverySource {
    pub fn channel(&self) -> Channel {
        match self {
            DiscoverySource::NetworkRequest | DiscoverySource::NetworkResponse => Channel::Network,
            DiscoverySource::InjectedCryptoHook | DiscoverySource::InjectedFetchHook => Channel::Hooks,
            DiscoverySource::VideoElementMutation => Channel::DomMutation,
            DiscoverySource::PlayerLibraryHook => Channel::PlayerLibrary,
        }
    }
}

/// Reporting bucket for discovery sources
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Channel {
    Network,
    Hooks,
    DomMutation,
    PlayerLibrary,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CapturedResource {
    /// Normalized URL, the dedup key
    pub url: String,
    pub discovery_source: DiscoverySource,
    pub timestamp: DateTime<Utc>,
    pub content_hint: ContentHint,
}

/// Distinct URLs seen per channel
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ChannelCounts {
    pub network: usize,
    pub hooks: usize,
    pub dom_mutation: usize,
    pub player_library: usize,
}

/// Insertion-ordered set of captured resources keyed by normalized URL
///
/// The first arrival of a URL fixes its attribution. Later sightings from other channels
/// only count towards [`ChannelCounts`].
#[derive(Debug, Default)]
pub struct ResourceSet {
    resources: Vec<CapturedResource>,
    index: HashMap<String, usize>,
    seen_per_channel: HashSet<(Channel, String)>,
    base: Option<Url>,
}

impl ResourceSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Relative URLs are resolved against this page URL (http/https only)
    pub fn with_base(base: Option<&str>) -> Self {
        let mut set = Self::default();
        set.set_base(base);
        set
    }

    /// Switch the base, e.g. after the session navigated
    pub fn set_base(&mut self, base: Option<&str>) {
        self.base = base
            .and_then(|b| Url::parse(b).ok())
            .filter(|u| matches!(u.scheme(), "http" | "https"));
    }

    pub fn base(&self) -> Option<&Url> {
        self.base.as_ref()
    }

    /// Record a sighting. Returns true when the URL was new to the set.
    pub fn insert(&mut self, raw_url: &str, source: DiscoverySource, mime_type: Option<&str>) -> bool {
        let Some(url) = normalize_url(raw_url, self.base.as_ref()) else {
            return false;
        };

        self.seen_per_channel.insert((source.channel(), url.clone()));

        if let Some(&existing) = self.index.get(&url) {
            // A later content type can sharpen an unknown hint, never the attribution
            if let Some(slot) = self.resources.get_mut(existing)
                && slot.content_hint == ContentHint::Unknown
            {
                slot.content_hint = content_hint(&url, mime_type);
            }
            return false;
        }

        self.index.insert(url.clone(), self.resources.len());
        self.resources.push(CapturedResource {
            content_hint: content_hint(&url, mime_type),
            url,
            discovery_source: source,
            timestamp: Utc::now(),
        });
        true
    }

    pub fn len(&self) -> usize {
        self.resources.len()
    }

    pub fn is_empty(&self) -> bool {
        self.resources.is_empty()
    }

    pub fn resources(&self) -> &[CapturedResource] {
        &self.resources
    }

    pub fn channel_counts(&self) -> ChannelCounts {
        let mut counts = ChannelCounts::default();
        for (channel, _) in &self.seen_per_channel {
            match channel {
                Channel::Network => counts.network += 1,
                Channel::Hooks => counts.hooks += 1,
                Channel::DomMutation => counts.dom_mutation += 1,
                Channel::PlayerLibrary => counts.player_library += 1,
            }
        }
        counts
    }

    /// URLs grouped into the `hls`/`dash`/`direct`/`other` buckets, in arrival order
    pub fn by_kind(&self) -> ResourcesByKind {
        let mut grouped = ResourcesByKind::default();
        for resource in &self.resources {
            let bucket = match resource.content_hint {
                ContentHint::Hls => &mut grouped.hls,
                ContentHint::Dash => &mut grouped.dash,
                ContentHint::DirectMedia => &mut grouped.direct,
                ContentHint::Unknown => &mut grouped.other,
            };
            bucket.push(resource.url.clone());
        }
        grouped
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ResourcesByKind {
    pub hls: Vec<String>,
    pub dash: Vec<String>,
    pub direct: Vec<String>,
    pub other: Vec<String>,
}

impl ResourcesByKind {
    pub fn total(&self) -> usize {
        self.hls.len() + self.dash.len() + self.direct.len() + self.other.len()
    }
}
