//! URL normalization and media classification

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use url::Url;

/// Absolute media URLs embedded in text (JSON, JS, HTML)
static EMBEDDED_MEDIA_URL: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"(?i)https?://[^\s"'<>\\`]+?\.(?:m3u8|mpd|mp4|webm|m4v|mov)\b(?:\?[^\s"'<>\\`]*)?"#)
        .unwrap_or_else(|e| unreachable!("static regex: {e}"))
});

/// `URI="..."` attributes inside HLS tags
static HLS_URI_ATTRIBUTE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"URI="([^"]+)""#).unwrap_or_else(|e| unreachable!("static regex: {e}"))
});

const DIRECT_MEDIA_EXTENSIONS: &[&str] = &[
    "mp4", "webm", "m4v", "mov", "mkv", "avi", "flv", "ogv", "mp3", "m4a", "aac", "ogg", "wav",
    "flac",
];

/// Coarse kind of a captured URL
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ContentHint {
    Hls,
    Dash,
    DirectMedia,
    Unknown,
}

/// Dedup key for a discovered URL
///
/// Absolute http(s) URLs are parsed (host lowercased, default port dropped) and lose their
/// fragment. Relative URLs resolve against an http(s) `base`; without one they are kept as
/// written minus the fragment. Returns `None` for empty, `blob:`, `data:` and `javascript:`
/// values.
pub fn normalize_url(raw: &str, base: Option<&Url>) -> Option<String> {
    let cleaned = raw
        .trim()
        .trim_matches(|c| c == '"' || c == '\'')
        .replace("\\/", "/")
        .replace("\\u002F", "/")
        .replace("\\u0026", "&");
    if cleaned.is_empty() {
        return None;
    }

    let lower = cleaned.to_ascii_lowercase();
    if ["blob:", "data:", "javascript:", "about:"]
        .iter()
        .any(|scheme| lower.starts_with(scheme))
    {
        return None;
    }

    match Url::parse(&cleaned) {
        Ok(mut url) => {
            url.set_fragment(None);
            Some(url.to_string())
        }
        Err(url::ParseError::RelativeUrlWithoutBase) => match base {
            Some(base) => {
                let mut url = base.join(&cleaned).ok()?;
                url.set_fragment(None);
                Some(url.to_string())
            }
            None => {
                let without_fragment = cleaned.split('#').next().unwrap_or_default();
                (!without_fragment.is_empty()).then(|| without_fragment.to_string())
            }
        },
        Err(_) => None,
    }
}

fn path_and_query(url: &str) -> (String, String) {
    let lower = url.to_ascii_lowercase();
    match lower.split_once('?') {
        Some((path, query)) => (path.to_string(), query.to_string()),
        None => (lower, String::new()),
    }
}

fn extension(path: &str) -> Option<&str> {
    let last = path.rsplit('/').next()?;
    let (_, ext) = last.rsplit_once('.')?;
    Some(ext)
}

/// Classify by URL shape first, then by content type
pub fn content_hint(url: &str, mime_type: Option<&str>) -> ContentHint {
    let (path, query) = path_and_query(url);
    match extension(&path) {
        Some("m3u8" | "m3u") => return ContentHint::Hls,
        Some("mpd") => return ContentHint::Dash,
        Some(ext) if DIRECT_MEDIA_EXTENSIONS.contains(&ext) => return ContentHint::DirectMedia,
        _ => {}
    }

    let mime = mime_type.unwrap_or_default().to_ascii_lowercase();
    if mime.contains("mpegurl") || query.contains("m3u8") {
        ContentHint::Hls
    } else if mime.contains("dash+xml") || query.contains(".mpd") {
        ContentHint::Dash
    } else if mime.starts_with("video/") || mime.starts_with("audio/") {
        ContentHint::DirectMedia
    } else {
        ContentHint::Unknown
    }
}

/// Request worth recording: a media resource type or a media-looking URL
pub fn is_media_request(url: &str, resource_type: Option<&str>) -> bool {
    if resource_type.is_some_and(|t| t.eq_ignore_ascii_case("media")) {
        return true;
    }
    let lower = url.to_ascii_lowercase();
    if lower.starts_with("data:") || lower.starts_with("blob:") {
        return false;
    }
    [".m3u8", ".mpd", ".mp4", ".webm", "stream", "/video/"]
        .iter()
        .any(|pattern| lower.contains(pattern))
}

/// Response carrying a manifest or media payload
pub fn is_media_response(url: &str, mime_type: &str, resource_type: Option<&str>) -> bool {
    let mime = mime_type.to_ascii_lowercase();
    mime.starts_with("video/")
        || mime.starts_with("audio/")
        || mime.contains("mpegurl")
        || mime.contains("dash+xml")
        || is_media_request(url, resource_type)
}

/// Media URLs referenced from a text body
///
/// HLS playlists have their URI lines and `URI="..."` attributes resolved against
/// `base`; any other body is scanned for absolute media URLs after unescaping JSON-style
/// `\/` separators.
pub fn extract_media_urls(body: &str, base: Option<&Url>) -> Vec<String> {
    let unescaped = body.replace("\\/", "/").replace("\\u002F", "/");
    let mut found: Vec<String> = Vec::new();
    let mut push = |candidate: String| {
        if !found.contains(&candidate) {
            found.push(candidate);
        }
    };

    if unescaped.trim_start().starts_with("#EXTM3U") {
        for line in unescaped.lines().map(str::trim) {
            if line.is_empty() {
                continue;
            }
            if line.starts_with('#') {
                if line.starts_with("#EXT-X-KEY") || line.starts_with("#EXT-X-SESSION-KEY") {
                    continue;
                }
                for caps in HLS_URI_ATTRIBUTE.captures_iter(line) {
                    if let Some(url) = resolve_playlist_entry(&caps[1], base) {
                        push(url);
                    }
                }
            } else if let Some(url) = resolve_playlist_entry(line, base) {
                push(url);
            }
        }
        return found;
    }

    for m in EMBEDDED_MEDIA_URL.find_iter(&unescaped) {
        push(m.as_str().to_string());
    }
    found
}

/// Playlist entries count only when they are manifests or media files themselves
fn resolve_playlist_entry(entry: &str, base: Option<&Url>) -> Option<String> {
    let url = normalize_url(entry, base)?;
    (content_hint(&url, None) != ContentHint::Unknown).then_some(url)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classifies_by_extension_then_mime() {
        assert_eq!(content_hint("https://a.example/x/master.m3u8?token=1", None), ContentHint::Hls);
        assert_eq!(content_hint("https://a.example/manifest.mpd", None), ContentHint::Dash);
        assert_eq!(content_hint("a.mp4", None), ContentHint::DirectMedia);
        assert_eq!(
            content_hint("https://a.example/get?id=1", Some("video/mp4")),
            ContentHint::DirectMedia
        );
        assert_eq!(content_hint("https://a.example/api/list", None), ContentHint::Unknown);
    }

    #[test]
    fn media_request_patterns() {
        assert!(is_media_request("https://a.example/live/stream/1", None));
        assert!(is_media_request("https://a.example/chunk", Some("Media")));
        assert!(!is_media_request("https://a.example/app.js", Some("Script")));
    }

    #[test]
    fn extracts_escaped_urls_from_json() {
        let body = r#"{"sources":[{"file":"https:\/\/cdn.example\/v\/master.m3u8?sig=ab"}],"poster":"https://cdn.example/p.jpg"}"#;
        assert_eq!(
            extract_media_urls(body, None),
            vec!["https://cdn.example/v/master.m3u8?sig=ab"]
        );
    }

    #[test]
    fn resolves_master_playlist_variants() {
        let base = Url::parse("https://cdn.example/hls/master.m3u8").unwrap();
        let playlist = "#EXTM3U\n\
            #EXT-X-MEDIA:TYPE=AUDIO,GROUP-ID=\"aud\",URI=\"audio/en.m3u8\"\n\
            #EXT-X-STREAM-INF:BANDWIDTH=800000\n\
            720p/index.m3u8\n\
            #EXT-X-KEY:METHOD=AES-128,URI=\"key.bin\"\n\
            seg0.ts\n";
        assert_eq!(
            extract_media_urls(playlist, Some(&base)),
            vec![
                "https://cdn.example/hls/audio/en.m3u8",
                "https://cdn.example/hls/720p/index.m3u8",
            ]
        );
    }

    #[test]
    fn normalization_rejects_non_fetchable_schemes() {
        assert_eq!(normalize_url("blob:https://a.example/123", None), None);
        assert_eq!(normalize_url("   ", None), None);
        assert_eq!(
            normalize_url("https://A.example:443/v.mp4#frag", None).as_deref(),
            Some("https://a.example/v.mp4")
        );
    }
}
