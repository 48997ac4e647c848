//! Platform detection from the page URL, captured URLs and wrapped player libraries

use url::Url;

/// Host suffix to platform name
const HOST_PLATFORMS: &[(&str, &str)] = &[
    ("youtube.com", "youtube"),
    ("youtu.be", "youtube"),
    ("googlevideo.com", "youtube"),
    ("vimeo.com", "vimeo"),
    ("vimeocdn.com", "vimeo"),
    ("dailymotion.com", "dailymotion"),
    ("dmcdn.net", "dailymotion"),
    ("twitch.tv", "twitch"),
    ("ttvnw.net", "twitch"),
    ("jwplatform.com", "jwplayer"),
    ("jwpcdn.com", "jwplayer"),
    ("brightcove.net", "brightcove"),
    ("brightcovecdn.com", "brightcove"),
    ("wistia.com", "wistia"),
    ("wistia.net", "wistia"),
    ("akamaihd.net", "akamai"),
    ("cloudfront.net", "cloudfront"),
    ("mux.com", "mux"),
    ("kaltura.com", "kaltura"),
];

fn platform_for_host(host: &str) -> Option<&'static str> {
    let host = host.to_ascii_lowercase();
    HOST_PLATFORMS
        .iter()
        .find(|(suffix, _)| host == *suffix || host.ends_with(&format!(".{suffix}")))
        .map(|(_, name)| *name)
}

/// Distinct platform names in first-seen order
///
/// Player libraries are reported by their global names (`Hls`, `videojs`, ...) and pass
/// through lowercased.
pub fn detect_platforms<'a>(
    page_url: Option<&'a str>,
    captured: impl IntoIterator<Item = &'a str>,
    players: &[String],
) -> Vec<String> {
    let mut found: Vec<String> = Vec::new();
    let mut add = |name: &str| {
        if !found.iter().any(|f| f == name) {
            found.push(name.to_string());
        }
    };

    for url in page_url.into_iter().chain(captured) {
        if let Some(name) = Url::parse(url)
            .ok()
            .and_then(|u| u.host_str().and_then(platform_for_host))
        {
            add(name);
        }
    }
    for player in players {
        add(&player.to_lowercase());
    }
    found
}
