//! In-page discovery hooks
//!
//! One script wraps the page's own `crypto.subtle.decrypt`, `fetch`, `XMLHttpRequest`,
//! `atob` and `JSON.parse`, observes `<video>`/`<source>` `src` changes, and wraps the load
//! entry points of known player libraries. Every sighting is pushed into an in-page queue
//! which the host drains by polling; nothing calls back into the host directly.
//!
//! The install function is idempotent, so it can both run before load on every new
//! document and be evaluated once against the document that is already there.

use serde::Deserialize;
use serde_json::Value;
use tracing::debug;

use super::resource::DiscoverySource;

// Globals that tell the scripts apart; only the test page double dispatches on them
#[cfg(test)]
pub(crate) const INSTALL_MARKER: &str = "__kodegenMediaHooksInstalled";
#[cfg(test)]
pub(crate) const UNINSTALL_MARKER: &str = "__kodegenMediaHooksRemoved";
#[cfg(test)]
pub(crate) const DRAIN_MARKER: &str = "__kodegenMediaDrains";

/// Installs every hook; returns `true`
pub(crate) const INSTALL_FUNCTION: &str = r#"() => {
    const w = window;
    w.__kodegenMediaQueue = w.__kodegenMediaQueue || [];
    w.__kodegenMediaPlayers = w.__kodegenMediaPlayers || [];
    if (w.__kodegenMediaHooksInstalled) return true;
    w.__kodegenMediaHooksInstalled = true;

    const MEDIA = /\.(m3u8|mpd|mp4|webm|m4v|mov)(\?|#|$)|\/manifest|\/playlist|stream|\/video\//i;
    const EMBEDDED = /https?:\/\/[^\s"'<>\\`]+?\.(?:m3u8|mpd|mp4|webm|m4v|mov)\b(?:\?[^\s"'<>\\`]*)?/gi;
    const originals = {};
    w.__kodegenMediaOriginals = originals;

    const push = (url, source) => {
        if (!w.__kodegenMediaHooksInstalled || typeof url !== 'string' || !url) return;
        if (url.startsWith('blob:') || url.startsWith('data:')) return;
        if (w.__kodegenMediaQueue.length < 5000) w.__kodegenMediaQueue.push({ url, source });
    };
    const scanText = (text, source) => {
        if (typeof text !== 'string' || text.length > 4000000) return;
        const plain = text.replace(/\\\//g, '/');
        let m;
        EMBEDDED.lastIndex = 0;
        while ((m = EMBEDDED.exec(plain)) !== null) push(m[0], source);
    };
    const scanArgs = (args, source) => {
        for (const arg of args) {
            if (typeof arg === 'string') {
                if (MEDIA.test(arg)) push(arg, source);
                continue;
            }
            try {
                scanText(JSON.stringify(arg), source);
            } catch (e) {}
        }
    };

    try {
        const subtle = w.crypto && w.crypto.subtle;
        if (subtle && subtle.decrypt) {
            originals.decrypt = subtle.decrypt;
            subtle.decrypt = function (...args) {
                return originals.decrypt.apply(this, args).then((buf) => {
                    try {
                        scanText(new TextDecoder().decode(buf), 'crypto');
                    } catch (e) {}
                    return buf;
                });
            };
        }
    } catch (e) {}

    try {
        if (typeof w.fetch === 'function') {
            originals.fetch = w.fetch;
            w.fetch = function (input, init) {
                const url = typeof input === 'string' ? input : (input && input.url) || '';
                if (MEDIA.test(url)) push(url, 'fetch');
                const pending = originals.fetch.apply(this, arguments);
                pending.then((res) => {
                    const type = (res.headers && res.headers.get('content-type')) || '';
                    if (/json|javascript|text|mpegurl/i.test(type)) {
                        res.clone().text().then((t) => scanText(t, 'fetch')).catch(() => {});
                    }
                }).catch(() => {});
                return pending;
            };
        }
    } catch (e) {}

    try {
        const proto = w.XMLHttpRequest && w.XMLHttpRequest.prototype;
        if (proto) {
            originals.xhrOpen = proto.open;
            proto.open = function (method, url) {
                try {
                    const target = String(url);
                    if (MEDIA.test(target)) push(target, 'xhr');
                    this.addEventListener('load', () => {
                        try {
                            if (this.responseType === '' || this.responseType === 'text') {
                                scanText(this.responseText, 'xhr');
                            }
                        } catch (e) {}
                    });
                } catch (e) {}
                return originals.xhrOpen.apply(this, arguments);
            };
        }
    } catch (e) {}

    try {
        originals.atob = w.atob;
        w.atob = function (data) {
            const out = originals.atob.call(this, data);
            scanText(out, 'atob');
            return out;
        };
    } catch (e) {}

    try {
        originals.jsonParse = JSON.parse;
        JSON.parse = function (text, reviver) {
            const out = originals.jsonParse.call(this, text, reviver);
            if (typeof text === 'string' && text.length < 1000000 && MEDIA.test(text)) {
                scanText(text, 'json');
            }
            return out;
        };
    } catch (e) {}

    const reportElement = (el) => {
        if (!el || !el.tagName) return;
        const tag = el.tagName.toLowerCase();
        if (tag !== 'video' && tag !== 'source' && tag !== 'audio') return;
        push(el.currentSrc || el.src || el.getAttribute('src'), 'video-element');
    };
    const observer = new MutationObserver((mutations) => {
        for (const m of mutations) {
            if (m.type === 'attributes') reportElement(m.target);
            for (const node of m.addedNodes || []) {
                if (node.nodeType !== 1) continue;
                reportElement(node);
                if (node.querySelectorAll) node.querySelectorAll('video, source, audio').forEach(reportElement);
            }
        }
    });
    const observe = () => observer.observe(document.documentElement || document, {
        subtree: true, childList: true, attributes: true, attributeFilter: ['src'],
    });
    if (document.documentElement) observe();
    else document.addEventListener('DOMContentLoaded', observe, { once: true });
    w.__kodegenMediaObserver = observer;

    const wrapped = (fn) => fn && fn.__kodegenWrapped;
    const wrapResult = (result) => {
        if (!result || typeof result !== 'object') return result;
        for (const method of ['setup', 'load', 'src', 'loadSource', 'attachSource', 'source', 'create']) {
            const inner = result[method];
            if (typeof inner !== 'function' || wrapped(inner)) continue;
            result[method] = function (...innerArgs) {
                scanArgs(innerArgs, 'player');
                const out = inner.apply(this, innerArgs);
                return method === 'create' ? wrapResult(out) : out;
            };
            result[method].__kodegenWrapped = true;
        }
        return result;
    };
    const wrapFactory = (owner, key, name) => {
        const original = owner && owner[key];
        if (typeof original !== 'function' || wrapped(original)) return;
        const replacement = function (...args) {
            scanArgs(args, 'player');
            const result = new.target ? Reflect.construct(original, args, new.target) : original.apply(this, args);
            return wrapResult(result);
        };
        Object.setPrototypeOf(replacement, original);
        replacement.prototype = original.prototype;
        replacement.__kodegenWrapped = true;
        owner[key] = replacement;
        if (!w.__kodegenMediaPlayers.includes(name)) w.__kodegenMediaPlayers.push(name);
    };
    const wrapMethod = (proto, method, name) => {
        const original = proto && proto[method];
        if (typeof original !== 'function' || wrapped(original)) return;
        proto[method] = function (...args) {
            scanArgs(args, 'player');
            return original.apply(this, args);
        };
        proto[method].__kodegenWrapped = true;
        if (!w.__kodegenMediaPlayers.includes(name)) w.__kodegenMediaPlayers.push(name);
    };

    w.__kodegenHookPlayers = () => {
        try { wrapFactory(w, 'jwplayer', 'jwplayer'); } catch (e) {}
        try { wrapFactory(w, 'videojs', 'videojs'); } catch (e) {}
        try { wrapMethod(w.Hls && w.Hls.prototype, 'loadSource', 'Hls'); } catch (e) {}
        try { wrapFactory(w.dashjs, 'MediaPlayer', 'dashjs'); } catch (e) {}
        try { wrapMethod(w.shaka && w.shaka.Player && w.shaka.Player.prototype, 'load', 'shaka'); } catch (e) {}
        try { wrapFactory(w.Clappr, 'Player', 'Clappr'); } catch (e) {}
        try { wrapFactory(w, 'Plyr', 'Plyr'); } catch (e) {}
        try { wrapFactory(w, 'flowplayer', 'flowplayer'); } catch (e) {}
    };
    w.__kodegenHookPlayers();
    return true;
}"#;

/// Empties the queue, rescans media elements and retries player hooks
pub(crate) const DRAIN_FUNCTION: &str = r#"() => {
    const w = window;
    w.__kodegenMediaDrains = (w.__kodegenMediaDrains || 0) + 1;
    const entries = (w.__kodegenMediaQueue || []).splice(0);
    try {
        document.querySelectorAll('video, source, audio').forEach((el) => {
            const src = el.currentSrc || el.src || el.getAttribute('src');
            if (src && !src.startsWith('blob:')) entries.push({ url: src, source: 'video-element' });
        });
    } catch (e) {}
    if (typeof w.__kodegenHookPlayers === 'function') {
        try { w.__kodegenHookPlayers(); } catch (e) {}
    }
    return { entries, players: (w.__kodegenMediaPlayers || []).slice() };
}"#;

/// Restores wrapped primitives and stops the observer
pub(crate) const UNINSTALL_FUNCTION: &str = r#"() => {
    const w = window;
    w.__kodegenMediaHooksRemoved = (w.__kodegenMediaHooksRemoved || 0) + 1;
    if (!w.__kodegenMediaHooksInstalled) return true;
    const o = w.__kodegenMediaOriginals || {};
    try { if (o.decrypt) w.crypto.subtle.decrypt = o.decrypt; } catch (e) {}
    try { if (o.fetch) w.fetch = o.fetch; } catch (e) {}
    try { if (o.xhrOpen) w.XMLHttpRequest.prototype.open = o.xhrOpen; } catch (e) {}
    try { if (o.atob) w.atob = o.atob; } catch (e) {}
    try { if (o.jsonParse) JSON.parse = o.jsonParse; } catch (e) {}
    try { if (w.__kodegenMediaObserver) w.__kodegenMediaObserver.disconnect(); } catch (e) {}
    w.__kodegenMediaHooksInstalled = false;
    w.__kodegenMediaQueue = [];
    return true;
}"#;

/// Source registered to run before page scripts on every new document
pub(crate) fn before_load_source() -> String {
    format!("({INSTALL_FUNCTION})();")
}

#[derive(Debug, Clone, Deserialize)]
pub(crate) struct HookEntry {
    pub url: String,
    pub source: String,
}

impl HookEntry {
    pub fn discovery_source(&self) -> DiscoverySource {
        match self.source.as_str() {
            "crypto" | "atob" => DiscoverySource::InjectedCryptoHook,
            "video-element" => DiscoverySource::VideoElementMutation,
            "player" => DiscoverySource::PlayerLibraryHook,
            _ => DiscoverySource::InjectedFetchHook,
        }
    }
}

/// Result of one drain poll
#[derive(Debug, Clone, Default, Deserialize)]
pub(crate) struct Drained {
    #[serde(default)]
    pub entries: Vec<HookEntry>,
    /// Player libraries whose entry points are wrapped
    #[serde(default)]
    pub players: Vec<String>,
}

impl Drained {
    /// A malformed or null result drains nothing
    pub fn from_value(value: Value) -> Self {
        if value.is_null() {
            return Self::default();
        }
        serde_json::from_value(value).unwrap_or_else(|e| {
            debug!("Ignoring malformed hook drain result: {}", e);
            Self::default()
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn scripts_carry_their_markers() {
        assert!(INSTALL_FUNCTION.contains(INSTALL_MARKER));
        assert!(DRAIN_FUNCTION.contains(DRAIN_MARKER));
        assert!(UNINSTALL_FUNCTION.contains(UNINSTALL_MARKER));
        assert!(!INSTALL_FUNCTION.contains(DRAIN_MARKER));
        assert!(before_load_source().starts_with("(() => {"));
    }

    #[test]
    fn hook_sources_map_to_channels() {
        let drained = Drained::from_value(json!({
            "entries": [
                { "url": "https://a.example/x.m3u8", "source": "crypto" },
                { "url": "https://a.example/y.m3u8", "source": "xhr" },
                { "url": "https://a.example/z.mp4", "source": "player" },
            ],
            "players": ["Hls"],
        }));

        let sources: Vec<DiscoverySource> =
            drained.entries.iter().map(HookEntry::discovery_source).collect();
        assert_eq!(
            sources,
            vec![
                DiscoverySource::InjectedCryptoHook,
                DiscoverySource::InjectedFetchHook,
                DiscoverySource::PlayerLibraryHook,
            ]
        );
        assert_eq!(drained.players, vec!["Hls"]);
    }

    #[test]
    fn malformed_drain_is_empty() {
        assert!(Drained::from_value(json!("nope")).entries.is_empty());
        assert!(Drained::from_value(Value::Null).players.is_empty());
    }
}
