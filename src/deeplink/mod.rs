//! Deep link commands
//!
//! `wool://toggle-lock[/<bool>]` and `wool://toggle-keyboard-lock[/<bool>]`.
//! A missing or unrecognized payload means "toggle the current value";
//! anything else about the URL that does not fit is ignored.

use serde::{Deserialize, Serialize};
use tracing::debug;
use url::Url;

/// Which lock a deep link targets
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum LinkCommand {
    /// Screen and keyboard
    ToggleLock,
    /// Keyboard only
    ToggleKeyboardLock,
}

impl LinkCommand {
    fn from_host(host: &str) -> Option<Self> {
        match host.to_ascii_lowercase().as_str() {
            "toggle-lock" => Some(Self::ToggleLock),
            "toggle-keyboard-lock" => Some(Self::ToggleKeyboardLock),
            _ => None,
        }
    }
}

/// A parsed deep link
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeepLink {
    pub command: LinkCommand,
    /// `None` toggles the current value
    pub target: Option<bool>,
}

impl DeepLink {
    /// Parse a URL for `scheme`; returns `None` for anything not addressed to us
    pub fn parse(raw: &str, scheme: &str) -> Option<Self> {
        let url = match Url::parse(raw.trim()) {
            Ok(url) => url,
            Err(e) => {
                debug!(raw, ?e, "ignoring unparseable deep link");
                return None;
            }
        };

        if !url.scheme().eq_ignore_ascii_case(scheme) {
            debug!(scheme = url.scheme(), "ignoring deep link for another scheme");
            return None;
        }

        let Some(command) = url.host_str().and_then(LinkCommand::from_host) else {
            debug!(host = ?url.host_str(), "ignoring unknown deep link command");
            return None;
        };

        Some(Self {
            command,
            target: parse_bool_payload(url.path()),
        })
    }
}

/// Map a path payload to an explicit target
///
/// Slashes are dropped before matching, so `/on/` reads as `on`.
pub fn parse_bool_payload(path: &str) -> Option<bool> {
    match path.replace('/', "").to_ascii_lowercase().as_str() {
        "true" | "yes" | "on" | "1" => Some(true),
        "false" | "no" | "off" | "0" => Some(false),
        "" => None,
        other => {
            debug!(payload = other, "malformed deep link payload, toggling instead");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(raw: &str) -> Option<DeepLink> {
        DeepLink::parse(raw, "wool")
    }

    #[test]
    fn test_commands_without_payload_toggle() {
        assert_eq!(
            parse("wool://toggle-lock"),
            Some(DeepLink { command: LinkCommand::ToggleLock, target: None })
        );
        assert_eq!(
            parse("wool://toggle-keyboard-lock/"),
            Some(DeepLink { command: LinkCommand::ToggleKeyboardLock, target: None })
        );
    }

    #[test]
    fn test_explicit_payloads() {
        for word in ["true", "YES", "On", "1"] {
            let link = parse(&format!("wool://toggle-lock/{word}")).unwrap();
            assert_eq!(link.target, Some(true), "payload {word}");
        }
        for word in ["false", "No", "OFF", "0"] {
            let link = parse(&format!("wool://toggle-keyboard-lock/{word}")).unwrap();
            assert_eq!(link.target, Some(false), "payload {word}");
        }
    }

    #[test]
    fn test_malformed_payload_is_a_toggle() {
        assert_eq!(parse("wool://toggle-lock/xyz"), parse("wool://toggle-lock"));
        assert_eq!(parse("wool://toggle-lock/2").unwrap().target, None);
    }

    #[test]
    fn test_slashes_are_stripped() {
        assert_eq!(parse("wool://toggle-lock/on/").unwrap().target, Some(true));
        assert_eq!(parse("wool://toggle-lock//off").unwrap().target, Some(false));
    }

    #[test]
    fn test_unknown_links_are_ignored() {
        assert_eq!(parse("wool://self-destruct/true"), None);
        assert_eq!(parse("https://toggle-lock/true"), None);
        assert_eq!(parse("not a url"), None);
        assert_eq!(parse("wool:toggle-lock"), None);
    }
}
