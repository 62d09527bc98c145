//! User-agent classification into device type, browser and operating system
//!
//! All three classifiers are pure functions over the lower-cased input and
//! never fail. Sentinels:
//! - device type: `unknown` only when the header is missing or blank; any
//!   other string that matches no tablet/mobile marker is `desktop`
//! - browser and operating system: `Other` for both missing input and
//!   unrecognized strings

use serde::{Deserialize, Serialize};
use std::fmt;

/// Label used by [`browser`] and [`operating_system`] when nothing matches
pub const OTHER: &str = "Other";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeviceType {
    Mobile,
    Tablet,
    Desktop,
    Unknown,
}

impl DeviceType {
    pub fn as_str(&self) -> &'static str {
        match self {
            DeviceType::Mobile => "mobile",
            DeviceType::Tablet => "tablet",
            DeviceType::Desktop => "desktop",
            DeviceType::Unknown => "unknown",
        }
    }

    /// Parse a stored label; anything unrecognized maps to `Unknown`
    pub fn from_label(label: &str) -> Self {
        match label.trim().to_ascii_lowercase().as_str() {
            "mobile" => DeviceType::Mobile,
            "tablet" => DeviceType::Tablet,
            "desktop" => DeviceType::Desktop,
            _ => DeviceType::Unknown,
        }
    }
}

impl fmt::Display for DeviceType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

const TABLET_MARKERS: &[&str] = &["ipad", "tablet", "kindle", "silk/", "playbook"];

const MOBILE_MARKERS: &[&str] = &[
    "mobile",
    "android",
    "iphone",
    "ipod",
    "blackberry",
    "windows phone",
    "opera mini",
];

/// Windows NT version tokens, most specific first
const WINDOWS_VERSIONS: &[(&str, &str)] = &[
    ("windows nt 10", "Windows 10"),
    ("windows nt 6.3", "Windows 8.1"),
    ("windows nt 6.2", "Windows 8"),
    ("windows nt 6.1", "Windows 7"),
];

fn normalize(user_agent: Option<&str>) -> Option<String> {
    user_agent
        .map(str::trim)
        .filter(|ua| !ua.is_empty())
        .map(str::to_lowercase)
}

fn contains_any(haystack: &str, needles: &[&str]) -> bool {
    needles.iter().any(|needle| haystack.contains(needle))
}

/// Classify the requesting device. Tablet markers win over mobile markers.
pub fn device_type(user_agent: Option<&str>) -> DeviceType {
    let Some(ua) = normalize(user_agent) else {
        return DeviceType::Unknown;
    };

    if contains_any(&ua, TABLET_MARKERS) {
        DeviceType::Tablet
    } else if contains_any(&ua, MOBILE_MARKERS) {
        DeviceType::Mobile
    } else {
        DeviceType::Desktop
    }
}

/// Attribute the request to a browser family.
///
/// Order matters: Chromium-based Edge also carries the Chrome token, and
/// Chrome carries the Safari token.
pub fn browser(user_agent: Option<&str>) -> &'static str {
    let Some(ua) = normalize(user_agent) else {
        return OTHER;
    };

    let is_edge = ua.contains("edg/") || ua.contains("edge/") || ua.contains("edga/");
    let is_chrome = ua.contains("chrome/") || ua.contains("crios/");

    if is_edge {
        "Edge"
    } else if is_chrome {
        "Chrome"
    } else if ua.contains("firefox/") || ua.contains("fxios/") {
        "Firefox"
    } else if ua.contains("safari/") {
        "Safari"
    } else if ua.contains("opera") || ua.contains("opr/") {
        "Opera"
    } else if ua.contains("msie") || ua.contains("trident/") {
        "Internet Explorer"
    } else {
        OTHER
    }
}

/// Attribute the request to an operating system.
pub fn operating_system(user_agent: Option<&str>) -> &'static str {
    let Some(ua) = normalize(user_agent) else {
        return OTHER;
    };

    if let Some((_, label)) = WINDOWS_VERSIONS
        .iter()
        .find(|(marker, _)| ua.contains(marker))
    {
        return label;
    }

    // iOS agents advertise "like Mac OS X" and Android agents advertise
    // "Linux", so those tokens only count on their own.
    let is_ios = contains_any(&ua, &["iphone", "ipad", "ipod"]);
    let is_android = ua.contains("android");

    if ua.contains("windows") {
        "Windows"
    } else if !is_ios && (ua.contains("mac os x") || ua.contains("macintosh")) {
        "macOS"
    } else if !is_android && ua.contains("linux") {
        "Linux"
    } else if is_android {
        "Android"
    } else if is_ios {
        "iOS"
    } else {
        OTHER
    }
}

/// All three labels for one user-agent string
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Classification {
    pub device_type: DeviceType,
    pub browser: &'static str,
    pub operating_system: &'static str,
}

pub fn classify(user_agent: Option<&str>) -> Classification {
    Classification {
        device_type: device_type(user_agent),
        browser: browser(user_agent),
        operating_system: operating_system(user_agent),
    }
}
