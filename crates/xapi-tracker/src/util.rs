//! Formatting helpers for statement fields

use regex::Regex;
use std::fmt::Write;
use std::sync::LazyLock;

static TAG_PATTERN: LazyLock<Option<Regex>> = LazyLock::new(|| Regex::new(r"(?s)<[^>]*>").ok());

/// Format milliseconds as an ISO-8601 duration, e.g. `PT1H2M3.45S`.
///
/// Rounded to centiseconds. Hours and minutes are omitted when zero;
/// seconds are always present.
pub fn iso8601_duration(millis: i64) -> String {
    let mut centis = (millis as f64 / 10.0).round() as i64;
    let mut out = String::new();

    if centis < 0 {
        out.push('-');
        centis = -centis;
    }
    out.push_str("PT");

    let hours = centis / 360_000;
    let minutes = (centis % 360_000) / 6_000;
    let seconds = centis % 6_000;

    if hours > 0 {
        let _ = write!(out, "{}H", hours);
    }
    if minutes > 0 {
        let _ = write!(out, "{}M", minutes);
    }

    let (whole, fraction) = (seconds / 100, seconds % 100);
    let _ = match fraction {
        0 => write!(out, "{}S", whole),
        f if f % 10 == 0 => write!(out, "{}.{}S", whole, f / 10),
        f => write!(out, "{}.{:02}S", whole, f),
    };

    out
}

/// Text content of an HTML fragment
pub fn strip_html(html: &str) -> String {
    let text = match TAG_PATTERN.as_ref() {
        Some(pattern) => pattern.replace_all(html, ""),
        None => html.into(),
    };

    text.replace("&nbsp;", " ")
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&#39;", "'")
        .replace("&amp;", "&")
}

/// Rewrite a host response string into xAPI interaction response syntax.
///
/// `choice`: `1,3` or `1#3` becomes `1[,]3`.
/// `matching`: `1.2#2.1` becomes `1[.]1_2[,]2[.]2_1`.
pub fn process_interaction_response(interaction_type: &str, response: &str) -> String {
    match interaction_type {
        "choice" => response.replace([',', '#'], "[,]"),
        "matching" => response
            .split('#')
            .enumerate()
            .map(|(i, pair)| format!("{}[.]{}", i + 1, pair.replacen('.', "_", 1)))
            .collect::<Vec<_>>()
            .join("[,]"),
        _ => response.to_string(),
    }
}
