use regex::Regex;

/// Extract the tweet id from a status URL, or accept a bare numeric id.
/// Example: https://x.com/sama/status/1234567890123456789 -> Some("1234567890123456789")
pub fn tweet_id_from_url(input: &str) -> Option<String> {
    let input = input.trim();
    if !input.is_empty() && input.chars().all(|c| c.is_ascii_digit()) {
        return Some(input.to_string());
    }

    // Pattern: /status/{TWEET_ID} or the legacy /statuses/{TWEET_ID}
    let re = Regex::new(r"/status(?:es)?/(\d+)").ok()?;

    re.captures(input)
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str().to_string())
}

/// Strip a leading `@` and surrounding whitespace from a screen name.
pub fn normalize_screen_name(name: &str) -> &str {
    let name = name.trim();
    name.strip_prefix('@').unwrap_or(name)
}
