use regex::Regex;

#[inline]
pub fn capture_group<'a>(re: &Regex, input: &'a str, group: usize) -> Option<&'a str> {
    re.captures(input)
        .and_then(|caps| caps.get(group))
        .map(|m| m.as_str())
}

#[inline]
pub fn capture_group_1_owned(re: &Regex, input: &str) -> Option<String> {
    capture_group(re, input, 1).map(ToOwned::to_owned)
}

/// Resolve `reference` against `base`, returning `reference` untouched when it
/// is already absolute or the base cannot be parsed.
pub fn join_url(base: &str, reference: &str) -> String {
    if reference.starts_with("http://") || reference.starts_with("https://") {
        return reference.to_string();
    }
    url::Url::parse(base)
        .and_then(|b| b.join(reference))
        .map(|u| u.to_string())
        .unwrap_or_else(|_| reference.to_string())
}
