use semver::{Prerelease, Version};

/// Parses a published release version such as `1.4`, `2.0.1`, `3.1b2` or
/// `1.0+local`. Two or three numeric components are accepted; the local
/// segment after `+` is ignored. Returns `None` for anything else.
pub fn parse_release_version(text: &str) -> Option<Version> {
    let canonical = text.split_once('+').map_or(text, |(head, _)| head);
    let split_at = canonical
        .find(|ch: char| !(ch.is_ascii_digit() || ch == '.'))
        .unwrap_or(canonical.len());
    let (numeric, suffix) = canonical.split_at(split_at);

    let parts = numeric
        .split('.')
        .map(|part| part.parse::<u64>().ok())
        .collect::<Option<Vec<_>>>()?;
    if !(2..=3).contains(&parts.len()) {
        return None;
    }

    let mut version = Version::new(parts[0], parts[1], parts.get(2).copied().unwrap_or(0));
    if !suffix.is_empty() {
        let (tag, number) = ["rc", "a", "b"]
            .iter()
            .find_map(|tag| suffix.strip_prefix(tag).map(|number| (*tag, number)))?;
        if number.is_empty() || !number.bytes().all(|b| b.is_ascii_digit()) {
            return None;
        }
        version.pre = Prerelease::new(&format!("{tag}.{number}")).ok()?;
    }
    Some(version)
}

/// Highest final release among `candidates`; prereleases and unparseable
/// versions are skipped. The original text of the winner is returned.
pub fn select_highest_release<'a, I>(candidates: I) -> Option<&'a str>
where
    I: IntoIterator<Item = &'a str>,
{
    candidates
        .into_iter()
        .filter_map(|text| parse_release_version(text).map(|version| (version, text)))
        .filter(|(version, _)| version.pre.is_empty())
        .max_by(|a, b| a.0.cmp(&b.0))
        .map(|(_, text)| text)
}
