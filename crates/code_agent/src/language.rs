//! Fence-line language recognition.

/// Canonical tags for runnable languages.
pub const PYTHON: &str = "python";
pub const BATCH: &str = "batch";
pub const SHELL: &str = "shell";
pub const POWERSHELL: &str = "powershell";

/// Tag substrings searched in a fence's language line, in match order, with the canonical tag
/// each resolves to. Longer tags come before the tags they contain.
pub const LANGUAGE_TAGS: &[(&str, &str)] = &[
    ("powershell", POWERSHELL),
    ("ps1", POWERSHELL),
    ("python", PYTHON),
    ("py", PYTHON),
    ("batch", BATCH),
    ("bat", BATCH),
    ("cmd", BATCH),
    ("bash", SHELL),
    ("shell", SHELL),
    ("sh", SHELL),
];

/// Matches a fence language line against [`LANGUAGE_TAGS`], case-insensitively.
///
/// Returns the canonical tag of the first table entry that occurs anywhere in the line.
#[must_use]
pub fn match_language_line(line: &str) -> Option<&'static str> {
    let lowered = line.to_lowercase();
    LANGUAGE_TAGS
        .iter()
        .find(|(tag, _)| lowered.contains(tag))
        .map(|(_, canonical)| *canonical)
}

/// Resolves a tag that is either canonical or an exact alias.
#[must_use]
pub fn canonical_tag(tag: &str) -> Option<&'static str> {
    let lowered = tag.trim().to_lowercase();
    LANGUAGE_TAGS
        .iter()
        .find(|(alias, canonical)| *alias == lowered || *canonical == lowered)
        .map(|(_, canonical)| *canonical)
}
