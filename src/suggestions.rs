//! # Error Suggestions
//!
//! Hint text attached to errors that name something unknown: a
//! configuration, repository or stage. When the unknown name is a near miss
//! of a known one, the hint suggests it.
//!
//! ```rust,ignore
//! let hint = suggestions::unknown_name_hint("configurations", "dve", &["dev", "ci"]);
//! assert_eq!(hint, "Did you mean 'dev'? Known configurations: dev, ci");
//! ```

/// Hint listing the known names, led by a suggestion when one is close.
pub fn unknown_name_hint<S: AsRef<str>>(kind: &str, input: &str, candidates: &[S]) -> String {
    let known: Vec<&str> = candidates.iter().map(AsRef::as_ref).collect();
    let listing = if known.is_empty() {
        format!("No {} are declared", kind)
    } else {
        format!("Known {}: {}", kind, known.join(", "))
    };
    match find_similar(input, &known) {
        Some(similar) => format!("Did you mean '{}'? {}", similar, listing),
        None => listing,
    }
}

/// Hint for a command run outside any workspace.
pub fn workspace_not_found_hint() -> String {
    format!(
        "Create {}/{} or pass --root (or set {})",
        crate::defaults::GRIP_DIR,
        crate::defaults::DOCUMENT_FILE,
        crate::defaults::ROOT_ENV_VAR
    )
}

/// Find a similar string from a list of candidates using edit distance.
///
/// Returns Some(candidate) if a close match is found (edit distance <= 2).
fn find_similar<'a>(input: &str, candidates: &[&'a str]) -> Option<&'a str> {
    candidates
        .iter()
        .filter_map(|&candidate| {
            let distance = edit_distance(input, candidate);
            if distance <= 2 && distance < input.len() {
                Some((candidate, distance))
            } else {
                None
            }
        })
        .min_by_key(|(_, distance)| *distance)
        .map(|(candidate, _)| candidate)
}

/// Calculate the Levenshtein edit distance between two strings.
fn edit_distance(a: &str, b: &str) -> usize {
    let a_chars: Vec<char> = a.chars().collect();
    let b_chars: Vec<char> = b.chars().collect();
    if a_chars.is_empty() {
        return b_chars.len();
    }
    if b_chars.is_empty() {
        return a_chars.len();
    }

    let mut previous: Vec<usize> = (0..=b_chars.len()).collect();
    let mut current = vec![0; b_chars.len() + 1];
    for (i, a_char) in a_chars.iter().enumerate() {
        current[0] = i + 1;
        for (j, b_char) in b_chars.iter().enumerate() {
            let cost = usize::from(a_char != b_char);
            current[j + 1] = (previous[j + 1] + 1)
                .min(current[j] + 1)
                .min(previous[j] + cost);
        }
        std::mem::swap(&mut previous, &mut current);
    }
    previous[b_chars.len()]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hint_suggests_close_name() {
        let hint = unknown_name_hint("configurations", "dve", &["dev", "ci"]);
        assert_eq!(hint, "Did you mean 'dev'? Known configurations: dev, ci");
    }

    #[test]
    fn test_hint_without_close_name() {
        let hint = unknown_name_hint("repositories", "frobnicate", &["core", "extra"]);
        assert_eq!(hint, "Known repositories: core, extra");
    }

    #[test]
    fn test_hint_with_nothing_declared() {
        let none: [&str; 0] = [];
        assert_eq!(unknown_name_hint("stages", "build", &none), "No stages are declared");
    }

    #[test]
    fn test_workspace_hint_mentions_root_flag() {
        let hint = workspace_not_found_hint();
        assert!(hint.contains(".grip/grip.yaml"));
        assert!(hint.contains("--root"));
        assert!(hint.contains("GRIP_ROOT"));
    }

    #[test]
    fn test_edit_distance() {
        assert_eq!(edit_distance("build", "build"), 0);
        assert_eq!(edit_distance("buld", "build"), 1);
        assert_eq!(edit_distance("", "ci"), 2);
        assert_eq!(edit_distance("kitten", "sitting"), 3);
    }

    #[test]
    fn test_find_similar() {
        let candidates = ["readonly", "single"];
        assert_eq!(find_similar("singel", &candidates), Some("single"));
        assert_eq!(find_similar("readonyl", &candidates), Some("readonly"));
        assert_eq!(find_similar("x", &candidates), None);
    }
}
