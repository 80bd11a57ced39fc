//! Shallow literal-run extraction from regex patterns.
//!
//! The index cannot evaluate a regex, but most patterns contain literal
//! byte runs that every match must include. Those runs are found with a
//! conservative single pass (no regex parsing) and their trigrams
//! become the mandatory candidate filter. The compiled regex remains the
//! source of truth at verification time, so a too-small run set only
//! costs extra verification work, never a wrong result.

use crate::index::types::Trigram;
use crate::utils::trigram::query_trigrams;

/// Maximal literal byte runs of a pattern.
///
/// A run ends inside `(…)` and `[…]` groups and at any of
/// `. * + ? | { } ^ $ \`; an escape contributes nothing (conservative: the
/// escaped character stands alone and a one-byte run carries no trigram).
/// A quantifier additionally drops the run's final character, which it
/// made optional or repeatable: in `abcd*` only `abc` is guaranteed.
pub fn literal_runs(pattern: &str) -> Vec<String> {
    let mut runs = Vec::new();
    let mut run = String::new();
    let mut chars = pattern.chars().peekable();
    let mut paren_depth = 0usize;
    let mut in_class = false;

    let mut end_run = |run: &mut String| {
        if !run.is_empty() {
            runs.push(std::mem::take(run));
        }
    };

    while let Some(c) = chars.next() {
        if in_class {
            match c {
                '\\' => {
                    chars.next();
                }
                ']' => in_class = false,
                _ => {}
            }
            continue;
        }
        if paren_depth > 0 {
            match c {
                '\\' => {
                    chars.next();
                }
                '(' => paren_depth += 1,
                ')' => paren_depth -= 1,
                '[' => in_class = true,
                _ => {}
            }
            continue;
        }

        match c {
            '(' => {
                end_run(&mut run);
                paren_depth = 1;
            }
            '[' => {
                end_run(&mut run);
                in_class = true;
            }
            '*' | '+' | '?' | '{' => {
                // The preceding character is no longer mandatory
                run.pop();
                end_run(&mut run);
                if c == '{' {
                    // Skip the repetition spec
                    for c in chars.by_ref() {
                        if c == '}' {
                            break;
                        }
                    }
                }
            }
            '.' | '|' | '}' | '^' | '$' | ')' => {
                end_run(&mut run);
            }
            '\\' => {
                end_run(&mut run);
                chars.next();
            }
            _ => run.push(c),
        }
    }
    end_run(&mut run);
    runs
}

/// The deduplicated trigrams of every literal run. Empty means the
/// pattern cannot constrain the candidate set.
pub fn pattern_trigrams(pattern: &str) -> Vec<Trigram> {
    let mut trigrams = Vec::new();
    for run in literal_runs(pattern) {
        trigrams.extend(query_trigrams(run.as_bytes()));
    }
    trigrams.sort_unstable();
    trigrams.dedup();
    trigrams
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::index::types::trigram;

    #[test]
    fn test_plain_literal() {
        assert_eq!(literal_runs("hello"), vec!["hello"]);
    }

    #[test]
    fn test_alternation_group_is_skipped() {
        assert_eq!(literal_runs("abc(def|ghi)jkl"), vec!["abc", "jkl"]);

        let tris = pattern_trigrams("abc(def|ghi)jkl");
        assert!(tris.contains(&trigram(b'a', b'b', b'c')));
        assert!(tris.contains(&trigram(b'j', b'k', b'l')));
        assert!(!tris.contains(&trigram(b'd', b'e', b'f')));
        assert!(!tris.contains(&trigram(b'c', b'd', b'e')));
    }

    #[test]
    fn test_char_class_ends_run() {
        assert_eq!(literal_runs("foo[abc]bar"), vec!["foo", "bar"]);
        // Escaped bracket inside the class does not close it
        assert_eq!(literal_runs(r"foo[a\]b]bar"), vec!["foo", "bar"]);
    }

    #[test]
    fn test_quantifier_drops_last_char() {
        // The 'd' is optional, so only "abc" is mandatory
        assert_eq!(literal_runs("abcd*"), vec!["abc"]);
        assert_eq!(literal_runs("abcd+e"), vec!["abc", "e"]);
        assert_eq!(literal_runs("abcd?"), vec!["abc"]);
        assert_eq!(literal_runs("abcd{2,3}x"), vec!["abc", "x"]);
    }

    #[test]
    fn test_dot_and_anchors() {
        assert_eq!(literal_runs("^foo.bar$"), vec!["foo", "bar"]);
    }

    #[test]
    fn test_top_level_alternation() {
        // Conservative: both sides are treated as mandatory runs
        assert_eq!(literal_runs("abc|def"), vec!["abc", "def"]);
    }

    #[test]
    fn test_escape_ends_run() {
        assert_eq!(literal_runs(r"foo\.bar"), vec!["foo", "bar"]);
        assert_eq!(literal_runs(r"foo\nbar"), vec!["foo", "bar"]);
    }

    #[test]
    fn test_nested_groups() {
        assert_eq!(literal_runs("pre((a|b)c(d))post"), vec!["pre", "post"]);
    }

    #[test]
    fn test_no_trigrams() {
        assert!(pattern_trigrams(".*").is_empty());
        assert!(pattern_trigrams("a.b").is_empty());
        assert!(pattern_trigrams("[abc]+").is_empty());
        assert!(pattern_trigrams("").is_empty());
    }

    #[test]
    fn test_short_runs_yield_nothing() {
        // Two-byte runs carry no trigram
        assert!(pattern_trigrams("ab.cd").is_empty());
        assert_eq!(pattern_trigrams("abc.cd").len(), 1);
    }
}
