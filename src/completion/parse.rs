use once_cell::sync::Lazy;
use regex::Regex;

static TARGET_CODES_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"target:[ \t]*(\d+(?:[ \t]+\d+)*)").expect("target codes regex"));

/// Code sequence of the last `target: <codes>` pattern in a completion.
/// Returns an empty sequence when nothing matches.
pub fn extract_target_codes(response: &str) -> Vec<u32> {
    let Some(caps) = TARGET_CODES_RE.captures_iter(response).last() else {
        return Vec::new();
    };
    caps.get(1)
        .map(|m| {
            m.as_str()
                .split_whitespace()
                .filter_map(|n| n.parse::<u32>().ok())
                .collect()
        })
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn last_match_wins() {
        let resp = "source: a b\ntarget: 1 2\nsource: c\ntarget: 3 4 5";
        assert_eq!(extract_target_codes(resp), vec![3, 4, 5]);
    }

    #[test]
    fn prose_without_codes_is_empty() {
        assert!(extract_target_codes("I cannot translate this.").is_empty());
        assert!(extract_target_codes("target: none").is_empty());
        assert!(extract_target_codes("").is_empty());
    }

    #[test]
    fn codes_stop_at_line_end() {
        let resp = "Here you go:\ntarget: 7 8\n12 is my favourite number";
        assert_eq!(extract_target_codes(resp), vec![7, 8]);
    }

    #[test]
    fn codes_must_share_the_label_line() {
        assert!(extract_target_codes("The target:\n\n12 apples were eaten").is_empty());
        assert!(extract_target_codes("target:\r\n3").is_empty());
        // a dangling label later on does not shadow an earlier complete one
        assert_eq!(
            extract_target_codes("target: 4 5\nfinal target:\n6"),
            vec![4, 5]
        );
        assert_eq!(extract_target_codes("target:\t9 10"), vec![9, 10]);
    }

    #[test]
    fn oversized_numbers_are_dropped() {
        assert_eq!(extract_target_codes("target: 1 99999999999 2"), vec![1, 2]);
    }
}
