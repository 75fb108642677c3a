//! Conversation identifier normalization.
//!
//! Collection names must be 3–63 characters drawn from `[a-zA-Z0-9_-]`. Caller-supplied chat
//! identifiers are mapped onto that alphabet with [`sanitize_chat_id`]. The mapping is
//! many-to-one: distinct identifiers can land on the same collection (`"a b"` and `"a_b"`, or
//! two long ids sharing their first 63 characters).

use regex::Regex;
use serde::Serialize;
use std::fmt;
use std::sync::OnceLock;

const MIN_LEN: usize = 3;
const MAX_LEN: usize = 63;
const SHORT_ID_PREFIX: &str = "chat_";

/// Storage-safe collection name derived from a conversation identifier.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(transparent)]
pub struct CollectionName(String);

impl CollectionName {
    /// Borrow the underlying name.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Consume the wrapper, returning the owned name.
    pub fn into_inner(self) -> String {
        self.0
    }
}

impl fmt::Display for CollectionName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for CollectionName {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

fn disallowed_chars() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"[^a-zA-Z0-9_\-]").expect("static pattern compiles"))
}

/// Normalize a caller-supplied chat identifier into a valid [`CollectionName`].
///
/// Every disallowed character becomes `_`. Results shorter than three characters are
/// zero-padded to width three and prefixed with `chat_`; results longer than 63 characters
/// keep their first 63.
pub fn sanitize_chat_id(raw: &str) -> CollectionName {
    let replaced = disallowed_chars().replace_all(raw, "_").into_owned();

    // After substitution every char is ASCII, so byte lengths equal char counts.
    let name = if replaced.len() < MIN_LEN {
        format!("{SHORT_ID_PREFIX}{}", zero_pad(&replaced, MIN_LEN))
    } else if replaced.len() > MAX_LEN {
        replaced[..MAX_LEN].to_string()
    } else {
        replaced
    };

    CollectionName(name)
}

/// Left-pad with zeros to `width`, keeping a leading sign in front of the padding.
fn zero_pad(value: &str, width: usize) -> String {
    if value.len() >= width {
        return value.to_string();
    }
    let fill = "0".repeat(width - value.len());
    match value.chars().next() {
        Some(sign @ ('+' | '-')) => format!("{sign}{fill}{}", &value[1..]),
        _ => format!("{fill}{value}"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn is_valid(name: &CollectionName) -> bool {
        let len = name.as_str().len();
        (MIN_LEN..=MAX_LEN).contains(&len)
            && name
                .as_str()
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
    }

    #[test]
    fn valid_ids_pass_through_unchanged() {
        for raw in ["demo", "abc", "chat-42_final", &"x".repeat(63)] {
            assert_eq!(sanitize_chat_id(raw).as_str(), raw);
        }
    }

    #[test]
    fn disallowed_characters_become_underscores() {
        assert_eq!(sanitize_chat_id("my chat/1").as_str(), "my_chat_1");
        assert_eq!(sanitize_chat_id("héllo").as_str(), "h_llo");
        assert_eq!(sanitize_chat_id("a.b.c").as_str(), "a_b_c");
    }

    #[test]
    fn short_ids_are_padded_and_prefixed() {
        assert_eq!(sanitize_chat_id("").as_str(), "chat_000");
        assert_eq!(sanitize_chat_id("7").as_str(), "chat_007");
        assert_eq!(sanitize_chat_id("ab").as_str(), "chat_0ab");
        assert_eq!(sanitize_chat_id("é").as_str(), "chat_00_");
    }

    #[test]
    fn short_ids_keep_sign_in_front_of_padding() {
        assert_eq!(sanitize_chat_id("-a").as_str(), "chat_-0a");
        assert_eq!(sanitize_chat_id("-").as_str(), "chat_-00");
    }

    #[test]
    fn long_ids_truncate_to_first_63_characters() {
        let raw = format!("{}{}", "a".repeat(60), "b c d e");
        let name = sanitize_chat_id(&raw);
        assert_eq!(name.as_str().len(), 63);
        assert_eq!(name.as_str(), format!("{}b_c", "a".repeat(60)));
    }

    #[test]
    fn outputs_always_satisfy_collection_rules() {
        let inputs = [
            "",
            "a",
            "ab",
            "+",
            "日本語",
            "with spaces and ✓ symbols",
            &"z".repeat(200),
            "../../etc/passwd",
        ];
        for raw in inputs {
            let name = sanitize_chat_id(raw);
            assert!(is_valid(&name), "{raw:?} produced invalid {name}");
        }
    }

    #[test]
    fn distinct_ids_can_collide() {
        assert_eq!(sanitize_chat_id("a b"), sanitize_chat_id("a_b"));
    }
}
