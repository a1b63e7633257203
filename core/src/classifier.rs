/// Thread classification: derives a thread id from a message
use crate::message::{Message, MessageType};
use regex::{NoExpand, Regex};
use std::sync::LazyLock;

/// Reserved thread that collects every spam message
pub const SPAM_BIN: &str = "spam-bin";

/// Derive the thread id a message belongs to.
///
/// Spam always lands in [`SPAM_BIN`]. Thread replies are keyed by the first
/// `@name` mention, falling back to the author. Everything else, including
/// unrecognised labels, is a direct thread keyed by author.
pub fn classify(message: &Message) -> String {
    match &message.kind {
        MessageType::Spam => SPAM_BIN.to_string(),
        MessageType::Thread => match first_mention(&message.text) {
            Some(name) => format!("thread-{}", name),
            None => format!("thread-{}", message.author),
        },
        MessageType::Direct | MessageType::Other(_) => format!("direct-{}", message.author),
    }
}

/// `@` followed by ASCII word characters; `\w` alone would also match
/// non-ASCII letters
static MENTION: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"@((?-u:\w)+)").expect("invalid mention regex"));

/// First `@name` mention in `text`; a name is one or more ASCII word characters
pub fn first_mention(text: &str) -> Option<&str> {
    MENTION
        .captures(text)
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str())
}

/// Replace the first mention in `text` with `@name`, leaving text without
/// mentions untouched
pub fn replace_first_mention(text: &str, name: &str) -> String {
    MENTION
        .replacen(text, 1, NoExpand(&format!("@{}", name)))
        .into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn msg(author: &str, text: &str, kind: &str) -> Message {
        Message::new(author, text, MessageType::from(kind))
    }

    #[test]
    fn test_spam_goes_to_bin() {
        assert_eq!(classify(&msg("Bot", "buy now", "spam")), "spam-bin");
        assert_eq!(classify(&msg("Bot", "@Alex buy now", "spam")), "spam-bin");
    }

    #[test]
    fn test_thread_uses_first_mention() {
        assert_eq!(classify(&msg("Sam", "@Alex hi", "thread")), "thread-Alex");
        assert_eq!(
            classify(&msg("Sam", "hey @Jordan and @Casey", "thread")),
            "thread-Jordan"
        );
    }

    #[test]
    fn test_thread_without_mention_uses_author() {
        assert_eq!(classify(&msg("Sam", "no mention", "thread")), "thread-Sam");
        assert_eq!(classify(&msg("Sam", "lone @ sign", "thread")), "thread-Sam");
    }

    #[test]
    fn test_direct_and_unknown_use_author() {
        assert_eq!(classify(&msg("Alex", "@Sam hello", "direct")), "direct-Alex");
        assert_eq!(classify(&msg("Alex", "hello", "superchat")), "direct-Alex");
    }

    #[test]
    fn test_mention_scanning() {
        assert_eq!(first_mention("@@Riley welcome"), Some("Riley"));
        assert_eq!(first_mention("email@x.com"), Some("x"));
        assert_eq!(first_mention("@drew_99!"), Some("drew_99"));
        assert_eq!(first_mention("@ @ ..."), None);
        assert_eq!(first_mention("héllo @Zoë"), Some("Zo"));
    }

    #[test]
    fn test_replace_first_mention() {
        assert_eq!(replace_first_mention("@Alex totally agree!", "Quinn"), "@Quinn totally agree!");
        assert_eq!(replace_first_mention("@A and @B", "C"), "@C and @B");
        assert_eq!(replace_first_mention("no mention", "C"), "no mention");
        assert_eq!(replace_first_mention("@Zoë hi", "$1"), "@$1ë hi");
    }
}
