//! Keyspace notifications and the channel pattern they are subscribed with.

use std::fmt;

/// A message as delivered by a transport, before it is decoded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawMessage {
    /// Channel the message arrived on.
    pub channel: String,
    /// Message payload, `None` if it was not a UTF-8 string.
    pub payload: Option<String>,
}

impl RawMessage {
    /// Create a raw message.
    pub fn new(channel: impl Into<String>, payload: Option<String>) -> Self {
        Self {
            channel: channel.into(),
            payload,
        }
    }

    /// A keyspace message for `key` in `database` with `operation` as payload.
    pub fn keyspace(database: i64, key: &str, operation: &str) -> Self {
        Self::new(
            format!("{}{}", KeyspacePattern::channel_prefix(database), key),
            Some(operation.to_string()),
        )
    }
}

/// One change event on the store.
///
/// Built from a [`RawMessage`] right after it arrives and handed to the
/// handler by the receive loop; it is dropped once the handler returns.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notification {
    /// Channel the event arrived on, e.g. `__keyspace@0__:user:42`.
    pub channel: String,
    /// Name of the key that changed, e.g. `user:42`.
    pub key: String,
    /// Mutation type such as `set`, `del` or `expired`, when known.
    pub operation: Option<String>,
}

impl Notification {
    /// Decode a raw message received on `pattern`.
    ///
    /// Returns `None` if the channel does not match the pattern or carries no key.
    pub fn decode(message: RawMessage, pattern: &KeyspacePattern) -> Option<Self> {
        if !pattern.matches(&message.channel) {
            return None;
        }
        let key = pattern.extract_key(&message.channel)?.to_string();
        if key.is_empty() {
            return None;
        }

        Some(Self {
            channel: message.channel,
            key,
            operation: message.payload.filter(|op| !op.is_empty()),
        })
    }
}

/// Pattern subscription over the keyspace channels of one logical database.
///
/// Renders as `__keyspace@<db>__:<key_pattern>`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct KeyspacePattern {
    database: i64,
    prefix_len: usize,
    pattern: String,
}

impl KeyspacePattern {
    /// Create a pattern for `key_pattern` keys in `database`.
    pub fn new(database: i64, key_pattern: &str) -> Self {
        let prefix = Self::channel_prefix(database);
        Self {
            database,
            prefix_len: prefix.len(),
            pattern: format!("{}{}", prefix, key_pattern),
        }
    }

    /// Every key in `database`.
    pub fn all_keys(database: i64) -> Self {
        Self::new(database, "*")
    }

    /// Channel prefix shared by every keyspace event in `database`.
    pub fn channel_prefix(database: i64) -> String {
        format!("__keyspace@{}__:", database)
    }

    /// The logical database this pattern covers.
    pub fn database(&self) -> i64 {
        self.database
    }

    /// The key part of the pattern.
    pub fn key_pattern(&self) -> &str {
        &self.pattern[self.prefix_len..]
    }

    /// The full channel pattern sent with `PSUBSCRIBE`.
    pub fn as_str(&self) -> &str {
        &self.pattern
    }

    /// Whether `channel` matches this pattern, using Redis glob rules.
    pub fn matches(&self, channel: &str) -> bool {
        glob_match(self.pattern.as_bytes(), channel.as_bytes())
    }

    /// The key a keyspace channel refers to.
    ///
    /// Returns `None` if the channel belongs to another database or is not a
    /// keyspace channel at all.
    pub fn extract_key<'a>(&self, channel: &'a str) -> Option<&'a str> {
        channel.strip_prefix(&self.pattern[..self.prefix_len])
    }
}

impl fmt::Display for KeyspacePattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.pattern)
    }
}

/// Redis-style glob: `*`, `?`, `[abc]`, `[^a-z]`, and `\` escapes.
pub(crate) fn glob_match(pattern: &[u8], text: &[u8]) -> bool {
    let (mut p, mut t) = (0usize, 0usize);
    // Backtrack point for the most recent `*`: (pattern index after it, text index).
    let mut star: Option<(usize, usize)> = None;

    while t < text.len() {
        if p < pattern.len() {
            match pattern[p] {
                b'*' => {
                    while p < pattern.len() && pattern[p] == b'*' {
                        p += 1;
                    }
                    if p == pattern.len() {
                        return true;
                    }
                    star = Some((p, t));
                    continue;
                }
                b'?' => {
                    p += 1;
                    t += 1;
                    continue;
                }
                b'[' => {
                    let (matched, next) = match_class(pattern, p, text[t]);
                    if matched {
                        p = next;
                        t += 1;
                        continue;
                    }
                }
                b'\\' if p + 1 < pattern.len() => {
                    if pattern[p + 1] == text[t] {
                        p += 2;
                        t += 1;
                        continue;
                    }
                }
                c => {
                    if c == text[t] {
                        p += 1;
                        t += 1;
                        continue;
                    }
                }
            }
        }

        match star {
            Some((star_p, star_t)) => {
                p = star_p;
                t = star_t + 1;
                star = Some((star_p, star_t + 1));
            }
            None => return false,
        }
    }

    while p < pattern.len() && pattern[p] == b'*' {
        p += 1;
    }
    p == pattern.len()
}

/// Match `c` against the class starting at `pattern[start] == b'['`.
///
/// Returns whether it matched and the index just past the class. A class with
/// no closing `]` runs to the end of the pattern, as in Redis.
fn match_class(pattern: &[u8], start: usize, c: u8) -> (bool, usize) {
    let mut i = start + 1;
    let negate = pattern.get(i) == Some(&b'^');
    if negate {
        i += 1;
    }

    let mut matched = false;
    let end = loop {
        let Some(&current) = pattern.get(i) else {
            break pattern.len();
        };
        match current {
            b']' => break i + 1,
            b'\\' if i + 1 < pattern.len() => {
                matched |= pattern[i + 1] == c;
                i += 2;
            }
            _ if pattern.get(i + 1) == Some(&b'-') && i + 2 < pattern.len() => {
                let (mut lo, mut hi) = (current, pattern[i + 2]);
                if lo > hi {
                    std::mem::swap(&mut lo, &mut hi);
                }
                matched |= (lo..=hi).contains(&c);
                i += 3;
            }
            _ => {
                matched |= current == c;
                i += 1;
            }
        }
    };

    (matched != negate, end)
}
