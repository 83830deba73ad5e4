//! Character-safe string capping.
//!
//! Form fields are capped by character count, while upstream error bodies
//! are capped by byte budget before they reach logs. Both helpers return a
//! prefix that always ends on a UTF-8 character boundary.

/// Keep at most `max_chars` Unicode scalar values from the start of `s`.
///
/// # Examples
///
/// ```
/// use snsdiag_utils_string::take_chars;
///
/// assert_eq!(take_chars("Instagram", 5), "Insta");
/// assert_eq!(take_chars("カフェ経営", 2), "カフ");
/// assert_eq!(take_chars("short", 30), "short");
/// ```
#[inline]
pub fn take_chars(s: &str, max_chars: usize) -> &str {
    match s.char_indices().nth(max_chars) {
        Some((cut, _)) => &s[..cut],
        None => s,
    }
}

/// Owned variant of [`take_chars`].
#[inline]
pub fn capped(s: &str, max_chars: usize) -> String {
    take_chars(s, max_chars).to_string()
}

/// Truncate `s` to a byte budget without splitting a character.
///
/// # Examples
///
/// ```
/// use snsdiag_utils_string::take_bytes_at_char_boundary;
///
/// assert_eq!(take_bytes_at_char_boundary("hello world", 5), "hello");
/// assert_eq!(take_bytes_at_char_boundary("héllo", 2), "h"); // é is 2 bytes
/// assert_eq!(take_bytes_at_char_boundary("😀abc", 3), "");
/// ```
#[inline]
pub fn take_bytes_at_char_boundary(s: &str, max_bytes: usize) -> &str {
    if s.len() <= max_bytes {
        return s;
    }
    let mut cut = max_bytes;
    while !s.is_char_boundary(cut) {
        cut -= 1;
    }
    &s[..cut]
}
