//! Glob-style string matching (`spec.md` §4.8 `like`, also used by the
//! query planner's `where` pushdown): `?` one char, `*` any run, `[abc]`
//! a class, `[^abc]` a negated class.

use rayforce_core::error::ErrorKind;
use rayforce_core::tag::Tag;
use rayforce_core::value::Value;

pub(super) fn string_match_verb(s: &Value, pattern: &Value) -> Value {
    let (Value::Vector(sv), Value::Vector(pv)) = (s, pattern) else {
        return Value::error(ErrorKind::Type, "like: expected char vectors");
    };
    if sv.tag() != Tag::Char || pv.tag() != Tag::Char {
        return Value::error(ErrorKind::Type, "like: expected char vectors");
    }
    Value::Bool(glob_match(sv.as_bytes(), pv.as_bytes()))
}

/// Backtracking glob matcher. `spec.md` §4.8 doesn't require linear-time
/// matching, so a straightforward recursive match over bytes is enough.
pub fn glob_match(s: &[u8], pattern: &[u8]) -> bool {
    match_at(s, pattern)
}

fn match_at(s: &[u8], p: &[u8]) -> bool {
    if p.is_empty() {
        return s.is_empty();
    }
    match p[0] {
        b'*' => {
            if match_at(s, &p[1..]) {
                return true;
            }
            !s.is_empty() && match_at(&s[1..], p)
        }
        b'?' => !s.is_empty() && match_at(&s[1..], &p[1..]),
        b'[' => {
            let Some(close) = p.iter().position(|&b| b == b']') else {
                return !s.is_empty() && s[0] == b'[' && match_at(&s[1..], &p[1..]);
            };
            if s.is_empty() {
                return false;
            }
            let class = &p[1..close];
            let (negate, class) = if class.first() == Some(&b'^') { (true, &class[1..]) } else { (false, class) };
            let matched = class.contains(&s[0]);
            if matched != negate {
                match_at(&s[1..], &p[close + 1..])
            } else {
                false
            }
        }
        c => !s.is_empty() && s[0] == c && match_at(&s[1..], &p[1..]),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn star_matches_any_run() {
        assert!(glob_match(b"hello world", b"hello*"));
        assert!(!glob_match(b"hello world", b"world*"));
    }

    #[test]
    fn question_mark_matches_one_char() {
        assert!(glob_match(b"cat", b"c?t"));
        assert!(!glob_match(b"ct", b"c?t"));
    }

    #[test]
    fn character_class_and_negation() {
        assert!(glob_match(b"cat", b"[bc]at"));
        assert!(!glob_match(b"cat", b"[^bc]at"));
    }
}
