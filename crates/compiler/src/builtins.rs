//! The fixed table of builtin-verb names and arities the compiler needs
//! at compile time to choose `CALL1`/`CALL2`/`CALLN` over a dynamic
//! `CALLD` (`spec.md` §4.6, §4.8's verb table). The runtime owns the
//! actual function pointers; the compiler only needs to know a name's
//! declared arity and whether it is a special form.

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Arity {
    Unary,
    Binary,
    Vary,
}

/// Names compiled as special forms: arguments are *not* evaluated by
/// the compiler, they are pushed as quoted AST constants and the
/// builtin evaluates them itself (`spec.md` §4.6).
pub const SPECIAL_FORMS: &[&str] = &[
    "set", "let", "quote", "try", "select", "update", "insert", "upsert", "from", "where", "by",
];

pub fn is_special_form(name: &str) -> bool {
    SPECIAL_FORMS.contains(&name)
}

/// Control-flow forms compiled directly to jumps rather than calls.
pub const CONTROL_FORMS: &[&str] = &["if", "cond", "and", "or"];

pub fn is_control_form(name: &str) -> bool {
    CONTROL_FORMS.contains(&name)
}

/// Known builtin arities (`spec.md` §4.8's verb table). Anything not
/// listed here is compiled as a dynamic call (`CALLD`) — it may be a
/// user lambda, a closure-captured builtin, or an as-yet-unknown name
/// resolved at runtime.
pub fn known_arity(name: &str) -> Option<Arity> {
    use Arity::*;
    Some(match name {
        "+" | "-" | "*" | "%" | "/" | "div" | "==" | "!=" | "<" | ">" | "<=" | ">=" | "and"
        | "or" | "concat" | "take" | "filter" | "in" | "sect" | "except" | "union" | "within"
        | "find" | "xbar" | "bin" | "binr" | "split" | "as" | "rand" | "xasc" | "xdesc" => Binary,
        "not" | "sum" | "avg" | "min" | "max" | "count" | "first" | "last" | "med" | "dev"
        | "floor" | "ceil" | "round" | "til" | "neg" | "where" | "distinct" | "group" | "asc"
        | "desc" | "iasc" | "idesc" | "rank" | "raze" | "enlist" | "ser" | "de" => Unary,
        "map" | "map-left" | "map-right" | "fold" | "scan" | "pmap" | "asof-join" | "left-join"
        | "inner-join" | "window-join" => Vary,
        _ => return None,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn arithmetic_is_binary() {
        assert_eq!(known_arity("+"), Some(Arity::Binary));
    }

    #[test]
    fn aggregates_are_unary() {
        assert_eq!(known_arity("sum"), Some(Arity::Unary));
    }

    #[test]
    fn unknown_name_has_no_known_arity() {
        assert_eq!(known_arity("my-udf"), None);
    }

    #[test]
    fn select_is_a_special_form() {
        assert!(is_special_form("select"));
        assert!(!is_special_form("+"));
    }
}
