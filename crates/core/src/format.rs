//! Pretty-printer (`spec.md` §4.4).
//!
//! Prints every value kind into a growable buffer with a per-row width
//! limit and a max-rows/max-columns for lists/dicts/tables, the way
//! `examples/original_source/core/format.c` does (`MAX_ROW_WIDTH`,
//! `LIST_MAX_HEIGHT`, `TABLE_MAX_WIDTH`, `TABLE_MAX_HEIGHT`), truncating
//! with a `..` marker. Atoms print with type-suffixed literals; `spec.md`
//! gives the suffixes for null atoms as `0Ni`/`0Nf`/`0Nt` (the original
//! prints `0i`/`0f`/`0t` — we follow `spec.md` here since it is explicit
//! about the suffix text, unlike the tag numbers and opcode set where
//! the original governs).

use crate::symbol::SymbolInterner;
use crate::value::{Value, VecData};

/// Layout limits governing truncation, named after
/// `examples/original_source/core/format.c`'s constants.
#[derive(Debug, Clone, Copy)]
pub struct FormatOpts {
    pub max_row_width: usize,
    pub list_max_height: usize,
    pub table_max_width: usize,
    pub table_max_height: usize,
}

impl Default for FormatOpts {
    fn default() -> Self {
        FormatOpts {
            max_row_width: 80,
            list_max_height: 5,
            table_max_width: 10,
            table_max_height: 10,
        }
    }
}

/// Render `v` into a freshly allocated string. `interner` resolves
/// symbol ids to their text for `SYMBOL`/`ENUM`/table-column printing.
pub fn format_value(v: &Value, opts: &FormatOpts, interner: &SymbolInterner) -> String {
    let mut out = String::new();
    write_value(&mut out, v, opts, interner, 0);
    out
}

fn write_value(out: &mut String, v: &Value, opts: &FormatOpts, interner: &SymbolInterner, indent: usize) {
    match v {
        Value::Bool(b) => out.push_str(if *b { "true" } else { "false" }),
        Value::U8(n) => out.push_str(&format!("{n}")),
        Value::Char(c) => out.push(*c as char),
        Value::I16(n) => write_int_literal(out, *n as i64, n == &crate::value::vecdata::null::I16, "i"),
        Value::I32(n) => write_int_literal(out, *n as i64, n == &crate::value::vecdata::null::I32, "i"),
        Value::I64(n) => write_int_literal(out, *n, n == &crate::value::vecdata::null::I64, "i"),
        Value::F64(n) => write_f64_literal(out, *n),
        Value::Symbol(s) => {
            if s.0 == crate::value::vecdata::null::SYMBOL {
                out.push_str("0Ns");
            } else {
                out.push('\'');
                out.push_str(&interner.get(*s));
            }
        }
        Value::Date(d) => write_date(out, *d),
        Value::Time(t) => write_time(out, *t),
        Value::Timestamp(ts) => write_timestamp(out, *ts),
        Value::Guid(g) => write_guid(out, g),
        Value::Vector(vd) => write_vector(out, vd, opts, interner),
        Value::List(items) => write_list(out, items, opts, interner, indent),
        Value::Dict(d) => write_dict(out, &d.keys, &d.values, opts, interner, indent),
        Value::Table(t) => write_table(out, &t.column_names, &t.columns, opts, interner),
        Value::MapFd(_) | Value::Parted(_) => out.push_str("<splayed table>"),
        Value::Enum(e) => write_vector_like(out, e.indices.len(), opts, |out, i| {
            write_value(out, &e.indices.at_idx(i), opts, interner, indent)
        }),
        Value::Lambda(_) => out.push_str("<lambda>"),
        Value::Builtin(b) => {
            out.push('`');
            out.push_str(&interner.get(b.name));
        }
        Value::Ext(e) => {
            out.push_str("<ext:");
            out.push_str(e.type_name);
            out.push('>');
        }
        Value::Error(e) => out.push_str(&e.render()),
    }
}

fn write_int_literal(out: &mut String, n: i64, is_null: bool, suffix: &str) {
    if is_null {
        out.push_str("0N");
        out.push_str(suffix);
    } else {
        out.push_str(&n.to_string());
    }
}

fn write_f64_literal(out: &mut String, n: f64) {
    if n.is_nan() {
        out.push_str("0Nf");
    } else {
        out.push_str(&format!("{n:.2}"));
    }
}

/// Days-since-epoch to (year, month, day), via Howard Hinnant's
/// `civil_from_days` algorithm (proleptic Gregorian, matches how the
/// original converts `DATE`/`TIMESTAMP` payloads in `term.c`).
fn civil_from_days(z: i64) -> (i64, u32, u32) {
    let z = z + 719468;
    let era = if z >= 0 { z } else { z - 146096 } / 146097;
    let doe = (z - era * 146097) as u64;
    let yoe = (doe - doe / 1460 + doe / 36524 - doe / 146096) / 365;
    let y = yoe as i64 + era * 400;
    let doy = doe - (365 * yoe + yoe / 4 - yoe / 100);
    let mp = (5 * doy + 2) / 153;
    let d = (doy - (153 * mp + 2) / 5 + 1) as u32;
    let m = if mp < 10 { mp + 3 } else { mp - 9 } as u32;
    (if m <= 2 { y + 1 } else { y }, m, d)
}

fn write_date(out: &mut String, days: i32) {
    if days == crate::value::vecdata::null::DATE {
        out.push_str("0Nd");
        return;
    }
    let (y, m, d) = civil_from_days(days as i64);
    out.push_str(&format!("{y:04}.{m:02}.{d:02}"));
}

fn write_time(out: &mut String, ms: i32) {
    if ms == crate::value::vecdata::null::TIME {
        out.push_str("0Nt");
        return;
    }
    let sign = if ms < 0 { "-" } else { "" };
    let ms = ms.unsigned_abs();
    let (h, m, s, milli) = (ms / 3_600_000, (ms / 60_000) % 60, (ms / 1000) % 60, ms % 1000);
    out.push_str(&format!("{sign}{h:02}:{m:02}:{s:02}.{milli:03}"));
}

fn write_timestamp(out: &mut String, ns: i64) {
    if ns == crate::value::vecdata::null::TIMESTAMP {
        out.push_str("0Np");
        return;
    }
    let days = ns.div_euclid(86_400_000_000_000);
    let rem_ns = ns.rem_euclid(86_400_000_000_000);
    let (y, m, d) = civil_from_days(days);
    let (h, mi, s, nanos) = (
        rem_ns / 3_600_000_000_000,
        (rem_ns / 60_000_000_000) % 60,
        (rem_ns / 1_000_000_000) % 60,
        rem_ns % 1_000_000_000,
    );
    out.push_str(&format!(
        "{y:04}.{m:02}.{d:02}D{h:02}:{mi:02}:{s:02}.{nanos:09}"
    ));
}

fn write_guid(out: &mut String, g: &[u8; 16]) {
    if *g == crate::value::vecdata::null::GUID {
        out.push_str("0Ng");
        return;
    }
    out.push_str(&format!(
        "{:02x}{:02x}{:02x}{:02x}-{:02x}{:02x}-{:02x}{:02x}-{:02x}{:02x}-{:02x}{:02x}{:02x}{:02x}{:02x}{:02x}",
        g[0], g[1], g[2], g[3], g[4], g[5], g[6], g[7], g[8], g[9], g[10], g[11], g[12], g[13], g[14], g[15]
    ));
}

fn write_vector_like(out: &mut String, len: usize, opts: &FormatOpts, mut write_elem: impl FnMut(&mut String, usize)) {
    if len == 0 {
        out.push_str("[]");
        return;
    }
    out.push('[');
    let mut truncated = false;
    for i in 0..len {
        if out.len() >= opts.max_row_width {
            truncated = true;
            break;
        }
        if i > 0 {
            out.push(' ');
        }
        write_elem(out, i);
    }
    out.push_str(if truncated { "..]" } else { "]" });
}

fn write_vector(out: &mut String, vd: &VecData, opts: &FormatOpts, interner: &SymbolInterner) {
    let wrapped = Value::Vector(std::sync::Arc::new(vd.clone_data()));
    write_vector_like(out, vd.len(), opts, |out, i| {
        write_value(out, &wrapped.at_idx(i), opts, interner, 0);
    });
}

fn write_list(out: &mut String, items: &[Value], opts: &FormatOpts, interner: &SymbolInterner, indent: usize) {
    if items.is_empty() {
        out.push_str("()");
        return;
    }
    out.push('(');
    let inner_indent = indent + 2;
    let shown = items.len().min(opts.list_max_height);
    for item in items.iter().take(shown) {
        out.push('\n');
        out.push_str(&" ".repeat(inner_indent));
        write_value(out, item, opts, interner, inner_indent);
    }
    if shown < items.len() {
        out.push('\n');
        out.push_str(&" ".repeat(inner_indent));
        out.push_str("..");
    }
    out.push('\n');
    out.push_str(&" ".repeat(indent));
    out.push(')');
}

fn write_dict(out: &mut String, keys: &Value, values: &Value, opts: &FormatOpts, interner: &SymbolInterner, indent: usize) {
    let n = keys.len();
    if n == 0 {
        out.push_str("{}");
        return;
    }
    out.push('{');
    let inner_indent = indent + 2;
    let shown = n.min(opts.list_max_height);
    for i in 0..shown {
        out.push('\n');
        out.push_str(&" ".repeat(inner_indent));
        write_value(out, &keys.at_idx(i), opts, interner, inner_indent);
        out.push_str(": ");
        write_value(out, &values.at_idx(i), opts, interner, inner_indent);
    }
    if shown < n {
        out.push('\n');
        out.push_str(&" ".repeat(inner_indent));
        out.push_str("..");
    }
    out.push('\n');
    out.push_str(&" ".repeat(indent));
    out.push('}');
}

fn write_table(out: &mut String, column_names: &[crate::symbol::Symbol], columns: &[Value], opts: &FormatOpts, interner: &SymbolInterner) {
    let table_width = column_names.len().min(opts.table_max_width);
    let table_height = columns
        .first()
        .map(Value::len)
        .unwrap_or(0)
        .min(opts.table_max_height);

    let headers: Vec<String> = column_names[..table_width]
        .iter()
        .map(|s| interner.get(*s).to_string())
        .collect();
    let mut cells: Vec<Vec<String>> = Vec::with_capacity(table_width);
    for col in columns.iter().take(table_width) {
        let mut rows = Vec::with_capacity(table_height);
        for r in 0..table_height {
            rows.push(format_value(&col.at_idx(r), opts, interner));
        }
        cells.push(rows);
    }
    let widths: Vec<usize> = headers
        .iter()
        .enumerate()
        .map(|(c, h)| {
            cells[c]
                .iter()
                .map(String::len)
                .chain(std::iter::once(h.len()))
                .max()
                .unwrap_or(0)
        })
        .collect();

    out.push('|');
    for (h, w) in headers.iter().zip(&widths) {
        out.push_str(&format!(" {h:<w$} |", w = w));
    }
    if column_names.len() > opts.table_max_width {
        out.push_str(" ..");
    }
    out.push('\n');
    out.push_str(&"-".repeat(widths.iter().sum::<usize>() + widths.len() * 3 + 1));
    for r in 0..table_height {
        out.push('\n');
        out.push('|');
        for (c, w) in widths.iter().enumerate() {
            out.push_str(&format!(" {:<w$} |", cells[c][r], w = w));
        }
    }
    let total_rows = columns.first().map(Value::len).unwrap_or(0);
    if total_rows > opts.table_max_height {
        out.push_str("\n..");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::alloc::ThreadHeap;
    use std::sync::Arc;

    fn interner() -> SymbolInterner {
        SymbolInterner::new()
    }

    #[test]
    fn null_i64_prints_with_suffix() {
        let out = format_value(&Value::I64(crate::value::vecdata::null::I64), &FormatOpts::default(), &interner());
        assert_eq!(out, "0Ni");
    }

    #[test]
    fn null_f64_prints_with_suffix() {
        let out = format_value(&Value::F64(f64::NAN), &FormatOpts::default(), &interner());
        assert_eq!(out, "0Nf");
    }

    #[test]
    fn date_round_trips_known_value() {
        // 2024-01-01 is 19723 days after the epoch.
        let out = format_value(&Value::Date(19723), &FormatOpts::default(), &interner());
        assert_eq!(out, "2024.01.01");
    }

    #[test]
    fn symbol_prints_with_quote_prefix() {
        let interner = interner();
        let sym = interner.intern("foo");
        let out = format_value(&Value::Symbol(sym), &FormatOpts::default(), &interner);
        assert_eq!(out, "'foo");
    }

    #[test]
    fn empty_vector_prints_brackets() {
        let heap = Arc::new(ThreadHeap::new());
        let v = VecData::with_capacity(heap, Tag::I64, 0);
        let out = format_value(&Value::Vector(Arc::new(v)), &FormatOpts::default(), &interner());
        assert_eq!(out, "[]");
    }

    #[test]
    fn vector_prints_space_separated_elements() {
        let heap = Arc::new(ThreadHeap::new());
        let mut v = VecData::with_capacity(heap, Tag::I64, 2);
        v.push_i64(1);
        v.push_i64(2);
        let out = format_value(&Value::Vector(Arc::new(v)), &FormatOpts::default(), &interner());
        assert_eq!(out, "[1 2]");
    }

    #[test]
    fn empty_list_prints_parens() {
        let out = format_value(&Value::List(Arc::new(vec![])), &FormatOpts::default(), &interner());
        assert_eq!(out, "()");
    }
}
