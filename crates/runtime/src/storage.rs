//! Splayed / parted on-disk storage (`spec.md` §4.12): one file per
//! column, one directory per partition, mmap'd read-only at open time.
//!
//! Layout follows `spec.md` §4.12/§6.2 literally: a splayed directory
//! holds one raw little-endian element file per column plus a `_cols`
//! metadata file; a parted root holds one `YYYY.MM.DD`-named
//! subdirectory per partition, each itself a splayed table. Symbol
//! columns store interned ids on disk with a companion `sym` file
//! (contiguous null-terminated strings, append-only, id = insertion
//! index) per `spec.md` §4.12's "symbol columns are stored as i64 ids
//! with an accompanying `sym` file".

use rayforce_core::alloc::ThreadHeap;
use rayforce_core::error::ErrorKind;
use rayforce_core::symbol::SymbolInterner;
use rayforce_core::tag::Tag;
use rayforce_core::value::composite::{MapFdData, MappedColumn, PartedData, TableData};
use rayforce_core::value::{VecData, Value};
use std::fs;
use std::io::Write;
use std::path::Path;
use std::sync::Arc;

const COLS_FILE: &str = "_cols";
const SYM_FILE: &str = "sym";

/// `set_splayed(path, table)` (`spec.md` §6.3): write every column of
/// an in-memory table to its own file under `path`, plus `_cols`
/// (`name,tag` per line, so `get_splayed` can recover a column's
/// element type without guessing from its name) and a whole-interner
/// `sym` dump (small and append-only; simpler than tracking which
/// symbol ids this particular table actually uses).
pub fn set_splayed(path: &Path, table: &TableData, interner: &SymbolInterner) -> Value {
    if let Err(e) = fs::create_dir_all(path) {
        return Value::error(ErrorKind::Io, format!("set_splayed: {e}"));
    }
    let mut manifest = String::new();
    for (name, column) in table.column_names.iter().zip(table.columns.iter()) {
        let colname = interner.get(*name);
        let Value::Vector(vec) = column else {
            return Value::error(ErrorKind::Type, format!("set_splayed: column '{colname}' is not a vector"));
        };
        manifest.push_str(&format!("{colname},{}\n", vec.tag() as i8));
        if let Err(e) = fs::write(path.join(&*colname), vec.as_bytes()) {
            return Value::error(ErrorKind::Io, format!("set_splayed: {e}"));
        }
    }
    if let Err(e) = fs::write(path.join(COLS_FILE), manifest) {
        return Value::error(ErrorKind::Io, format!("set_splayed: {e}"));
    }
    if let Err(e) = dump_sym_file(path, interner) {
        return Value::error(ErrorKind::Io, format!("set_splayed: {e}"));
    }
    Value::Bool(true)
}

fn dump_sym_file(dir: &Path, interner: &SymbolInterner) -> std::io::Result<()> {
    let mut f = fs::File::create(dir.join(SYM_FILE))?;
    // id 0 is the reserved null symbol (`spec.md` §3.2); skip it.
    for id in 1..interner.len() as u32 {
        if let Some(s) = interner.try_get(rayforce_core::symbol::Symbol(id)) {
            f.write_all(s.as_bytes())?;
            f.write_all(&[0])?;
        }
    }
    Ok(())
}

/// Read `_cols`: `(name, Tag)` pairs in declaration order.
fn read_manifest(dir: &Path, interner: &SymbolInterner) -> Result<Vec<(rayforce_core::symbol::Symbol, Tag)>, Value> {
    let manifest_path = dir.join(COLS_FILE);
    if manifest_path.exists() {
        let text = fs::read_to_string(&manifest_path).map_err(|e| Value::error(ErrorKind::Io, format!("get_splayed: {e}")))?;
        let mut out = Vec::new();
        for line in text.lines().filter(|l| !l.is_empty()) {
            let Some((name, tag_str)) = line.rsplit_once(',') else {
                return Err(Value::error(ErrorKind::Format, format!("get_splayed: malformed _cols line '{line}'")));
            };
            let raw: i8 = tag_str.parse().map_err(|_| Value::error(ErrorKind::Format, "get_splayed: bad tag in _cols"))?;
            let Some((tag, _)) = Tag::from_raw(raw) else {
                return Err(Value::error(ErrorKind::Format, "get_splayed: unknown tag in _cols"));
            };
            out.push((interner.intern(name), tag));
        }
        Ok(out)
    } else {
        // No manifest: directory enumeration gives order (`spec.md`
        // §4.12), element type defaults to I64 since it can't otherwise
        // be recovered.
        let mut names: Vec<String> = fs::read_dir(dir)
            .map_err(|e| Value::error(ErrorKind::Io, format!("get_splayed: {e}")))?
            .filter_map(|e| e.ok())
            .map(|e| e.file_name().to_string_lossy().into_owned())
            .filter(|n| n != COLS_FILE && n != SYM_FILE)
            .collect();
        names.sort();
        Ok(names.into_iter().map(|n| (interner.intern(&n), Tag::I64)).collect())
    }
}

/// `get_splayed(path)` (`spec.md` §6.3): open every column file listed
/// in `_cols` (or, lacking one, every non-metadata file in the
/// directory) as a read-only mmap view.
pub fn get_splayed(path: &Path, interner: &SymbolInterner) -> Value {
    match open_mapfd(path, interner) {
        Ok(m) => Value::MapFd(Arc::new(m)),
        Err(e) => e,
    }
}

fn open_mapfd(dir: &Path, interner: &SymbolInterner) -> Result<MapFdData, Value> {
    let manifest = read_manifest(dir, interner)?;
    let mut column_names = Vec::with_capacity(manifest.len());
    let mut columns = Vec::with_capacity(manifest.len());
    for (name, tag) in manifest {
        let colname = interner.get(name);
        let file_path = dir.join(&*colname);
        let file = fs::File::open(&file_path).map_err(|e| Value::error(ErrorKind::Io, format!("get_splayed: {e}")))?;
        let map = unsafe { memmap2::Mmap::map(&file) }.map_err(|e| Value::error(ErrorKind::Io, format!("get_splayed: {e}")))?;
        let elem = tag
            .element_size()
            .ok_or_else(|| Value::error(ErrorKind::Type, format!("get_splayed: column '{colname}' has no element size")))?;
        if map.len() % elem != 0 {
            return Err(Value::error(
                ErrorKind::Format,
                format!("get_splayed: column '{colname}' size {} not a multiple of element size {elem}", map.len()),
            ));
        }
        column_names.push(name);
        columns.push(MappedColumn { path: file_path, map, tag });
    }
    Ok(MapFdData { dir: dir.to_path_buf(), column_names, columns })
}

/// `get_parted(root, tableName)` (`spec.md` §6.3/§4.12): scan `root`'s
/// subdirectories in lexicographic order, open each `<partition>/<tableName>`
/// as a splayed view, and parse the partition directory name into its
/// key value. Date partitions (`YYYY.MM.DD`) parse via the proleptic
/// Gregorian civil-to-days algorithm; anything else is tried as a plain
/// integer, then falls back to a symbol.
pub fn get_parted(root: &Path, table_name: &str, interner: &SymbolInterner) -> Value {
    let mut entries: Vec<String> = match fs::read_dir(root) {
        Ok(rd) => rd.filter_map(|e| e.ok()).map(|e| e.file_name().to_string_lossy().into_owned()).collect(),
        Err(e) => return Value::error(ErrorKind::Io, format!("get_parted: {e}")),
    };
    entries.sort();

    let mut partition_column = interner.intern("Date");
    let mut partitions = Vec::with_capacity(entries.len());
    for (i, name) in entries.iter().enumerate() {
        let dir = root.join(name).join(table_name);
        if !dir.is_dir() {
            continue;
        }
        let mapfd = match open_mapfd(&dir, interner) {
            Ok(m) => m,
            Err(e) => return e,
        };
        let key = parse_partition_key(name, interner);
        if i == 0 {
            partition_column = interner.intern(match &key {
                Value::Date(_) => "Date",
                Value::Symbol(_) => "partition",
                _ => "partition",
            });
        }
        partitions.push((key, Arc::new(mapfd)));
    }
    Value::Parted(Arc::new(PartedData { partition_column, partitions }))
}

fn parse_partition_key(name: &str, interner: &SymbolInterner) -> Value {
    if let Some(days) = parse_date_dirname(name) {
        return Value::Date(days);
    }
    if let Ok(n) = name.parse::<i64>() {
        return Value::I64(n);
    }
    Value::Symbol(interner.intern(name))
}

/// Parse a `YYYY.MM.DD` directory name into days since the Unix epoch
/// (1970-01-01), using Howard Hinnant's `days_from_civil` formula
/// (proleptic Gregorian, valid across the full `i32` range). The epoch
/// isn't pinned down anywhere in the source material this was built
/// from, so Unix epoch was picked as the least surprising default —
/// recorded as an open question in `DESIGN.md`.
fn parse_date_dirname(name: &str) -> Option<i32> {
    let mut parts = name.splitn(3, '.');
    let y: i64 = parts.next()?.parse().ok()?;
    let m: i64 = parts.next()?.parse().ok()?;
    let d: i64 = parts.next()?.parse().ok()?;
    if parts.next().is_some() || !(1..=12).contains(&m) || !(1..=31).contains(&d) {
        return None;
    }
    Some(days_from_civil(y, m, d) as i32)
}

fn days_from_civil(y: i64, m: i64, d: i64) -> i64 {
    let y = if m <= 2 { y - 1 } else { y };
    let era = if y >= 0 { y } else { y - 399 } / 400;
    let yoe = (y - era * 400) as i64; // [0, 399]
    let mp = (m + 9) % 12; // [0, 11]
    let doy = (153 * mp + 2) / 5 + d - 1; // [0, 365]
    let doe = yoe * 365 + yoe / 4 - yoe / 100 + doy; // [0, 146096]
    era * 146097 + doe - 719468
}

/// Materialize one mmap'd column into an ordinary heap-owned
/// `Value::Vector` (`spec.md` §3.4 "Mmap-backed column objects have
/// `refcount_enabled=no`"). Used by the query evaluator whenever a
/// splayed/parted source needs full-table row-wise evaluation rather
/// than pushdown (see [`pushdown_aggregate`] for the zero-copy path).
pub fn read_column(column: &MappedColumn, heap: &Arc<ThreadHeap>) -> Value {
    Value::Vector(Arc::new(VecData::from_bytes_no_refcount(heap.clone(), column.tag, &column.map)))
}

/// Compute one aggregate verb directly against a mmap'd column's raw
/// bytes, without materializing a `VecData` (`spec.md` §4.12 "read
/// through the mmap pointer without allocating an intermediate
/// vector"). Returns `None` for a verb/tag combination this pushdown
/// path doesn't cover, letting the caller fall back to a materialized
/// evaluation.
pub fn pushdown_aggregate(verb: &str, column: &MappedColumn) -> Option<Value> {
    let elem = column.tag.element_size()?;
    let n = column.map.len() / elem;
    if verb == "count" {
        return Some(Value::I64(n as i64));
    }
    match column.tag {
        Tag::I64 | Tag::Timestamp => pushdown_i64(verb, &column.map, n),
        Tag::I32 | Tag::Date | Tag::Time => pushdown_i32(verb, &column.map, n),
        Tag::F64 => pushdown_f64(verb, &column.map, n),
        _ => None,
    }
}

fn pushdown_i64(verb: &str, bytes: &[u8], n: usize) -> Option<Value> {
    let values: Vec<i64> = (0..n).map(|i| i64::from_le_bytes(bytes[i * 8..i * 8 + 8].try_into().unwrap())).collect();
    let live: Vec<i64> = values.iter().copied().filter(|v| *v != i64::MIN).collect();
    match verb {
        "sum" => Some(Value::I64(live.iter().sum())),
        "avg" => Some(Value::F64(if live.is_empty() { f64::NAN } else { live.iter().sum::<i64>() as f64 / live.len() as f64 })),
        "min" => Some(Value::I64(live.iter().copied().min().unwrap_or(i64::MIN))),
        "max" => Some(Value::I64(live.iter().copied().max().unwrap_or(i64::MIN))),
        "first" => Some(Value::I64(values.first().copied().unwrap_or(i64::MIN))),
        "last" => Some(Value::I64(values.last().copied().unwrap_or(i64::MIN))),
        "med" => Some(Value::F64(median_i64(&live))),
        "dev" => Some(Value::F64(stddev(&live.iter().map(|&v| v as f64).collect::<Vec<_>>()))),
        "distinct" => {
            let mut seen = Vec::new();
            for v in live {
                if !seen.contains(&v) {
                    seen.push(v);
                }
            }
            Some(Value::I64(seen.len() as i64))
        }
        _ => None,
    }
}

fn pushdown_i32(verb: &str, bytes: &[u8], n: usize) -> Option<Value> {
    let values: Vec<i32> = (0..n).map(|i| i32::from_le_bytes(bytes[i * 4..i * 4 + 4].try_into().unwrap())).collect();
    let live: Vec<i32> = values.iter().copied().filter(|v| *v != i32::MIN).collect();
    match verb {
        "sum" => Some(Value::I64(live.iter().map(|&v| v as i64).sum())),
        "avg" => Some(Value::F64(if live.is_empty() { f64::NAN } else { live.iter().map(|&v| v as f64).sum::<f64>() / live.len() as f64 })),
        "min" => Some(Value::I32(live.iter().copied().min().unwrap_or(i32::MIN))),
        "max" => Some(Value::I32(live.iter().copied().max().unwrap_or(i32::MIN))),
        "first" => Some(Value::I32(values.first().copied().unwrap_or(i32::MIN))),
        "last" => Some(Value::I32(values.last().copied().unwrap_or(i32::MIN))),
        _ => None,
    }
}

fn pushdown_f64(verb: &str, bytes: &[u8], n: usize) -> Option<Value> {
    let values: Vec<f64> = (0..n).map(|i| f64::from_le_bytes(bytes[i * 8..i * 8 + 8].try_into().unwrap())).collect();
    let live: Vec<f64> = values.iter().copied().filter(|v| !v.is_nan()).collect();
    match verb {
        "sum" => Some(Value::F64(live.iter().sum())),
        "avg" => Some(Value::F64(if live.is_empty() { f64::NAN } else { live.iter().sum::<f64>() / live.len() as f64 })),
        "min" => Some(Value::F64(live.iter().copied().fold(f64::INFINITY, f64::min))),
        "max" => Some(Value::F64(live.iter().copied().fold(f64::NEG_INFINITY, f64::max))),
        "first" => Some(Value::F64(values.first().copied().unwrap_or(f64::NAN))),
        "last" => Some(Value::F64(values.last().copied().unwrap_or(f64::NAN))),
        "med" => Some(Value::F64(median_f64(&live))),
        "dev" => Some(Value::F64(stddev(&live))),
        _ => None,
    }
}

fn median_i64(values: &[i64]) -> f64 {
    median_f64(&values.iter().map(|&v| v as f64).collect::<Vec<_>>())
}

fn median_f64(values: &[f64]) -> f64 {
    if values.is_empty() {
        return f64::NAN;
    }
    let mut sorted = values.to_vec();
    sorted.sort_by(|a, b| a.partial_cmp(b).unwrap());
    let mid = sorted.len() / 2;
    if sorted.len() % 2 == 0 {
        (sorted[mid - 1] + sorted[mid]) / 2.0
    } else {
        sorted[mid]
    }
}

fn stddev(values: &[f64]) -> f64 {
    if values.is_empty() {
        return f64::NAN;
    }
    let mean = values.iter().sum::<f64>() / values.len() as f64;
    let variance = values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / values.len() as f64;
    variance.sqrt()
}

#[cfg(test)]
mod tests {
    use super::*;
    use rayforce_core::tag::Tag;

    #[test]
    fn date_dirname_round_trips_through_civil_days() {
        // 1970.01.01 is day zero of the Unix epoch.
        assert_eq!(parse_date_dirname("1970.01.01"), Some(0));
        assert_eq!(parse_date_dirname("1970.01.02"), Some(1));
        assert_eq!(parse_date_dirname("1969.12.31"), Some(-1));
        assert_eq!(parse_date_dirname("2024.01.01"), Some(19723));
    }

    #[test]
    fn set_then_get_splayed_round_trips_a_column() {
        let interner = SymbolInterner::new();
        let heap = Arc::new(ThreadHeap::new());
        let mut v = VecData::with_capacity(heap.clone(), Tag::I64, 3);
        v.push_i64(1);
        v.push_i64(2);
        v.push_i64(3);
        let table = TableData {
            column_names: vec![interner.intern("x")],
            columns: vec![Value::Vector(Arc::new(v))],
        };
        let dir = std::env::temp_dir().join(format!("rayforce-storage-test-{}", std::process::id()));
        let _ = fs::remove_dir_all(&dir);
        let wrote = set_splayed(&dir, &table, &interner);
        assert!(matches!(wrote, Value::Bool(true)));

        let loaded = get_splayed(&dir, &interner);
        let Value::MapFd(m) = loaded else { panic!("expected a mapfd table") };
        assert_eq!(m.row_count(), 3);
        let col = read_column(&m.columns[0], &heap);
        assert_eq!(col.at_idx(1), Value::I64(2));

        let agg = pushdown_aggregate("sum", &m.columns[0]);
        assert!(matches!(agg, Some(Value::I64(6))));
        let _ = fs::remove_dir_all(&dir);
    }
}
