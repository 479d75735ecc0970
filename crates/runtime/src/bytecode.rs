//! Decodes the opaque bytes `rayforce_core::value::LambdaData::bytecode`
//! carries back into `rayforce_compiler::Op` sequences.
//!
//! `rayforce-core` cannot depend on `rayforce-compiler` (the dependency
//! runs the other way), so `compiler::compile_lambda` serializes its
//! `Vec<Op>` into a flat tag+payload byte stream
//! (`rayforce_compiler::compiler`'s private `rayforce_runtime_wire`
//! module) before it ever reaches a `LambdaData`. This module is the
//! matching decoder: one `u8` tag followed by an `i64` little-endian
//! payload per instruction, 9 bytes total.

use rayforce_compiler::Op;
use rayforce_core::error::{ErrorKind, RfError, RfResult};

const ENTRY_SIZE: usize = 9;

/// Inverse of [`decode_ops`]. Used by `rayforce-runtime` itself whenever
/// it needs to build a `LambdaData` in memory (the `lambda` special-form
/// compile path already produces pre-encoded bytes via the compiler
/// crate, so this is mainly exercised by tests and by any future
/// runtime-internal lambda construction, e.g. `query`'s synthesized
/// predicates).
pub fn encode_ops(ops: &[Op]) -> Vec<u8> {
    let mut out = Vec::with_capacity(ops.len() * ENTRY_SIZE);
    for op in ops {
        let (tag, payload): (u8, i64) = match *op {
            Op::LoadConst(k) => (0, k as i64),
            Op::LoadEnv(i) => (1, i as i64),
            Op::StoreEnv(i) => (2, i as i64),
            Op::Pop => (3, 0),
            Op::Resolve => (4, 0),
            Op::Jmp(o) => (5, o as i64),
            Op::Jmpf(o) => (6, o as i64),
            Op::Call1 => (7, 0),
            Op::Call2 => (8, 0),
            Op::CallN(n) => (9, n as i64),
            Op::CallF => (10, 0),
            Op::CallS => (11, 0),
            Op::CallD(n) => (12, n as i64),
            Op::Ret => (13, 0),
            Op::Try(o) => (14, o as i64),
            Op::Catch => (15, 0),
            Op::Throw => (16, 0),
            Op::Trace => (17, 0),
        };
        out.push(tag);
        out.extend_from_slice(&payload.to_le_bytes());
    }
    out
}

pub fn decode_ops(bytes: &[u8]) -> RfResult<Vec<Op>> {
    if bytes.len() % ENTRY_SIZE != 0 {
        return Err(RfError::new(
            ErrorKind::Format,
            format!("bytecode length {} is not a multiple of {ENTRY_SIZE}", bytes.len()),
        ));
    }
    let mut ops = Vec::with_capacity(bytes.len() / ENTRY_SIZE);
    for chunk in bytes.chunks_exact(ENTRY_SIZE) {
        let tag = chunk[0];
        let payload = i64::from_le_bytes(chunk[1..9].try_into().unwrap());
        let op = match tag {
            0 => Op::LoadConst(payload as u32),
            1 => Op::LoadEnv(payload as u32),
            2 => Op::StoreEnv(payload as u32),
            3 => Op::Pop,
            4 => Op::Resolve,
            5 => Op::Jmp(payload as i32),
            6 => Op::Jmpf(payload as i32),
            7 => Op::Call1,
            8 => Op::Call2,
            9 => Op::CallN(payload as u32),
            10 => Op::CallF,
            11 => Op::CallS,
            12 => Op::CallD(payload as u32),
            13 => Op::Ret,
            14 => Op::Try(payload as i32),
            15 => Op::Catch,
            16 => Op::Throw,
            17 => Op::Trace,
            other => return Err(RfError::new(ErrorKind::Format, format!("unknown opcode tag {other}"))),
        };
        ops.push(op);
    }
    Ok(ops)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rayforce_compiler::compile_program;
    use rayforce_compiler::parse;
    use rayforce_core::symbol::SymbolInterner;

    #[test]
    fn round_trips_through_compiler_encoding() {
        let interner = SymbolInterner::new();
        let (program, spans) = parse("(+ 1 2)", &interner).unwrap();
        let compiled = compile_program(&program, &spans, &interner).unwrap();
        let bytes = encode_ops(&compiled.ops);
        let decoded = decode_ops(&bytes).unwrap();
        assert_eq!(decoded, compiled.ops);
    }

    #[test]
    fn rejects_truncated_bytes() {
        assert!(decode_ops(&[0u8; 5]).is_err());
    }

    #[test]
    fn rejects_unknown_tag() {
        let mut bytes = vec![99u8];
        bytes.extend_from_slice(&0i64.to_le_bytes());
        assert!(decode_ops(&bytes).is_err());
    }
}
