//! disasm.rs — Désassembleur "lisible humain" pour le bytecode Loutre.
//!
//! - `disassemble_instruction` : une instruction, avec ses annotations
//!   (constantes résolues, destinations de saut calculées) ;
//! - `disassemble_chunk`       : un chunk entier, une ligne par op ;
//! - `disassemble_function`    : une fonction et, récursivement, toutes les
//!   fonctions de son pool de constantes.
//!
//! Le désassembleur est tolérant : un octet qui n'est pas un opcode connu
//! s'affiche en brut (`db 0x..`) sans interrompre le parcours.

use std::fmt::Write as _;

use crate::chunk::Chunk;
use crate::heap::{Heap, ObjRef};
use crate::object::Obj;
use crate::op::Op;
use crate::value::{print_value, Value};

/// Désassemble tout un chunk, une ligne par instruction.
pub fn disassemble_chunk(heap: &Heap, chunk: &Chunk, title: &str) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "== {title} ==");
    let mut offset = 0;
    while offset < chunk.code.len() {
        let (line, next) = disassemble_instruction(heap, chunk, offset);
        let _ = writeln!(out, "{line}");
        offset = next;
    }
    out
}

/// Désassemble la fonction `fref` puis, récursivement, chaque fonction de
/// son pool de constantes (les fonctions imbriquées).
pub fn disassemble_function(heap: &Heap, fref: ObjRef) -> String {
    let fun = heap.function(fref);
    let title = match fun.name {
        Some(n) => format!("fn {}", heap.string(n).chars),
        None => "script".to_string(),
    };
    let mut out = disassemble_chunk(heap, &fun.chunk, &title);
    for &c in &fun.chunk.constants {
        if let Value::Obj(r) = c {
            if matches!(heap.obj(r), Obj::Function(_)) {
                out.push('\n');
                out.push_str(&disassemble_function(heap, r));
            }
        }
    }
    out
}

/// Désassemble l'instruction à `offset`. Renvoie (texte, offset suivant).
pub fn disassemble_instruction(heap: &Heap, chunk: &Chunk, offset: usize) -> (String, usize) {
    let line = chunk.line_for(offset);
    let head = format!("{offset:04} (line {line:>4})  ");
    let byte = chunk.code[offset];
    let Ok(op) = Op::try_from(byte) else {
        return (format!("{head}db {byte:#04x}"), offset + 1);
    };

    use Op::*;
    match op {
        // opcode + index constant
        Constant | GetGlobal | DefineGlobal | SetGlobal | GetProperty | SetProperty | GetSuper
        | Class | Method => {
            let ix = chunk.code[offset + 1];
            let text = format!(
                "{head}{:<8} {ix:3}  {}",
                op.mnemonic(),
                constant_preview(heap, chunk, ix)
            );
            (text, offset + 2)
        }

        // opcode + slot / argc
        GetLocal | SetLocal | GetUpvalue | SetUpvalue | Call => {
            let slot = chunk.code[offset + 1];
            (format!("{head}{:<8} {slot:3}", op.mnemonic()), offset + 2)
        }

        // opcode + index constant + argc
        Invoke | SuperInvoke => {
            let ix = chunk.code[offset + 1];
            let argc = chunk.code[offset + 2];
            let text = format!(
                "{head}{:<8} {ix:3} ({argc} args)  {}",
                op.mnemonic(),
                constant_preview(heap, chunk, ix)
            );
            (text, offset + 3)
        }

        // sauts : offset 16 bits big-endian
        Jump | JumpIfFalse => {
            let off = read_u16(chunk, offset + 1);
            let dest = offset + 3 + off as usize;
            (
                format!("{head}{:<8} {off:+5}  -> {dest:04}", op.mnemonic()),
                offset + 3,
            )
        }
        Loop => {
            let off = read_u16(chunk, offset + 1);
            let dest = offset + 3 - off as usize;
            (
                format!("{head}{:<8} -{off:4}  -> {dest:04}", op.mnemonic()),
                offset + 3,
            )
        }

        // longueur variable : const fn + paires (is_local, index)
        Closure => {
            let ix = chunk.code[offset + 1];
            let mut text = format!(
                "{head}{:<8} {ix:3}  {}",
                op.mnemonic(),
                constant_preview(heap, chunk, ix)
            );
            let upvalue_count = match chunk.constants.get(ix as usize) {
                Some(Value::Obj(r)) => heap.function(*r).upvalue_count,
                _ => 0,
            };
            let mut next = offset + 2;
            for _ in 0..upvalue_count {
                let is_local = chunk.code[next];
                let index = chunk.code[next + 1];
                let kind = if is_local == 1 { "local" } else { "upvalue" };
                let _ = write!(text, "\n{next:04}      |           {kind} {index}");
                next += 2;
            }
            (text, next)
        }

        // opcodes sans opérande
        Nil | True | False | Pop | Equal | Greater | Less | Add | Subtract | Multiply | Divide
        | Not | Negate | Print | CloseUpvalue | Return | Inherit => {
            (format!("{head}{}", op.mnemonic()), offset + 1)
        }
    }
}

fn read_u16(chunk: &Chunk, offset: usize) -> u16 {
    (u16::from(chunk.code[offset]) << 8) | u16::from(chunk.code[offset + 1])
}

fn constant_preview(heap: &Heap, chunk: &Chunk, ix: u8) -> String {
    match chunk.constants.get(ix as usize) {
        Some(&v) => match v {
            Value::Obj(r) if matches!(heap.obj(r), Obj::Str(_)) => {
                format!("; \"{}\"", heap.string(r).chars)
            }
            other => format!("; {}", print_value(heap, other)),
        },
        None => "; <invalid>".to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn renders_constants_and_jumps() {
        let mut heap = Heap::new();
        let mut chunk = Chunk::new();
        let s = heap.intern("salut");
        let k = chunk.add_constant(Value::Obj(s)).unwrap();
        chunk.write_op(Op::Constant, 1);
        chunk.write(k, 1);
        chunk.write_op(Op::JumpIfFalse, 2);
        chunk.write(0x00, 2);
        chunk.write(0x01, 2);
        chunk.write_op(Op::Print, 2);
        chunk.write_op(Op::Return, 3);

        let text = disassemble_chunk(&heap, &chunk, "test");
        assert!(text.contains("== test =="));
        assert!(text.contains("const"));
        assert!(text.contains("\"salut\""));
        // saut avant : 2 + 3 + 1 = destination 0006, le ret
        assert!(text.contains("-> 0006"));
        assert!(text.contains("ret"));
    }

    #[test]
    fn unknown_bytes_do_not_stop_the_walk() {
        let heap = Heap::new();
        let mut chunk = Chunk::new();
        chunk.write(0xFE, 1);
        chunk.write_op(Op::Return, 1);
        let text = disassemble_chunk(&heap, &chunk, "raw");
        assert!(text.contains("db 0xfe"));
        assert!(text.contains("ret"));
    }
}
