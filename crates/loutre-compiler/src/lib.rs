//! loutre-compiler — Du source Loutre au bytecode.
//!
//! Collaborateur externe du cœur : la VM ne voit que le `Chunk` produit.
//!
//! ## Modules
//! - `scanner`  : analyse lexicale, tokens empruntés à la source.
//! - `compiler` : parseur Pratt une-passe + émission de bytecode.

pub mod scanner;

mod compiler;

pub use compiler::{compile, CompileError};
