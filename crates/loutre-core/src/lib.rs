//! loutre-core — Cœur du langage Loutre
//!
//! Contient tout ce qu'il faut pour manipuler le bytecode Loutre et son
//! modèle d'objets, sans dépendre du compilateur ni de la VM complète.
//!
//! ## Modules
//! - `value`  : valeurs dynamiques (`nil`, booléens, nombres, références objet).
//! - `chunk`  : format `Chunk` (code + lignes + pool de constantes).
//! - `op`     : jeu d'instructions un-octet `Op`.
//! - `object` : variantes d'objets tas (chaînes, fonctions, fermetures, classes…).
//! - `heap`   : arène d'objets, internement des chaînes, mark-sweep.
//! - `table`  : table de hachage à adressage ouvert (globales, champs, méthodes).
//! - `disasm` : désassembleur lisible (humain).

pub mod chunk;
pub mod disasm;
pub mod heap;
pub mod object;
pub mod op;
pub mod table;
pub mod value;

// ---------- Reexports de confort ----------
pub use chunk::Chunk;
pub use heap::{Heap, ObjRef};
pub use object::{
    Location, NativeFn, Obj, ObjBoundMethod, ObjClass, ObjClosure, ObjFunction, ObjInstance,
    ObjNative, ObjString, ObjUpvalue,
};
pub use op::Op;
pub use table::Table;
pub use value::{print_value, Value};

/// Version du crate (lisible, via Cargo).
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
