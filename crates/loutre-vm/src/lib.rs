//! loutre-vm — Machine virtuelle d'exécution pour le langage Loutre.
//!
//! Ce crate fournit :
//!
//! - le type [`Vm`] avec configuration par [`VmOptions`],
//! - le point d'entrée [`Vm::interpret`] (compile + exécute),
//! - un système d'erreurs typé ([`InterpretError`], [`RuntimeError`]),
//! - l'abstraction d'hôte [`Host`] pour capturer les sorties,
//! - les fonctions natives de base (`clock`).
//!
//! ### Exemple
//!
//! ```
//! use loutre_vm::{Vm, VmOptions};
//!
//! let mut vm = Vm::with_options(VmOptions::default());
//! vm.interpret("print (1 + 2) * 3 - -4;").expect("exécution propre");
//! ```

mod error;
mod host;
mod natives;
mod vm;

pub use error::{InterpretError, RuntimeError};
pub use host::{CaptureHost, DefaultHost, Host};
pub use natives::clock;
pub use vm::{Vm, VmOptions, FRAMES_MAX, STACK_MAX};
