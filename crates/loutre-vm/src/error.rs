//! error.rs — Erreurs d'exécution de la VM.
//!
//! Deux familles : le résultat terminal d'`interpret` (compilation ou
//! exécution) et l'erreur runtime détaillée. Les messages runtime sont le
//! contrat de compatibilité du langage : ils sont reproduits au caractère
//! près.

use thiserror::Error;

use loutre_core::Op;

/// Résultat terminal d'`interpret` : la source a été rejetée à la
/// compilation, ou l'exécution a levé une erreur runtime.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum InterpretError {
    #[error("compile error")]
    Compile,
    #[error("runtime error")]
    Runtime,
}

/// Erreur levée pendant le dispatch. Le message est émis tel quel, suivi de
/// la trace de pile, puis la VM remet pile et frames à zéro.
#[derive(Debug, Error)]
pub enum RuntimeError {
    /// Octet qui n'est pas un opcode (bytecode corrompu).
    #[error(transparent)]
    InvalidOpcode(#[from] num_enum::TryFromPrimitiveError<Op>),

    /// Dépilage d'une pile vide (invariant interne, bytecode bien formé
    /// ne le déclenche pas).
    #[error("stack underflow")]
    StackUnderflow,

    #[error("Operands must be numbers.")]
    OperandsMustBeNumbers,

    #[error("Operand must be a number.")]
    OperandMustBeNumber,

    #[error("Operands must be two numbers or two strings.")]
    OperandsMustBeNumbersOrStrings,

    #[error("Undefined variable '{0}'.")]
    UndefinedVariable(String),

    #[error("Undefined property '{0}'.")]
    UndefinedProperty(String),

    #[error("Only instances have properties.")]
    OnlyInstancesHaveProperties,

    #[error("Only instances have fields.")]
    OnlyInstancesHaveFields,

    #[error("Expected {expected} arguments but got {got}.")]
    ArityMismatch { expected: u8, got: u8 },

    #[error("Can only call functions and classes.")]
    NotCallable,

    #[error("Stack overflow.")]
    StackOverflow,

    #[error("Superclass must be a class.")]
    SuperclassMustBeClass,
}
