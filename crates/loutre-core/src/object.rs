//! object.rs — Variantes d'objets tas du langage Loutre.
//!
//! Chaque objet vit dans l'arène (`heap`) et porte côté arène son bit de
//! marquage GC ; ici on ne décrit que les charges utiles. Les références
//! entre objets sont des `ObjRef` (indices stables), jamais des pointeurs :
//! le graphe peut être cyclique (instances → classes → méthodes → …) et le
//! collecteur mark-sweep s'en charge.

use crate::chunk::Chunk;
use crate::heap::ObjRef;
use crate::table::Table;
use crate::value::Value;

/// Fonction native (host) : reçoit les arguments, renvoie une `Value`.
/// Une native ne doit pas allouer d'objets sans les enraciner via la pile.
pub type NativeFn = fn(&[Value]) -> Value;

/// Chaîne internée : contenu + hash FNV-1a précalculé.
#[derive(Debug)]
pub struct ObjString {
    pub chars: String,
    pub hash: u32,
}

/// Fonction compilée. Jamais mutée après compilation.
#[derive(Debug)]
pub struct ObjFunction {
    /// Nombre de paramètres déclarés (0–255).
    pub arity: u8,
    /// Nombre d'upvalues capturées par les fermetures sur cette fonction.
    pub upvalue_count: usize,
    /// Nom (`None` pour le script top-level).
    pub name: Option<ObjRef>,
    /// Bytecode de la fonction.
    pub chunk: Chunk,
}

/// Fonction native enregistrée dans les globales.
#[derive(Debug)]
pub struct ObjNative {
    pub function: NativeFn,
}

/// Fermeture : fonction + tableau de références d'upvalues (partagées).
#[derive(Debug)]
pub struct ObjClosure {
    pub function: ObjRef,
    pub upvalues: Vec<ObjRef>,
}

/// Où vit la variable capturée par un upvalue.
#[derive(Debug, Clone, Copy)]
pub enum Location {
    /// Ouvert : alias d'un slot vivant de la pile de valeurs.
    Open(usize),
    /// Fermé : l'upvalue possède sa propre copie.
    Closed(Value),
}

/// Upvalue : l'indirection qui permet à une fermeture de survivre à la
/// frame dont elle capture une locale.
#[derive(Debug)]
pub struct ObjUpvalue {
    pub location: Location,
}

/// Classe : nom + table de méthodes (installées à la définition et par
/// héritage).
#[derive(Debug)]
pub struct ObjClass {
    pub name: ObjRef,
    pub methods: Table,
}

/// Instance : classe + champs librement mutés à l'exécution.
#[derive(Debug)]
pub struct ObjInstance {
    pub class: ObjRef,
    pub fields: Table,
}

/// Méthode liée : receveur + fermeture, créée à l'accès propriété.
#[derive(Debug)]
pub struct ObjBoundMethod {
    pub receiver: Value,
    pub method: ObjRef,
}

/// Un objet tas.
#[derive(Debug)]
pub enum Obj {
    Str(ObjString),
    Function(ObjFunction),
    Native(ObjNative),
    Closure(ObjClosure),
    Upvalue(ObjUpvalue),
    Class(ObjClass),
    Instance(ObjInstance),
    Bound(ObjBoundMethod),
}

impl Obj {
    /// Estimation des octets occupés, contenu compris. Sert à la
    /// comptabilité `bytes_allocated`/`next_gc` du collecteur.
    pub fn deep_size(&self) -> usize {
        let base = std::mem::size_of::<Obj>();
        base + match self {
            Obj::Str(s)      => s.chars.capacity(),
            Obj::Function(f) => {
                f.chunk.code.capacity()
                    + f.chunk.lines.capacity() * std::mem::size_of::<u32>()
                    + f.chunk.constants.capacity() * std::mem::size_of::<Value>()
            }
            Obj::Closure(c)  => c.upvalues.capacity() * std::mem::size_of::<ObjRef>(),
            Obj::Class(k)    => k.methods.byte_size(),
            Obj::Instance(i) => i.fields.byte_size(),
            Obj::Native(_) | Obj::Upvalue(_) | Obj::Bound(_) => 0,
        }
    }
}
