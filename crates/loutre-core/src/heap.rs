//! heap.rs — Arène d'objets + internement + collecteur mark-sweep.
//!
//! Tous les objets tas vivent dans une arène unique ; une référence
//! (`ObjRef`) est un indice stable dans cette arène. Le vecteur de slots
//! joue le rôle de la liste "tous les objets" : il énumère chaque objet
//! vivant exactement une fois, et le graphe peut être cyclique sans que la
//! possession Rust s'y oppose.
//!
//! Le collecteur est un mark-sweep tricolore précis, non déplaçant :
//! - blanc  : non marqué (candidat à la libération) ;
//! - gris   : marqué, en attente dans la worklist `gray` ;
//! - noir   : marqué et dépilé (toutes ses références sont marquées).
//!
//! Le tas ne déclenche **jamais** une collecte de lui-même : c'est la VM qui
//! marque ses racines puis appelle `trace` + `sweep` à ses points
//! d'allocation. Le compilateur alloue donc librement sans risquer de voir
//! ses objets en cours d'assemblage balayés.

use crate::object::{Location, Obj, ObjString};
use crate::table::Table;
use crate::value::Value;

/// Facteur de croissance du seuil après chaque collecte.
const GC_HEAP_GROW_FACTOR: usize = 2;

/// Premier seuil de déclenchement (octets alloués).
const GC_FIRST_THRESHOLD: usize = 1024 * 1024;

/// Référence vers un objet de l'arène. Indice stable : un slot n'est
/// réutilisé qu'après libération de son occupant par le collecteur.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ObjRef(u32);

impl ObjRef {
    pub(crate) fn new(ix: u32) -> Self {
        Self(ix)
    }

    #[inline]
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

/// Arène possédant tous les objets tas.
#[derive(Debug, Default)]
pub struct Heap {
    slots: Vec<Option<Obj>>,
    marks: Vec<bool>,
    free: Vec<u32>,
    /// Table d'internement : chaque chaîne est unique par contenu. La
    /// relation est *faible* : elle ne compte pas comme racine.
    strings: Table,
    bytes_allocated: usize,
    next_gc: usize,
    /// Worklist grise, réutilisée d'une collecte à l'autre.
    gray: Vec<ObjRef>,
}

/// FNV-1a 32 bits, le hachage des chaînes du langage.
pub fn hash_str(s: &str) -> u32 {
    let mut h: u32 = 2_166_136_261;
    for &b in s.as_bytes() {
        h ^= u32::from(b);
        h = h.wrapping_mul(16_777_619);
    }
    h
}

impl Heap {
    pub fn new() -> Self {
        Self {
            next_gc: GC_FIRST_THRESHOLD,
            ..Self::default()
        }
    }

    // ---------- Allocation ----------

    /// Installe un objet dans l'arène et renvoie sa référence.
    pub fn alloc(&mut self, obj: Obj) -> ObjRef {
        self.bytes_allocated += obj.deep_size();
        if let Some(ix) = self.free.pop() {
            self.slots[ix as usize] = Some(obj);
            self.marks[ix as usize] = false;
            ObjRef(ix)
        } else {
            self.slots.push(Some(obj));
            self.marks.push(false);
            ObjRef((self.slots.len() - 1) as u32)
        }
    }

    /// Interne une chaîne par copie : renvoie la chaîne existante si le
    /// contenu est déjà présent.
    pub fn intern(&mut self, s: &str) -> ObjRef {
        let hash = hash_str(s);
        if let Some(existing) = self.find_string(s, hash) {
            return existing;
        }
        let r = self.alloc(Obj::Str(ObjString { chars: s.to_string(), hash }));
        self.strings.set(r, hash, Value::Nil);
        r
    }

    /// Interne une chaîne en prenant possession du tampon (concaténation) ;
    /// le tampon est simplement abandonné si le contenu existe déjà.
    pub fn intern_owned(&mut self, s: String) -> ObjRef {
        let hash = hash_str(&s);
        if let Some(existing) = self.find_string(&s, hash) {
            return existing;
        }
        let r = self.alloc(Obj::Str(ObjString { chars: s, hash }));
        self.strings.set(r, hash, Value::Nil);
        r
    }

    fn find_string(&self, s: &str, hash: u32) -> Option<ObjRef> {
        self.strings.find_key(hash, |r| self.string(r).chars == s)
    }

    // ---------- Accès ----------

    pub fn obj(&self, r: ObjRef) -> &Obj {
        match &self.slots[r.index()] {
            Some(obj) => obj,
            None => panic!("heap: dangling reference #{}", r.index()),
        }
    }

    pub fn obj_mut(&mut self, r: ObjRef) -> &mut Obj {
        match &mut self.slots[r.index()] {
            Some(obj) => obj,
            None => panic!("heap: dangling reference #{}", r.index()),
        }
    }

    pub fn string(&self, r: ObjRef) -> &ObjString {
        match self.obj(r) {
            Obj::Str(s) => s,
            other => panic!("heap: expected string, found {other:?}"),
        }
    }

    pub fn function(&self, r: ObjRef) -> &crate::object::ObjFunction {
        match self.obj(r) {
            Obj::Function(f) => f,
            other => panic!("heap: expected function, found {other:?}"),
        }
    }

    pub fn closure(&self, r: ObjRef) -> &crate::object::ObjClosure {
        match self.obj(r) {
            Obj::Closure(c) => c,
            other => panic!("heap: expected closure, found {other:?}"),
        }
    }

    pub fn upvalue(&self, r: ObjRef) -> &crate::object::ObjUpvalue {
        match self.obj(r) {
            Obj::Upvalue(u) => u,
            other => panic!("heap: expected upvalue, found {other:?}"),
        }
    }

    pub fn upvalue_mut(&mut self, r: ObjRef) -> &mut crate::object::ObjUpvalue {
        match self.obj_mut(r) {
            Obj::Upvalue(u) => u,
            other => panic!("heap: expected upvalue, found {other:?}"),
        }
    }

    pub fn class(&self, r: ObjRef) -> &crate::object::ObjClass {
        match self.obj(r) {
            Obj::Class(k) => k,
            other => panic!("heap: expected class, found {other:?}"),
        }
    }

    pub fn class_mut(&mut self, r: ObjRef) -> &mut crate::object::ObjClass {
        match self.obj_mut(r) {
            Obj::Class(k) => k,
            other => panic!("heap: expected class, found {other:?}"),
        }
    }

    pub fn instance(&self, r: ObjRef) -> &crate::object::ObjInstance {
        match self.obj(r) {
            Obj::Instance(i) => i,
            other => panic!("heap: expected instance, found {other:?}"),
        }
    }

    pub fn instance_mut(&mut self, r: ObjRef) -> &mut crate::object::ObjInstance {
        match self.obj_mut(r) {
            Obj::Instance(i) => i,
            other => panic!("heap: expected instance, found {other:?}"),
        }
    }

    /// Hash mis en cache de la chaîne internée `r`.
    #[inline]
    pub fn str_hash(&self, r: ObjRef) -> u32 {
        self.string(r).hash
    }

    // ---------- Comptabilité ----------

    pub fn bytes_allocated(&self) -> usize {
        self.bytes_allocated
    }

    /// Vrai quand les allocations ont dépassé le seuil de collecte.
    pub fn should_collect(&self) -> bool {
        self.bytes_allocated > self.next_gc
    }

    /// Nombre d'objets vivants (tests, diagnostics).
    pub fn live_count(&self) -> usize {
        self.slots.iter().filter(|s| s.is_some()).count()
    }

    /// Vrai si le slot de `r` est occupé et marqué (tests d'invariants).
    pub fn is_marked(&self, r: ObjRef) -> bool {
        self.slots[r.index()].is_some() && self.marks[r.index()]
    }

    // ---------- Phase de marquage ----------

    pub fn mark_value(&mut self, v: Value) {
        if let Value::Obj(r) = v {
            self.mark_object(r);
        }
    }

    pub fn mark_object(&mut self, r: ObjRef) {
        mark_ref(&mut self.marks, &mut self.gray, r);
    }

    /// Marque clés et valeurs d'une table externe au tas (les globales).
    pub fn mark_table(&mut self, table: &Table) {
        for (k, v) in table.iter() {
            self.mark_object(k);
            self.mark_value(v);
        }
    }

    /// Vide la worklist grise en noircissant chaque objet : toutes les
    /// références qu'il détient passent au gris.
    pub fn trace(&mut self) {
        while let Some(r) = self.gray.pop() {
            self.blacken(r);
        }
    }

    fn blacken(&mut self, r: ObjRef) {
        // destructuration : emprunts disjoints sur slots / marks / gray
        let Heap { slots, marks, gray, .. } = self;
        let Some(obj) = slots[r.index()].as_ref() else {
            return;
        };
        match obj {
            Obj::Str(_) | Obj::Native(_) => {}
            Obj::Function(f) => {
                if let Some(name) = f.name {
                    mark_ref(marks, gray, name);
                }
                for &c in &f.chunk.constants {
                    mark_val(marks, gray, c);
                }
            }
            Obj::Closure(c) => {
                mark_ref(marks, gray, c.function);
                for &u in &c.upvalues {
                    mark_ref(marks, gray, u);
                }
            }
            Obj::Upvalue(u) => {
                // seul un upvalue fermé possède une valeur
                if let Location::Closed(v) = u.location {
                    mark_val(marks, gray, v);
                }
            }
            Obj::Class(k) => {
                mark_ref(marks, gray, k.name);
                mark_table_entries(marks, gray, &k.methods);
            }
            Obj::Instance(i) => {
                mark_ref(marks, gray, i.class);
                mark_table_entries(marks, gray, &i.fields);
            }
            Obj::Bound(b) => {
                mark_val(marks, gray, b.receiver);
                mark_ref(marks, gray, b.method);
            }
        }
    }

    // ---------- Phase de balayage ----------

    /// Balaye les objets non marqués et remet les bits à zéro. À appeler
    /// après `trace`. Renvoie le nombre d'octets libérés.
    pub fn sweep(&mut self) -> usize {
        // La table des chaînes est faible : on retire d'abord les entrées
        // dont la clé n'a pas été marquée, sinon le sweep laisserait des
        // clés pendantes dans la table.
        let marks = &self.marks;
        self.strings.retain(|k, _| marks[k.index()]);

        let before = self.bytes_allocated;
        let mut freed = 0usize;
        for ix in 0..self.slots.len() {
            if !self.marks[ix] {
                if let Some(obj) = self.slots[ix].take() {
                    freed += obj.deep_size();
                    self.free.push(ix as u32);
                }
            }
            self.marks[ix] = false;
        }

        self.bytes_allocated = self.bytes_allocated.saturating_sub(freed);
        self.next_gc = (self.bytes_allocated * GC_HEAP_GROW_FACTOR).max(GC_FIRST_THRESHOLD);
        log::debug!(
            "gc: swept {freed} bytes ({before} -> {}), next collection at {}",
            self.bytes_allocated,
            self.next_gc
        );
        freed
    }
}

fn mark_ref(marks: &mut [bool], gray: &mut Vec<ObjRef>, r: ObjRef) {
    let ix = r.index();
    if !marks[ix] {
        marks[ix] = true;
        gray.push(r);
    }
}

fn mark_val(marks: &mut [bool], gray: &mut Vec<ObjRef>, v: Value) {
    if let Value::Obj(r) = v {
        mark_ref(marks, gray, r);
    }
}

fn mark_table_entries(marks: &mut [bool], gray: &mut Vec<ObjRef>, t: &Table) {
    for (k, v) in t.iter() {
        mark_ref(marks, gray, k);
        mark_val(marks, gray, v);
    }
}
