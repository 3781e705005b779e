//! table.rs — Table de hachage à adressage ouvert.
//!
//! Map de chaîne internée → `Value`, utilisée pour les globales, les champs
//! d'instance, les méthodes de classe et la table d'internement elle-même.
//!
//! - capacité puissance de deux, sondage linéaire ;
//! - pierres tombales à la suppression (le sondage continue au travers) ;
//! - facteur de charge plafonné à 0,75 (tombstones comprises) ;
//! - le hash FNV-1a de la clé est mis en cache dans l'entrée : les
//!   opérations n'ont pas besoin de retourner voir le tas.
//!
//! Les clés étant internées, l'égalité de clé est l'égalité d'`ObjRef`.

use crate::heap::ObjRef;
use crate::value::Value;

/// Entrée pleine.
#[derive(Debug, Clone, Copy)]
struct Entry {
    key: ObjRef,
    hash: u32,
    value: Value,
}

#[derive(Debug, Clone, Copy, Default)]
enum Slot {
    /// Jamais occupé : le sondage s'arrête ici.
    #[default]
    Empty,
    /// Ancienne entrée supprimée : le sondage continue.
    Tombstone,
    Full(Entry),
}

/// Table à adressage ouvert.
#[derive(Debug, Clone, Default)]
pub struct Table {
    /// Entrées pleines + tombstones (pour le facteur de charge).
    count: usize,
    slots: Vec<Slot>,
}

impl Table {
    pub fn new() -> Self {
        Self::default()
    }

    /// Nombre d'entrées pleines.
    pub fn len(&self) -> usize {
        self.iter().count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Octets occupés par le stockage (comptabilité GC).
    pub fn byte_size(&self) -> usize {
        self.slots.capacity() * std::mem::size_of::<Slot>()
    }

    /// Lecture. `None` si la clé est absente.
    pub fn get(&self, key: ObjRef, hash: u32) -> Option<Value> {
        if self.slots.is_empty() {
            return None;
        }
        match self.slots[self.find_slot(key, hash)] {
            Slot::Full(e) => Some(e.value),
            _ => None,
        }
    }

    /// Écriture. Renvoie `true` si la clé est nouvelle.
    pub fn set(&mut self, key: ObjRef, hash: u32, value: Value) -> bool {
        if 4 * (self.count + 1) > 3 * self.slots.len() {
            self.grow();
        }
        let ix = self.find_slot(key, hash);
        let entry = Entry { key, hash, value };
        match self.slots[ix] {
            Slot::Full(_) => {
                self.slots[ix] = Slot::Full(entry);
                false
            }
            Slot::Tombstone => {
                // réutilise la tombale : déjà comptée dans `count`
                self.slots[ix] = Slot::Full(entry);
                true
            }
            Slot::Empty => {
                self.slots[ix] = Slot::Full(entry);
                self.count += 1;
                true
            }
        }
    }

    /// Suppression par tombale. Renvoie `true` si la clé existait.
    pub fn delete(&mut self, key: ObjRef, hash: u32) -> bool {
        if self.slots.is_empty() {
            return false;
        }
        let ix = self.find_slot(key, hash);
        match self.slots[ix] {
            Slot::Full(_) => {
                self.slots[ix] = Slot::Tombstone;
                true
            }
            _ => false,
        }
    }

    /// Copie toutes les entrées de `from` dans `self` (héritage de méthodes).
    pub fn add_all(&mut self, from: &Table) {
        for slot in &from.slots {
            if let Slot::Full(e) = slot {
                self.set(e.key, e.hash, e.value);
            }
        }
    }

    /// Itère les paires (clé, valeur) pleines.
    pub fn iter(&self) -> impl Iterator<Item = (ObjRef, Value)> + '_ {
        self.slots.iter().filter_map(|slot| match slot {
            Slot::Full(e) => Some((e.key, e.value)),
            _ => None,
        })
    }

    /// Ne garde que les entrées pour lesquelles `keep` est vrai ; les autres
    /// deviennent des tombales. Sert au balayage faible de la table des
    /// chaînes avant le sweep général.
    pub fn retain<F: FnMut(ObjRef, Value) -> bool>(&mut self, mut keep: F) {
        for slot in &mut self.slots {
            if let Slot::Full(e) = slot {
                if !keep(e.key, e.value) {
                    *slot = Slot::Tombstone;
                }
            }
        }
    }

    /// Sondage par contenu, pour l'internement : cherche une clé de même
    /// hash pour laquelle `eq` répond vrai (comparaison du contenu, faite
    /// par l'appelant qui a accès au tas).
    pub fn find_key<F: Fn(ObjRef) -> bool>(&self, hash: u32, eq: F) -> Option<ObjRef> {
        if self.slots.is_empty() {
            return None;
        }
        let mask = self.slots.len() - 1;
        let mut ix = (hash as usize) & mask;
        loop {
            match self.slots[ix] {
                Slot::Empty => return None,
                Slot::Tombstone => {}
                Slot::Full(e) => {
                    if e.hash == hash && eq(e.key) {
                        return Some(e.key);
                    }
                }
            }
            ix = (ix + 1) & mask;
        }
    }

    /// Index du slot de `key` : l'entrée pleine correspondante, ou le
    /// premier slot réutilisable (tombale rencontrée en chemin, sinon le
    /// slot vide qui termine le sondage).
    fn find_slot(&self, key: ObjRef, hash: u32) -> usize {
        let mask = self.slots.len() - 1;
        let mut ix = (hash as usize) & mask;
        let mut tombstone: Option<usize> = None;
        loop {
            match self.slots[ix] {
                Slot::Empty => return tombstone.unwrap_or(ix),
                Slot::Tombstone => {
                    if tombstone.is_none() {
                        tombstone = Some(ix);
                    }
                }
                Slot::Full(e) => {
                    if e.key == key {
                        return ix;
                    }
                }
            }
            ix = (ix + 1) & mask;
        }
    }

    /// Double la capacité (min 8) et réinsère les entrées pleines ; les
    /// tombales sont abandonnées au passage.
    fn grow(&mut self) {
        let new_cap = (self.slots.len() * 2).max(8);
        let old = std::mem::replace(&mut self.slots, vec![Slot::Empty; new_cap]);
        self.count = 0;
        for slot in old {
            if let Slot::Full(e) = slot {
                let ix = self.find_slot(e.key, e.hash);
                self.slots[ix] = Slot::Full(e);
                self.count += 1;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // Clés de test : des ObjRef fabriquées, le hash est fourni à la main
    // (la table ne retourne jamais voir le tas).
    fn key(i: u32) -> (ObjRef, u32) {
        (ObjRef::new(i), i.wrapping_mul(2654435761))
    }

    #[test]
    fn set_get_update() {
        let mut t = Table::new();
        let (k, h) = key(1);
        assert!(t.set(k, h, Value::Number(1.0)));
        assert_eq!(t.get(k, h), Some(Value::Number(1.0)));
        // mise à jour : pas une nouvelle clé
        assert!(!t.set(k, h, Value::Number(2.0)));
        assert_eq!(t.get(k, h), Some(Value::Number(2.0)));
        assert_eq!(t.len(), 1);
    }

    #[test]
    fn get_on_empty_table() {
        let t = Table::new();
        let (k, h) = key(7);
        assert_eq!(t.get(k, h), None);
    }

    #[test]
    fn delete_leaves_probing_intact() {
        let mut t = Table::new();
        // trois clés au même hash : collision garantie, sondage linéaire
        let a = ObjRef::new(1);
        let b = ObjRef::new(2);
        let c = ObjRef::new(3);
        let h = 0x42;
        t.set(a, h, Value::Number(1.0));
        t.set(b, h, Value::Number(2.0));
        t.set(c, h, Value::Number(3.0));
        // supprimer l'entrée du milieu ne doit pas couper la chaîne
        assert!(t.delete(b, h));
        assert!(!t.delete(b, h));
        assert_eq!(t.get(c, h), Some(Value::Number(3.0)));
        assert_eq!(t.get(a, h), Some(Value::Number(1.0)));
        assert_eq!(t.get(b, h), None);
        // la tombale est réutilisable
        assert!(t.set(b, h, Value::Nil));
        assert_eq!(t.get(b, h), Some(Value::Nil));
    }

    #[test]
    fn grows_past_load_factor() {
        let mut t = Table::new();
        for i in 0..64 {
            let (k, h) = key(i);
            t.set(k, h, Value::Number(f64::from(i)));
        }
        assert_eq!(t.len(), 64);
        for i in 0..64 {
            let (k, h) = key(i);
            assert_eq!(t.get(k, h), Some(Value::Number(f64::from(i))));
        }
    }

    #[test]
    fn add_all_copies_everything() {
        let mut src = Table::new();
        for i in 0..10 {
            let (k, h) = key(i);
            src.set(k, h, Value::Number(f64::from(i)));
        }
        let mut dst = Table::new();
        let (k0, h0) = key(0);
        dst.set(k0, h0, Value::Nil); // sera écrasée
        dst.add_all(&src);
        assert_eq!(dst.len(), 10);
        assert_eq!(dst.get(k0, h0), Some(Value::Number(0.0)));
    }

    #[test]
    fn retain_tombstones_the_rest() {
        let mut t = Table::new();
        for i in 0..8 {
            let (k, h) = key(i);
            t.set(k, h, Value::Number(f64::from(i)));
        }
        t.retain(|k, _| k.index() % 2 == 0);
        assert_eq!(t.len(), 4);
        let (k1, h1) = key(1);
        assert_eq!(t.get(k1, h1), None);
        let (k2, h2) = key(2);
        assert_eq!(t.get(k2, h2), Some(Value::Number(2.0)));
    }
}
