//! tests/properties.rs — invariants du modèle de valeurs et du tas.
//!
//! Propriétés vérifiées par génération aléatoire (proptest) plutôt que par
//! cas choisis : internement, égalité IEEE, table de hachage.

use proptest::prelude::*;

use loutre_core::{Heap, Table, Value};

proptest! {
    // deux chaînes de même contenu donnent la même référence
    #[test]
    fn interning_is_content_unique(s in ".{0,32}") {
        let mut heap = Heap::new();
        let a = heap.intern(&s);
        let b = heap.intern_owned(s.clone());
        prop_assert_eq!(a, b);
        prop_assert_eq!(Value::Obj(a), Value::Obj(b));
    }

    // des contenus différents donnent des références différentes
    #[test]
    fn distinct_contents_stay_distinct(s in "[a-z]{1,16}", t in "[A-Z]{1,16}") {
        let mut heap = Heap::new();
        let a = heap.intern(&s);
        let b = heap.intern(&t);
        prop_assert_ne!(a, b);
    }

    // x == x pour tout nombre fini ; NaN n'est jamais égal à lui-même
    #[test]
    fn number_equality_is_ieee(n in prop::num::f64::NORMAL | prop::num::f64::ZERO) {
        prop_assert_eq!(Value::Number(n), Value::Number(n));
    }

    // seuls nil et false sont falsey
    #[test]
    fn truthiness_table(n in any::<f64>(), b in any::<bool>()) {
        prop_assert!(!Value::Number(n).is_falsey());
        prop_assert_eq!(Value::Bool(b).is_falsey(), !b);
        prop_assert!(Value::Nil.is_falsey());
    }

    // set puis get redonne la dernière valeur écrite, clé par clé
    #[test]
    fn table_set_then_get(entries in prop::collection::vec(("[a-z]{1,8}", any::<i32>()), 1..32)) {
        let mut heap = Heap::new();
        let mut table = Table::new();
        let mut expected: std::collections::HashMap<String, f64> = std::collections::HashMap::new();
        for (name, value) in &entries {
            let key = heap.intern(name);
            let hash = heap.str_hash(key);
            table.set(key, hash, Value::Number(f64::from(*value)));
            expected.insert(name.clone(), f64::from(*value));
        }
        for (name, value) in expected {
            let key = heap.intern(&name);
            let hash = heap.str_hash(key);
            prop_assert_eq!(table.get(key, hash), Some(Value::Number(value)));
        }
    }
}

#[test]
fn nan_is_not_equal_to_itself() {
    assert_ne!(Value::Number(f64::NAN), Value::Number(f64::NAN));
}
