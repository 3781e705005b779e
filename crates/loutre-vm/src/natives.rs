//! natives.rs — Fonctions natives installées dans les globales au démarrage.

use std::time::Instant;

use once_cell::sync::Lazy;

use loutre_core::Value;

/// Époque du process : figée au premier accès (la construction de la VM
/// force l'initialisation pour ancrer l'origine au démarrage).
static START: Lazy<Instant> = Lazy::new(Instant::now);

pub(crate) fn anchor_clock() {
    Lazy::force(&START);
}

/// `clock()` — secondes écoulées depuis le démarrage, en nombre.
pub fn clock(_args: &[Value]) -> Value {
    Value::Number(START.elapsed().as_secs_f64())
}
