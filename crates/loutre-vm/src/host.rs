//! host.rs — Primitives d'E/S fournies par l'hôte.
//!
//! La VM n'écrit jamais directement sur stdout/stderr : tout passe par un
//! `Host`, ce qui rend la sortie des programmes capturable dans les tests.

use std::cell::RefCell;
use std::rc::Rc;

/// Environnement hôte : sortie programme et sortie d'erreurs.
/// Chaque appel reçoit une ligne complète, sans retour final.
pub trait Host {
    /// Sortie de `print`.
    fn print(&mut self, text: &str);
    /// Messages d'erreur et trace de pile.
    fn eprint(&mut self, text: &str);
}

/// Hôte par défaut : stdout/stderr du process.
#[derive(Debug, Default)]
pub struct DefaultHost;

impl Host for DefaultHost {
    fn print(&mut self, text: &str) {
        println!("{text}");
    }

    fn eprint(&mut self, text: &str) {
        eprintln!("{text}");
    }
}

/// Hôte de capture : les sorties s'accumulent dans des tampons partagés,
/// que l'appelant garde via `clone()` pour les inspecter après coup.
#[derive(Debug, Default, Clone)]
pub struct CaptureHost {
    pub out: Rc<RefCell<String>>,
    pub err: Rc<RefCell<String>>,
}

impl Host for CaptureHost {
    fn print(&mut self, text: &str) {
        let mut out = self.out.borrow_mut();
        out.push_str(text);
        out.push('\n');
    }

    fn eprint(&mut self, text: &str) {
        let mut err = self.err.borrow_mut();
        err.push_str(text);
        err.push('\n');
    }
}
