//! main.rs — Pilote en ligne de commande du langage Loutre.
//!
//! Deux modes, comme tout bon petit langage :
//! - `loutre script.ltr` exécute un fichier ;
//! - `loutre` sans argument ouvre une REPL (les globales persistent de
//!   ligne en ligne).
//!
//! Codes de sortie : 65 erreur de compilation, 70 erreur runtime,
//! 74 erreur d'E/S.

use std::io::{self, BufRead, Write};
use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::Context as _;
use clap::Parser;

use loutre_vm::{InterpretError, Vm, VmOptions};

const EX_DATAERR: u8 = 65;
const EX_SOFTWARE: u8 = 70;
const EX_IOERR: u8 = 74;

#[derive(Parser)]
#[command(name = "loutre", version, about = "La machine virtuelle Loutre", long_about = None)]
struct Cli {
    /// Script à exécuter ; REPL si absent.
    script: Option<PathBuf>,

    /// Tracer chaque instruction (pile + désassemblage) sur stderr.
    #[arg(long)]
    trace: bool,

    /// Collecter à chaque allocation (débogage du GC).
    #[arg(long)]
    stress_gc: bool,

    /// Afficher le bytecode compilé avant de l'exécuter.
    #[arg(long)]
    disasm: bool,
}

fn main() -> ExitCode {
    env_logger::init();
    let cli = Cli::parse();

    let options = VmOptions::default()
        .with_trace(cli.trace)
        .with_stress_gc(cli.stress_gc);

    match &cli.script {
        Some(path) => run_file(options, path, cli.disasm),
        None => repl(options),
    }
}

fn run_file(options: VmOptions, path: &PathBuf, disasm: bool) -> ExitCode {
    let source = match std::fs::read_to_string(path)
        .with_context(|| format!("lecture de {}", path.display()))
    {
        Ok(source) => source,
        Err(err) => {
            eprintln!("{err:#}");
            return ExitCode::from(EX_IOERR);
        }
    };

    log::debug!("exécution de {} ({} octets)", path.display(), source.len());
    let mut vm = Vm::with_options(options);

    if disasm {
        match vm.disassemble(&source) {
            Ok(text) => print!("{text}"),
            Err(_) => return ExitCode::from(EX_DATAERR),
        }
    }

    match vm.interpret(&source) {
        Ok(()) => ExitCode::SUCCESS,
        Err(InterpretError::Compile) => ExitCode::from(EX_DATAERR),
        Err(InterpretError::Runtime) => ExitCode::from(EX_SOFTWARE),
    }
}

fn repl(options: VmOptions) -> ExitCode {
    let mut vm = Vm::with_options(options);
    let stdin = io::stdin();
    let mut lines = stdin.lock().lines();

    loop {
        print!("> ");
        if io::stdout().flush().is_err() {
            return ExitCode::from(EX_IOERR);
        }
        let Some(line) = lines.next() else {
            // EOF : on sort proprement
            println!();
            return ExitCode::SUCCESS;
        };
        let line = match line {
            Ok(line) => line,
            Err(err) => {
                eprintln!("stdin: {err}");
                return ExitCode::from(EX_IOERR);
            }
        };
        // les erreurs sont déjà rapportées par la VM ; la session continue
        let _ = vm.interpret(&line);
    }
}
