//! ketrac — the compiler driver: reads one source file, runs it through
//! every phase up to a chosen stopping point, and either prints that
//! stage's intermediate form or runs the compiled module to completion.
//!
//! A `Config`/`Session` split carries the one pipeline this toolchain
//! actually has (no target triple, no linker, no object files —
//! `ketra-gen` emits bytecode for `ketra-rt`, not machine code).

use std::fmt;
use std::path::PathBuf;

use clap::{Parser, ValueEnum};

use ketra_rt::config::RuntimeConfig;
use ketra_rt::object::Slot;
use ketra_rt::vm::Vm;

/// Which stage to stop at and print, instead of running the program.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum EmitStage {
    Tokens,
    Ast,
    Mir,
    Lir,
}

#[derive(Debug, Parser)]
#[command(name = "ketrac", version, about = "Compile and run a Ketra source file")]
pub struct Cli {
    /// Source file to compile.
    pub input: PathBuf,

    /// Stop after a pipeline stage and print its intermediate form instead
    /// of running the program.
    #[arg(long, value_enum)]
    pub emit: Option<EmitStage>,

    /// Entry function to call after linking (must take no parameters).
    #[arg(long, default_value = "main")]
    pub entry: String,

    /// Enable verbose tracing (equivalent to `RUST_LOG=ketra=debug`).
    #[arg(short, long)]
    pub verbose: bool,
}

#[derive(Debug, thiserror::Error)]
pub enum DriverError {
    #[error("failed to read {path}: {source}")]
    Io { path: PathBuf, source: std::io::Error },
    #[error(transparent)]
    Lex(#[from] ketra_lex::LexError),
    #[error(transparent)]
    Parse(#[from] ketra_par::ParseError),
    #[error(transparent)]
    Sem(#[from] ketra_sem::SemError),
    #[error(transparent)]
    Gen(#[from] ketra_gen::GenError),
    #[error(transparent)]
    Lir(#[from] ketra_lir::LirError),
    #[error("entry point {0:?} not found")]
    MissingEntry(String),
    #[error("entry point {0:?} takes {1} parameter(s); the driver only calls niladic entry points")]
    EntryTakesArgs(String, usize),
    #[error(transparent)]
    Runtime(#[from] ketra_rt::RtError),
}

pub type DriverResult<T> = Result<T, DriverError>;

/// A value returned from running a program, formatted for terminal output.
pub struct DisplaySlot(pub Slot);

impl fmt::Display for DisplaySlot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.0 {
            Slot::Prim(bits) => write!(f, "{bits}"),
            Slot::Obj(None) => write!(f, "null"),
            Slot::Obj(Some(_)) => write!(f, "<object>"),
        }
    }
}

pub fn run(cli: Cli) -> DriverResult<()> {
    let source = std::fs::read_to_string(&cli.input)
        .map_err(|source| DriverError::Io { path: cli.input.clone(), source })?;

    if cli.emit == Some(EmitStage::Tokens) {
        let tokens = ketra_lex::lex(&source)?;
        println!("{tokens:#?}");
        return Ok(());
    }

    let module = ketra_par::parse(&source)?;
    if cli.emit == Some(EmitStage::Ast) {
        println!("{module:#?}");
        return Ok(());
    }

    tracing::debug!(functions = module.functions.len(), "parsed module");
    let checked = ketra_sem::check(module)?;
    let mir = ketra_mir::lower(&checked);
    if cli.emit == Some(EmitStage::Mir) {
        println!("{mir:#?}");
        return Ok(());
    }

    let lir = ketra_lir::lower(&mir)?;
    if cli.emit == Some(EmitStage::Lir) {
        println!("{lir:#?}");
        return Ok(());
    }

    let entry_decl = lir
        .functions
        .iter()
        .find(|f| f.name == cli.entry)
        .ok_or_else(|| DriverError::MissingEntry(cli.entry.clone()))?;
    if entry_decl.param_count != 0 {
        return Err(DriverError::EntryTakesArgs(cli.entry.clone(), entry_decl.param_count as usize));
    }
    let entry_slot = entry_decl.global_slot;

    let mut vm = Vm::new(RuntimeConfig::default());
    let objects = ketra_gen::compile(&lir, &mut vm)?;
    let entry = objects[entry_slot as usize];

    tracing::info!(entry = %cli.entry, "running");
    let result = vm.call(entry, &[])?;
    println!("{}", DisplaySlot(result));
    Ok(())
}
