//! ketra — the embedding-style script runner: load a `ketra.toml` project
//! config (if any), compile one source file, and run its entry point to
//! completion. Where `ketrac` (`ketra-drv`) is the developer-facing
//! multi-stage compiler driver, this binary is the "just run it" surface
//! paired with it.

use std::path::{Path, PathBuf};

use clap::Parser;
use serde::Deserialize;

use ketra_rt::config::RuntimeConfig;
use ketra_rt::object::Slot;
use ketra_rt::vm::Vm;

#[derive(Debug, Parser)]
#[command(name = "ketra", version, about = "Run a Ketra script")]
pub struct Cli {
    /// Source file to run.
    pub script: PathBuf,

    /// Entry function to call (overrides `ketra.toml`'s `entry`, default "main").
    #[arg(long)]
    pub entry: Option<String>,

    /// Disable the collector's implicit stepping; only the `gc_tick` opcode
    /// and explicit `full_gc()` calls advance it.
    #[arg(long)]
    pub gc_manual: bool,

    /// Enable verbose tracing (equivalent to `RUST_LOG=ketra=debug`).
    #[arg(short, long)]
    pub verbose: bool,
}

/// `ketra.toml` project configuration, looked up first in the script's
/// directory and then in the user config directory
/// (`dirs::config_dir()/ketra/config.toml`); fields left unset fall back to
/// [`RuntimeConfig::default`].
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct ProjectConfig {
    pub entry: Option<String>,
    pub max_heap_mb: Option<usize>,
    pub promotion_threshold_bytes: Option<usize>,
}

impl ProjectConfig {
    /// Load `ketra.toml` from `script_dir`, falling back to the user config
    /// directory, falling back to defaults. A malformed file is a hard
    /// error; a missing one is not.
    pub fn load(script_dir: &Path) -> anyhow::Result<Self> {
        if let Some(config) = Self::read_if_present(&script_dir.join("ketra.toml"))? {
            return Ok(config);
        }
        if let Some(dir) = dirs::config_dir() {
            if let Some(config) = Self::read_if_present(&dir.join("ketra").join("config.toml"))? {
                return Ok(config);
            }
        }
        Ok(Self::default())
    }

    fn read_if_present(path: &Path) -> anyhow::Result<Option<Self>> {
        match std::fs::read_to_string(path) {
            Ok(text) => Ok(Some(toml::from_str(&text)?)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    fn runtime_config(&self) -> RuntimeConfig {
        let mut config = RuntimeConfig::default();
        if let Some(mb) = self.max_heap_mb {
            config.gc.max_heap_bytes = mb * 1024 * 1024;
        }
        if let Some(bytes) = self.promotion_threshold_bytes {
            config.gc.promotion_threshold_bytes = bytes;
        }
        config
    }
}

pub fn run(cli: Cli) -> anyhow::Result<()> {
    let script_dir = cli.script.parent().unwrap_or_else(|| Path::new("."));
    let project = ProjectConfig::load(script_dir)?;
    let entry = cli.entry.clone().or_else(|| project.entry.clone()).unwrap_or_else(|| "main".to_string());

    let mut runtime_config = project.runtime_config();
    if cli.gc_manual {
        runtime_config.gc.auto_step = false;
    }

    let source = std::fs::read_to_string(&cli.script)?;
    let module = ketra_par::parse(&source)?;
    let checked = ketra_sem::check(module)?;
    let mir = ketra_mir::lower(&checked);
    let lir = ketra_lir::lower(&mir)?;

    let entry_decl = lir
        .functions
        .iter()
        .find(|f| f.name == entry)
        .ok_or_else(|| anyhow::anyhow!("entry point {entry:?} not found"))?;
    anyhow::ensure!(
        entry_decl.param_count == 0,
        "entry point {entry:?} takes {} parameter(s); ketra only calls niladic entry points",
        entry_decl.param_count
    );
    let entry_slot = entry_decl.global_slot;

    let mut vm = Vm::new(runtime_config);
    let objects = ketra_gen::compile(&lir, &mut vm)?;
    let callee = objects[entry_slot as usize];

    tracing::info!(%entry, "running");
    let result = vm.call(callee, &[])?;
    if let Slot::Prim(bits) = result {
        println!("{bits}");
    }
    Ok(())
}
