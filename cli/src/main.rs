mod logging;

use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;
use std::process::ExitCode;
use toolbox_core::config::{load_config, Config};
use toolbox_core::state::{read_snapshot, write_snapshot};
use toolbox_core::{
    Error, FileStateStore, PathFile, PathProvider, Permanence, Registry, Request, Response,
    Result, Selection, TargetState, ToggleController,
};

type Controller = ToggleController<Registry, FileStateStore, PathFile>;

/// Switch toolbox modules on and off the host search path.
#[derive(Debug, Parser)]
#[command(name = "toolbox", about = "Toggle toolbox modules on the host search path")]
struct Cli {
    /// Path to a toolbox config file.
    #[arg(long, global = true)]
    config: Option<PathBuf>,
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Show whether modules are enabled. No modules means all of them.
    Query {
        modules: Vec<String>,
        /// Accepted for symmetry with the other commands; has no effect.
        #[arg(long)]
        permanent: bool,
        /// Write the full state snapshot to this file. Only valid without module arguments.
        #[arg(long, value_name = "FILE", conflicts_with = "modules")]
        snapshot: Option<PathBuf>,
    },
    /// List module ids and display names.
    Names,
    /// Put modules back on the search path.
    Enable(Toggle),
    /// Take modules off the search path.
    Disable(Toggle),
    /// Set modules to an explicit state (on/off).
    Set {
        #[command(flatten)]
        toggle: Toggle,
        #[arg(long)]
        state: String,
    },
    /// Re-apply a snapshot written with `--snapshot`.
    Restore { snapshot: PathBuf },
    /// Print the live search path.
    Path,
}

#[derive(Debug, Args)]
struct Toggle {
    /// Module ids or display names, or `all`.
    #[arg(required = true)]
    modules: Vec<String>,
    /// Also write the new path to the host's startup path.
    #[arg(long)]
    permanent: bool,
    /// Save the state from before the change to this file.
    #[arg(long, value_name = "FILE")]
    snapshot: Option<PathBuf>,
}

impl Toggle {
    fn permanence(&self) -> Permanence {
        if self.permanent {
            Permanence::Permanent
        } else {
            Permanence::Temporary
        }
    }
}

fn main() -> ExitCode {
    logging::init();
    let cli = Cli::parse();

    match run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("error: {err}");
            match err {
                Error::Argument(_) | Error::UnknownModule(_) | Error::InvalidSnapshot(_) => {
                    ExitCode::from(2)
                }
                _ => ExitCode::FAILURE,
            }
        }
    }
}

fn run(cli: Cli) -> Result<()> {
    let config = match &cli.config {
        Some(path) => load_config(path)?,
        None => Config::default(),
    };
    let mut controller = build_controller(&config)?;

    match cli.command {
        Command::Query {
            modules,
            permanent,
            snapshot,
        } => {
            let selection = if modules.is_empty() {
                Selection::All
            } else {
                Selection::from_inputs(modules)
            };
            let request = Request::Query {
                selection,
                permanence: permanent.then_some(Permanence::Permanent),
            };
            match controller.handle(request)? {
                Response::Flags { flags, .. } => {
                    for (id, enabled) in &flags {
                        println!("{id}\t{}", describe(*enabled));
                    }
                }
                Response::Snapshot {
                    snapshot: state, ..
                } => {
                    for (id, enabled) in &state.enabled {
                        println!("{id}\t{}", describe(*enabled));
                    }
                    if let Some(file) = snapshot {
                        write_snapshot(&file, &state)?;
                    }
                }
                Response::Names(_) | Response::Prior { .. } | Response::Restored { .. } => {}
            }
        }
        Command::Names => {
            for (id, name) in controller.list_names()? {
                println!("{id}\t{name}");
            }
        }
        Command::Enable(toggle) => set_state(&mut controller, toggle, TargetState::Enabled)?,
        Command::Disable(toggle) => set_state(&mut controller, toggle, TargetState::Disabled)?,
        Command::Set { toggle, state } => {
            let target: TargetState = state.parse()?;
            set_state(&mut controller, toggle, target)?;
        }
        Command::Restore { snapshot } => {
            let state = read_snapshot(&snapshot)?;
            controller.handle(Request::Restore { snapshot: state })?;
        }
        Command::Path => {
            for entry in controller.path_provider().current()? {
                println!("{}", entry.display());
            }
        }
    }
    Ok(())
}

fn build_controller(config: &Config) -> Result<Controller> {
    Ok(ToggleController::new(
        Registry::new(config.modules_dir()),
        FileStateStore::new(config.state_file()?),
        PathFile::new(config.path_file()?, config.startup_file()?),
        config.host_module(),
    ))
}

fn set_state(controller: &mut Controller, toggle: Toggle, target: TargetState) -> Result<()> {
    let request = Request::SetState {
        selection: Selection::from_inputs(toggle.modules.iter().cloned()),
        target,
        permanence: toggle.permanence(),
    };
    if let Response::Prior { snapshot, .. } = controller.handle(request)? {
        if let Some(file) = &toggle.snapshot {
            write_snapshot(file, &snapshot)?;
        }
    }
    Ok(())
}

fn describe(enabled: bool) -> &'static str {
    if enabled {
        "enabled"
    } else {
        "disabled"
    }
}
