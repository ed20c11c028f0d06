use anyhow::{Context, Result};
use argh::FromArgs;
use ash::{
    Cancellation, EditorSettings, Interpreter, ReadlineEditor, SearchPath, Session, SessionPaths,
    listen_for_interrupts,
};
use log::info;
use std::fs::File;
use std::path::{Path, PathBuf};
use std::sync::Arc;

#[derive(FromArgs)]
/// An interactive shell.
struct Args {
    /// history file (default: .ash_history)
    #[argh(option)]
    history: Option<PathBuf>,

    /// line editor settings (default: inputrc)
    #[argh(option)]
    inputrc: Option<PathBuf>,

    /// script run before the first prompt (default: shinit)
    #[argh(option)]
    init: Option<PathBuf>,

    /// log file (default: ash.log)
    #[argh(option)]
    log: Option<PathBuf>,
}

impl Args {
    fn into_paths(self) -> SessionPaths {
        let defaults = SessionPaths::default();
        SessionPaths {
            history: self.history.unwrap_or(defaults.history),
            inputrc: self.inputrc.unwrap_or(defaults.inputrc),
            init: self.init.unwrap_or(defaults.init),
            log: self.log.unwrap_or(defaults.log),
        }
    }
}

/// Send log records to `path`, keeping the terminal for the user.
fn init_logging(path: &Path) -> Result<()> {
    let file = File::create(path).with_context(|| format!("can't open log file {}", path.display()))?;
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .target(env_logger::Target::Pipe(Box::new(file)))
        .init();
    Ok(())
}

fn run(paths: SessionPaths) -> Result<i32> {
    init_logging(&paths.log)?;
    info!("starting with {paths:?}");

    let index = Arc::new(SearchPath::from_env());
    let settings = EditorSettings::load(&paths.inputrc);
    let editor = ReadlineEditor::new(&settings, index, paths.history.clone())
        .context("can't set up the terminal")?;

    let cancel = Cancellation::new();
    listen_for_interrupts(&cancel).context("can't install the interrupt handler")?;

    let mut session = Session::new(editor, Interpreter::default(), cancel);
    if let Some(code) = session.source_file(&paths.init) {
        session.finish();
        return Ok(code);
    }
    Ok(session.run()?)
}

fn main() {
    let args: Args = argh::from_env();
    match run(args.into_paths()) {
        Ok(code) => std::process::exit(code),
        Err(err) => {
            eprintln!("ash: {err:#}");
            std::process::exit(1);
        }
    }
}
