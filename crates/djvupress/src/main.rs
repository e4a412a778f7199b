mod backends;
mod classify;
mod cli;
mod convert;
mod library;
mod logging;
mod settings;

use clap::Parser;
use log::{error, info, warn};
use tokio_util::sync::CancellationToken;

use djvupress_backend::{BackendError, BackendRegistry};
use djvupress_platform::AppPaths;

use cli::{BackendCommand, Cli, CliCommand, ConvertArgs};
use library::Library;
use settings::Preferences;

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    std::process::exit(run(cli).await);
}

async fn run(cli: Cli) -> i32 {
    let paths = match AppPaths::new() {
        Ok(paths) => paths,
        Err(err) => {
            eprintln!("djvupress: {err}");
            return 1;
        }
    };
    if let Err(err) = paths.ensure_dirs() {
        eprintln!("djvupress: {err}");
        return 1;
    }

    let mut prefs = Preferences::load(paths.settings_file());
    logging::init_logging(cli.verbose || prefs.debug_logging, &paths.log_file());

    let registry = backends::default_registry();

    let cancel = CancellationToken::new();
    {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                cancel.cancel();
            }
        });
    }

    let result = match cli.command {
        CliCommand::Backend { command } => match command {
            BackendCommand::Install { name, yes } => {
                backend_install(&registry, &mut prefs, &paths, &name, yes, &cancel).await
            }
            BackendCommand::Set { name } => backend_set(&registry, &mut prefs, &name),
        },
        CliCommand::Convert(args) => {
            convert_command(&registry, &mut prefs, &paths, args, &cancel).await
        }
    };

    match result {
        Ok(()) => 0,
        Err(err) => {
            eprintln!("{}: {err}", err.kind());
            1
        }
    }
}

fn backend_set(
    registry: &BackendRegistry,
    prefs: &mut Preferences,
    name: &str,
) -> Result<(), BackendError> {
    let backend = registry.resolve(name)?;
    prefs.backend = backend.name.to_string();
    prefs
        .commit()
        .map_err(|err| BackendError::io("failed to commit preferences", err))?;
    info!("default backend set to {}", backend.name);
    Ok(())
}

async fn backend_install(
    registry: &BackendRegistry,
    prefs: &mut Preferences,
    paths: &AppPaths,
    name: &str,
    assume_yes: bool,
    cancel: &CancellationToken,
) -> Result<(), BackendError> {
    let backend = registry.resolve(name)?;
    let client = reqwest::Client::builder()
        .user_agent("djvupress")
        .build()
        .map_err(|err| BackendError::network("failed to build HTTP client", err))?;

    let mut confirm = |question: &str| assume_yes || ask_yes_no(question);

    let scan_dir = paths.backends_dir();
    let outcome = {
        let state = prefs.backend_state_mut(backend.name);
        djvupress_install::install_backend(&client, backend, state, &scan_dir, &mut confirm, cancel)
            .await
    };
    // The install may have adopted or cleared versions even on failure;
    // either way the whole settings object goes out in one commit.
    if let Err(err) = prefs.commit() {
        warn!("failed to persist backend state: {err}");
    }

    let outcome = outcome?;
    if outcome.installed {
        info!(
            "{} {} is ready to use",
            backend.name,
            outcome.version.as_deref().unwrap_or("(unversioned)")
        );
    } else {
        info!("no changes made");
    }
    Ok(())
}

async fn convert_command(
    registry: &BackendRegistry,
    prefs: &mut Preferences,
    paths: &AppPaths,
    args: ConvertArgs,
    cancel: &CancellationToken,
) -> Result<(), BackendError> {
    if let Some(path) = &args.path {
        convert::convert_document(registry, prefs, paths, path, args.force, cancel).await?;
        return Ok(());
    }

    let library_root = args
        .library
        .clone()
        .or_else(|| prefs.library_dir.clone())
        .ok_or_else(|| {
            BackendError::inconsistency(
                "no library directory configured; pass --library or set library_dir in preferences",
            )
        })?;
    let library = Library::open(library_root);

    if let Some(id) = args.id {
        let document = library
            .document_by_id(id)
            .map_err(|err| BackendError::io("failed to resolve library document", err))?;
        convert::convert_document(registry, prefs, paths, &document, args.force, cancel).await?;
        return Ok(());
    }

    let documents = library
        .documents()
        .map_err(|err| BackendError::io("failed to enumerate library", err))?;
    let mut last_failure: Option<BackendError> = None;
    let mut failures = 0usize;
    for document in documents {
        if cancel.is_cancelled() {
            return Err(BackendError::Cancelled);
        }
        if library::has_djvu_sibling(&document) {
            info!("{}: already has a DJVU rendition", document.display());
            continue;
        }
        match convert::convert_document(registry, prefs, paths, &document, args.force, cancel).await
        {
            Ok(_) => {}
            Err(BackendError::Cancelled) => return Err(BackendError::Cancelled),
            Err(err) => {
                error!("{}: {}: {err}", document.display(), err.kind());
                failures += 1;
                last_failure = Some(err);
            }
        }
    }

    match last_failure {
        None => Ok(()),
        Some(err) => {
            error!("{failures} documents failed to convert");
            Err(err)
        }
    }
}

fn ask_yes_no(question: &str) -> bool {
    use std::io::{BufRead, Write};

    let stdin = std::io::stdin();
    let mut input = String::new();
    loop {
        println!("\n\t{question} (y/n)");
        let _ = std::io::stdout().flush();
        input.clear();
        if stdin.lock().read_line(&mut input).is_err() {
            return false;
        }
        match input.trim().to_ascii_lowercase().as_str() {
            "y" => return true,
            "n" => return false,
            _ => println!("Your input is not 'y' or 'n'."),
        }
    }
}
