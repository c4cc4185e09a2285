//! mfx - browse and edit mainframe resources through the virtual filesystem

use std::io::{Read, Write};

use anyhow::{bail, Context, Result};
use mfx_host::app::App;
use mfx_host::config::Config;
use mfx_vfs::{FileSystemProvider, FileType};
use tracing_subscriber::EnvFilter;

const VERSION: &str = env!("CARGO_PKG_VERSION");

fn print_help() {
    println!("mfx - mainframe resources as a virtual filesystem");
    println!();
    println!("USAGE:");
    println!("    mfx <COMMAND> [ARGS]");
    println!();
    println!("COMMANDS:");
    println!("    profiles              List configured profiles");
    println!("    ls URI                List a directory");
    println!("    cat URI               Print a file");
    println!("    put URI [FILE]        Upload FILE (or stdin) to URI");
    println!("    rm URI [-r]           Delete a file, or a directory with -r");
    println!("    init                  Write a default config file");
    println!();
    println!("PUT OPTIONS:");
    println!("    --force               Overwrite remote changes on conflict");
    println!();
    println!("GLOBAL OPTIONS:");
    println!("    -h, --help            Print help information");
    println!("    -v, --version         Print version");
    println!();
    println!("CONFIG:");
    println!("    {}", Config::default_config_path().display());
    println!();
    println!("EXAMPLES:");
    println!("    mfx ls zowe-ds:/lpar1");
    println!("    mfx cat zowe-ds:/lpar1/USER.JCL/BUILD");
    println!("    mfx put zowe-uss:/lpar1/u/user/a.txt ./a.txt");
}

fn init_logging(level: &str) {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level)))
        .with_writer(std::io::stderr)
        .with_target(false)
        .with_level(true)
        .init();
}

fn arg<'a>(args: &'a [String], idx: usize, what: &str) -> Result<&'a str> {
    args.get(idx)
        .map(String::as_str)
        .with_context(|| format!("missing {what}; see `mfx --help`"))
}

fn cmd_profiles(config: &Config) {
    if config.profiles.is_empty() {
        println!("no profiles configured");
        return;
    }
    for profile in &config.profiles {
        match &profile.root {
            Some(root) => println!("{}\t{}\t{}", profile.name, profile.profile_type, root.display()),
            None => println!("{}\t{}", profile.name, profile.profile_type),
        }
    }
}

async fn cmd_ls(app: &App, uri: &str) -> Result<()> {
    let (provider, uri) = app.resolve(uri)?;
    for (name, kind) in provider.read_directory(&uri).await? {
        match kind {
            FileType::Directory => println!("{name}/"),
            FileType::File => println!("{name}"),
        }
    }
    Ok(())
}

async fn cmd_cat(app: &App, uri: &str) -> Result<()> {
    let (provider, uri) = app.resolve(uri)?;
    let data = provider.read_file(&uri).await?;
    std::io::stdout().write_all(&data)?;
    Ok(())
}

async fn cmd_put(app: &App, args: &[String]) -> Result<()> {
    let force = args.iter().any(|a| a == "--force");
    let positional: Vec<&String> = args.iter().filter(|a| !a.starts_with("--")).collect();
    let uri = positional
        .first()
        .context("missing URI; see `mfx --help`")?;

    let contents = match positional.get(1) {
        Some(path) => std::fs::read(path).with_context(|| format!("reading {path}"))?,
        None => {
            let mut buf = Vec::new();
            std::io::stdin().read_to_end(&mut buf)?;
            buf
        }
    };

    // load the cached etag so remote changes are detected
    let (provider, parsed) = app.resolve(uri)?;
    if provider.stat(&parsed).await.is_ok() {
        provider.read_file(&parsed).await?;
    }
    if force {
        app.host().answer_next(Some("Overwrite"));
    }

    app.save(uri, contents).await?;
    if !force {
        if let Some(conflict) = app.host().errors().first() {
            bail!("{} (rerun with --force to overwrite)", conflict.message);
        }
    }
    Ok(())
}

async fn cmd_rm(app: &App, args: &[String]) -> Result<()> {
    let recursive = args.iter().any(|a| a == "-r" || a == "--recursive");
    let uri = args
        .iter()
        .find(|a| !a.starts_with('-'))
        .context("missing URI; see `mfx --help`")?;
    let (provider, uri) = app.resolve(uri)?;
    provider.delete(&uri, recursive).await?;
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let args: Vec<String> = std::env::args().collect();
    let Some(command) = args.get(1).map(String::as_str) else {
        print_help();
        return Ok(());
    };

    match command {
        "--version" | "-v" => {
            println!("mfx {VERSION}");
            return Ok(());
        }
        "--help" | "-h" => {
            print_help();
            return Ok(());
        }
        _ => {}
    }

    // === LOAD CONFIGURATION ===
    let config = Config::load()?;
    init_logging(&config.logging.level);
    tracing::debug!(path = %Config::default_config_path().display(), "Loaded config");

    let rest = &args[2..];
    match command {
        "init" => {
            Config::create_default_if_missing()?;
            println!("{}", Config::default_config_path().display());
        }
        "profiles" => cmd_profiles(&config),
        "ls" | "cat" | "put" | "rm" => {
            let app = App::new(config).await?;
            app.open_sessions()?;
            match command {
                "ls" => cmd_ls(&app, arg(rest, 0, "URI")?).await?,
                "cat" => cmd_cat(&app, arg(rest, 0, "URI")?).await?,
                "put" => cmd_put(&app, rest).await?,
                _ => cmd_rm(&app, rest).await?,
            }
        }
        other => bail!("unknown command '{other}'; see `mfx --help`"),
    }
    Ok(())
}
