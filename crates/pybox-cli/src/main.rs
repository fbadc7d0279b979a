use std::fs;

use atty::Stream;
use clap::Parser;
use color_eyre::{eyre::WrapErr, Result};
use pybox_core::{
    build_wheelhouse, known_packages, packages_of_interest, probe_interpreter, render_report,
    Capture, EnvSession, HarnessConfig, HarnessError, PythonBucket, SharedWheelhouse,
};
use serde_json::json;

mod cli;
mod style;

use cli::{CommandCli, PackagesArgs, PyboxCli, RunArgs, WheelhouseArgs};
use style::Style;

fn main() -> Result<()> {
    color_eyre::install()?;

    let cli = PyboxCli::parse();
    init_tracing(cli.trace, cli.verbose);

    let style = Style::new(cli.no_color, atty::is(Stream::Stdout));
    let config = HarnessConfig::from_env();
    if let Err(err) = dispatch(&cli.command, &config, &style) {
        eprintln!("{}", style.failure(&format!("{err}")));
        let code = err
            .downcast_ref::<HarnessError>()
            .and_then(HarnessError::exit_code)
            .unwrap_or(1);
        std::process::exit(if code == 0 { 1 } else { code });
    }
    Ok(())
}

fn init_tracing(trace: bool, verbose: u8) {
    let level = if trace {
        "trace"
    } else {
        match verbose {
            0 => "info",
            1 => "debug",
            _ => "trace",
        }
    };

    let filter = format!("pybox_core={level},pybox_cli={level}");
    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .with_level(true)
        .finish();

    let _ = tracing::subscriber::set_global_default(subscriber);
}

fn dispatch(command: &CommandCli, config: &HarnessConfig, style: &Style) -> Result<()> {
    match command {
        CommandCli::Wheelhouse(args) => wheelhouse(args, config, style),
        CommandCli::Run(args) => run(args, config),
        CommandCli::Report => report(config),
        CommandCli::Packages(args) => packages(args, config, style),
    }
}

fn wheelhouse(args: &WheelhouseArgs, config: &HarnessConfig, style: &Style) -> Result<()> {
    fs::create_dir_all(&args.dir)
        .wrap_err_with(|| format!("failed to create {}", args.dir.display()))?;
    let wheelhouse = build_wheelhouse(config, &args.dir)?;
    let artifacts = wheelhouse.artifacts()?;
    println!(
        "{}",
        style.ok(&format!(
            "wheelhouse ready at {} ({} artifacts)",
            wheelhouse.path().display(),
            artifacts.len()
        ))
    );
    Ok(())
}

fn run(args: &RunArgs, config: &HarnessConfig) -> Result<()> {
    let Some((program, rest)) = args.command.split_first() else {
        color_eyre::eyre::bail!("no program given");
    };
    let shared = match &args.wheelhouse {
        Some(dir) => Some(SharedWheelhouse::prebuilt(dir)?),
        None if args.isolated => Some(SharedWheelhouse::new()),
        None => None,
    };
    let session = match &shared {
        Some(wheelhouse) => EnvSession::isolated(config, wheelhouse)?,
        None => EnvSession::virtualenv(config)?,
    };
    tracing::info!(root = %session.root().display(), "running inside environment");
    session.run(program, rest, Capture::Inherit)?;
    Ok(())
}

fn report(config: &HarnessConfig) -> Result<()> {
    let python = config.python()?;
    let packages = packages_of_interest(&python)?;
    println!("{}", render_report(&packages));
    Ok(())
}

fn packages(args: &PackagesArgs, config: &HarnessConfig, style: &Style) -> Result<()> {
    if args.json {
        let payload = json!({ "packages": known_packages() });
        println!("{}", serde_json::to_string_pretty(&payload)?);
        return Ok(());
    }

    let python = config.python()?;
    let info = probe_interpreter(&python)?;
    let bucket = info.bucket();
    println!(
        "{}",
        style.table_header(&format!(
            "python {} ({})",
            info.version_string(),
            bucket_label(bucket)
        ))
    );
    let width = known_packages()
        .iter()
        .map(|package| package.name.len())
        .max()
        .unwrap_or(0);
    for package in known_packages() {
        let sdist = package.sdist_hash(bucket).unwrap_or("-");
        let dated = package.sdist_dated_hash(bucket).unwrap_or("-");
        println!("{:<width$}  {sdist}  {dated}", package.name);
    }
    Ok(())
}

fn bucket_label(bucket: PythonBucket) -> &'static str {
    match bucket {
        PythonBucket::Py38 => "3.8 checksums",
        PythonBucket::Py39Plus => "3.9+ checksums",
    }
}
