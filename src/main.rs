use anyhow::{Result, bail};
use clap::Parser;
use dr::commands::{self, Context};
use dr::config::Config;
use dr::process::TokioRunner;
use dr::runtime::{RealRuntime, Runtime};
use std::path::PathBuf;

/// dr - Debian package repository manager
///
/// Builds Debian packages from git branches in clean build roots, keeps a
/// history of the builds and publishes them into the suites of an apt
/// archive.
///
/// Examples:
///   dr add git https://example.com/widget.git   # Register a package
///   dr build widget                             # Build its default branch
///   dr push widget --suite stable               # Publish the newest build
#[derive(Parser, Debug)]
#[command(author, version = env!("DR_VERSION"), about)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Repository name from the configuration, or its path (also via DR_REPO)
    #[arg(
        long = "repo",
        short = 'r',
        env = "DR_REPO",
        value_name = "NAME|PATH",
        global = true
    )]
    pub repo: Option<String>,

    /// Configuration file to use instead of /etc/dr.conf and ~/.dr.conf
    #[arg(long = "config", value_name = "FILE", global = true)]
    pub config: Option<PathBuf>,

    /// More output, repeat for debug output
    #[arg(short = 'v', long = "verbose", action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,
}

#[derive(clap::Subcommand, Debug)]
enum Commands {
    /// List the packages of the repository
    List(ListArgs),

    /// List the suites of the archive
    Suites,

    /// Show a package, or the files of one of its builds
    Show(ShowArgs),

    /// Show the builds of a package
    History(PackageArgs),

    /// Build a package from its git sources
    Build(BuildArgs),

    /// Publish a build in a suite
    Push(PushArgs),

    /// Take a package out of a suite
    Unpush(UnpushArgs),

    /// Remove a package with all its builds
    Remove(RemoveArgs),

    /// Remove a single build of a package
    RemoveBuild(RemoveBuildArgs),

    /// Set the build environment of a package
    SetEnv(SetEnvArgs),

    /// Add a package to the repository
    #[command(subcommand)]
    Add(AddCommands),
}

#[derive(clap::Subcommand, Debug)]
enum AddCommands {
    /// Add a package built from a git repository
    Git(AddGitArgs),

    /// Import a pre-built package file
    Deb(AddDebArgs),
}

#[derive(clap::Args, Debug)]
pub struct ListArgs {
    /// Only list the packages published in this suite
    #[arg(long, short = 's')]
    pub suite: Option<String>,
}

#[derive(clap::Args, Debug)]
pub struct PackageArgs {
    /// The package name
    pub package: String,
}

#[derive(clap::Args, Debug)]
pub struct ShowArgs {
    /// The package name
    pub package: String,

    /// Show the files of this build
    #[arg(long)]
    pub version: Option<String>,
}

#[derive(clap::Args, Debug)]
pub struct BuildArgs {
    /// The package name
    pub package: String,

    /// Branch to build (defaults to the mirror's default branch)
    #[arg(long, short = 'b')]
    pub branch: Option<String>,

    /// Build even when the revision was built before
    #[arg(long, short = 'f')]
    pub force: bool,
}

#[derive(clap::Args, Debug)]
pub struct PushArgs {
    /// The package name
    pub package: String,

    /// Build to push (defaults to the newest)
    #[arg(long)]
    pub version: Option<String>,

    /// Target suite (defaults to the configured default suite)
    #[arg(long, short = 's')]
    pub suite: Option<String>,

    /// Replace a suite's same or newer version
    #[arg(long, short = 'f')]
    pub force: bool,
}

#[derive(clap::Args, Debug)]
pub struct UnpushArgs {
    /// The package name
    pub package: String,

    /// The suite to take it out of
    pub suite: String,
}

#[derive(clap::Args, Debug)]
pub struct RemoveArgs {
    /// The package name
    pub package: String,

    /// Unpush the package from the suites still using it
    #[arg(long, short = 'f')]
    pub force: bool,
}

#[derive(clap::Args, Debug)]
pub struct RemoveBuildArgs {
    /// The package name
    pub package: String,

    /// Version of the build
    pub version: String,

    /// Unpush the build from the suites still using it
    #[arg(long, short = 'f')]
    pub force: bool,
}

#[derive(clap::Args, Debug)]
pub struct SetEnvArgs {
    /// The package name
    pub package: String,

    /// Build environment id from the configuration (omit to use the base OS)
    pub environment: Option<String>,
}

#[derive(clap::Args, Debug)]
pub struct AddGitArgs {
    /// URL of the git repository
    pub url: String,

    /// Branch to build by default
    #[arg(long, short = 'b', default_value = "master")]
    pub branch: String,

    /// Replace the sources of an existing package
    #[arg(long, short = 'f')]
    pub force: bool,
}

#[derive(clap::Args, Debug)]
pub struct AddDebArgs {
    /// The .deb file
    pub file: PathBuf,

    /// Overwrite the file in an existing build
    #[arg(long, short = 'f')]
    pub force: bool,
}

fn log_level(verbose: u8) -> &'static str {
    match verbose {
        0 => "warn",
        1 => "info",
        _ => "debug",
    }
}

fn load_config<R: Runtime>(runtime: &R, file: Option<PathBuf>) -> Result<Config> {
    let locations = match file {
        Some(path) => {
            if !runtime.exists(&path) {
                bail!("Configuration file {:?} not found", path);
            }
            vec![path]
        }
        None => Config::default_locations(runtime),
    };
    Ok(Config::load(runtime, &locations)?)
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(log_level(cli.verbose)))
        .init();

    let runtime = RealRuntime;
    let runner = TokioRunner;
    let config = load_config(&runtime, cli.config)?;
    let ctx = Context::new(&runtime, &runner, config, cli.repo.as_deref())?;

    match cli.command {
        Commands::List(args) => commands::list(&ctx, args.suite.as_deref()).await?,
        Commands::Suites => commands::suites(&ctx)?,
        Commands::Show(args) => {
            commands::show(&ctx, &args.package, args.version.as_deref()).await?
        }
        Commands::History(args) => commands::history(&ctx, &args.package)?,
        Commands::Build(args) => {
            commands::build(&ctx, &args.package, args.branch.as_deref(), args.force).await?
        }
        Commands::Push(args) => {
            commands::push(
                &ctx,
                &args.package,
                args.version.as_deref(),
                args.suite.as_deref(),
                args.force,
            )
            .await?
        }
        Commands::Unpush(args) => commands::unpush(&ctx, &args.package, &args.suite).await?,
        Commands::Remove(args) => commands::remove(&ctx, &args.package, args.force).await?,
        Commands::RemoveBuild(args) => {
            commands::remove_build(&ctx, &args.package, &args.version, args.force).await?
        }
        Commands::SetEnv(args) => {
            commands::set_env(&ctx, &args.package, args.environment.as_deref())?
        }
        Commands::Add(AddCommands::Git(args)) => {
            commands::add_git(&ctx, &args.url, &args.branch, args.force).await?
        }
        Commands::Add(AddCommands::Deb(args)) => {
            commands::add_deb(&ctx, &args.file, args.force).await?
        }
    }
    Ok(())
}
