//! # inox CLI Entry Point
//!
//! Parses arguments with clap and routes each command to the library:
//! - `build`: prepare the sketch, discover libraries, compile everything
//! - `discover`: run library discovery only and print its result
//! - `libs`: list installed libraries, or the candidates for one header
//! - `clean`: remove the build folder

use anyhow::Result;
use clap::{Args, Parser, Subcommand};
use colored::*;
use std::path::PathBuf;

use inox::build::{self, BuildOptions};
use inox::config;
use inox::library::LibraryResolver;
use inox::library::resolver::compute_priority;
use inox::ui;

#[derive(Parser)]
#[command(name = "inox")]
#[command(about = "Incremental sketch builds with automatic library discovery", version = env!("CARGO_PKG_VERSION"))]
#[command(propagate_version = true)]
struct Cli {
    /// Sketch folder holding inox.toml
    #[arg(long, global = true, default_value = ".")]
    sketch: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Args, Clone, Default)]
struct BuildArgs {
    /// Number of parallel compile jobs (0 = all CPUs)
    #[arg(short, long)]
    jobs: Option<usize>,
    /// Show commands, cache decisions and library candidates
    #[arg(short, long)]
    verbose: bool,
    /// Only print warnings and errors
    #[arg(short, long)]
    quiet: bool,
    /// Write compile_commands.json without compiling; discovery errors are not fatal
    #[arg(long)]
    only_compilation_database: bool,
    /// Reuse the include folders found by the previous build
    #[arg(long)]
    use_cached_libraries: bool,
}

impl From<&BuildArgs> for BuildOptions {
    fn from(args: &BuildArgs) -> Self {
        BuildOptions {
            jobs: args.jobs,
            verbose: args.verbose,
            quiet: args.quiet,
            only_update_compilation_database: args.only_compilation_database,
            use_cached_libraries: args.use_cached_libraries,
        }
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Compile the sketch, its libraries and the core
    Build(BuildArgs),
    /// Find the libraries the sketch needs without compiling
    Discover(BuildArgs),
    /// List installed libraries
    Libs {
        /// Show the candidates for this header, best first
        #[arg(long)]
        header: Option<String>,
    },
    /// Remove the build folder
    Clean,
}

fn main() {
    inox::init_tracing();
    let cli = Cli::parse();
    if let Err(e) = run(cli) {
        eprintln!("{} {:#}", "x".red(), e);
        std::process::exit(1);
    }
}

fn run(cli: Cli) -> Result<()> {
    let config = config::load_config(&cli.sketch)?;

    match &cli.command {
        Commands::Build(args) => {
            let summary = build::build_project(&config, &BuildOptions::from(args))?;
            if args.verbose {
                for object in &summary.objects {
                    println!("   {}", object.display().to_string().dimmed());
                }
            }
            Ok(())
        }

        Commands::Discover(args) => {
            let report = build::discover_project(&config, &BuildOptions::from(args))?;
            println!("{}", "Include folders:".bold());
            for folder in &report.include_folders {
                println!("   {}", folder.display());
            }
            if report.imported_libraries.is_empty() {
                println!("{} No libraries used", "→".dimmed());
                return Ok(());
            }
            let mut table = ui::Table::new(&["Library", "Version", "Location", "Folder"]);
            for lib in &report.imported_libraries {
                table.add_row(vec![
                    lib.name.bold().green().to_string(),
                    lib.version.as_ref().map(|v| v.to_string()).unwrap_or_default(),
                    lib.location.to_string(),
                    lib.install_dir.display().to_string(),
                ]);
            }
            table.print();
            Ok(())
        }

        Commands::Libs { header } => {
            let logger = BuildOptions::default().logger();
            let catalog = build::load_catalog(&config, &logger);
            let arch = &config.platform.arch;

            match header {
                Some(header) => {
                    let resolver = LibraryResolver::new(&catalog);
                    let mut candidates: Vec<_> = resolver
                        .alternatives_for(header)
                        .iter()
                        .map(|lib| (compute_priority(lib, header, arch), lib))
                        .collect();
                    if candidates.is_empty() {
                        println!("{} No installed library provides '{}'", "x".red(), header);
                        return Ok(());
                    }
                    candidates.sort_by(|a, b| b.0.cmp(&a.0).then_with(|| a.1.name.cmp(&b.1.name)));
                    let selected = resolver.resolve_for(header, arch);

                    let mut table = ui::Table::new(&["Library", "Priority", "Location", "Folder"]);
                    for (priority, lib) in candidates {
                        let name = if selected.as_ref() == Some(lib) {
                            lib.name.bold().green().to_string()
                        } else {
                            lib.name.clone()
                        };
                        table.add_row(vec![
                            name,
                            priority.to_string(),
                            lib.location.to_string(),
                            lib.install_dir.display().to_string(),
                        ]);
                    }
                    table.print();
                }
                None => {
                    if catalog.is_empty() {
                        println!("{} No libraries installed", "!".yellow());
                        return Ok(());
                    }
                    let mut table = ui::Table::new(&["Library", "Version", "Architectures", "Location"]);
                    for lib in catalog.libraries() {
                        table.add_row(vec![
                            lib.name.bold().green().to_string(),
                            lib.version.as_ref().map(|v| v.to_string()).unwrap_or_default(),
                            lib.architectures.join(","),
                            lib.location.to_string(),
                        ]);
                    }
                    table.print();
                }
            }
            Ok(())
        }

        Commands::Clean => {
            build::clean(&config.build.path)?;
            Ok(())
        }
    }
}
