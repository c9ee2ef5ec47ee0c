use std::io::{BufRead, Write};
use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};

use stigforge_core::catalog::Catalog;
use stigforge_core::config::Config;
use stigforge_core::query::Category;
use stigforge_core::session::{OutputDocument, Session};

const GREETING: &str = "Hello and welcome to the RHEL STIG configurator!\n\
This program assembles an Ansible playbook that fixes STIG findings based on your desired settings.\n\
You may select fixes via category, CAT rating, or group ID.";

#[derive(Parser)]
#[command(name = "stigforge", about = "Assemble STIG remediation playbooks from a fix catalog")]
struct Cli {
    /// Config file path (default: ./stigforge.toml, then the user config dir)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Catalog database path (overrides the config file)
    #[arg(long, global = true)]
    db: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Interactively assemble a playbook from catalog queries
    Generate {
        /// Output file name, without extension; prompted for when omitted
        #[arg(long)]
        output: Option<String>,
    },
    /// Print the available fix categories
    Categories,
    /// Manage catalog entries
    #[command(subcommand)]
    Catalog(CatalogCommand),
}

#[derive(Subcommand)]
enum CatalogCommand {
    /// Insert a new fix
    Add {
        #[arg(long)]
        group_id: i64,
        #[arg(long)]
        category: String,
        /// CAT rating, 1-3
        #[arg(long)]
        rating: i64,
        /// Remediation content file backing this fix
        #[arg(long)]
        file: PathBuf,
    },
    /// Change an existing fix's category
    SetCategory { group_id: i64, category: String },
    /// Change an existing fix's CAT rating
    SetRating { group_id: i64, rating: i64 },
    /// Delete a fix
    Remove { group_id: i64 },
    /// Print all catalog entries
    List {
        #[arg(long)]
        json: bool,
    },
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("stigforge_core=info".parse()?),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let mut config = Config::load(cli.config.as_deref())?;
    if let Some(db) = cli.db {
        config.db_path = db;
    }

    tracing::info!(db = %config.db_path.display(), "opening catalog");
    let catalog = Catalog::open(&config.db_path.to_string_lossy())?;

    match cli.command {
        Command::Generate { output } => generate(&catalog, &config, output),
        Command::Categories => {
            let names: Vec<&str> = Category::ALL.iter().map(|c| c.as_str()).collect();
            println!("Categories: {}", names.join(" "));
            Ok(())
        }
        Command::Catalog(cmd) => catalog_admin(&catalog, cmd),
    }
}

/// Run one interactive assembly session: pick a fresh output file, seed it
/// from the template, then hand control to the query loop.
fn generate(catalog: &Catalog, config: &Config, output: Option<String>) -> Result<()> {
    std::fs::create_dir_all(&config.output_dir).with_context(|| {
        format!(
            "failed to create output directory {}",
            config.output_dir.display()
        )
    })?;

    let stdin = std::io::stdin();
    let mut input = stdin.lock();
    let mut out = std::io::stdout();

    writeln!(out, "{GREETING}")?;

    let path = match output {
        Some(name) => {
            let path = playbook_path(&config.output_dir, &name);
            if path.exists() {
                bail!("output file {} already exists", path.display());
            }
            path
        }
        None => prompt_output_path(&config.output_dir, &mut input, &mut out)?,
    };

    let document = OutputDocument::create(&path, &config.template_path)?;
    tracing::info!(path = %path.display(), "output document created");

    let mut session = Session::new(catalog, document);
    session.run(&mut input, &mut out)?;
    Ok(())
}

fn playbook_path(output_dir: &Path, name: &str) -> PathBuf {
    output_dir.join(format!("{name}.yaml"))
}

/// Ask for output file names until one names a file that does not exist yet.
fn prompt_output_path<R: BufRead, W: Write>(
    output_dir: &Path,
    input: &mut R,
    out: &mut W,
) -> Result<PathBuf> {
    loop {
        write!(out, "\nEnter the desired output file name with no extension: ")?;
        out.flush()?;
        let mut line = String::new();
        if input.read_line(&mut line)? == 0 {
            bail!("no output file name given");
        }
        let name = line.trim();
        if name.is_empty() {
            continue;
        }
        let path = playbook_path(output_dir, name);
        if path.exists() {
            writeln!(out, "\nFile exists! Enter a different name.")?;
            continue;
        }
        return Ok(path);
    }
}

fn catalog_admin(catalog: &Catalog, cmd: CatalogCommand) -> Result<()> {
    match cmd {
        CatalogCommand::Add {
            group_id,
            category,
            rating,
            file,
        } => {
            let category = parse_category(&category)?;
            if !file.exists() {
                bail!("content file {} not found", file.display());
            }
            catalog.insert_fix(group_id, category, rating, &file.to_string_lossy())?;
            println!(
                "Inserted fix {group_id}: {} CAT {rating} -> {}",
                category.as_str(),
                file.display()
            );
        }
        CatalogCommand::SetCategory { group_id, category } => {
            let category = parse_category(&category)?;
            if !catalog.update_category(group_id, category)? {
                bail!("no fix with group ID {group_id} in the catalog");
            }
            println!("Updated fix {group_id}: category set to {}", category.as_str());
        }
        CatalogCommand::SetRating { group_id, rating } => {
            if !catalog.update_rating(group_id, rating)? {
                bail!("no fix with group ID {group_id} in the catalog");
            }
            println!("Updated fix {group_id}: CAT rating set to {rating}");
        }
        CatalogCommand::Remove { group_id } => {
            if !catalog.delete_fix(group_id)? {
                bail!("no fix with group ID {group_id} in the catalog");
            }
            println!("Deleted fix with group ID {group_id}");
        }
        CatalogCommand::List { json } => {
            let fixes = catalog.all_fixes()?;
            if json {
                println!("{}", serde_json::to_string_pretty(&fixes)?);
            } else {
                for fix in fixes {
                    println!(
                        "{}  {}  CAT {}  {}",
                        fix.group_id, fix.category, fix.cat_rating, fix.content_path
                    );
                }
            }
        }
    }
    Ok(())
}

fn parse_category(token: &str) -> Result<Category> {
    Category::parse(token).with_context(|| {
        let names: Vec<&str> = Category::ALL.iter().map(|c| c.as_str()).collect();
        format!(
            "`{token}` is not a valid category; choose from: {}",
            names.join(" ")
        )
    })
}
