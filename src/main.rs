//! CLI entry point for the product similarity service.
//!
//! Loads a JSON product catalog, builds the similarity index on demand and
//! answers queries from the command line.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{
    Parser, Subcommand,
    builder::styling::{AnsiColor, Effects, Styles},
};
use comfy_table::{ContentArrangement, Table};
use prodsim::config::CONFIG_DIR;
use prodsim::vector::create_generator;
use prodsim::{
    JsonCatalog, ProductId, RecommendedProduct, SearchResult, Settings, SimilaritySearchService,
    logging,
};

fn clap_cargo_style() -> Styles {
    Styles::styled()
        .header(AnsiColor::Cyan.on_default() | Effects::BOLD)
        .usage(AnsiColor::Cyan.on_default() | Effects::BOLD)
        .literal(AnsiColor::Green.on_default())
        .placeholder(AnsiColor::Green.on_default())
}

#[derive(Parser)]
#[command(
    name = "prodsim",
    version,
    about = "Find similar products by description embeddings",
    next_line_help = true,
    styles = clap_cargo_style()
)]
struct Cli {
    /// Path to custom settings.toml file
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Product catalog JSON file (overrides config)
    #[arg(long, global = true)]
    catalog: Option<PathBuf>,

    /// Embedding model: AllMiniLML6V2 or hashing (overrides config)
    #[arg(long, global = true)]
    model: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

/// Available CLI commands
#[derive(Subcommand)]
enum Commands {
    /// Write a default settings file
    #[command(about = "Set up .prodsim directory with default configuration")]
    Init {
        /// Force overwrite existing configuration
        #[arg(short, long)]
        force: bool,
    },

    /// Search products by free text
    Search {
        /// What you are looking for
        query: String,

        /// Number of results (defaults to search.default_top_k)
        #[arg(short = 'k', long)]
        top_k: Option<i64>,

        /// Minimum similarity score (defaults to search.threshold)
        #[arg(short, long)]
        threshold: Option<f32>,

        /// Print results as JSON
        #[arg(long)]
        json: bool,
    },

    /// Find products similar to an existing product
    Similar {
        /// Product id
        id: i64,

        /// Number of results (defaults to search.default_top_k)
        #[arg(short = 'k', long)]
        top_k: Option<i64>,

        /// Print results as JSON
        #[arg(long)]
        json: bool,
    },

    /// Build the index and print its metadata
    Info {
        /// Print metadata as JSON
        #[arg(long)]
        json: bool,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let mut settings = if let Some(config_path) = &cli.config {
        Settings::load_from(config_path).unwrap_or_else(|e| {
            eprintln!(
                "Configuration error loading from {}: {}",
                config_path.display(),
                e
            );
            std::process::exit(1);
        })
    } else {
        Settings::load().unwrap_or_else(|e| {
            eprintln!("Configuration error: {e}");
            Settings::default()
        })
    };
    if let Some(catalog) = cli.catalog {
        settings.catalog.path = catalog;
    }
    if let Some(model) = cli.model {
        settings.embedding.model = model;
    }

    logging::init(&settings.logging);

    match cli.command {
        Commands::Init { force } => init(&settings, force),
        Commands::Search {
            query,
            top_k,
            threshold,
            json,
        } => {
            let service = create_service(&settings)?;
            let top_k = top_k.unwrap_or(settings.search.default_top_k);
            let threshold = threshold.unwrap_or(settings.search.threshold);
            let results = service.search_with_threshold(&query, top_k, threshold)?;
            print_results(&service, &results, json)
        }
        Commands::Similar { id, top_k, json } => {
            let service = create_service(&settings)?;
            let top_k = top_k.unwrap_or(settings.search.default_top_k);
            let results = service.similar_to_product(ProductId::new(id), top_k)?;
            print_results(&service, &results, json)
        }
        Commands::Info { json } => {
            let service = create_service(&settings)?;
            service.initialize()?;
            let metadata = service
                .metadata()
                .context("index was not published after a successful build")?;
            if json {
                println!("{}", serde_json::to_string_pretty(&metadata)?);
            } else {
                println!("Model:       {}", metadata.model_name);
                println!("Dimension:   {}", metadata.dimension);
                println!("Products:    {}", metadata.entry_count);
                println!("Generation:  {}", metadata.generation);
                println!("Build time:  {}ms", metadata.build_millis);
            }
            Ok(())
        }
    }
}

fn init(settings: &Settings, force: bool) -> Result<()> {
    let path = PathBuf::from(CONFIG_DIR).join("settings.toml");
    if path.exists() && !force {
        anyhow::bail!(
            "Configuration file already exists at {}. Use --force to overwrite",
            path.display()
        );
    }
    settings
        .save(&path)
        .map_err(|e| anyhow::anyhow!("Failed to write {}: {e}", path.display()))?;
    println!("Created configuration at: {}", path.display());
    Ok(())
}

fn create_service(settings: &Settings) -> Result<SimilaritySearchService> {
    let store = JsonCatalog::load(&settings.catalog.path)?;
    let embedder = create_generator(
        &settings.embedding.model,
        settings.embedding.dimension,
        settings.embedding.cache_dir.clone(),
        settings.embedding.show_download_progress,
    )?;

    Ok(SimilaritySearchService::with_config(
        Arc::new(store),
        Arc::from(embedder),
        settings.service_config(),
    ))
}

fn print_results(
    service: &SimilaritySearchService,
    results: &[SearchResult],
    json: bool,
) -> Result<()> {
    if json {
        println!("{}", serde_json::to_string_pretty(results)?);
        return Ok(());
    }

    let products: Vec<RecommendedProduct> = service.resolve(results)?;
    if products.is_empty() {
        println!("No matching products.");
        return Ok(());
    }

    let mut table = Table::new();
    table
        .set_content_arrangement(ContentArrangement::Dynamic)
        .set_header(vec!["#", "ID", "Score", "Name", "Description"]);
    for (rank, item) in products.iter().enumerate() {
        table.add_row(vec![
            (rank + 1).to_string(),
            item.product.id.to_string(),
            format!("{:.3}", item.score),
            item.product.name.clone().unwrap_or_default(),
            item.product.description.clone(),
        ]);
    }
    println!("{table}");
    Ok(())
}
