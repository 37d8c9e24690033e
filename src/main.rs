use clap::Parser;
use log::error;
use schemalens::config::LensConfig;
use schemalens::errors::LensError;
use schemalens::models::schema::TableRef;
use schemalens::pipeline::{Pipeline, RunOptions};

#[derive(Parser, Debug)]
#[command(name = "schemalens")]
#[command(author, version, about = "Database model and relationship generator")]
struct Args {
    /// Business context for semantic understanding (e.g. 'This is an e-commerce platform...')
    #[arg(long)]
    context: String,

    /// Tables as 'database:table'; all tables of DB_NAME when omitted
    #[arg(long, num_args = 1..)]
    tables: Vec<String>,

    /// Queries to try against the freshly built index
    #[arg(long, num_args = 1..)]
    test_queries: Vec<String>,
}

async fn run(args: Args) -> Result<(), LensError> {
    let tables = args
        .tables
        .iter()
        .map(|t| TableRef::parse(t))
        .collect::<Result<Vec<_>, _>>()?;

    let config = LensConfig::from_env()?;
    let pipeline = Pipeline::from_config(config)?;
    let report = pipeline
        .run(&RunOptions {
            business_context: Some(args.context),
            tables,
            test_queries: args.test_queries,
        })
        .await?;

    for result in &report.test_queries {
        println!("\nQuery: {}", result.query);
        for m in &result.matches {
            println!("Table: {}", m.document.metadata.table_name);
            println!("Database: {}", m.document.metadata.database);
            println!("Relevance Score: {}", m.score);
            println!("{}", "-".repeat(50));
        }
    }

    println!("Models written: {}", report.models_written);
    println!("Explicit relationships: {}", report.explicit_relationships);
    println!("Semantic relationships: {}", report.semantic_relationships);
    if !report.skipped.is_empty() {
        println!("Skipped units: {}", report.skipped.len());
        for skip in &report.skipped {
            println!("  {:?} {}: {}", skip.stage, skip.subject, skip.cause);
        }
    }
    Ok(())
}

#[tokio::main]
async fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let args = Args::parse();
    if let Err(e) = run(args).await {
        error!("Error during processing: {}", e);
        std::process::exit(1);
    }
}
