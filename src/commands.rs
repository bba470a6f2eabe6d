use anyhow::{Context, Result};
use console::style;
use std::fs;
use std::path::Path;
use tracing::info;

use crate::StructuredAnswer;
use crate::config::Config;
use crate::pipeline::{Document, RagContext};

/// Question asked by `rag-agent demo` after indexing the sample documents
pub const DEMO_QUESTION: &str = "why is the sky blue?";

/// Three short science facts with topic metadata
#[inline]
pub fn sample_documents() -> Vec<Document> {
    vec![
        Document::new(
            "The sky appears blue because of Rayleigh scattering. Sunlight is scattered \
             by the gases in the atmosphere, and shorter blue wavelengths scatter much \
             more than longer red ones.",
        )
        .with_metadata("topic", "atmosphere"),
        Document::new("Water boils at 100 degrees Celsius (212 degrees Fahrenheit) at sea level.")
            .with_metadata("topic", "physics"),
        Document::new(
            "The Earth rotates on its axis once roughly every 24 hours, which causes day and night.",
        )
        .with_metadata("topic", "astronomy"),
    ]
}

/// Read a JSON array of `{"text": ..., "metadata": {...}}` objects
#[inline]
pub fn read_documents(path: &Path) -> Result<Vec<Document>> {
    let raw = fs::read_to_string(path)
        .with_context(|| format!("Failed to read documents from {}", path.display()))?;
    let documents: Vec<Document> = serde_json::from_str(&raw)
        .with_context(|| format!("{} is not a JSON array of documents", path.display()))?;
    Ok(documents)
}

fn load_context() -> Result<RagContext> {
    let config = Config::load()?;
    let context = RagContext::from_config(&config)
        .context("Run 'rag-agent config' or set the API key environment variables")?;
    Ok(context)
}

/// Index the documents stored in `path`
#[inline]
pub async fn index_file(path: &Path) -> Result<()> {
    let documents = read_documents(path)?;
    if documents.is_empty() {
        println!("{} contains no documents, nothing to index.", path.display());
        return Ok(());
    }

    let context = load_context()?;
    println!(
        "Indexing {} documents into '{}'...",
        documents.len(),
        context.index_spec().name
    );

    let indexed = context.index(documents).await?;
    println!("{}", style(format!("✓ Indexed {} documents", indexed)).green());
    Ok(())
}

/// Answer a question against the configured index
#[inline]
pub async fn ask(question: &str, structured: bool) -> Result<()> {
    let context = load_context()?;

    if structured {
        let answer = context.query_structured(question).await?;
        print_structured(&answer);
    } else {
        let answer = context.query(question).await?;
        println!("{}", answer);
    }
    Ok(())
}

/// Index the sample documents and ask [`DEMO_QUESTION`]
#[inline]
pub async fn run_demo() -> Result<()> {
    let context = load_context()?;

    println!("{}", style("📚 Indexing sample documents").bold().cyan());
    let indexed = context.index(sample_documents()).await?;
    println!("   Indexed {} documents", indexed);
    info!("Demo documents indexed");

    println!();
    println!("{} {}", style("❓ Question:").bold().cyan(), DEMO_QUESTION);
    let answer = context.query(DEMO_QUESTION).await?;
    println!("{}", style("💡 Answer:").bold().cyan());
    println!("{}", answer);
    Ok(())
}

fn print_structured(answer: &StructuredAnswer) {
    println!("{}", style("Answer:").bold().cyan());
    println!("{}", answer.answer);
    println!();
    println!(
        "{} {:.2}",
        style("Confidence:").bold().yellow(),
        answer.confidence
    );
    if answer.sources.is_empty() {
        println!("{}", style("Sources: none").dim());
    } else {
        println!("{}", style("Sources:").bold().yellow());
        for source in &answer.sources {
            println!("  - {}", source);
        }
    }
}
