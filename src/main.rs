use std::path::PathBuf;

use clap::{Parser, Subcommand};
use rag_agent::Result;
use rag_agent::commands::{ask, index_file, run_demo};
use rag_agent::config::{run_interactive_config, show_config};

#[derive(Parser)]
#[command(name = "rag-agent")]
#[command(about = "Retrieval-augmented question answering over a Pinecone index")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Configure OpenAI and Pinecone credentials and settings
    Config {
        /// Show current configuration
        #[arg(long)]
        show: bool,
    },
    /// Index documents from a JSON file
    Index {
        /// JSON array of objects with "text" and optional "metadata"
        file: PathBuf,
    },
    /// Ask a question answered from the indexed documents
    Query {
        question: String,
        /// Return an answer with sources and a confidence score
        #[arg(long)]
        structured: bool,
    },
    /// Index a few sample documents and ask a question about them
    Demo,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Config { show } => {
            if show {
                show_config()?;
            } else {
                run_interactive_config()?;
            }
        }
        Commands::Index { file } => {
            index_file(&file).await?;
        }
        Commands::Query {
            question,
            structured,
        } => {
            ask(&question, structured).await?;
        }
        Commands::Demo => {
            run_demo().await?;
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::error::ErrorKind;

    #[test]
    fn demo_command() {
        let cli = Cli::try_parse_from(["rag-agent", "demo"]);
        assert!(cli.is_ok());

        if let Ok(parsed) = cli {
            assert!(matches!(parsed.command, Commands::Demo));
        }
    }

    #[test]
    fn index_command_with_file() {
        let cli = Cli::try_parse_from(["rag-agent", "index", "documents.json"]);
        assert!(cli.is_ok());

        if let Ok(parsed) = cli {
            if let Commands::Index { file } = parsed.command {
                assert_eq!(file, PathBuf::from("documents.json"));
            }
        }
    }

    #[test]
    fn index_command_requires_file() {
        let cli = Cli::try_parse_from(["rag-agent", "index"]);
        assert!(cli.is_err());

        if let Err(err) = cli {
            assert_eq!(err.kind(), ErrorKind::MissingRequiredArgument);
        }
    }

    #[test]
    fn query_command() {
        let cli = Cli::try_parse_from(["rag-agent", "query", "why is the sky blue?"]);
        assert!(cli.is_ok());

        if let Ok(parsed) = cli {
            if let Commands::Query {
                question,
                structured,
            } = parsed.command
            {
                assert_eq!(question, "why is the sky blue?");
                assert!(!structured);
            }
        }
    }

    #[test]
    fn query_structured_flag() {
        let cli = Cli::try_parse_from(["rag-agent", "query", "--structured", "what boils?"]);
        assert!(cli.is_ok());

        if let Ok(parsed) = cli {
            if let Commands::Query {
                question,
                structured,
            } = parsed.command
            {
                assert_eq!(question, "what boils?");
                assert!(structured);
            }
        }
    }

    #[test]
    fn config_show_flag() {
        let cli = Cli::try_parse_from(["rag-agent", "config", "--show"]);
        assert!(cli.is_ok());

        if let Ok(parsed) = cli {
            if let Commands::Config { show } = parsed.command {
                assert!(show);
            }
        }
    }

    #[test]
    fn invalid_command() {
        let cli = Cli::try_parse_from(["rag-agent", "invalid"]);
        assert!(cli.is_err());

        if let Err(err) = cli {
            assert_eq!(err.kind(), ErrorKind::InvalidSubcommand);
        }
    }

    #[test]
    fn help_message() {
        let cli = Cli::try_parse_from(["rag-agent", "--help"]);
        assert!(cli.is_err());

        if let Err(err) = cli {
            assert_eq!(err.kind(), ErrorKind::DisplayHelp);
        }
    }
}
