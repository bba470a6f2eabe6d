#[cfg(test)]
mod tests;

use anyhow::{Context, Result};
use console::style;
use dialoguer::{Confirm, Input, Password, Select};

use super::{Config, ConfigError, OpenAiConfig, PineconeConfig};
use crate::database::Metric;

#[inline]
pub fn run_interactive_config() -> Result<()> {
    eprintln!("{}", style("🔧 RAG Agent Configuration Setup").bold().cyan());
    eprintln!();

    let mut config = load_existing_config()?;

    eprintln!("{}", style("OpenAI Configuration").bold().yellow());
    eprintln!("Used for both embeddings and answer generation.");
    eprintln!();
    configure_openai(&mut config.openai)?;

    eprintln!();
    eprintln!("{}", style("Pinecone Configuration").bold().yellow());
    eprintln!("The vector index documents are stored in and retrieved from.");
    eprintln!();
    configure_pinecone(&mut config.pinecone)?;

    eprintln!();
    if Confirm::new()
        .with_prompt("Save configuration?")
        .default(true)
        .interact()?
    {
        let config_path = config.save().context("Failed to save configuration")?;
        eprintln!("{}", style("✓ Configuration saved successfully!").green());
        eprintln!(
            "Configuration saved to: {}",
            style(config_path.display()).cyan()
        );
    } else {
        eprintln!("Configuration not saved.");
    }

    Ok(())
}

#[inline]
pub fn show_config() -> Result<()> {
    let config = Config::load().context("Failed to load configuration")?;

    eprintln!("{}", style("📋 Current Configuration").bold().cyan());
    eprintln!();

    eprintln!("{}", style("OpenAI Settings:").bold().yellow());
    eprintln!("  API Key: {}", style(mask_secret(&config.openai.api_key)).cyan());
    eprintln!("  Base URL: {}", style(&config.openai.base_url).cyan());
    eprintln!(
        "  Embedding Model: {} ({} dimensions)",
        style(&config.openai.embedding_model).cyan(),
        config.openai.embedding_dimension
    );
    eprintln!("  Chat Model: {}", style(&config.openai.chat_model).cyan());

    eprintln!();
    eprintln!("{}", style("Pinecone Settings:").bold().yellow());
    eprintln!(
        "  API Key: {}",
        style(mask_secret(&config.pinecone.api_key)).cyan()
    );
    eprintln!("  Index: {}", style(&config.pinecone.index_name).cyan());
    eprintln!(
        "  Region: {} ({})",
        style(&config.pinecone.environment).cyan(),
        config.pinecone.cloud
    );
    eprintln!("  Metric: {}", style(config.pinecone.metric).cyan());
    if let Some(host) = &config.pinecone.index_host {
        eprintln!("  Index Host: {}", style(host).cyan());
    }

    eprintln!();
    eprintln!("{}", style("Retrieval Settings:").bold().yellow());
    eprintln!("  Top K: {}", style(config.retrieval.top_k).cyan());
    eprintln!(
        "  Relevance Threshold: {}",
        style(config.retrieval.relevance_threshold).cyan()
    );
    eprintln!(
        "  Max Tool Rounds: {}",
        style(config.retrieval.max_tool_rounds).cyan()
    );

    let config_path = Config::config_file_path().context("Failed to get config file path")?;
    eprintln!();
    eprintln!("Config file: {}", style(config_path.display()).dim());

    Ok(())
}

/// Render a secret as its last four characters
pub(crate) fn mask_secret(secret: &str) -> String {
    let chars: Vec<char> = secret.chars().collect();
    match chars.len() {
        0 => "(not set)".to_string(),
        n if n <= 8 => "****".to_string(),
        n => format!("****{}", chars[n - 4..].iter().collect::<String>()),
    }
}

/// File contents only; environment overrides must not end up in the saved file
pub(crate) fn load_file_config() -> Result<Config> {
    let config_dir = Config::config_dir().context("Failed to determine config directory")?;
    Config::load_from(config_dir)
}

fn load_existing_config() -> Result<Config> {
    load_file_config().map_or_else(
        |_| {
            eprintln!(
                "{}",
                style("No existing configuration found. Using defaults.").yellow()
            );
            Ok(Config::default())
        },
        |config| {
            eprintln!("{}", style("Found existing configuration.").green());
            Ok(config)
        },
    )
}

fn configure_openai(openai: &mut OpenAiConfig) -> Result<()> {
    let api_key = Password::new()
        .with_prompt("OpenAI API key (leave empty to keep current)")
        .allow_empty_password(true)
        .interact()?;

    let embedding_model: String = Input::new()
        .with_prompt("Embedding model")
        .default(openai.embedding_model.clone())
        .validate_with(|input: &String| -> Result<(), &str> {
            if input.trim().is_empty() {
                Err("Model name cannot be empty")
            } else {
                Ok(())
            }
        })
        .interact_text()?;

    let chat_model: String = Input::new()
        .with_prompt("Chat model")
        .default(openai.chat_model.clone())
        .validate_with(|input: &String| -> Result<(), &str> {
            if input.trim().is_empty() {
                Err("Model name cannot be empty")
            } else {
                Ok(())
            }
        })
        .interact_text()?;

    if !api_key.trim().is_empty() {
        openai.api_key = api_key.trim().to_string();
    }
    openai.set_embedding_model(embedding_model)?;
    openai.set_chat_model(chat_model)?;

    Ok(())
}

fn configure_pinecone(pinecone: &mut PineconeConfig) -> Result<()> {
    let api_key = Password::new()
        .with_prompt("Pinecone API key (leave empty to keep current)")
        .allow_empty_password(true)
        .interact()?;

    let index_name: String = Input::new()
        .with_prompt("Index name")
        .default(pinecone.index_name.clone())
        .validate_with(|input: &String| -> Result<(), ConfigError> {
            let mut candidate = pinecone.clone();
            candidate.set_index_name(input.clone())
        })
        .interact_text()?;

    let environment: String = Input::new()
        .with_prompt("Serverless region")
        .default(pinecone.environment.clone())
        .interact_text()?;

    let metrics = [Metric::Cosine, Metric::Euclidean, Metric::DotProduct];
    let default_index = metrics
        .iter()
        .position(|&m| m == pinecone.metric)
        .unwrap_or(0);
    let metric_index = Select::new()
        .with_prompt("Similarity metric")
        .default(default_index)
        .items(&metrics)
        .interact()?;

    if !api_key.trim().is_empty() {
        pinecone.api_key = api_key.trim().to_string();
    }
    pinecone.set_index_name(index_name)?;
    pinecone.set_environment(environment)?;
    pinecone.metric = metrics[metric_index];

    Ok(())
}
