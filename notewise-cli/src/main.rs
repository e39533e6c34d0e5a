use anyhow::Result;
use clap::{Parser, Subcommand};
use notewise_common::config::Config;
use notewise_common::logging::init_logging;
use notewise_common::validation::Validate;
use std::path::PathBuf;

mod commands;
mod document;

/// Notewise - ask questions about your notes with bounded AI context.
#[derive(Parser, Debug)]
#[command(name = "notewise")]
#[command(version)]
#[command(about = "Ask questions about your notes with bounded AI context.", long_about = None)]
struct Cli {
    /// Configuration directory (defaults to ~/.notewise)
    #[arg(long, global = true)]
    config_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// List known models and their recommended context budgets
    Models {
        /// Only show models of this provider (poe, ollama)
        #[arg(long)]
        provider: Option<String>,
    },

    /// Ask a question about a document, streaming the answer
    Ask {
        /// The question
        prompt: String,

        /// Document to ask about: plain text, or an editor JSON export (.json)
        #[arg(short, long)]
        file: PathBuf,

        /// Key for the saved summary (defaults to the file name)
        #[arg(long)]
        document_id: Option<String>,

        /// Provider to route to (defaults to ai.default_provider)
        #[arg(short, long)]
        provider: Option<String>,

        /// Model to use (defaults to ai.default_model)
        #[arg(short, long)]
        model: Option<String>,

        /// Send the whole document without summarization
        #[arg(long)]
        no_context: bool,
    },

    /// Inspect or clear saved summaries
    Summary {
        #[command(subcommand)]
        action: SummaryCommands,
    },
}

#[derive(Subcommand, Debug)]
enum SummaryCommands {
    /// Print the saved summary of a document
    Show { document_id: String },
    /// Delete the saved summary of a document
    Clear { document_id: String },
    /// Replace the saved summary with edited text
    Set {
        document_id: String,
        /// Read the summary from this file instead of stdin
        #[arg(short, long)]
        file: Option<PathBuf>,
    },
    /// Rebuild the saved summary from the document's current content
    Regenerate {
        document_id: String,

        /// Document to summarize: plain text, or an editor JSON export (.json)
        #[arg(short, long)]
        file: PathBuf,

        /// Provider to summarize with (defaults to ai.default_provider)
        #[arg(short, long)]
        provider: Option<String>,

        /// Model to use (defaults to ai.default_model)
        #[arg(short, long)]
        model: Option<String>,
    },
}

fn load_config(dir: Option<&PathBuf>) -> Result<Config> {
    let config = match dir {
        Some(dir) => {
            let mut config = Config::load_from_dir(dir)?;
            config.apply_env_overrides();
            config.validate()?;
            config
        }
        None => Config::load_with_env()?,
    };
    Ok(config)
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let config = load_config(cli.config_dir.as_ref())?;

    init_logging(
        &config.observability.log_level,
        &config.observability.log_format,
    );

    match cli.command {
        Commands::Models { provider } => commands::models(&config, provider.as_deref()),

        Commands::Ask {
            prompt,
            file,
            document_id,
            provider,
            model,
            no_context,
        } => {
            commands::ask(
                &config,
                commands::AskArgs {
                    prompt,
                    file,
                    document_id,
                    provider,
                    model,
                    no_context,
                },
            )
            .await
        }

        Commands::Summary { action } => match action {
            SummaryCommands::Show { document_id } => {
                commands::summary_show(&config, &document_id).await
            }
            SummaryCommands::Clear { document_id } => {
                commands::summary_clear(&config, &document_id).await
            }
            SummaryCommands::Set { document_id, file } => {
                commands::summary_set(&config, &document_id, file.as_deref(), std::io::stdin())
                    .await
            }
            SummaryCommands::Regenerate {
                document_id,
                file,
                provider,
                model,
            } => {
                commands::summary_regenerate(
                    &config,
                    commands::RegenerateArgs {
                        document_id,
                        file,
                        provider,
                        model,
                    },
                )
                .await
            }
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn cli_definition_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn parses_ask() {
        let cli = Cli::try_parse_from([
            "notewise", "ask", "What changed?", "-f", "notes.md", "-m", "llama2", "--no-context",
        ])
        .unwrap();
        match cli.command {
            Commands::Ask {
                prompt,
                file,
                model,
                no_context,
                ..
            } => {
                assert_eq!(prompt, "What changed?");
                assert_eq!(file, PathBuf::from("notes.md"));
                assert_eq!(model.as_deref(), Some("llama2"));
                assert!(no_context);
            }
            other => panic!("unexpected command {other:?}"),
        }
    }

    #[test]
    fn parses_summary_regenerate() {
        let cli = Cli::try_parse_from([
            "notewise", "summary", "regenerate", "notes", "-f", "notes.json", "-p", "ollama",
        ])
        .unwrap();
        match cli.command {
            Commands::Summary {
                action:
                    SummaryCommands::Regenerate {
                        document_id,
                        file,
                        provider,
                        model,
                    },
            } => {
                assert_eq!(document_id, "notes");
                assert_eq!(file, PathBuf::from("notes.json"));
                assert_eq!(provider.as_deref(), Some("ollama"));
                assert_eq!(model, None);
            }
            other => panic!("unexpected command {other:?}"),
        }
    }

    #[test]
    fn load_config_from_dir_applies_file_values() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(
            dir.path().join("config.json"),
            r#"{"observability": {"log_format": "json"}}"#,
        )
        .unwrap();
        let config = load_config(Some(&dir.path().to_path_buf())).unwrap();
        assert_eq!(config.observability.log_format, "json");
    }
}
