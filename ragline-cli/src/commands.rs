//! CLI subcommand handlers.

use crate::Commands;
use crate::ConfigAction;
use ragline_core::config::RaglineConfig;
use ragline_core::error::{ConfigError, RagError};
use ragline_core::index::ChromaIndex;
use ragline_core::types::{RagEvent, RagResult, SourceRecord};
use ragline_core::{OpenAiEmbedder, RagController, create_provider, validate_question};
use std::io::Write;
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::mpsc;
use tracing::{info, warn};

/// Handle a CLI subcommand.
pub async fn handle_command(
    command: Commands,
    config: &RaglineConfig,
    quiet: bool,
) -> anyhow::Result<()> {
    match command {
        Commands::Ask {
            question,
            no_stream,
            json,
        } => {
            validate_question(&question)?;
            let controller = build_controller(config)?;
            let output = OutputMode::select(no_stream, json);
            let completed =
                answer(&controller, &question, output, config).await?;
            if !completed {
                anyhow::bail!("Interrupted");
            }
            Ok(())
        }
        Commands::Chat => {
            let controller = build_controller(config)?;
            run_chat(&controller, config, quiet).await
        }
        Commands::Config { action } => match action {
            ConfigAction::Show => {
                println!("{}", toml::to_string_pretty(config)?);
                Ok(())
            }
        },
        Commands::Status => {
            println!("{}", status_report());
            Ok(())
        }
    }
}

/// How an answer is written to stdout.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum OutputMode {
    Stream,
    Buffered,
    Json,
}

impl OutputMode {
    fn select(no_stream: bool, json: bool) -> Self {
        match (no_stream, json) {
            (_, true) => OutputMode::Json,
            (true, false) => OutputMode::Buffered,
            (false, false) => OutputMode::Stream,
        }
    }
}

/// Wire the Chroma index, embedder and LLM provider from configuration.
fn build_controller(config: &RaglineConfig) -> anyhow::Result<RagController> {
    let embedding_key_env = &config.embedding.api_key_env;
    let embedding_key = std::env::var(embedding_key_env).map_err(|_| ConfigError::EnvVarMissing {
        var: embedding_key_env.clone(),
    })?;
    let embedder = Arc::new(OpenAiEmbedder::new(embedding_key, &config.embedding));

    let index_token = config
        .index
        .api_key_env
        .as_deref()
        .and_then(|var| std::env::var(var).ok());
    let index = Arc::new(ChromaIndex::new(&config.index, index_token, embedder));

    let provider = create_provider(&config.llm)?;
    info!(
        index = %config.index.url,
        model = provider.model_name(),
        collection = %config.rag.default_collection,
        "Engine ready"
    );
    Ok(RagController::from_config(config, index, provider))
}

/// Answer one question and print it. Returns `false` when interrupted by Ctrl-C.
async fn answer(
    controller: &RagController,
    question: &str,
    output: OutputMode,
    config: &RaglineConfig,
) -> anyhow::Result<bool> {
    let result = match output {
        OutputMode::Stream => {
            let (tx, mut rx) = mpsc::channel::<RagEvent>(config.rag.stream_buffer);
            let printer = tokio::spawn(async move {
                let mut stdout = std::io::stdout();
                while let Some(RagEvent::Token { content }) = rx.recv().await {
                    let _ = write!(stdout, "{}", content);
                    let _ = stdout.flush();
                }
            });

            let outcome = tokio::select! {
                result = controller.ask_streaming(question, None, &tx) => Some(result),
                _ = tokio::signal::ctrl_c() => None,
            };
            drop(tx);
            let _ = printer.await;
            println!();

            match outcome {
                Some(result) => result?,
                None => {
                    warn!("Generation interrupted by user");
                    return Ok(false);
                }
            }
        }
        OutputMode::Buffered | OutputMode::Json => {
            let outcome = tokio::select! {
                result = controller.ask(question, None) => Some(result),
                _ = tokio::signal::ctrl_c() => None,
            };
            match outcome {
                Some(result) => result?,
                None => return Ok(false),
            }
        }
    };

    match output {
        OutputMode::Json => println!("{}", serde_json::to_string_pretty(&result)?),
        OutputMode::Buffered => {
            println!("{}", result.answer);
            print_sources(&result);
        }
        OutputMode::Stream => print_sources(&result),
    }
    Ok(true)
}

fn print_sources(result: &RagResult) {
    let rendered = render_sources(&result.sources);
    if !rendered.is_empty() {
        println!("\nSources:\n{}", rendered);
    }
}

/// Render citation records as a numbered list matching the `[n]` markers.
fn render_sources(sources: &[SourceRecord]) -> String {
    sources
        .iter()
        .enumerate()
        .map(|(i, record)| {
            let mut line = format!("  [{}] {}", i + 1, record.source.as_deref().unwrap_or("unknown"));
            if let Some(chunk) = record.chunk {
                line.push_str(&format!(" (chunk {})", chunk));
            }
            if let Some(id) = &record.id {
                line.push_str(&format!(" id={}", id));
            }
            line
        })
        .collect::<Vec<_>>()
        .join("\n")
}

/// Interactive loop. One controller serves every question, so the collection
/// pipeline is built once and reused.
async fn run_chat(
    controller: &RagController,
    config: &RaglineConfig,
    quiet: bool,
) -> anyhow::Result<()> {
    if !quiet {
        println!(
            "Chatting with collection '{}'. Type 'exit' or press Ctrl-D to quit.",
            controller.default_collection()
        );
    }

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        print!("\n> ");
        std::io::stdout().flush()?;

        let Some(line) = lines.next_line().await? else {
            break;
        };
        let question = line.trim();
        if matches!(question, "exit" | "quit") {
            break;
        }
        if let Err(e) = validate_question(question) {
            eprintln!("{}", e);
            continue;
        }

        match answer(controller, question, OutputMode::Stream, config).await {
            Ok(true) => {}
            Ok(false) => eprintln!("(interrupted)"),
            // Keep the session alive on per-question failures.
            Err(e) if is_recoverable(&e) => eprintln!("Error: {}", e),
            Err(e) => return Err(e),
        }
    }
    Ok(())
}

/// Failures that only affect the current question.
fn is_recoverable(err: &anyhow::Error) -> bool {
    matches!(
        err.downcast_ref::<RagError>(),
        Some(RagError::Retrieval(_) | RagError::Generation(_) | RagError::Validation(_))
    )
}

/// Service status line, the same shape a health endpoint would return.
fn status_report() -> serde_json::Value {
    serde_json::json!({
        "status": "ok",
        "service": "ragline",
        "version": env!("CARGO_PKG_VERSION"),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use ragline_core::error::RetrievalError;

    #[test]
    fn test_output_mode_selection() {
        assert_eq!(OutputMode::select(false, false), OutputMode::Stream);
        assert_eq!(OutputMode::select(true, false), OutputMode::Buffered);
        assert_eq!(OutputMode::select(false, true), OutputMode::Json);
        assert_eq!(OutputMode::select(true, true), OutputMode::Json);
    }

    #[test]
    fn test_render_sources() {
        let sources = vec![
            SourceRecord {
                source: Some("handbook.md".into()),
                chunk: Some(2),
                id: Some("hb-2".into()),
            },
            SourceRecord::default(),
        ];
        assert_eq!(
            render_sources(&sources),
            "  [1] handbook.md (chunk 2) id=hb-2\n  [2] unknown"
        );
        assert_eq!(render_sources(&[]), "");
    }

    #[test]
    fn test_status_report() {
        let status = status_report();
        assert_eq!(status["status"], "ok");
        assert_eq!(status["service"], "ragline");
    }

    #[test]
    fn test_recoverable_errors() {
        let retrieval = anyhow::Error::from(RagError::from(RetrievalError::CollectionNotFound {
            name: "docs".into(),
        }));
        assert!(is_recoverable(&retrieval));

        let config = anyhow::Error::from(RagError::from(ConfigError::Invalid {
            message: "bad".into(),
        }));
        assert!(!is_recoverable(&config));
        assert!(!is_recoverable(&anyhow::anyhow!("stdin closed")));
    }

    #[tokio::test]
    async fn test_ask_rejects_empty_question_before_wiring() {
        let command = Commands::Ask {
            question: "   ".into(),
            no_stream: true,
            json: false,
        };
        let err = handle_command(command, &RaglineConfig::default(), true)
            .await
            .unwrap_err();
        assert_eq!(err.to_string(), "Question must not be empty");
    }

    #[tokio::test]
    async fn test_config_show() {
        let command = Commands::Config {
            action: ConfigAction::Show,
        };
        assert!(
            handle_command(command, &RaglineConfig::default(), true)
                .await
                .is_ok()
        );
    }
}
