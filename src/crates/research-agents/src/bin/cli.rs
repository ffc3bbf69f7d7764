//! `research-agents-cli`: a `clap`-derived binary with `serve` and `ask`
//! subcommands, following the teacher's `orchestrator-server` binary idiom
//! (tracing-subscriber from `RUST_LOG`, config loading with a warn-and-fall
//! back-to-defaults posture, `axum::serve(...).with_graceful_shutdown(...)`).
//!
//! Wires a real `OpenAiCompatibleClient` when `RESEARCH_AGENTS_LLM_BASE_URL`
//! and `RESEARCH_AGENTS_LLM_API_KEY` are both set in the environment;
//! otherwise falls back to the in-memory fakes, same as the test suite, so
//! both commands work out of the box against nothing but the sample corpus.

use clap::{Parser, Subcommand};
use llm::openai_compatible::{OpenAiCompatibleClient, OpenAiCompatibleConfig};
use llm::ChatModel;
use research_agents::agents::Deps;
use research_agents::api::AppState;
use research_agents::cache::AnswerCache;
use research_agents::config::Config;
use research_agents::memory::ConversationMemory;
use research_agents::providers::fake::{FakeGraphStore, FakeWebSearch, NoopReranker, SeedChunk};
use research_agents::workflow;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::sync::Mutex;

#[derive(Parser)]
#[command(name = "research-agents-cli", about = "Building-code question answering engine")]
struct Cli {
    /// Path to a TOML config file; falls back to built-in defaults if absent.
    #[arg(long, default_value = "research-agents.toml")]
    config: String,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run the HTTP API.
    Serve {
        #[arg(long, env = "HOST", default_value = "127.0.0.1")]
        host: String,
        #[arg(long, env = "PORT", default_value_t = 8080)]
        port: u16,
    },
    /// Run a single turn against stdin-given session id and print the result.
    Ask {
        /// The question to ask.
        query: String,
        #[arg(long, default_value = "cli")]
        session_id: String,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let rust_log = std::env::var("RUST_LOG").unwrap_or_else(|_| "info".to_string());
    tracing_subscriber::fmt().with_env_filter(rust_log).init();

    let cli = Cli::parse();
    let config = match Config::load(&cli.config) {
        Ok(config) => config,
        Err(err) => {
            tracing::warn!("failed to load {}: {err}. Using defaults.", cli.config);
            Config::default()
        }
    };
    let deps = build_deps(config);

    match cli.command {
        Command::Serve { host, port } => serve(deps, &host, port).await,
        Command::Ask { query, session_id } => ask(deps, query, session_id).await,
    }
}

/// Builds the long-lived [`Deps`] template shared across turns. Each turn
/// gets its own copy via [`workflow::deps_for_turn`].
fn build_deps(config: Config) -> Deps {
    let llm: Arc<dyn ChatModel> = match real_llm_client() {
        Some(client) => {
            tracing::info!("using OpenAI-compatible LLM backend");
            client
        }
        None => {
            tracing::warn!(
                "RESEARCH_AGENTS_LLM_BASE_URL/RESEARCH_AGENTS_LLM_API_KEY not set; \
                 falling back to the in-memory scripted model and sample corpus"
            );
            Arc::new(llm::scripted::ScriptedModel::new(
                "I don't have enough information to answer that.",
            ))
        }
    };

    Deps {
        llm,
        graph_store: Arc::new(sample_corpus()),
        web_search: Arc::new(FakeWebSearch::new(vec![])),
        reranker: Arc::new(NoopReranker),
        cache: AnswerCache::new(config.cache_ttl(), config.cache_build_wait_timeout()),
        memory: ConversationMemory::new(),
        config: Arc::new(config),
        pending_build: Arc::new(Mutex::new(None)),
    }
}

fn real_llm_client() -> Option<Arc<dyn ChatModel>> {
    let base_url = std::env::var("RESEARCH_AGENTS_LLM_BASE_URL").ok()?;
    let api_key = std::env::var("RESEARCH_AGENTS_LLM_API_KEY").ok()?;
    let mut config = OpenAiCompatibleConfig::new(base_url, api_key);
    if let (Ok(quality), Ok(fast)) = (
        std::env::var("RESEARCH_AGENTS_LLM_QUALITY_MODEL"),
        std::env::var("RESEARCH_AGENTS_LLM_FAST_MODEL"),
    ) {
        config = config.with_models(quality, fast);
    }
    Some(Arc::new(OpenAiCompatibleClient::new(config)))
}

/// A handful of seeded chunks so `ask`/`serve` have something to retrieve
/// against without a real knowledge-graph store configured. Not a stand-in
/// for the real corpus — just enough to exercise the fast path end to end.
fn sample_corpus() -> FakeGraphStore {
    FakeGraphStore::new()
        .seed(SeedChunk {
            uid: "1607.9.1".into(),
            title: Some("Table 1607.9.1".into()),
            text: "Live load reduction factors for members supporting large tributary areas."
                .into(),
        })
        .seed(SeedChunk {
            uid: "1607".into(),
            title: Some("Section 1607".into()),
            text: "Minimum uniformly distributed and concentrated live loads.".into(),
        })
}

async fn serve(deps: Deps, host: &str, port: u16) -> anyhow::Result<()> {
    let state = AppState::new(deps)?;
    let app = research_agents::api::router(state);

    let addr: SocketAddr = format!("{host}:{port}").parse()?;
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!("listening on {addr}");

    axum::serve(listener, app.into_make_service())
        .with_graceful_shutdown(shutdown_signal())
        .await?;
    tracing::info!("shut down gracefully");
    Ok(())
}

async fn ask(deps: Deps, query: String, session_id: String) -> anyhow::Result<()> {
    let compiled = workflow::build()?;
    let turn_deps = workflow::deps_for_turn(&deps);
    let final_state = workflow::run_turn(&compiled, query, session_id, turn_deps).await?;

    match final_state.final_answer {
        Some(answer) => println!("{answer}"),
        None => println!("(no answer produced; workflow_status = {:?})", final_state.workflow_status),
    }
    if let Some(confidence) = final_state.confidence {
        println!("confidence: {confidence:.2}");
    }
    if let Some(citations) = final_state.citations {
        for citation in citations {
            println!("  [{:?}] {}", citation.source_tag, citation.uid);
        }
    }
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("failed to install CTRL-C signal handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => tracing::info!("received CTRL-C, shutting down"),
        _ = terminate => tracing::info!("received SIGTERM, shutting down"),
    }
}
