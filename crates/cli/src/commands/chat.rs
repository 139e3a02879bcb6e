//! `docchat chat`: Ask questions about documents.

use std::io::Write;
use std::path::{Path, PathBuf};

use docchat_agent::{
    AnswerStatus, ChatAnswer, ChatHistory, ChatSession, ChatStreamEvent, SessionOptions,
};
use docchat_config::AppConfig;
use docchat_core::document::RetrievalResult;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::warn;

pub struct ChatArgs {
    pub docs: Vec<PathBuf>,
    pub message: Option<String>,
    pub stream: bool,
    pub top_k: Option<usize>,
}

pub async fn run(args: ChatArgs) -> Result<(), Box<dyn std::error::Error>> {
    let config = AppConfig::load().map_err(|e| format!("Failed to load config: {e}"))?;

    let mut options = SessionOptions::from(&config.rag);
    if let Some(top_k) = args.top_k {
        if top_k == 0 {
            return Err("--top-k must be at least 1".into());
        }
        options.top_k = top_k;
    }

    let providers = docchat_providers::build_from_config(&config);
    if providers.generator.is_none() {
        print_missing_generator_help(&config);
    }

    let mut session = ChatSession::new(providers.embedder, providers.generator, options)?;
    if config.history.enabled {
        session = session.with_history(ChatHistory::open(config.history_path()));
    }

    for path in &args.docs {
        load_document(&mut session, path).await?;
    }
    if session.knowledge().documents().is_empty() {
        eprintln!("  No documents loaded. Pass one or more with --doc <PATH>.");
    }

    if let Some(msg) = args.message {
        answer(&session, &msg, args.stream).await?;
        return Ok(());
    }

    // Interactive mode
    println!();
    println!("  docchat interactive mode");
    println!();
    println!("  Generation: {} ({})", config.generation.provider, config.generation.model);
    println!("  Embedding:  {}", config.embedding.provider);
    println!("  Documents:  {}", session.knowledge().documents().len());
    println!();
    println!("  Type a question and press Enter.");
    println!("  /clear forgets the conversation, /docs lists documents, exit quits.");
    println!();

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        print!("  You > ");
        std::io::stdout().flush()?;

        let Some(line) = lines.next_line().await? else {
            break;
        };
        let line = line.trim();
        match line {
            "" => continue,
            "exit" | "quit" => break,
            "/clear" => {
                session.clear_conversation().await;
                println!("  Conversation cleared.");
            }
            "/docs" => {
                for doc in session.knowledge().documents() {
                    println!("  - {} ({} chars)", doc.name, doc.content.chars().count());
                }
            }
            question => answer(&session, question, args.stream).await?,
        }
        println!();
    }

    Ok(())
}

async fn load_document(
    session: &mut ChatSession,
    path: &Path,
) -> Result<(), Box<dyn std::error::Error>> {
    let text = std::fs::read_to_string(path)
        .map_err(|e| format!("Failed to read {}: {e}", path.display()))?;
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string());

    match session.ingest(name.clone(), text).await {
        Ok(chunks) => println!("  Indexed {name} ({chunks} chunks)"),
        Err(e) => {
            warn!(document = %name, error = %e, "Indexing failed");
            eprintln!("  Could not index {name}: {e}");
            eprintln!("  Answers will use document excerpts instead of retrieved sections.");
        }
    }
    Ok(())
}

async fn answer(
    session: &ChatSession,
    question: &str,
    stream: bool,
) -> Result<(), Box<dyn std::error::Error>> {
    if stream {
        return answer_streaming(session, question).await;
    }

    eprint!("  Thinking...");
    let ChatAnswer {
        answer: text,
        sources,
        status,
        ..
    } = session.ask(question).await;
    eprint!("\r              \r");

    println!();
    for line in text.lines() {
        println!("  {line}");
    }
    print_sources(&sources, status);
    Ok(())
}

async fn answer_streaming(
    session: &ChatSession,
    question: &str,
) -> Result<(), Box<dyn std::error::Error>> {
    let mut stream = session.ask_stream(question).await;

    let canceller = stream.canceller();
    let ctrl_c = tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            canceller.cancel();
        }
    });

    let mut sources = Vec::new();
    println!();
    print!("  ");
    while let Some(event) = stream.next().await {
        match event {
            ChatStreamEvent::Sources { sources: found } => sources = found,
            ChatStreamEvent::Chunk { content } => {
                print!("{}", content.replace('\n', "\n  "));
                std::io::stdout().flush()?;
            }
            ChatStreamEvent::Done { status, .. } => {
                println!();
                print_sources(&sources, status);
            }
            ChatStreamEvent::Error { message } => {
                println!();
                println!("  {message}");
            }
            ChatStreamEvent::Cancelled => {
                println!();
                println!("  [cancelled]");
            }
        }
    }

    ctrl_c.abort();
    Ok(())
}

fn print_sources(sources: &[RetrievalResult], status: AnswerStatus) {
    match status {
        AnswerStatus::Grounded => {
            println!();
            println!("  Sources:");
            for (rank, r) in sources.iter().enumerate() {
                println!(
                    "    [{}] {} section {} (similarity {:.3})",
                    rank + 1,
                    r.chunk.document_name,
                    r.chunk.chunk_index + 1,
                    r.similarity
                );
            }
        }
        AnswerStatus::Fallback => {
            println!();
            println!("  (no matching sections; answered from document excerpts)");
        }
        AnswerStatus::Unavailable => {}
    }
}

fn print_missing_generator_help(config: &AppConfig) {
    eprintln!();
    eprintln!("  WARNING: No generation provider is available.");
    eprintln!("  Questions will be answered with an 'unavailable' message.");
    eprintln!();
    eprintln!("  Set one of these environment variables:");
    eprintln!("    DOCCHAT_API_KEY=sk-...   (generic)");
    eprintln!("    OPENAI_API_KEY=sk-...    (OpenAI)");
    eprintln!();
    eprintln!("  Or configure a provider in:");
    eprintln!("    {}", AppConfig::config_dir().join("config.toml").display());
    eprintln!("  (current generation provider: {})", config.generation.provider);
    eprintln!();
}
