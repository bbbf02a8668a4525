use std::io::Write;
use std::pin::pin;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use futures::{Stream, StreamExt};
use lawgpt_rag::{
    ChatSession, DirectoryIndexStore, FlatVectorIndex, RagError, RagPipeline, fragments,
};
use rustyline::DefaultEditor;
use rustyline::error::ReadlineError;
use tracing::{debug, info};

use crate::cli::ChatArgs;
use crate::models;

const DISCLAIMER: &str = "⚠️ Note: Information provided may be inaccurate.";
const TYPING_FRAGMENT_CHARS: usize = 2;
const TYPING_DELAY: Duration = Duration::from_millis(20);

/// A line typed at the prompt.
#[derive(Debug, PartialEq)]
enum Input<'a> {
    Quit,
    Reset,
    Help,
    Question(&'a str),
    Empty,
}

fn parse_input(line: &str) -> Input<'_> {
    match line.trim() {
        "" => Input::Empty,
        "/quit" | "/exit" => Input::Quit,
        "/reset" => Input::Reset,
        "/help" => Input::Help,
        question => Input::Question(question),
    }
}

pub async fn run(args: ChatArgs) -> Result<()> {
    let mut config = models::base_config(&args.model)?;
    if let Some(top_k) = args.top_k {
        config.top_k = top_k;
    }
    if let Some(model) = &args.model_name {
        config.generation.model = model.clone();
    }
    if let Some(temperature) = args.temperature {
        config.generation.temperature = temperature;
    }
    config.validate()?;

    let embedder = models::embedding_provider(&args.model)?;
    let store = DirectoryIndexStore::new(&args.index);
    let index = FlatVectorIndex::load_expecting(&store, embedder.dimensions())
        .await
        .with_context(|| format!("failed to open index at {}", args.index.display()))?;
    let generator =
        models::generator(&args.model, &config.generation, args.generation_url.as_deref())?;

    let pipeline = RagPipeline::builder()
        .config(config)
        .embedding_provider(embedder)
        .vector_index(Arc::new(index))
        .generator(generator)
        .build()?;

    let entries = pipeline.vector_index().len().await;
    let mut session = ChatSession::new(pipeline.config().memory_window);
    info!(session = %session.id(), entries, "chat session started");

    println!("LawGPT: ask about the Indian Penal Code.");
    println!("/reset clears the conversation, /quit exits, Ctrl-C cancels an answer.");
    if entries == 0 {
        println!("The index is empty; answers will not cite any provisions.");
    }

    let mut editor = DefaultEditor::new()?;
    loop {
        let line = match editor.readline("You> ") {
            Ok(line) => line,
            Err(ReadlineError::Interrupted | ReadlineError::Eof) => break,
            Err(e) => return Err(e.into()),
        };

        match parse_input(&line) {
            Input::Empty => continue,
            Input::Quit => break,
            Input::Help => {
                println!("Type a question, /reset to start over, or /quit to leave.");
            }
            Input::Reset => {
                session.reset();
                debug!(session = %session.id(), "session reset");
                println!("Conversation cleared.");
            }
            Input::Question(question) => {
                let _ = editor.add_history_entry(question);
                if let Err(e) = respond(&pipeline, &mut session, question, !args.no_typing).await {
                    report_failure(&e);
                }
            }
        }
    }

    Ok(())
}

/// How a streamed answer ended.
#[derive(Debug, PartialEq)]
enum Delivery {
    Completed,
    Cancelled,
}

async fn respond(
    pipeline: &RagPipeline,
    session: &mut ChatSession,
    question: &str,
    typing: bool,
) -> lawgpt_rag::Result<()> {
    // Ctrl-C while an answer streams cancels that answer only.
    let cancel = async {
        if tokio::signal::ctrl_c().await.is_err() {
            futures::future::pending::<()>().await;
        }
    };
    let mut stdout = std::io::stdout();
    let delivery = deliver(pipeline.answer_stream(session, question), cancel, &mut stdout, typing);

    match delivery.await? {
        Delivery::Completed => println!("\n"),
        Delivery::Cancelled => {
            debug!(session = %session.id(), "answer cancelled");
            println!("\n(cancelled; the question was not added to the conversation)\n");
        }
    }
    let _ = stdout.flush();
    Ok(())
}

/// Print `answer` to `out` until it ends or `cancel` resolves.
async fn deliver<S, C, W>(
    answer: S,
    cancel: C,
    out: &mut W,
    typing: bool,
) -> lawgpt_rag::Result<Delivery>
where
    S: Stream<Item = lawgpt_rag::Result<String>>,
    C: Future<Output = ()>,
    W: Write,
{
    let printing = async {
        let mut answer = pin!(answer);
        let mut started = false;
        while let Some(fragment) = answer.next().await {
            let fragment = fragment?;
            if !started {
                let _ = writeln!(out, "{DISCLAIMER}\n");
                started = true;
            }
            if typing {
                for piece in fragments(&fragment, TYPING_FRAGMENT_CHARS) {
                    let _ = write!(out, "{piece}");
                    let _ = out.flush();
                    tokio::time::sleep(TYPING_DELAY).await;
                }
            } else {
                let _ = write!(out, "{fragment}");
            }
        }
        Ok::<(), RagError>(())
    };

    tokio::select! {
        biased;
        () = cancel => Ok(Delivery::Cancelled),
        result = printing => result.map(|()| Delivery::Completed),
    }
}

fn report_failure(error: &RagError) {
    match error {
        RagError::EmbeddingUnavailable { .. }
        | RagError::GenerationUnavailable { .. }
        | RagError::RetrievalUnavailable(_) => {
            println!("\nThe assistant is unavailable right now ({error}). Ask again to retry.\n");
        }
        other => println!("\nCould not answer: {other}\n"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use lawgpt_rag::mock::{MockEmbeddingProvider, MockGenerator};

    #[test]
    fn recognises_commands_and_questions() {
        assert_eq!(parse_input("  /reset "), Input::Reset);
        assert_eq!(parse_input("/quit"), Input::Quit);
        assert_eq!(parse_input("/exit"), Input::Quit);
        assert_eq!(parse_input("   "), Input::Empty);
        assert_eq!(parse_input(" What is section 302? "), Input::Question("What is section 302?"));
    }

    fn offline_pipeline() -> RagPipeline {
        RagPipeline::builder()
            .embedding_provider(Arc::new(MockEmbeddingProvider::new(16)))
            .vector_index(Arc::new(FlatVectorIndex::new(16)))
            .generator(Arc::new(MockGenerator::new()))
            .build()
            .unwrap()
    }

    #[tokio::test]
    async fn cancelled_answer_prints_nothing_and_is_not_remembered() {
        let pipeline = offline_pipeline();
        let mut session = ChatSession::new(2);
        let mut out = Vec::new();

        let answer = pipeline.answer_stream(&mut session, "What is theft?");
        let delivery = deliver(answer, async {}, &mut out, false).await.unwrap();

        assert_eq!(delivery, Delivery::Cancelled);
        assert!(out.is_empty());
        assert!(session.memory().is_empty());
        assert!(session.messages().is_empty());
    }

    #[tokio::test]
    async fn completed_answer_is_printed_after_the_disclaimer() {
        let pipeline = offline_pipeline();
        let mut session = ChatSession::new(2);
        let mut out = Vec::new();

        let answer = pipeline.answer_stream(&mut session, "What is theft?");
        let never = futures::future::pending::<()>();
        let delivery = deliver(answer, never, &mut out, false).await.unwrap();

        assert_eq!(delivery, Delivery::Completed);
        let printed = String::from_utf8(out).unwrap();
        assert!(printed.starts_with(DISCLAIMER));
        assert!(printed.contains("No indexed provisions matched"));
        assert_eq!(session.memory().len(), 2);
    }
}
