//! Minimal terminal player: joins the quiz, prints pushed questions, and
//! reads option numbers from stdin.
//!
//! ```sh
//! QUIZWIRE_BACKEND_URL=http://127.0.0.1:8000 cargo run --example play -- Ana
//! ```

use std::sync::Arc;

use tokio::io::AsyncBufReadExt;
use tokio_stream::StreamExt;
use tracing_subscriber::EnvFilter;

use quizwire_client::{ClientConfig, Session, SessionEvent};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let name = std::env::args()
        .nth(1)
        .unwrap_or_else(|| "anonymous".to_string());

    let config = ClientConfig::load();
    let handle = Arc::new(Session::spawn(config)?);
    let mut events = handle.event_stream();

    handle.join(&name).await?;
    println!("Joined as {name}. Waiting for the host...");

    let submitter = Arc::clone(&handle);
    tokio::spawn(async move {
        let stdin = tokio::io::BufReader::new(tokio::io::stdin());
        let mut lines = stdin.lines();
        while let Ok(Some(line)) = lines.next_line().await {
            match line.trim().parse::<usize>() {
                Ok(choice) => {
                    if let Err(e) = submitter.submit_answer(choice).await {
                        println!("!! {e}");
                    }
                },
                Err(_) => println!("Type an option number"),
            }
        }
    });

    while let Some(event) = events.next().await {
        let Ok(event) = event else { continue };
        match event {
            SessionEvent::QuestionStarted {
                question,
                duration_secs,
            } => {
                println!("\nQ{}: {} ({duration_secs}s)", question.id, question.prompt);
                for (i, option) in question.options.iter().enumerate() {
                    println!("  [{i}] {option}");
                }
            },
            SessionEvent::CountdownTick { remaining_secs } if remaining_secs <= 3 => {
                println!("  {remaining_secs}s left!");
            },
            SessionEvent::TimeUp => println!("Time up!"),
            SessionEvent::SubmissionAccepted => println!("Answer submitted."),
            SessionEvent::SubmissionFailed { retry_available } => {
                if retry_available {
                    println!("Submission failed, try again.");
                } else {
                    println!("Submission failed and time is up.");
                }
            },
            SessionEvent::AnswerResult {
                correct,
                correct_text,
                score,
                ..
            } => {
                let verdict = if correct { "correct" } else { "wrong" };
                println!("Your answer was {verdict} (answer: {correct_text}). Score: {score}");
            },
            SessionEvent::LeaderboardUpdated { leaderboard } => {
                println!("Leaderboard:");
                for entry in leaderboard {
                    println!("  {}: {} pts", entry.name, entry.score);
                }
            },
            SessionEvent::ConnectionChanged { state } => {
                println!("[connection: {state:?}]");
            },
            _ => {},
        }
    }

    Ok(())
}
