//! Interactive consultation (`consult chat`).
//!
//! Reads one question per line from stdin. The history is kept for display
//! only: every question is answered on its own, without earlier turns.

use anyhow::Result;
use std::io::Write;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::debug;

use crate::config::Config;
use crate::service;
use crate::session::ChatSession;

const EXIT_WORDS: [&str; 2] = ["exit", "quit"];

pub async fn run_chat(config: &Config) -> Result<()> {
    let service = service::shared(config).await?;
    let mut session = ChatSession::new();
    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    println!("Ask a question. Type `exit` to leave.");
    loop {
        print!("> ");
        std::io::stdout().flush()?;

        let Some(line) = lines.next_line().await? else {
            break;
        };
        let question = line.trim();
        if question.is_empty() {
            continue;
        }
        if EXIT_WORDS.contains(&question.to_lowercase().as_str()) {
            break;
        }

        match service.answer(question).await {
            Ok(answer) => {
                let response = answer.render();
                println!("{}\n", response);
                session.record(question, &response);
            }
            // A failed turn is reported and the session continues.
            Err(e) => {
                debug!(error = %e, "question failed");
                eprintln!("{}\n", e.user_message());
            }
        }
    }

    println!("Session ended after {} questions.", session.len() / 2);
    Ok(())
}
