//! toolpilot console - line-oriented chat with the agent.
//!
//! Type a request and press Enter. `reset` starts a new conversation;
//! `exit`, `quit`, Ctrl-D or Ctrl-C leave.

use std::io::Write;

use tokio::io::{AsyncBufReadExt, BufReader};
use toolpilot::{agent::Agent, config::Config, init_tracing};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = match Config::from_env() {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Error: {}. Failed to initialize the AI Agent. Exiting CLI.", e);
            std::process::exit(1);
        }
    };

    init_tracing(&config.default_log_filter(), true);

    let agent = Agent::new(&config)?;
    tracing::info!(model = %config.llm.model, tools = ?agent.tools().names(), "AI agent initialized");

    let mut conversation = agent.new_conversation();
    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    println!("AI Agent CLI initialized. Type 'exit' or 'quit' to end, 'reset' to start over.");

    loop {
        print!("You: ");
        std::io::stdout().flush()?;

        let line = tokio::select! {
            line = lines.next_line() => line?,
            _ = tokio::signal::ctrl_c() => None,
        };
        let Some(line) = line else {
            println!("\nExiting agent.");
            break;
        };

        let input = line.trim();
        match input.to_lowercase().as_str() {
            "" => continue,
            "exit" | "quit" => {
                println!("Exiting agent.");
                break;
            }
            "reset" => {
                conversation.reset();
                println!("Conversation cleared.");
                continue;
            }
            _ => {}
        }

        let result = tokio::select! {
            result = agent.respond(&mut conversation, input) => result,
            _ = tokio::signal::ctrl_c() => {
                println!("\nExiting agent.");
                break;
            }
        };

        match result {
            Ok(turn) => println!("{}", turn.answer),
            Err(e) => {
                tracing::error!(error = %e, "Request failed");
                println!("Error: {}", e);
            }
        }
    }

    Ok(())
}
