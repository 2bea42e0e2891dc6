use std::process::ExitCode;

use quizagent::tracing::init_tracing;
use quizagent::{AgentController, ChatClient, Config, ToolRegistry};

#[tokio::main]
async fn main() -> ExitCode {
    // .env is optional; real deployments set the variables directly.
    let _ = dotenvy::dotenv();
    if let Err(e) = init_tracing() {
        eprintln!("⚠️  Tracing init failed: {e}");
    }

    let start_url = match std::env::args().nth(1) {
        Some(url) => url,
        None => {
            eprintln!("usage: quizagent <start-url>");
            return ExitCode::FAILURE;
        }
    };

    let config = match Config::from_env() {
        Ok(config) => config,
        Err(e) => {
            eprintln!("❌ Configuration error: {e}");
            return ExitCode::FAILURE;
        }
    };

    println!("🧠 quizagent — model: {}", config.model);

    let controller = AgentController::new(
        ChatClient::new(&config),
        ToolRegistry::new(&config),
        config,
    );

    match controller.run(&start_url).await {
        Ok(result) => {
            println!(
                "🏁 Finished: {} steps, {} tool calls, {} messages",
                result.steps,
                result.tool_calls_made,
                result.messages.len()
            );
            ExitCode::SUCCESS
        }
        Err(e) => {
            eprintln!("❌ Run failed: {e}");
            ExitCode::FAILURE
        }
    }
}
