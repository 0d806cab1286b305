use std::io::{self, BufRead, Write};
use std::sync::Arc;
use trading_agent_orchestrator::{
    agent::Orchestrator,
    model::chat::ChatModel,
    models::Recommendation,
    tools::create_default_registry,
    AgentConfig,
};
use tracing::info;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    dotenv::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let config = AgentConfig::from_env();
    let model = Arc::new(ChatModel::from_env()?);
    let registry = Arc::new(create_default_registry()?);

    info!(
        max_steps = config.max_steps,
        max_steps_per_task = config.max_steps_per_task,
        tools = registry.list().len(),
        "Trading agent ready"
    );

    let orchestrator = Orchestrator::new(model, registry, config);

    // One-shot when a query is passed on the command line, interactive
    // otherwise.
    let args: Vec<String> = std::env::args().skip(1).collect();
    if !args.is_empty() {
        let query = args.join(" ");
        let recommendation = orchestrator.run(&query).await;
        print_recommendation(&recommendation);
        return Ok(());
    }

    println!("Trading agent. Ask for a long-position plan, or 'quit' to exit.");
    let stdin = io::stdin();
    loop {
        print!("> ");
        io::stdout().flush()?;

        let mut line = String::new();
        if stdin.lock().read_line(&mut line)? == 0 {
            break;
        }
        let query = line.trim();
        if query.is_empty() {
            continue;
        }
        if query.eq_ignore_ascii_case("quit") || query.eq_ignore_ascii_case("exit") {
            break;
        }

        let recommendation = orchestrator.run(query).await;
        print_recommendation(&recommendation);
    }

    Ok(())
}

fn print_recommendation(recommendation: &Recommendation) {
    println!();
    println!("Plan status: {}", recommendation.plan_status);
    println!();
    println!("Thesis:");
    println!("  {}", recommendation.thesis);
    println!();
    println!("Position sizing:");
    println!("  entry zone:         {}", recommendation.position_sizing.entry_zone);
    println!(
        "  initial allocation: {:.1}%",
        recommendation.position_sizing.initial_allocation_pct
    );
    println!(
        "  max allocation:     {:.1}%",
        recommendation.position_sizing.max_allocation_pct
    );
    println!("  stop loss:          {}", recommendation.position_sizing.stop_loss);
    println!("  scaling:            {}", recommendation.position_sizing.scaling);
    println!();
    println!("Risk notes:");
    println!("  {}", recommendation.risk_notes);
    println!();
}
