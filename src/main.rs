use anyhow::Result;
use clap::{Parser, Subcommand};
use colored::*;
use std::io::{self, Write};
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, BufReader};

use profchat::{
    ChatController, ChatError, ChatSession, Config, GeminiClient, GeminiSession, Message,
    ProfessorDb, Role, NO_MATCH_SENTINEL,
};

const DEFAULT_DATA_PATH: &str = "data/reviews.json";

#[derive(Parser)]
#[command(name = "profchat")]
#[command(about = "Chat assistant for finding professors, grounded in a review dataset")]
struct Cli {
    /// Path to the professor review dataset (JSON)
    #[arg(long, global = true)]
    data: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Chat with the assistant (interactive)
    Chat,
    /// Ask a single question and exit
    Ask {
        /// Your question
        question: String,
    },
    /// Search the review dataset directly, skipping the assistant
    Search {
        /// Search query
        query: String,
        /// Maximum number of results
        #[arg(short, long, default_value = "5")]
        limit: usize,
    },
    /// Store the Gemini API key in the config file
    SetKey {
        /// API key for the Gemini API
        key: String,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    env_logger::init();

    let cli = Cli::parse();
    let config = Config::load();

    let data_path = cli
        .data
        .clone()
        .or_else(|| config.reviews_path.clone())
        .unwrap_or_else(|| DEFAULT_DATA_PATH.to_string());

    match cli.command {
        Commands::Chat => chat(&config, &data_path).await?,
        Commands::Ask { question } => ask(&config, &data_path, &question).await?,
        Commands::Search { query, limit } => search_reviews(&data_path, &query, limit).await?,
        Commands::SetKey { key } => set_key(&key)?,
    }

    Ok(())
}

async fn start_session(config: &Config) -> Result<GeminiSession, ChatError> {
    GeminiClient::from_config(config)?.start_chat().await
}

async fn chat(config: &Config, data_path: &str) -> Result<()> {
    println!("\n{}", "💬 Rate My Professor Chat".bold().blue());

    let mut controller: ChatController<GeminiSession> = ChatController::new();

    // The dataset and the session are independent; set them up together
    let (dataset, session) = tokio::join!(
        ProfessorDb::load_from_json(data_path),
        start_session(config)
    );

    match dataset {
        Ok(db) => controller.install_dataset(db),
        // the failure notice prints with the rest of the log below
        Err(e) => controller.report_data_failure(e),
    }
    match session {
        Ok(s) => controller.install_session(s),
        Err(e) => println!("{}", format!("⚠️  {}", e).yellow()),
    }
    if !controller.has_session() {
        println!(
            "Set {} or run {} to enable replies.",
            "GEMINI_API_KEY".bold(),
            "profchat set-key <KEY>".bold()
        );
    }

    for message in controller.log() {
        print_message(message);
    }
    println!("{}", "Type your question, or /quit to exit.".dimmed());

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        print!("\n{} ", "You:".bold().cyan());
        io::stdout().flush()?;

        let Some(line) = lines.next_line().await? else {
            break;
        };
        let input = line.trim();
        if input.is_empty() {
            continue;
        }
        if input == "/quit" || input == "/exit" {
            break;
        }

        run_turn(&mut controller, input).await;
    }

    Ok(())
}

async fn run_turn<S: ChatSession>(controller: &mut ChatController<S>, input: &str) {
    let before = controller.log().len();

    if let Err(err) = controller.submit_turn(input) {
        println!("{} {}", "!".red().bold(), err);
        return;
    }

    let mut ticker = tokio::time::interval(Duration::from_millis(300));
    let mut dots = 0;
    while !controller.poll_turn() {
        ticker.tick().await;
        if dots == 0 {
            print!("{}", "Thinking".dimmed());
        }
        print!("{}", ".".dimmed());
        let _ = io::stdout().flush();
        dots += 1;
    }
    if dots > 0 {
        println!();
    }

    // Show whatever the turn appended after the user's own message
    for message in &controller.log()[before + 1..] {
        print_message(message);
    }
}

async fn ask(config: &Config, data_path: &str, question: &str) -> Result<()> {
    let mut controller: ChatController<GeminiSession> = ChatController::new();

    let (dataset, session) = tokio::join!(
        ProfessorDb::load_from_json(data_path),
        start_session(config)
    );
    match dataset {
        Ok(db) => controller.install_dataset(db),
        Err(e) => {
            println!("{}", format!("⚠️  {}", e).yellow());
            controller.report_data_failure(e);
        }
    }
    controller.install_session(session?);

    controller.submit_turn(question)?;
    controller.finish_turn().await;

    if let Some(err) = controller.last_error() {
        anyhow::bail!("{}", err);
    }
    if let Some(reply) = controller.log().last() {
        println!("{}", reply.text);
    }

    Ok(())
}

async fn search_reviews(data_path: &str, query: &str, limit: usize) -> Result<()> {
    println!("🔍 Searching for: {}", query.bold().cyan());

    let db = ProfessorDb::load_from_json(data_path).await?;
    let results = db.search(query, limit);

    if results.is_empty() {
        println!("{}", NO_MATCH_SENTINEL.red());
        return Ok(());
    }

    println!(
        "\n{} matching professors:\n",
        results.len().to_string().bold().green()
    );

    for (i, record) in results.iter().enumerate() {
        println!(
            "{}. {} - {} ({} stars)",
            (i + 1).to_string().bold().blue(),
            record.name.bold().yellow(),
            record.subject,
            record.rating
        );
        println!("   {}\n", record.review_text);
    }

    Ok(())
}

fn set_key(key: &str) -> Result<()> {
    Config::save_api_key(key)?;
    println!("{}", "✅ API key saved".green());
    Ok(())
}

fn print_message(message: &Message) {
    match message.role {
        Role::Assistant => println!("{} {}", "Assistant:".bold().green(), message.text),
        Role::User => println!("{} {}", "You:".bold().cyan(), message.text),
    }
}
