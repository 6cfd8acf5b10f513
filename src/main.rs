use acmp_solver::acmp::{AcmpClient, AcmpConfigBuilder, ACMP_URL};
use acmp_solver::attempt::AttemptCycle;
use acmp_solver::config::{AuthPolicy, ContextPolicy, PollPolicyBuilder, RetryPolicy};
use acmp_solver::history::HistoryStore;
use acmp_solver::judge::{Language, TaskSource};
use acmp_solver::poller::VerdictPoller;
use acmp_solver::provider::{DemoProvider, OpenRouterClient, SolutionProvider, DEFAULT_MODEL};
use acmp_solver::retry::RetryController;
use acmp_solver::runner::{await_authorization, BatchRunner};
use acmp_solver::TaskId;
use anyhow::Result;
use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::warn;
use tracing_subscriber::EnvFilter;

#[derive(Debug, Parser)]
#[command(name = "acmp-solver", version, about = "Solve acmp.ru tasks with a language model")]
struct Cli {
    #[command(flatten)]
    judge: JudgeArgs,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Args)]
struct JudgeArgs {
    /// Judge base URL
    #[arg(long, env = "ACMP_URL", default_value = ACMP_URL, global = true)]
    base_url: String,

    /// Cookie header of a logged-in browser session
    #[arg(long, env = "ACMP_COOKIE", hide_env_values = true, global = true)]
    cookie: Option<String>,

    /// Directory holding the attempt history and best solutions
    #[arg(long, default_value = "data", global = true)]
    data_dir: PathBuf,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Solve tasks and submit the solutions
    Run(RunArgs),

    /// Only list the tasks found on the task list page
    List {
        #[arg(long, default_value_t = 5)]
        limit: usize,
    },

    /// Show the recorded attempts for a task
    History { task: String },
}

#[derive(Debug, Args)]
struct RunArgs {
    /// OpenRouter API key; demo solutions are used without one
    #[arg(long, env = "OPENROUTER_API_KEY", hide_env_values = true)]
    api_key: Option<String>,

    #[arg(long, default_value = DEFAULT_MODEL)]
    model: String,

    /// Author name shown in the judge status table
    #[arg(long, env = "ACMP_AUTHOR")]
    author: String,

    #[arg(long, default_value_t = 2)]
    max_attempts: u32,

    /// First task id; without a range the task list page is used
    #[arg(long, requires = "to")]
    from: Option<u32>,

    /// Last task id (inclusive)
    #[arg(long, requires = "from")]
    to: Option<u32>,

    #[arg(long, default_value = "PY")]
    language: Language,

    #[arg(long, default_value_t = 10)]
    max_polls: u32,

    /// Seconds between status checks
    #[arg(long, default_value_t = 5)]
    poll_interval: u64,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();
    let mut config = AcmpConfigBuilder::default();
    config.base_url(cli.judge.base_url);
    if let Some(cookie) = cli.judge.cookie {
        config.cookie(cookie);
    }
    let judge = Arc::new(AcmpClient::new(config.build()?)?);

    match cli.command {
        Command::Run(args) => {
            let store = Arc::new(HistoryStore::open(&cli.judge.data_dir));
            run(judge, store, args).await?;
        }
        Command::List { limit } => {
            let tasks = judge.list_tasks().await?;
            println!("Found {} tasks:", tasks.len());
            for id in tasks.iter().take(limit) {
                println!("  - {}", id);
            }
        }
        Command::History { task } => {
            let store = HistoryStore::open(&cli.judge.data_dir);
            let task_id = TaskId::new(task);
            let attempts = store.get_history(&task_id);
            if attempts.is_empty() {
                println!("No attempts recorded for task {}", task_id);
            }
            for attempt in &attempts {
                println!(
                    "#{} {} {}",
                    attempt.number,
                    attempt.timestamp.to_rfc3339(),
                    attempt.outcome
                );
            }
            if let Some(best) = store.best_solution(&task_id) {
                println!("\nBest solution (attempt #{}):\n{}", best.number, best.code);
            }
        }
    }
    Ok(())
}

async fn run(judge: Arc<AcmpClient>, store: Arc<HistoryStore>, args: RunArgs) -> Result<()> {
    let provider: Arc<dyn SolutionProvider> = match args.api_key {
        Some(key) => Arc::new(
            OpenRouterClient::new(key, Duration::from_secs(120))?
                .with_model(args.model)
                .with_attribution(ACMP_URL, "ACMP Solver"),
        ),
        None => {
            warn!("no API key given, using demo solutions");
            Arc::new(DemoProvider)
        }
    };

    await_authorization(judge.as_ref(), &AuthPolicy::default()).await?;

    let task_ids: Vec<TaskId> = match (args.from, args.to) {
        (Some(from), Some(to)) => (from..=to).map(TaskId::from).collect(),
        _ => judge.list_tasks().await?,
    };

    let poll = PollPolicyBuilder::default()
        .max_polls(args.max_polls)
        .interval(Duration::from_secs(args.poll_interval))
        .build()?;
    let cycle = AttemptCycle::new(
        provider,
        judge.clone(),
        VerdictPoller::new(judge.clone(), poll),
        store.clone(),
        args.language,
        args.author,
    );
    let controller = RetryController::new(
        judge.clone(),
        cycle,
        store,
        RetryPolicy::default(),
        ContextPolicy::default(),
    );

    let summary = BatchRunner::new(judge, controller)
        .run(&task_ids, args.max_attempts)
        .await?;
    println!("Tasks: {}", summary.attempted);
    println!("Solved: {}", summary.solved);
    println!("Success: {:.1}%", summary.success_ratio() * 100.0);
    Ok(())
}
