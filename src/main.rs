//! shiksha CLI - generate classroom content within a provider quota.

use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand};
use indicatif::{ProgressBar, ProgressStyle};
use shiksha::content::{self, GameKind};
use shiksha::models::Attachment;
use shiksha::{Config, GenerationRequest, GeminiProvider, ThrottledClient};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{Level, info};
use tracing_subscriber::FmtSubscriber;

#[derive(Parser)]
#[command(name = "shiksha")]
#[command(author = "Infernet <dev@infernet.org>")]
#[command(version)]
#[command(about = "Quota-aware AI content generation for multi-grade classrooms")]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Path to configuration file
    #[arg(short, long, global = true, default_value = "config.toml")]
    config: PathBuf,

    /// Verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Abort the request after this many seconds, waits included
    #[arg(long, global = true)]
    deadline_secs: Option<u64>,

    /// Print usage statistics after the request
    #[arg(long, global = true)]
    stats: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Generate an educational story in a local language
    Story {
        #[arg(short, long, default_value = "Hindi")]
        language: String,

        #[arg(short, long)]
        grade: u8,

        #[arg(short, long)]
        topic: String,

        /// Local context to weave into the story
        #[arg(long, default_value = "a small farming village")]
        context: String,
    },

    /// Create differentiated worksheets from a textbook page photo
    Worksheet {
        /// Path to the page image (jpeg or png)
        #[arg(short, long)]
        image: PathBuf,

        /// Target grades, e.g. 2,3,4
        #[arg(short, long, value_delimiter = ',')]
        grades: Vec<u8>,
    },

    /// Explain a concept with rural analogies
    Explain {
        /// The student's question
        #[arg(short, long)]
        question: String,

        #[arg(short, long, default_value = "Hindi")]
        language: String,

        #[arg(short, long)]
        grade: u8,
    },

    /// Create blackboard drawing instructions for a concept
    VisualAid {
        #[arg(long)]
        concept: String,

        #[arg(short, long, default_value = "blackboard")]
        medium: String,
    },

    /// Create a reading assessment for a passage
    Assessment {
        /// The passage the student will read
        #[arg(short, long)]
        text: String,

        #[arg(short, long, default_value = "English")]
        language: String,

        #[arg(short, long)]
        grade: u8,
    },

    /// Generate a classroom game
    Game {
        #[arg(short, long, value_enum)]
        kind: GameKind,

        #[arg(short, long)]
        topic: String,

        #[arg(short, long)]
        grade: u8,

        #[arg(short, long, default_value = "English")]
        language: String,
    },

    /// Create a multi-grade lesson plan
    LessonPlan {
        /// Goals for the period
        #[arg(long)]
        goals: String,

        /// Subjects, e.g. Math,Science
        #[arg(short, long, value_delimiter = ',')]
        subjects: Vec<String>,

        /// Grades, e.g. 3,4,5
        #[arg(short, long, value_delimiter = ',')]
        grades: Vec<u8>,

        #[arg(short, long, default_value = "week")]
        duration: String,

        #[arg(short, long, default_value = "English")]
        language: String,
    },

    /// Validate configuration file
    Validate,

    /// Show example configuration
    Example,
}

fn setup_logging(verbose: bool) {
    let level = if verbose { Level::DEBUG } else { Level::INFO };
    let subscriber = FmtSubscriber::builder()
        .with_max_level(level)
        .with_target(false)
        .with_thread_ids(false)
        .compact()
        .finish();
    tracing::subscriber::set_global_default(subscriber).expect("Failed to set subscriber");
}

fn print_example_config() {
    let example = r#"# shiksha configuration file

[provider]
# API key (can also use GEMINI_API_KEY env var)
# api_key = "..."
base_url = "https://generativelanguage.googleapis.com/v1beta"
model = "gemini-1.5-flash"
timeout_secs = 120
temperature = 0.7
top_p = 0.95
max_output_tokens = 8000

[throttle]
# Provider quota; dispatches are spaced 60/requests_per_minute seconds apart
requests_per_minute = 10
max_retries = 3

[generation]
# system_instruction = "You are an AI teaching assistant..."
"#;
    println!("{example}");
}

/// Read an image file and wrap it as an attachment.
fn load_image(path: &Path) -> Result<Attachment> {
    let mime = match path.extension().and_then(|e| e.to_str()) {
        Some("jpg") | Some("jpeg") => "image/jpeg",
        Some("png") => "image/png",
        other => bail!("unsupported image type: {other:?} (expected jpg or png)"),
    };
    let data =
        std::fs::read(path).with_context(|| format!("Failed to read image {}", path.display()))?;
    Ok(Attachment::new(mime, data))
}

fn build_request(command: &Commands) -> Result<GenerationRequest> {
    let request = match command {
        Commands::Story {
            language,
            grade,
            topic,
            context,
        } => content::story(language, *grade, topic, context),

        Commands::Worksheet { image, grades } => {
            if grades.is_empty() {
                bail!("at least one grade is required");
            }
            content::worksheet_from_image(grades, load_image(image)?)
        }

        Commands::Explain {
            question,
            language,
            grade,
        } => content::explain_concept(question, language, *grade),

        Commands::VisualAid { concept, medium } => content::visual_aid(concept, medium),

        Commands::Assessment {
            text,
            language,
            grade,
        } => content::reading_assessment(text, language, *grade),

        Commands::Game {
            kind,
            topic,
            grade,
            language,
        } => content::educational_game(*kind, topic, *grade, language),

        Commands::LessonPlan {
            goals,
            subjects,
            grades,
            duration,
            language,
        } => content::lesson_plan(goals, subjects, grades, duration, language),

        Commands::Validate | Commands::Example => unreachable!("handled before request building"),
    };
    Ok(request)
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    setup_logging(cli.verbose);

    match &cli.command {
        Commands::Example => {
            print_example_config();
            return Ok(());
        }

        Commands::Validate => {
            let config = Config::from_file(&cli.config)
                .with_context(|| format!("Failed to load config from {:?}", cli.config))?;

            config
                .resolve_api_key()
                .context("Failed to resolve API key")?;

            info!("Configuration is valid");
            info!("  Model:   {}", config.provider.model);
            info!(
                "  Quota:   {} requests/minute ({}s between dispatches)",
                config.throttle.requests_per_minute,
                config.throttle.min_delay().as_secs_f64()
            );
            info!("  Retries: {}", config.throttle.max_retries);
            return Ok(());
        }

        _ => {}
    }

    let config = Config::from_file(&cli.config)
        .with_context(|| format!("Failed to load config from {:?}", cli.config))?;
    let api_key = config
        .resolve_api_key()
        .context("Failed to resolve API key")?;

    let provider = GeminiProvider::new(&config.provider, api_key)?;
    let client = ThrottledClient::from_config(provider, &config);

    let mut request = build_request(&cli.command)?;
    if let Some(secs) = cli.deadline_secs {
        request = request.with_deadline(Duration::from_secs(secs));
    }

    let spinner = ProgressBar::new_spinner();
    spinner.set_style(ProgressStyle::with_template("{spinner} {msg}").expect("valid template"));
    spinner.set_message("generating...");
    spinner.enable_steady_tick(Duration::from_millis(120));

    let result = client.generate(request).await;
    spinner.finish_and_clear();

    match result {
        Ok(text) => println!("{text}"),
        Err(e) => {
            if cli.stats {
                eprintln!(
                    "{}",
                    serde_json::to_string_pretty(&client.usage_stats())
                        .context("Failed to serialize usage stats")?
                );
            }
            return Err(e).context("Generation failed");
        }
    }

    if cli.stats {
        println!(
            "{}",
            serde_json::to_string_pretty(&client.usage_stats())
                .context("Failed to serialize usage stats")?
        );
    }

    Ok(())
}
