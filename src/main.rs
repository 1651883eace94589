use std::io::{Read, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use futures::StreamExt;
use tracing::{info, warn};
use tracing_subscriber::{EnvFilter, FmtSubscriber};

use adforge::io::{combine_traits, gameplay_traits, high_performing_traits, theme_traits};
use adforge::llm::BUILTIN_PROMPTS;
use adforge::stages::RunOptions;
use adforge::{
    frame_event, Category, ChatClient, FileKnowledgeBase, GenerationEvent, GenerationInput,
    GenerationPipeline, Ingestor, KnowledgeBase, LanguageModel, LlmConfig, PipelineConfig,
    PipelinePhase, PromptLibrary, ScriptOutput,
};

#[derive(Parser)]
#[command(name = "adforge")]
#[command(author, version, about = "Ad-copy tagging and script generation pipeline", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Tag a piece of ad copy and archive it in the knowledge base
    Ingest {
        /// Ad copy text (reads --file or stdin when omitted)
        #[arg(short, long)]
        text: Option<String>,

        /// File containing the ad copy
        #[arg(short, long, conflicts_with = "text")]
        file: Option<PathBuf>,

        /// Knowledge base directory
        #[arg(long, default_value = "data/scripts")]
        kb: PathBuf,

        /// JSON file of prompt template overrides
        #[arg(long)]
        prompts: Option<PathBuf>,

        /// Verbose output
        #[arg(short, long)]
        verbose: bool,
    },

    /// Generate an ad script: retrieval, draft, committee review, refine
    Generate {
        /// Game introduction
        #[arg(long)]
        intro: String,

        /// Unique selling point
        #[arg(long)]
        usp: String,

        /// Target audience
        #[arg(long)]
        audience: String,

        /// Game category (SLG, MMO, 卡牌, 休闲, 二次元, 模拟经营, 射击, 传奇, 其他)
        #[arg(long)]
        category: String,

        /// Game theme, e.g. 三国, 仙侠, 魔幻 (adds theme traits to the review)
        #[arg(long)]
        theme: Option<String>,

        /// Core gameplay, e.g. 卡牌, 放置挂机 (adds gameplay traits to the review)
        #[arg(long)]
        gameplay: Option<String>,

        /// Knowledge base directory
        #[arg(long, default_value = "data/scripts")]
        kb: PathBuf,

        /// JSON file of prompt template overrides
        #[arg(long)]
        prompts: Option<PathBuf>,

        /// Number of reference scripts to retrieve
        #[arg(long, default_value = "3")]
        top_k: usize,

        /// Skip reference retrieval
        #[arg(long)]
        no_rag: bool,

        /// Skip review and refine; the draft is the result
        #[arg(long)]
        no_review: bool,

        /// Single call with the quick template
        #[arg(long, conflicts_with_all = ["no_rag", "no_review", "encoded"])]
        quick: bool,

        /// Print one JSON-string line per marker-encoded event instead of formatted text
        #[arg(long)]
        encoded: bool,

        /// Write the final script table to this file
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Verbose output
        #[arg(short, long)]
        verbose: bool,
    },

    /// Show the high-performing traits used to review a category
    Traits {
        #[arg(long)]
        category: String,

        #[arg(long)]
        theme: Option<String>,

        #[arg(long)]
        gameplay: Option<String>,
    },

    /// List built-in prompt templates, or print one
    Prompts {
        /// Template name to print
        #[arg(long)]
        show: Option<String>,
    },

    /// Count archived scripts per category
    Stats {
        /// Knowledge base directory
        #[arg(long, default_value = "data/scripts")]
        kb: PathBuf,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();

    match cli.command {
        Commands::Ingest {
            text,
            file,
            kb,
            prompts,
            verbose,
        } => {
            setup_logging(verbose);
            ingest(text, file, kb, prompts).await
        }
        Commands::Generate {
            intro,
            usp,
            audience,
            category,
            theme,
            gameplay,
            kb,
            prompts,
            top_k,
            no_rag,
            no_review,
            quick,
            encoded,
            output,
            verbose,
        } => {
            setup_logging(verbose);
            let input = GenerationInput {
                game_intro: intro,
                usp,
                target_audience: audience,
                category,
                theme,
                gameplay,
            };
            let options = RunOptions {
                use_rag: !no_rag,
                use_review: !no_review,
            };
            generate(input, kb, prompts, top_k, options, quick, encoded, output).await
        }
        Commands::Traits {
            category,
            theme,
            gameplay,
        } => {
            let parsed = Category::from_label(&category).unwrap_or_default();
            if parsed == Category::Other && category.trim() != Category::Other.label() {
                eprintln!("Unknown category '{}', showing generic traits", category);
            }
            if let Some(theme) = theme.as_deref().filter(|t| theme_traits(t).is_none()) {
                eprintln!("No traits listed for theme '{}'", theme);
            }
            if let Some(gameplay) = gameplay.as_deref().filter(|g| gameplay_traits(g).is_none()) {
                eprintln!("No traits listed for gameplay '{}'", gameplay);
            }
            println!(
                "{}",
                combine_traits(high_performing_traits(parsed), theme.as_deref(), gameplay.as_deref())
            );
            Ok(())
        }
        Commands::Prompts { show } => show_prompts(show.as_deref()),
        Commands::Stats { kb } => stats(&kb).await,
    }
}

fn setup_logging(verbose: bool) {
    let default_level = if verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    let subscriber = FmtSubscriber::builder()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .finish();
    tracing::subscriber::set_global_default(subscriber).ok();
}

fn load_prompts(path: Option<&Path>) -> Result<PromptLibrary> {
    match path {
        Some(path) => PromptLibrary::from_file(path),
        None => Ok(PromptLibrary::new()),
    }
}

/// Generation model plus, when REVIEW_LLM_* is set, a separate review model
fn load_models() -> Result<(Arc<dyn LanguageModel>, Option<Arc<dyn LanguageModel>>)> {
    let config = LlmConfig::from_env()?;
    let reviewer = LlmConfig::review_from_env(&config).map(|review| {
        info!("Review model: {} at {}", review.model, review.base_url);
        Arc::new(ChatClient::new(review)) as Arc<dyn LanguageModel>
    });
    info!("Generation model: {} at {}", config.model, config.base_url);
    Ok((Arc::new(ChatClient::new(config)), reviewer))
}

async fn ingest(text: Option<String>, file: Option<PathBuf>, kb: PathBuf, prompts: Option<PathBuf>) -> Result<()> {
    let raw_text = match (text, file) {
        (Some(text), _) => text,
        (None, Some(file)) => {
            std::fs::read_to_string(&file).with_context(|| format!("Failed to read {:?}", file))?
        }
        (None, None) => {
            let mut buffer = String::new();
            std::io::stdin()
                .read_to_string(&mut buffer)
                .context("Failed to read ad copy from stdin")?;
            buffer
        }
    };

    let (model, _) = load_models()?;
    let store = Arc::new(FileKnowledgeBase::new(kb));
    let ingestor = Ingestor::new(model, store).with_prompts(load_prompts(prompts.as_deref())?);

    let result = ingestor.auto_ingest(&raw_text).await;
    println!("{}", serde_json::to_string_pretty(&result)?);

    if !result.success {
        bail!("Ingest failed: {}", result.message);
    }
    Ok(())
}

#[allow(clippy::too_many_arguments)]
async fn generate(
    input: GenerationInput,
    kb: PathBuf,
    prompts: Option<PathBuf>,
    top_k: usize,
    options: RunOptions,
    quick: bool,
    encoded: bool,
    output: Option<PathBuf>,
) -> Result<()> {
    let (generator, reviewer) = load_models()?;
    let store: Arc<dyn KnowledgeBase> = Arc::new(FileKnowledgeBase::new(kb));

    let mut pipeline = GenerationPipeline::new(generator, store)
        .with_prompts(load_prompts(prompts.as_deref())?)
        .with_config(PipelineConfig {
            top_k,
            ..Default::default()
        })
        .with_observer(|step| info!("[{}] {:?}", step.phase, step.status));
    if let Some(reviewer) = reviewer {
        pipeline = pipeline.with_reviewer(reviewer);
    }

    let script = if quick {
        pipeline.generate_quick(input).await?
    } else {
        stream_to_stdout(&pipeline, input, options, encoded).await?
    };

    if let Some(path) = output {
        std::fs::write(&path, script.to_markdown_table())
            .with_context(|| format!("Failed to write {:?}", path))?;
        info!("Script written to {:?}", path);
    } else if quick {
        println!("{}", script.to_markdown_table());
    }
    Ok(())
}

/// Print a run as it streams and return the assembled script
async fn stream_to_stdout(
    pipeline: &GenerationPipeline,
    input: GenerationInput,
    options: RunOptions,
    encoded: bool,
) -> Result<ScriptOutput> {
    let mut stdout = std::io::stdout();
    let mut events = pipeline.run(input, options);
    let mut current: Option<PipelinePhase> = None;

    while let Some(event) = events.next().await {
        if encoded {
            if let Some(line) = frame_event(&event) {
                writeln!(stdout, "{}", line)?;
            }
        } else if let GenerationEvent::Chunk(chunk) = &event {
            if current != Some(chunk.phase) {
                writeln!(stdout, "\n===== {} =====", chunk.phase)?;
                current = Some(chunk.phase);
            }
            write!(stdout, "{}", chunk.text)?;
            stdout.flush()?;
        }

        match event {
            GenerationEvent::Chunk(_) => {}
            GenerationEvent::Failed(error) => {
                writeln!(stdout)?;
                bail!("Generation failed: {}", error);
            }
            GenerationEvent::Completed(output) => {
                writeln!(stdout)?;
                if !output.script.is_valid() {
                    warn!("Final text is not a three-column table; keeping raw text");
                }
                return Ok(output.script);
            }
        }
    }

    bail!("Generation ended without a result")
}

fn show_prompts(show: Option<&str>) -> Result<()> {
    match show {
        Some(name) => {
            let Some(template) = BUILTIN_PROMPTS.iter().find(|t| t.name == name) else {
                bail!("No built-in prompt named '{}'", name);
            };
            println!("{}", template.template);
        }
        None => {
            for template in BUILTIN_PROMPTS.iter() {
                println!(
                    "{:<14} {:<20} {{{}}}",
                    template.name,
                    template.description,
                    template.placeholders().join("}, {")
                );
            }
        }
    }
    Ok(())
}

async fn stats(kb: &Path) -> Result<()> {
    let store = FileKnowledgeBase::new(kb);
    for category in Category::ALL {
        let count = store.count(Some(category)).await?;
        if count > 0 {
            println!("{:<10} {}", category.label(), count);
        }
    }
    println!("total      {}", store.count(None).await?);
    Ok(())
}
