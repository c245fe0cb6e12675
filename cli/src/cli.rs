use std::path::PathBuf;

use indoc::indoc;

#[derive(Debug, clap::Parser)]
#[command(
    name = "replicate-images",
    version,
    about = "Generate images from text prompts using Replicate",
    long_about = indoc! {"
        Generate images from text prompts using Replicate's API.

        Images are cached by a hash of prompt and model, so the same prompt is never paid for
        twice. Every output directory holds its own cache.json next to the images.
    "}
)]
pub struct Cli {
    #[command(flatten)]
    pub global: GlobalArgs,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Clone, Default, clap::Args)]
pub struct GlobalArgs {
    /// Output directory [default: ./generated-images]
    #[arg(short, long, global = true)]
    pub output: Option<PathBuf>,

    /// Force regeneration, ignore cache
    #[arg(long, global = true)]
    pub no_cache: bool,

    /// Output results as JSON (one object per line for batches)
    #[arg(long, global = true)]
    pub json: bool,

    /// Show what would be generated without executing
    #[arg(long, global = true)]
    pub dry_run: bool,

    /// Suppress all output except errors
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Replicate API token
    #[arg(long, global = true, env = "REPLICATE_API_TOKEN", hide_env_values = true)]
    pub api_token: Option<String>,
}

#[derive(Debug, clap::Subcommand)]
pub enum Command {
    /// Generate a single image
    Generate(Generate),
    /// Generate images from a YAML file of prompts
    #[command(long_about = indoc! {"
        Process a YAML file containing multiple prompt/model combinations.

        Example prompts.yaml:
          prompts:
            - prompt: \"a cat in space\"
              model: black-forest-labs/flux-schnell
            - prompt: \"a dog on the moon\"

        Prompts without a model use --model, the configured default, or flux-schnell.
        Existing cached images are skipped unless --no-cache is set.
    "})]
    Batch(Batch),
    /// Check a prompts YAML file without generating anything
    Validate(Validate),
    /// Search Replicate for models, or list the ones with built-in defaults
    Models(Models),
    /// Inspect the configuration file
    #[command(subcommand)]
    Config(ConfigCommand),
}

#[derive(Debug, clap::Args)]
pub struct Generate {
    pub prompt: String,

    /// Replicate model to use
    #[arg(short, long)]
    pub model: Option<String>,
}

#[derive(Debug, clap::Args)]
pub struct Batch {
    pub file: PathBuf,

    /// Default model for prompts without one
    #[arg(short, long)]
    pub model: Option<String>,

    /// Number of concurrent generations [default: 3]
    #[arg(short, long)]
    pub concurrency: Option<usize>,
}

#[derive(Debug, clap::Args)]
pub struct Validate {
    pub file: PathBuf,

    /// Default model for prompts without one
    #[arg(short, long)]
    pub model: Option<String>,
}

#[derive(Debug, clap::Args)]
pub struct Models {
    /// Search query, e.g. "text to image". Without it the built-in models are listed
    pub query: Option<String>,
}

#[derive(Debug, clap::Subcommand)]
pub enum ConfigCommand {
    /// Print where the configuration file is looked up
    Path,
    /// Print the effective configuration
    Show,
}
