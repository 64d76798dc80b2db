use clap::Parser;
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "openui_codegen", version, about = "Generate React components through an OpenUI endpoint, validating and repairing streamed output")]
pub struct Args {
    /// Component requirements, in plain words.
    #[arg(long, short = 'p')]
    pub prompt: String,

    #[arg(long)]
    pub config: Option<PathBuf>,

    #[arg(long)]
    pub model: Option<String>,

    #[arg(long)]
    pub base_url: Option<String>,

    #[arg(long)]
    pub max_tokens: Option<u32>,

    #[arg(long)]
    pub max_retries: Option<u32>,

    #[arg(long)]
    pub temperature: Option<f32>,

    #[arg(long)]
    pub timeout_secs: Option<u64>,

    #[arg(long)]
    pub cookie_file: Option<PathBuf>,

    /// Skip the Babel syntax check and use pattern heuristics only.
    #[arg(long, default_value_t = false)]
    pub no_oracle: bool,

    #[arg(long, default_value_t = false)]
    pub no_transcript: bool,

    #[arg(long, short = 'o', default_value = "component.tsx")]
    pub output: PathBuf,

    #[arg(long)]
    pub result_json: Option<PathBuf>,

    /// Print tokens as they stream in.
    #[arg(long, default_value_t = false)]
    pub echo: bool,

    #[arg(long, default_value_t = false)]
    pub debug: bool,
}
