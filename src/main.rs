use anyhow::Context;
use clap::Parser;
use fs_err as fs;
use std::time::Instant;
use tracing::info;
use uuid::Uuid;

use openui_codegen::cli::Args;
use openui_codegen::config::Config;
use openui_codegen::controller::ContinuationController;
use openui_codegen::validate::{BabelOracle, CompletionValidator, SyntaxOracle};
use openui_codegen::{log, prompt, provider, ux};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    log::init_tracing(args.debug);

    let mut cfg = Config::load(args.config.as_deref())?;
    cfg.apply_args(&args);
    let mut cfg = cfg.with_api_key_from(|k| std::env::var(k).ok());
    cfg.load_cookies()?;
    cfg.validate()?;

    let run_id = Uuid::new_v4();
    info!(run = %run_id, model = %cfg.model, endpoint = %cfg.base_url, max_retries = cfg.max_retries, "starting generation");

    let oracle = BabelOracle::detect(&cfg.oracle)
        .await
        .map(|o| Box::new(o) as Box<dyn SyntaxOracle>);
    let validator = CompletionValidator::new(oracle, cfg.oracle.min_output_len);
    if !validator.has_oracle() {
        info!("validating with bracket/pattern heuristics only");
    }

    let prov = provider::make_provider(&cfg, args.echo).context("building HTTP client")?;
    let controller = ContinuationController::new(prov, Box::new(validator), cfg.max_retries);

    let mut transcript = log::Transcript::new(&cfg, run_id);
    let request = prompt::component_prompt(&args.prompt);
    let started = Instant::now();

    let outcome = {
        let mut progress = ux::Progress::new(!args.echo, controller.max_attempts(), &mut transcript);
        let outcome = controller.generate_with(&request, &mut progress).await;
        progress.finish();
        outcome
    };
    let elapsed_ms = started.elapsed().as_millis() as u64;

    ux::print_outcome(&outcome);

    if let Some(parent) = args.output.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)?;
    }
    fs::write(&args.output, &outcome.code)
        .with_context(|| format!("writing {}", args.output.display()))?;
    println!("component written to {}", args.output.display());

    if let Some(p) = transcript.save_final(&outcome.code)? {
        println!("transcript saved in {}", p.parent().unwrap_or(transcript.dir()).display());
    }

    if let Some(path) = &args.result_json {
        let summary = log::RunSummary::new(run_id, &cfg.model, &args.prompt, &outcome, elapsed_ms);
        log::save_summary(path, &summary)?;
        println!("result saved to {}", path.display());
    }

    Ok(())
}
