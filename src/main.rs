use std::process::ExitCode;

use anyhow::{Context, Result, bail};
use clap::Parser;
use console::Style;
use dialoguer::Input;
use tracing::info;

use mobility_research::cli::{Cli, Command};
use mobility_research::config::MobilityConfig;
use mobility_research::images::ImageSource;
use mobility_research::llm::{AnthropicClient, GroqClient, Provider};
use mobility_research::ui::{self, RunProgress};
use mobility_research::{LlmSectionGenerator, ResearchContext, ResearchOrchestrator, logging, sections};

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("{} {e:#}", Style::new().red().bold().apply_to("error:"));
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> Result<()> {
    if let Command::Sections = cli.command {
        ui::print_sections(&sections::catalog());
        return Ok(());
    }

    let mut config = MobilityConfig::load().context("failed to load configuration")?;
    cli.apply_to(&mut config);
    logging::init_logging(&config.logging, cli.verbose || config.debug)?;
    config.validate()?;

    let Command::Research {
        measure,
        context,
        view,
        ..
    } = cli.command
    else {
        return Ok(());
    };
    let (measure, context) = match measure {
        Some(measure) => (measure, context.unwrap_or_default()),
        None => prompt_measure(context)?,
    };
    if measure.trim().is_empty() {
        bail!("a mobility measure name is required");
    }

    let provider = build_provider(&config)?;
    info!(provider = provider.name(), "LLM provider selected");
    let mut generator = LlmSectionGenerator::new(provider, config.temperature, config.max_tokens);
    if !config.repair_json {
        generator = generator.without_repair();
    }
    let images = ImageSource::from_key(Some(&config.pexels_api_key))?;
    info!(source = images.name(), "image source selected");

    let orchestrator = ResearchOrchestrator::new(generator, images, config.retry_policy())
        .with_mode(config.execution_mode())
        .with_max_concurrency(config.max_concurrency)
        .with_run_timeout(config.run_timeout())
        .with_image_count(config.image_count)
        .with_output_dir(config.output_dir.clone());

    let ctx = ResearchContext::new(measure.trim(), context);
    let mut progress = RunProgress::start(&ctx.measure_name, orchestrator.sections().len());
    let report = orchestrator
        .run_with(&ctx, |key, outcome| progress.section_done(key, outcome))
        .await;
    progress.finish();
    let report = report?;

    ui::print_summary(&report);
    if view {
        println!("{}", report.document.to_json_pretty()?);
    }
    Ok(())
}

fn build_provider(config: &MobilityConfig) -> Result<Provider> {
    let key = config.provider_api_key().to_string();
    let provider = if config.money_mode {
        Provider::Anthropic(AnthropicClient::new(key)?)
    } else {
        Provider::Groq(GroqClient::new(key)?)
    };
    Ok(provider)
}

fn prompt_measure(context: Option<String>) -> Result<(String, String)> {
    let measure: String = Input::new()
        .with_prompt("Mobility measure")
        .allow_empty(true)
        .interact_text()
        .context("failed to read the measure name")?;
    let context = match context {
        Some(context) => context,
        None => Input::new()
            .with_prompt("Additional context (optional)")
            .allow_empty(true)
            .interact_text()
            .context("failed to read the context")?,
    };
    Ok((measure, context))
}
