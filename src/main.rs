use anyhow::Context;
use clap::Parser;
use tokio_util::sync::CancellationToken;
use transcode_bus::{EncodingProfile, InputConfig, registry};

mod config;
mod plan;
mod profiles;

use config::Config;
use plan::RoutingPlan;

fn init_logging(level: log::LevelFilter) {
    env_logger::Builder::new()
        .filter_level(level)
        .filter_module("ffmpeg_next", log::LevelFilter::Warn)
        .filter_module("transcode_bus", level)
        .parse_default_env()
        .init();
}

fn input_config(input: &str) -> InputConfig {
    if input.contains("://") {
        InputConfig::Net {
            url: input.to_string(),
        }
    } else {
        InputConfig::File {
            path: input.to_string(),
        }
    }
}

async fn run_profile(
    input: &str,
    profile: &EncodingProfile,
    cancel: &CancellationToken,
) -> anyhow::Result<RoutingPlan> {
    let bin = registry::make_named(
        registry::TRANSCODE_BIN,
        &format!("transcodebin-{}", profile.name),
    )?
    .into_transcoder()?;
    bin.set_profile(Some(profile.clone()))?;
    bin.play(input_config(input))?;

    let summary = tokio::select! {
        summary = bin.wait() => summary.unwrap_or_default(),
        _ = cancel.cancelled() => {
            bin.teardown();
            anyhow::bail!("cancelled");
        }
    };

    let plan = RoutingPlan::new(
        input,
        profile,
        bin.linked_inputs(),
        bin.provisioned_count(),
        summary,
    );
    bin.teardown();
    Ok(plan)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = Config::parse();
    init_logging(config.log_level);
    transcode_bus::init()?;

    if config.list_elements {
        for factory in registry::factories() {
            println!("{:<14} {:<24} {}", factory.name, factory.long_name, factory.klass);
        }
        return Ok(());
    }
    let input = config.input.clone().context("no input given")?;

    let candidates = match &config.profiles {
        Some(path) => profiles::load(path)?,
        None => profiles::builtin()?,
    };
    std::fs::create_dir_all(&config.output_dir)
        .with_context(|| format!("create {}", config.output_dir.display()))?;

    let cancel = CancellationToken::new();
    let cancel_clone = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            cancel_clone.cancel();
        }
    });

    let mut written = 0;
    for (n, profile) in config.selected(&candidates) {
        if cancel.is_cancelled() {
            break;
        }
        let plan = match run_profile(&input, profile, &cancel).await {
            Ok(plan) => plan,
            Err(e) => {
                log::error!("{}: {:#}", profile.name, e);
                continue;
            }
        };
        match plan.write(&config.output_dir, n) {
            Ok(path) => {
                log::info!(
                    "{}: {} inputs linked, plan written to {}",
                    profile.name,
                    plan.inputs.len(),
                    path.display()
                );
                written += 1;
            }
            Err(e) => log::error!("{}: {:#}", profile.name, e),
        }
    }

    println!("Made {} test plans", written);
    Ok(())
}
