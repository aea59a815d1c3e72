use captcha_locator::config::AppConfig;
use captcha_locator::decoder::Decoder;
use captcha_locator::utils::read_url_list;
use captcha_locator::Pipeline;
use clap::Parser;
use serde::Serialize;
use std::process::ExitCode;

mod args;
use args::{Args, Command};

#[tokio::main]
async fn main() -> ExitCode {
    // Initialize logging
    env_logger::init();

    let args = Args::parse();

    let mut config = match &args.config {
        Some(path) => match AppConfig::from_file(path) {
            Ok(config) => config,
            Err(e) => {
                ::log::error!("{}", e);
                return ExitCode::FAILURE;
            }
        },
        None => {
            let mut config = AppConfig::default();
            config.apply_env();
            config
        }
    };
    if let Some(url) = &args.webdriver_url {
        config.webdriver.url = url.clone();
    }
    if args.headless {
        config.webdriver.headless = true;
    }

    match run(args.command, config).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            ::log::error!("{}", e);
            ExitCode::FAILURE
        }
    }
}

async fn run(command: Command, config: AppConfig) -> Result<(), Box<dyn std::error::Error>> {
    match command {
        Command::Locate { mut urls, urls_file } => {
            if let Some(path) = urls_file {
                urls.extend(read_url_list(&path)?);
            }
            if urls.is_empty() {
                return Err("no URLs given".into());
            }

            let pipeline = Pipeline::new(config)?;
            let mut session = pipeline.connect().await?;
            let (reports, summary) = pipeline.run_batch(&mut session, &urls).await;
            session.close().await;

            for report in &reports {
                print_json(report)?;
            }
            ::log::info!(
                "Metadata written to {}",
                pipeline.store().metadata_path().display()
            );
            print_json(&summary)?;
        }
        Command::Solve { url, submit } => {
            // Artifacts load before the browser session opens
            let decoder = Decoder::from_config(&config.decoder)?;
            let mut pipeline = Pipeline::new(config)?.with_decoder(decoder);
            if submit {
                pipeline = pipeline.with_submission(true);
            }

            let mut session = pipeline.connect().await?;
            let result = pipeline.solve_url(&mut session, &url).await;
            session.close().await;
            print_json(&result?)?;
        }
        Command::Decode { image } => {
            let decoder = Decoder::from_config(&config.decoder)?;
            print_json(&decoder.predict_file(&image)?)?;
        }
        Command::Captures => {
            let pipeline = Pipeline::new(config)?;
            let records = pipeline.store().records();
            ::log::info!("{} capture records", records.len());
            print_json(&records)?;
        }
        Command::ModelInfo => {
            let decoder = Decoder::from_config(&config.decoder)?;
            print_json(&decoder.info())?;
        }
    }
    Ok(())
}

fn print_json<T: Serialize>(value: &T) -> Result<(), serde_json::Error> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
