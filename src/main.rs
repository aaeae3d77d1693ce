mod cli;

use anyhow::{Context, Result};
use clap::Parser;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use crate::cli::{Cli, Commands};
use heartsphere::config::Settings;
use heartsphere::core::Orchestrator;
use heartsphere::studio::JournalEntry;
use heartsphere::ui::Console;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let settings = match &cli.config {
        Some(path) => {
            dotenvy::dotenv().ok();
            Settings::load_from(path)?
        }
        None => Settings::load()?,
    };
    let console = Console::new();

    match cli.command {
        Some(Commands::Characters) => {
            console.list_characters(&settings);
            return Ok(());
        }
        Some(Commands::Config) => {
            console.show_config(&settings);
            return Ok(());
        }
        _ => {}
    }

    let config_path = match &cli.config {
        Some(path) => path.clone(),
        None => Settings::config_path()?,
    };
    let orchestrator = Orchestrator::new(settings)?;

    match cli.command {
        Some(Commands::Chat { message, character }) => {
            orchestrator.chat(character.as_deref(), &message).await?;
        }
        Some(Commands::Repl { character }) => {
            console.banner();
            orchestrator.repl(character.as_deref()).await?;
        }
        Some(Commands::Story { file }) => {
            console.banner();
            orchestrator.story(&file).await?;
        }
        Some(Commands::BuildStory { idea, out }) => {
            orchestrator.build_story(&idea, &out).await?;
        }
        Some(Commands::Journal {
            text,
            history,
            mood_image,
        }) => {
            let previous: Vec<JournalEntry> = match history {
                Some(path) => {
                    let content = std::fs::read_to_string(&path)
                        .with_context(|| format!("Failed to read {}", path.display()))?;
                    serde_json::from_str(&content).context("Failed to parse journal history")?
                }
                None => Vec::new(),
            };
            orchestrator
                .journal(&text, &previous, mood_image.as_deref())
                .await?;
        }
        Some(Commands::CreateCharacter {
            idea,
            era,
            out_dir,
            save,
        }) => {
            let character = orchestrator.create_character(&idea, &era, &out_dir).await?;
            if let (Some(character), true) = (character, save) {
                let mut settings = orchestrator.settings().clone();
                let id = character.id.clone();
                settings.characters.insert(id.clone(), character);
                settings.save_to(&config_path)?;
                console.success(&format!("Added {} to {}", id, config_path.display()));
            }
        }
        Some(Commands::Era { image }) => {
            orchestrator.era(&image).await?;
        }
        Some(Commands::Image { prompt, ratio, out }) => {
            orchestrator.image(&prompt, ratio, &out).await?;
        }
        Some(Commands::Portrait { character, out }) => {
            orchestrator.portrait(character.as_deref(), &out).await?;
        }
        Some(Commands::Speak { text, voice, out }) => {
            orchestrator.speak(&text, voice.as_deref(), &out).await?;
        }
        Some(Commands::Characters) | Some(Commands::Config) => {}
        None => {
            console.banner();
            orchestrator.repl(None).await?;
        }
    }

    Ok(())
}

fn init_tracing(verbose: bool) {
    let default = if verbose {
        "heartsphere=debug"
    } else {
        "heartsphere=info"
    };
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| default.into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();
}
