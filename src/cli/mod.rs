use clap::{Parser, Subcommand};
use std::path::PathBuf;

use heartsphere::llm::AspectRatio;

#[derive(Parser)]
#[command(name = "heartsphere")]
#[command(author = "HeartSphere Team")]
#[command(version)]
#[command(about = "心域 HeartSphere - companions and stories, streamed", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Commands>,

    /// Enable verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Use this config file instead of the default location
    #[arg(long, global = true, env = "HEARTSPHERE_CONFIG")]
    pub config: Option<PathBuf>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Send one message to a character
    Chat {
        /// The message to send
        #[arg(required = true)]
        message: String,

        /// Character id (default from config)
        #[arg(short, long)]
        character: Option<String>,
    },

    /// Talk with a character interactively
    Repl {
        /// Character id (default from config)
        character: Option<String>,
    },

    /// Play a scenario file
    Story {
        /// Path to a scenario JSON file
        #[arg(required = true)]
        file: PathBuf,
    },

    /// Generate a scenario from an idea
    BuildStory {
        /// One-line story idea
        #[arg(required = true)]
        idea: String,

        /// Output JSON file
        #[arg(short, long, default_value = "scenario.json")]
        out: PathBuf,
    },

    /// Reflect on a journal entry
    Journal {
        /// Journal text
        #[arg(required = true)]
        text: String,

        /// Earlier entries as a JSON array
        #[arg(long)]
        history: Option<PathBuf>,

        /// Also paint the mood into this file
        #[arg(long)]
        mood_image: Option<PathBuf>,
    },

    /// Invent a character for an era, with avatar and background
    CreateCharacter {
        /// What the character should be like
        #[arg(required = true)]
        idea: String,

        /// Name of the era or world
        #[arg(short, long, default_value = "心域")]
        era: String,

        /// Directory for the profile and images
        #[arg(short, long, default_value = ".")]
        out_dir: PathBuf,

        /// Add the character to the config file
        #[arg(long)]
        save: bool,
    },

    /// Suggest an era name and description from an image
    Era {
        /// Photo or artwork (png, jpg, webp)
        #[arg(required = true)]
        image: PathBuf,
    },

    /// Generate an image from a prompt
    Image {
        #[arg(required = true)]
        prompt: String,

        /// Aspect ratio (1:1, 3:4, 4:3, 9:16, 16:9)
        #[arg(short, long, default_value = "1:1")]
        ratio: AspectRatio,

        #[arg(short, long, default_value = "image.png")]
        out: PathBuf,
    },

    /// Draw a character portrait
    Portrait {
        character: Option<String>,

        #[arg(short, long, default_value = "portrait.png")]
        out: PathBuf,
    },

    /// Synthesize speech to a WAV file
    Speak {
        #[arg(required = true)]
        text: String,

        /// Prebuilt voice name
        #[arg(long)]
        voice: Option<String>,

        #[arg(short, long, default_value = "speech.wav")]
        out: PathBuf,
    },

    /// List characters
    Characters,

    /// Show current configuration
    Config,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_image_ratio() {
        let cli = Cli::parse_from(["heartsphere", "image", "a lantern", "--ratio", "9:16"]);
        match cli.command {
            Some(Commands::Image { ratio, out, .. }) => {
                assert_eq!(ratio, AspectRatio::Tall);
                assert_eq!(out, PathBuf::from("image.png"));
            }
            _ => panic!("expected image command"),
        }
    }

    #[test]
    fn test_parse_create_character() {
        let cli = Cli::parse_from([
            "heartsphere",
            "create-character",
            "a night-market poet",
            "--era",
            "千禧年",
            "--save",
        ]);
        match cli.command {
            Some(Commands::CreateCharacter {
                idea,
                era,
                out_dir,
                save,
            }) => {
                assert_eq!(idea, "a night-market poet");
                assert_eq!(era, "千禧年");
                assert_eq!(out_dir, PathBuf::from("."));
                assert!(save);
            }
            _ => panic!("expected create-character command"),
        }
    }

    #[test]
    fn test_bad_ratio_rejected() {
        assert!(Cli::try_parse_from(["heartsphere", "image", "x", "--ratio", "2:1"]).is_err());
    }
}
