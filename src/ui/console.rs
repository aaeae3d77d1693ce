use colored::Colorize;
use indicatif::{ProgressBar, ProgressStyle};
use std::io::{self, Write};
use std::time::Duration;

use crate::chat::{Message, Role};
use crate::config::Settings;
use crate::story::StoryOption;

pub struct Console;

impl Console {
    pub fn new() -> Self {
        Self
    }

    pub fn banner(&self) {
        let version = env!("CARGO_PKG_VERSION");
        println!(
            "\n{}\n{}\n",
            format!("  ♥  心域 HeartSphere  v{}", version).bright_magenta().bold(),
            "     一个平行于现实的记忆与情感世界".dimmed(),
        );
    }

    pub fn info(&self, message: &str) {
        println!("{} {}", "[INFO]".blue(), message);
    }

    pub fn warn(&self, message: &str) {
        println!("{} {}", "[WARN]".yellow(), message);
    }

    pub fn error(&self, message: &str) {
        eprintln!("{} {}", "[ERROR]".red(), message);
    }

    pub fn success(&self, message: &str) {
        println!("{} {}", "[OK]".green(), message);
    }

    pub fn user_message(&self, message: &str) {
        println!("\n{} {}", "▶".cyan().bold(), message);
    }

    pub fn character_header(&self, name: &str) {
        println!(
            "\n{} {}",
            format!("[{}]", name).magenta().bold(),
            "━".repeat(40).dimmed()
        );
    }

    pub fn character_message(&self, name: &str, message: &str) {
        self.character_header(name);
        println!("{}", message);
    }

    pub fn quote(&self, text: &str) {
        println!("\n  {} {}\n", "❝".magenta(), text.italic());
    }

    pub fn letter(&self, from: &str, subject: &str, content: &str) {
        println!("\n{}", format!("✉  {}", subject).bold().underline());
        println!("{}", "─".repeat(40).dimmed());
        println!("{}", content);
        println!("{}\n", format!("— {}", from).dimmed());
    }

    pub fn story_title(&self, title: &str, description: &str) {
        println!("\n{}", title.bold().underline());
        println!("{}", description.dimmed());
    }

    pub fn options(&self, options: &[StoryOption]) {
        println!();
        for (i, option) in options.iter().enumerate() {
            println!("  {} {}", format!("{}.", i + 1).cyan().bold(), option.text);
        }
    }

    /// Read one trimmed line. `None` at end of input.
    pub fn prompt(&self) -> io::Result<Option<String>> {
        print!("\n{} ", "▶".cyan().bold());
        io::stdout().flush()?;

        let mut input = String::new();
        if io::stdin().read_line(&mut input)? == 0 {
            return Ok(None);
        }
        Ok(Some(input.trim().to_string()))
    }

    pub fn spinner(&self, message: &str) -> ProgressBar {
        let spinner = ProgressBar::new_spinner();
        spinner.set_style(
            ProgressStyle::with_template("{spinner:.magenta} {msg}")
                .unwrap_or_else(|_| ProgressStyle::default_spinner()),
        );
        spinner.set_message(message.to_string());
        spinner.enable_steady_tick(Duration::from_millis(100));
        spinner
    }

    pub fn repl_help(&self) {
        println!("\n{}", "COMMANDS".bold().underline());
        for (cmd, help) in [
            ("voice", "read the last reply aloud (saved as .wav)"),
            ("scene", "illustrate the current scene"),
            ("echo", "crystallize the conversation into one sentence"),
            ("letter", "receive a letter from the character"),
            ("reset", "start the conversation over"),
            ("exit", "leave"),
        ] {
            println!("  {} {}", format!("{:<8}", cmd).cyan(), help.dimmed());
        }
    }

    pub fn list_characters(&self, settings: &Settings) {
        println!("\n{}", "CHARACTERS".bold().underline());
        println!("{}", "─".repeat(50));
        for (id, character) in &settings.characters {
            let marker = if id == &settings.default_character {
                "→ "
            } else {
                "  "
            };
            println!(
                "{}{} {} {}",
                marker.green(),
                id.cyan().bold(),
                character.name,
                format!("({}, {})", character.role, character.age).dimmed()
            );
            println!("    {}", character.bio.dimmed());
        }
        println!();
    }

    pub fn show_config(&self, settings: &Settings) {
        println!("\n{}", "CONFIGURATION".bold().underline());
        println!("{}", "─".repeat(50));

        let gemini = &settings.gemini;
        println!("\n  {}", "Gemini:".yellow());
        println!("    Chat model:  {}", gemini.chat_model.cyan());
        println!("    Image model: {}", gemini.image_model.cyan());
        println!("    TTS model:   {}", gemini.tts_model.cyan());
        println!(
            "    API key:     {}",
            if gemini.api_key().is_some() {
                "set".green()
            } else {
                "missing".red()
            }
        );

        let retry = &settings.retry;
        println!("\n  {}", "Retry:".yellow());
        println!(
            "    {} retries, {}ms initial delay, x{} backoff",
            retry.max_retries, retry.initial_delay_ms, retry.backoff_multiplier
        );

        println!(
            "\n  {} {}",
            "Default Character:".yellow(),
            settings.default_character.green()
        );

        if let Ok(path) = Settings::config_path() {
            println!(
                "\n  {} {}",
                "Config file:".yellow(),
                path.display().to_string().dimmed()
            );
        }
        println!();
    }
}

impl Default for Console {
    fn default() -> Self {
        Self::new()
    }
}

/// Prints a streamed reply incrementally from history snapshots.
///
/// Each snapshot's last model message is compared with what was already
/// printed; only the new suffix is written. A different message id starts a
/// new line.
#[derive(Debug, Default)]
pub struct StreamPrinter {
    current_id: Option<String>,
    printed: usize,
}

impl StreamPrinter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn update(&mut self, history: &[Message]) {
        if let Some(delta) = self.delta(history) {
            print!("{}", delta);
            io::stdout().flush().ok();
        }
    }

    pub fn finish(&mut self) {
        if self.current_id.is_some() {
            println!();
        }
    }

    fn delta(&mut self, history: &[Message]) -> Option<String> {
        let last = history.last().filter(|m| m.role == Role::Model)?;

        let mut prefix = String::new();
        if self.current_id.as_deref() != Some(last.id.as_str()) {
            if self.current_id.is_some() {
                prefix.push('\n');
            }
            self.current_id = Some(last.id.clone());
            self.printed = 0;
        }

        let new = last.text.get(self.printed..)?;
        self.printed = last.text.len();
        Some(format!("{}{}", prefix, new))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_printer_emits_only_new_text() {
        let mut printer = StreamPrinter::new();
        let user = Message::user("hi");
        assert_eq!(printer.delta(&[user.clone()]), None);

        let mut history = vec![user, Message::model("r1", "你")];
        assert_eq!(printer.delta(&history).as_deref(), Some("你"));
        history[1].text.push_str("好");
        assert_eq!(printer.delta(&history).as_deref(), Some("好"));

        history.push(Message::model("err", "oops"));
        assert_eq!(printer.delta(&history).as_deref(), Some("\noops"));
    }
}
