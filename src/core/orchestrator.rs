use anyhow::{Context, Result};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::chat::{ChatService, Message, StreamOutcome};
use crate::config::Settings;
use crate::llm::{AspectRatio, GeminiProvider, Generator, ImagePayload};
use crate::story::{Character, CustomScenario};
use crate::studio::{JournalEntry, Studio};
use crate::ui::{Console, StreamPrinter};

/// Build the configured generation backend.
pub fn build_generator(settings: &Settings) -> Result<Arc<dyn Generator>> {
    let key = settings
        .gemini
        .api_key()
        .context("Gemini API key not found. Set GEMINI_API_KEY env var.")?;
    let provider = GeminiProvider::new(
        key,
        settings.gemini.base_url.as_deref(),
        settings.gemini.models(),
    )?;
    Ok(Arc::new(provider))
}

pub struct Orchestrator {
    settings: Settings,
    chat: ChatService<dyn Generator>,
    studio: Studio<dyn Generator>,
    console: Console,
}

impl Orchestrator {
    pub fn new(settings: Settings) -> Result<Self> {
        let generator = build_generator(&settings)?;
        Ok(Self::with_generator(settings, generator))
    }

    pub fn with_generator(settings: Settings, generator: Arc<dyn Generator>) -> Self {
        let retry = settings.retry.policy();
        let chat = ChatService::new(generator.clone(), retry.clone())
            .with_config(settings.gemini.generation_config());
        let studio = Studio::new(generator, retry);

        Self {
            settings,
            chat,
            studio,
            console: Console::new(),
        }
    }

    fn character(&self, id: Option<&str>) -> Result<Character> {
        self.settings.resolve_character(id).cloned()
    }

    fn opening(character: &Character) -> Vec<Message> {
        vec![Message::model(
            format!("{}_intro", character.id),
            character.first_message.clone(),
        )]
    }

    async fn exchange(
        &self,
        character: &Character,
        history: Vec<Message>,
        text: &str,
    ) -> Result<StreamOutcome> {
        self.console.character_header(&character.name);
        let mut printer = StreamPrinter::new();
        let outcome = self
            .chat
            .send_message(
                &character.id,
                character,
                Some(&self.settings.profile),
                history,
                text,
                |h| printer.update(h),
            )
            .await?;
        printer.finish();

        if let Some(e) = &outcome.error {
            self.console.warn(&format!("Reply failed: {}", e));
        }
        Ok(outcome)
    }

    /// One message, one streamed reply.
    pub async fn chat(&self, character_id: Option<&str>, message: &str) -> Result<()> {
        let character = self.character(character_id)?;
        self.console.user_message(message);
        self.exchange(&character, Self::opening(&character), message)
            .await?;
        Ok(())
    }

    pub async fn repl(&self, character_id: Option<&str>) -> Result<()> {
        let character = self.character(character_id)?;
        let mut history = Self::opening(&character);

        self.console
            .info("Starting interactive mode. Type 'help' for commands, 'exit' to quit.");
        self.console.character_message(&character.name, &character.first_message);

        loop {
            let Some(input) = self.console.prompt()? else {
                break;
            };
            if input.is_empty() {
                continue;
            }

            match input.to_lowercase().as_str() {
                "exit" | "quit" | "q" => {
                    self.console.info("再见！");
                    break;
                }
                "reset" | "clear" => {
                    self.chat.reset_session(&character.id);
                    history = Self::opening(&character);
                    self.console.info("Conversation reset.");
                }
                "help" | "?" => self.console.repl_help(),
                "voice" => self.speak_last(&character, &history).await?,
                "scene" => self.scene(&history).await?,
                "echo" => self.echo(&history).await?,
                "letter" => self.letter(&character).await?,
                _ => {
                    let outcome = self.exchange(&character, history, &input).await?;
                    history = outcome.history;
                }
            }
        }
        Ok(())
    }

    async fn speak_last(&self, character: &Character, history: &[Message]) -> Result<()> {
        let Some(last) = history.iter().rev().find(|m| m.role == crate::chat::Role::Model) else {
            return Ok(());
        };
        let out = PathBuf::from(format!("{}_{}.wav", character.id, last.timestamp));
        self.speak(&last.text, Some(&character.voice_name), &out).await
    }

    async fn scene(&self, history: &[Message]) -> Result<()> {
        let spinner = self.console.spinner("Painting the scene...");
        let image = self.chat.illustrate_scene(history).await;
        spinner.finish_and_clear();

        match image? {
            Some(image) => {
                let path = PathBuf::from(format!(
                    "scene_{}.{}",
                    chrono::Utc::now().timestamp(),
                    image.extension()
                ));
                fs::write(&path, &image.data)?;
                self.console.success(&format!("Scene saved to {}", path.display()));
            }
            None => self.console.warn("No scene image this time."),
        }
        Ok(())
    }

    async fn echo(&self, history: &[Message]) -> Result<()> {
        match self.studio.wisdom_echo(history).await? {
            Some(echo) => self.console.quote(&echo),
            None => self.console.warn("Nothing to crystallize yet."),
        }
        Ok(())
    }

    async fn letter(&self, character: &Character) -> Result<()> {
        let spinner = self.console.spinner("Waiting for the mail...");
        let letter = self
            .studio
            .chronos_letter(character, &self.settings.profile, &[])
            .await;
        spinner.finish_and_clear();

        match letter? {
            Some(letter) => self.console.letter(&character.name, &letter.subject, &letter.content),
            None => self.console.warn("The mailbox is empty."),
        }
        Ok(())
    }

    /// Reflect on a journal entry: mirror insight plus an optional mood image.
    pub async fn journal(
        &self,
        text: &str,
        previous: &[JournalEntry],
        image_out: Option<&Path>,
    ) -> Result<()> {
        match self.studio.mirror_insight(text, previous).await? {
            Some(insight) => self.console.quote(&insight),
            None => self.console.warn("The mirror stays silent."),
        }

        if let Some(out) = image_out {
            let spinner = self.console.spinner("Projecting your mood...");
            let image = self.studio.mood_image(text).await;
            spinner.finish_and_clear();
            match image? {
                Some(image) => {
                    fs::write(out, &image.data)?;
                    self.console.success(&format!("Mood image saved to {}", out.display()));
                }
                None => self.console.warn("No mood image this time."),
            }
        }
        Ok(())
    }

    /// Play through a scenario file interactively.
    pub async fn story(&self, scenario_path: &Path) -> Result<()> {
        let content = fs::read_to_string(scenario_path)
            .with_context(|| format!("Failed to read scenario {}", scenario_path.display()))?;
        let scenario: CustomScenario =
            serde_json::from_str(&content).context("Failed to parse scenario file")?;

        let (start, mut state) = scenario.start()?;
        self.console.story_title(&scenario.title, &scenario.description);

        let key = format!("story:{}", scenario.id);
        let profile = Some(&self.settings.profile);
        let mut printer = StreamPrinter::new();
        let mut outcome = self
            .chat
            .story_beat(&key, start, profile, Vec::new(), None, |h| printer.update(h))
            .await?;
        printer.finish();

        loop {
            let node = scenario.node(&state.current_node_id)?;
            if node.is_ending() {
                self.console.info("— 完 —");
                break;
            }
            self.console.options(&node.options);

            let Some(input) = self.console.prompt()? else {
                break;
            };
            let Some(option) = input
                .parse::<usize>()
                .ok()
                .and_then(|n| n.checked_sub(1))
                .and_then(|i| node.options.get(i))
            else {
                self.console.warn("Pick one of the numbered options.");
                continue;
            };

            let mut printer = StreamPrinter::new();
            outcome = self
                .chat
                .advance_story(
                    &key,
                    &scenario,
                    &mut state,
                    profile,
                    outcome.history,
                    &option.id,
                    |h| printer.update(h),
                )
                .await?;
            printer.finish();
        }
        Ok(())
    }

    /// Draft a scenario from an idea and write it as JSON.
    pub async fn build_story(&self, idea: &str, out: &Path) -> Result<()> {
        let spinner = self.console.spinner("Weaving a new story...");
        let scenario = self.studio.build_scenario(idea).await;
        spinner.finish_and_clear();

        match scenario? {
            Some(scenario) => {
                fs::write(out, serde_json::to_string_pretty(&scenario)?)?;
                self.console.success(&format!(
                    "\"{}\" ({} nodes) saved to {}",
                    scenario.title,
                    scenario.nodes.len(),
                    out.display()
                ));
            }
            None => self.console.warn("The model returned no scenario."),
        }
        Ok(())
    }

    /// Invent a character for an era and write its profile, avatar and
    /// background into `out_dir`. Returns the character when one was made.
    pub async fn create_character(
        &self,
        idea: &str,
        era_name: &str,
        out_dir: &Path,
    ) -> Result<Option<Character>> {
        let spinner = self.console.spinner(&format!("Summoning a soul from {}...", era_name));
        let generated = self.studio.generate_character(idea, era_name).await;
        spinner.finish_and_clear();

        let Some(generated) = generated? else {
            self.console.warn("No character this time.");
            return Ok(None);
        };
        fs::create_dir_all(out_dir)
            .with_context(|| format!("Failed to create {}", out_dir.display()))?;

        let character = generated.character;
        let profile = out_dir.join(format!("{}.json", character.id));
        fs::write(&profile, serde_json::to_string_pretty(&character)?)?;
        for (suffix, image) in [("avatar", &generated.avatar), ("background", &generated.background)] {
            let path = out_dir.join(format!("{}_{}.{}", character.id, suffix, image.extension()));
            fs::write(&path, &image.data)?;
        }

        self.console
            .character_message(&character.name, &character.first_message);
        self.console.success(&format!(
            "{} ({}) saved to {}",
            character.name,
            character.id,
            profile.display()
        ));
        Ok(Some(character))
    }

    /// Name the era a photo or artwork seems to come from.
    pub async fn era(&self, image_path: &Path) -> Result<()> {
        let image = ImagePayload::from_file(image_path)
            .with_context(|| format!("Failed to read {}", image_path.display()))?;
        let spinner = self.console.spinner("Reading the picture...");
        let sketch = self.studio.analyze_era_image(&image).await;
        spinner.finish_and_clear();

        match sketch? {
            Some(sketch) => self.console.story_title(&sketch.name, &sketch.description),
            None => self.console.warn("Could not place this picture in an era."),
        }
        Ok(())
    }

    pub async fn portrait(&self, character_id: Option<&str>, out: &Path) -> Result<()> {
        let character = self.character(character_id)?;
        let spinner = self.console.spinner(&format!("Drawing {}...", character.name));
        let image = self.studio.character_portrait(&character).await;
        spinner.finish_and_clear();

        match image? {
            Some(image) => {
                fs::write(out, &image.data)?;
                self.console.success(&format!("Portrait saved to {}", out.display()));
            }
            None => self.console.warn("No portrait this time."),
        }
        Ok(())
    }

    pub async fn image(&self, prompt: &str, ratio: AspectRatio, out: &Path) -> Result<()> {
        let spinner = self.console.spinner("Generating image...");
        let image = self.chat.illustrate(prompt, ratio).await;
        spinner.finish_and_clear();

        match image? {
            Some(image) => {
                fs::write(out, &image.data)?;
                self.console.success(&format!("Image saved to {}", out.display()));
            }
            None => self.console.warn("The model declined to draw this prompt."),
        }
        Ok(())
    }

    pub async fn speak(&self, text: &str, voice: Option<&str>, out: &Path) -> Result<()> {
        let voice = voice.unwrap_or("Kore");
        let spinner = self.console.spinner(&format!("Synthesizing with {}...", voice));
        let audio = self.chat.speak(text, voice).await;
        spinner.finish_and_clear();

        match audio? {
            Some(audio) => {
                audio
                    .write_wav(out)
                    .with_context(|| format!("Failed to write {}", out.display()))?;
                self.console.success(&format!(
                    "{:.1}s of speech saved to {}",
                    audio.duration().as_secs_f32(),
                    out.display()
                ));
            }
            None => self.console.warn("No audio produced for this text."),
        }
        Ok(())
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }
}
