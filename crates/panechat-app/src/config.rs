//! Settings file and first-run setup.

use std::collections::BTreeMap;
use std::fs;
use std::io::{self, BufRead, Write};
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

/// Models offered by the setup menu and `/model`.
pub const PRESELECTED_MODELS: &[&str] = &[
    "openrouter/google/gemini-2.5-pro-exp-03-25:free",
    "openrouter/deepseek/deepseek-chat-v3-0324:free",
    "openrouter/qwen/qwq-32b:free",
    "openrouter/google/gemini-flash-1.5:free",
    "openrouter/mistralai/mistral-7b-instruct:free",
    "openrouter/meta-llama/llama-3-8b-instruct:free",
    "openrouter/qwen/qwen-7b-chat:free",
    "openai/gpt-3.5-turbo",
    "deepseek/deepseek-chat",
];

/// Errors from reading or writing the settings file.
#[derive(Debug)]
pub enum ConfigError {
    Io(io::Error),
    Parse(serde_json::Error),
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigError::Io(err) => write!(f, "settings I/O error: {err}"),
            ConfigError::Parse(err) => write!(f, "invalid settings file: {err}"),
        }
    }
}

impl std::error::Error for ConfigError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ConfigError::Io(err) => Some(err),
            ConfigError::Parse(err) => Some(err),
        }
    }
}

impl From<io::Error> for ConfigError {
    fn from(err: io::Error) -> Self {
        ConfigError::Io(err)
    }
}

impl From<serde_json::Error> for ConfigError {
    fn from(err: serde_json::Error) -> Self {
        ConfigError::Parse(err)
    }
}

/// Contents of `settings.json`.
///
/// Provider keys live at the top level under their environment variable
/// names (`"OPENROUTER_API_KEY": "..."`).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Settings {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    /// OpenAI-compatible base URL overriding the provider default.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_base: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub shell: Option<String>,
    /// `TERM` for the embedded shell.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub term: Option<String>,
    #[serde(flatten)]
    pub keys: BTreeMap<String, String>,
}

impl Settings {
    /// The key stored under `var`, else the environment variable itself.
    pub fn api_key(&self, var: &str, env: impl Fn(&str) -> Option<String>) -> Option<String> {
        self.keys
            .get(var)
            .filter(|key| !key.is_empty())
            .cloned()
            .or_else(|| env(var).filter(|key| !key.is_empty()))
    }
}

/// `<config dir>/panechat/settings.json`.
pub fn default_path() -> Option<PathBuf> {
    Some(dirs::config_dir()?.join("panechat").join("settings.json"))
}

/// Read settings. A missing file is `Ok(None)`.
pub fn load(path: &Path) -> Result<Option<Settings>, ConfigError> {
    let text = match fs::read_to_string(path) {
        Ok(text) => text,
        Err(err) if err.kind() == io::ErrorKind::NotFound => return Ok(None),
        Err(err) => return Err(err.into()),
    };
    Ok(Some(serde_json::from_str(&text)?))
}

pub fn save(path: &Path, settings: &Settings) -> Result<(), ConfigError> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    let json = serde_json::to_string_pretty(settings)?;
    fs::write(path, json + "\n")?;
    log::info!("settings saved to {}", path.display());
    Ok(())
}

/// Environment variable holding the API key a model's provider expects.
pub fn required_key_var(model: &str) -> Option<&'static str> {
    let model = model.to_ascii_lowercase();
    if model.starts_with("openrouter/") {
        Some("OPENROUTER_API_KEY")
    } else if model.starts_with("openai/") || model.starts_with("gpt-") {
        Some("OPENAI_API_KEY")
    } else if model.starts_with("deepseek/") {
        Some("DEEPSEEK_API_KEY")
    } else if model.starts_with("anthropic/") {
        Some("ANTHROPIC_API_KEY")
    } else if model.starts_with("groq/") {
        Some("GROQ_API_KEY")
    } else {
        None
    }
}

/// Interactive model and key setup over plain line I/O.
///
/// Returns the updated settings, or `None` when input ends before a model
/// is chosen. The caller saves the result.
pub fn run_wizard<R: BufRead, W: Write>(
    input: &mut R,
    output: &mut W,
    mut settings: Settings,
    env: impl Fn(&str) -> Option<String>,
) -> io::Result<Option<Settings>> {
    writeln!(output, "\n--- LLM Configuration ---")?;
    writeln!(output, "Please select an LLM model:")?;
    for (idx, model) in PRESELECTED_MODELS.iter().enumerate() {
        writeln!(output, "{}. {model}", idx + 1)?;
    }
    let other = PRESELECTED_MODELS.len() + 1;
    writeln!(output, "{other}. Other (specify a custom model name)")?;

    let model = loop {
        write!(output, "Enter choice (1-{other}): ")?;
        output.flush()?;
        let Some(line) = read_line(input)? else {
            writeln!(output, "\nConfiguration cancelled.")?;
            return Ok(None);
        };
        match line.parse::<usize>() {
            Ok(choice) if (1..other).contains(&choice) => break PRESELECTED_MODELS[choice - 1].to_string(),
            Ok(choice) if choice == other => match prompt_custom_model(input, output)? {
                Some(model) => break model,
                None => {
                    writeln!(output, "\nConfiguration cancelled.")?;
                    return Ok(None);
                }
            },
            _ => writeln!(output, "Invalid choice. Please enter a number between 1 and {other}.")?,
        }
    };

    if let Some(var) = required_key_var(&model) {
        if settings.api_key(var, &env).is_none() {
            writeln!(output, "\nModel '{model}' typically requires {var}.")?;
            writeln!(output, "It is not set in your environment or settings.")?;
            write!(output, "Please enter your {var} (or press Enter to skip): ")?;
            output.flush()?;
            match read_line(input)? {
                Some(key) if !key.is_empty() => {
                    settings.keys.insert(var.to_string(), key);
                }
                _ => writeln!(output, "API key entry skipped. Requests to this model may fail.")?,
            }
        }
    }

    settings.model = Some(model);
    writeln!(output, "--- Configuration Complete ---")?;
    Ok(Some(settings))
}

fn prompt_custom_model<R: BufRead, W: Write>(input: &mut R, output: &mut W) -> io::Result<Option<String>> {
    loop {
        write!(output, "Enter the custom model name (e.g. 'provider/model-name'): ")?;
        output.flush()?;
        match read_line(input)? {
            None => return Ok(None),
            Some(name) if !name.is_empty() => return Ok(Some(name)),
            Some(_) => writeln!(output, "Model name cannot be empty.")?,
        }
    }
}

/// One trimmed line, or `None` at end of input.
fn read_line<R: BufRead>(input: &mut R) -> io::Result<Option<String>> {
    let mut line = String::new();
    if input.read_line(&mut line)? == 0 {
        return Ok(None);
    }
    Ok(Some(line.trim().to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    fn no_env(_: &str) -> Option<String> {
        None
    }

    fn wizard(script: &str, settings: Settings) -> (Option<Settings>, String) {
        let mut input = Cursor::new(script.as_bytes().to_vec());
        let mut output = Vec::new();
        let result = run_wizard(&mut input, &mut output, settings, no_env).unwrap();
        (result, String::from_utf8(output).unwrap())
    }

    #[test]
    fn test_settings_round_trip_keeps_provider_keys() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("settings.json");
        assert_eq!(load(&path).unwrap(), None);

        let mut settings = Settings {
            model: Some("groq/llama3-8b-8192".to_string()),
            shell: Some("/bin/zsh".to_string()),
            ..Settings::default()
        };
        settings.keys.insert("GROQ_API_KEY".to_string(), "gsk-test".to_string());
        save(&path, &settings).unwrap();

        let text = fs::read_to_string(&path).unwrap();
        assert!(text.contains("\"GROQ_API_KEY\": \"gsk-test\""));
        assert!(!text.contains("api_base"));
        assert_eq!(load(&path).unwrap(), Some(settings));
    }

    #[test]
    fn test_load_rejects_malformed_json() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.json");
        fs::write(&path, "{ not json").unwrap();
        assert!(matches!(load(&path), Err(ConfigError::Parse(_))));
    }

    #[test]
    fn test_required_key_var() {
        assert_eq!(required_key_var("openrouter/qwen/qwq-32b:free"), Some("OPENROUTER_API_KEY"));
        assert_eq!(required_key_var("openai/gpt-4o"), Some("OPENAI_API_KEY"));
        assert_eq!(required_key_var("gpt-3.5-turbo"), Some("OPENAI_API_KEY"));
        assert_eq!(required_key_var("DeepSeek/deepseek-chat"), Some("DEEPSEEK_API_KEY"));
        assert_eq!(required_key_var("anthropic/claude-3-haiku"), Some("ANTHROPIC_API_KEY"));
        assert_eq!(required_key_var("groq/llama3-8b-8192"), Some("GROQ_API_KEY"));
        assert_eq!(required_key_var("ollama/llama3"), None);
    }

    #[test]
    fn test_api_key_prefers_settings_over_env() {
        let mut settings = Settings::default();
        let env = |var: &str| (var == "OPENAI_API_KEY").then(|| "from-env".to_string());
        assert_eq!(settings.api_key("OPENAI_API_KEY", env), Some("from-env".to_string()));

        settings.keys.insert("OPENAI_API_KEY".to_string(), "from-file".to_string());
        assert_eq!(settings.api_key("OPENAI_API_KEY", env), Some("from-file".to_string()));
        assert_eq!(settings.api_key("GROQ_API_KEY", env), None);
    }

    #[test]
    fn test_wizard_picks_preselected_and_prompts_for_key() {
        let (result, output) = wizard("abc\n99\n1\nsk-or-123\n", Settings::default());
        let settings = result.unwrap();
        assert_eq!(settings.model.as_deref(), Some(PRESELECTED_MODELS[0]));
        assert_eq!(settings.keys.get("OPENROUTER_API_KEY").map(String::as_str), Some("sk-or-123"));
        assert_eq!(output.matches("Invalid choice").count(), 2);
    }

    #[test]
    fn test_wizard_custom_model_and_skipped_key() {
        let other = PRESELECTED_MODELS.len() + 1;
        let script = format!("{other}\n\ngroq/mixtral\n\n");
        let (result, output) = wizard(&script, Settings::default());
        let settings = result.unwrap();
        assert_eq!(settings.model.as_deref(), Some("groq/mixtral"));
        assert!(settings.keys.is_empty());
        assert!(output.contains("Model name cannot be empty."));
        assert!(output.contains("API key entry skipped"));
    }

    #[test]
    fn test_wizard_does_not_prompt_when_key_known() {
        let mut existing = Settings::default();
        existing.keys.insert("OPENAI_API_KEY".to_string(), "sk".to_string());
        let (result, output) = wizard("8\n", existing);
        assert_eq!(result.unwrap().model.as_deref(), Some("openai/gpt-3.5-turbo"));
        assert!(!output.contains("Please enter your"));
    }

    #[test]
    fn test_wizard_cancelled_at_eof() {
        let (result, output) = wizard("", Settings::default());
        assert!(result.is_none());
        assert!(output.contains("Configuration cancelled."));
    }
}
