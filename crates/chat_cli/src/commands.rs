use chat_session::settings::CUSTOM_ENDPOINT_ID;
use chat_session::Settings;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SettingField {
    Endpoint,
    CustomEndpoint,
    Key,
    Model,
    Temperature,
    Prompt,
}

impl SettingField {
    pub const ALL: [Self; 6] = [
        Self::Endpoint,
        Self::CustomEndpoint,
        Self::Key,
        Self::Model,
        Self::Temperature,
        Self::Prompt,
    ];

    pub fn parse(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|field| field.name() == name)
    }

    pub fn name(self) -> &'static str {
        match self {
            Self::Endpoint => "endpoint",
            Self::CustomEndpoint => "custom-endpoint",
            Self::Key => "key",
            Self::Model => "model",
            Self::Temperature => "temperature",
            Self::Prompt => "prompt",
        }
    }

    /// Writes `value` into `settings`; the error text is shown to the user.
    pub fn apply(self, settings: &mut Settings, value: &str) -> Result<(), String> {
        match self {
            Self::Endpoint => {
                if value.is_empty() {
                    return Err("endpoint must not be empty".to_string());
                }
                settings.api_endpoint = value.to_string();
            }
            Self::CustomEndpoint => {
                settings.custom_endpoint = value.to_string();
                if !value.is_empty() {
                    settings.api_endpoint = CUSTOM_ENDPOINT_ID.to_string();
                }
            }
            Self::Key => settings.api_key = value.to_string(),
            Self::Model => {
                if value.is_empty() {
                    return Err("model must not be empty".to_string());
                }
                settings.model = value.to_string();
            }
            Self::Temperature => {
                let parsed = value
                    .parse::<f64>()
                    .ok()
                    .filter(|temperature| (0.0..=2.0).contains(temperature))
                    .ok_or_else(|| format!("temperature must be a number in 0..=2, got '{value}'"))?;
                settings.temperature = parsed;
            }
            Self::Prompt => {
                if value.is_empty() {
                    return Err("prompt must not be empty".to_string());
                }
                settings.system_prompt = value.to_string();
            }
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SlashCommand {
    Help,
    Clear,
    Cancel,
    Quit,
    Settings,
    Set { field: SettingField, value: String },
    Ping,
    Poke,
    Drag,
    History,
    /// Recognised command with bad arguments; carries the usage hint.
    Usage(&'static str),
    Unknown(String),
}

pub const SET_USAGE: &str =
    "usage: /set <endpoint|custom-endpoint|key|model|temperature|prompt> <value>";

pub fn parse_slash_command(input: &str) -> Option<SlashCommand> {
    let trimmed = input.trim();
    if !trimmed.starts_with('/') {
        return None;
    }

    let (command, rest) = match trimmed.split_once(char::is_whitespace) {
        Some((command, rest)) => (command, rest.trim()),
        None => (trimmed, ""),
    };

    let parsed = match command {
        "/help" => SlashCommand::Help,
        "/clear" => SlashCommand::Clear,
        "/cancel" => SlashCommand::Cancel,
        "/quit" | "/exit" => SlashCommand::Quit,
        "/settings" => SlashCommand::Settings,
        "/set" => parse_set(rest),
        "/ping" => SlashCommand::Ping,
        "/poke" => SlashCommand::Poke,
        "/drag" => SlashCommand::Drag,
        "/history" => SlashCommand::History,
        _ => SlashCommand::Unknown(command.to_string()),
    };

    Some(parsed)
}

fn parse_set(rest: &str) -> SlashCommand {
    let (name, value) = match rest.split_once(char::is_whitespace) {
        Some((name, value)) => (name, value.trim()),
        None => (rest, ""),
    };
    match SettingField::parse(name) {
        Some(field) => SlashCommand::Set {
            field,
            value: value.to_string(),
        },
        None => SlashCommand::Usage(SET_USAGE),
    }
}

pub const HELP_TEXT: &str = "\
Commands:
  /help                      show this help
  /clear                     cancel any reply and delete the conversation
  /cancel                    stop the reply that is streaming
  /settings                  show the current settings
  /set <field> <value>       change a setting (endpoint, custom-endpoint, key, model, temperature, prompt)
  /ping                      check the connection with a one-turn request
  /poke                      ask the assistant companion for a comment
  /drag                      wiggle the assistant companion
  /history                   print the conversation
  /quit                      exit
Anything else is sent as a message.";
