use clap::{Args, Parser, Subcommand};

/// Run saved prompt templates against OpenAI or Anthropic from the terminal.
#[derive(Debug, Parser)]
#[command(name = "hotprompt", version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// List or edit saved prompts
    Prompts {
        #[command(subcommand)]
        action: Option<PromptAction>,
    },
    /// List known models for one provider, or for all of them
    Models {
        /// Provider tag (`openai`, `anthropic`)
        provider: Option<String>,
    },
    /// Render a prompt and stream the response
    Run {
        /// Prompt id or name (case-insensitive)
        prompt: String,

        /// Placeholder value, repeatable
        #[arg(short = 'v', long = "var", value_name = "NAME=VALUE", value_parser = parse_field)]
        vars: Vec<(String, String)>,

        /// Follow-up instruction applied to the previous answer, repeatable
        #[arg(long = "adjust", value_name = "TEXT")]
        adjustments: Vec<String>,

        /// Print every stream event as one JSON line
        #[arg(long)]
        json: bool,

        /// Copy the final answer to the system clipboard
        #[arg(long)]
        copy: bool,
    },
    /// Inspect or edit settings
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(Debug, Subcommand)]
pub enum PromptAction {
    /// List saved prompts (default)
    List,
    /// Save a new prompt
    Add {
        name: String,

        /// Template text with `{{name}}` placeholders
        #[arg(long)]
        template: String,

        #[command(flatten)]
        fields: PromptFields,
    },
    /// Change fields of a saved prompt
    Edit {
        /// Prompt id or name (case-insensitive)
        prompt: String,

        #[arg(long)]
        name: Option<String>,

        #[arg(long)]
        template: Option<String>,

        #[command(flatten)]
        fields: PromptFields,
    },
    /// Delete a saved prompt
    Delete {
        /// Prompt id or name (case-insensitive)
        prompt: String,
    },
}

#[derive(Debug, Default, Args)]
pub struct PromptFields {
    #[arg(long)]
    pub description: Option<String>,

    /// Form field, repeatable; replaces the whole field list when given
    #[arg(long = "placeholder", value_name = "NAME[=DEFAULT]", value_parser = parse_placeholder)]
    pub placeholders: Vec<(String, Option<String>)>,

    /// Provider tag (`openai`, `anthropic`)
    #[arg(long)]
    pub provider: Option<String>,

    /// Model id; an empty value means the settings model
    #[arg(long)]
    pub model: Option<String>,
}

#[derive(Debug, Subcommand)]
pub enum ConfigAction {
    /// Print the settings file path
    Path,
    /// Print effective settings with API keys masked
    Show,
    /// Store an API key for a provider
    SetKey { provider: String, key: String },
    /// Change provider options
    Set {
        provider: String,

        /// Model used when a prompt leaves its model blank
        #[arg(long)]
        model: Option<String>,

        /// Custom API endpoint; an empty value restores the vendor default
        #[arg(long)]
        base_url: Option<String>,

        /// Make this the provider for prompts without one
        #[arg(long)]
        default: bool,
    },
}

fn parse_field(raw: &str) -> Result<(String, String), String> {
    let (name, value) = raw
        .split_once('=')
        .ok_or_else(|| format!("expected NAME=VALUE, got '{raw}'"))?;
    let name = name.trim();
    if name.is_empty() {
        return Err(format!("placeholder name is empty in '{raw}'"));
    }
    Ok((name.to_string(), value.to_string()))
}

fn parse_placeholder(raw: &str) -> Result<(String, Option<String>), String> {
    match raw.split_once('=') {
        Some(_) => parse_field(raw).map(|(name, value)| (name, Some(value))),
        None if raw.trim().is_empty() => Err("placeholder name is empty".to_string()),
        None => Ok((raw.trim().to_string(), None)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn run_collects_vars_and_adjustments() {
        let cli = Cli::try_parse_from([
            "hotprompt",
            "run",
            "translate",
            "-v",
            "text=a=b",
            "--var",
            "language=French",
            "--adjust",
            "shorter",
            "--json",
        ])
        .unwrap();

        let Command::Run {
            prompt,
            vars,
            adjustments,
            json,
            copy,
        } = cli.command
        else {
            panic!("expected run command");
        };
        assert_eq!(prompt, "translate");
        assert_eq!(
            vars,
            vec![
                ("text".to_string(), "a=b".to_string()),
                ("language".to_string(), "French".to_string()),
            ]
        );
        assert_eq!(adjustments, vec!["shorter".to_string()]);
        assert!(json);
        assert!(!copy);
    }

    #[test]
    fn malformed_vars_are_rejected() {
        assert!(parse_field("novalue").is_err());
        assert!(parse_field(" =x").is_err());
        assert_eq!(parse_field("k=").unwrap(), ("k".to_string(), String::new()));
    }

    #[test]
    fn placeholders_take_optional_defaults() {
        assert_eq!(parse_placeholder("text").unwrap(), ("text".to_string(), None));
        assert_eq!(
            parse_placeholder("language=Japanese").unwrap(),
            ("language".to_string(), Some("Japanese".to_string()))
        );
        assert!(parse_placeholder("  ").is_err());
    }

    #[test]
    fn config_set_key_parses() {
        let cli = Cli::try_parse_from(["hotprompt", "config", "set-key", "openai", "sk-1"]).unwrap();
        assert!(matches!(
            cli.command,
            Command::Config {
                action: ConfigAction::SetKey { .. }
            }
        ));
    }

    #[test]
    fn config_set_parses_provider_options() {
        let cli = Cli::try_parse_from([
            "hotprompt",
            "config",
            "set",
            "anthropic",
            "--model",
            "claude-sonnet-4-0",
            "--base-url",
            "",
            "--default",
        ])
        .unwrap();

        let Command::Config {
            action:
                ConfigAction::Set {
                    provider,
                    model,
                    base_url,
                    default,
                },
        } = cli.command
        else {
            panic!("expected config set");
        };
        assert_eq!(provider, "anthropic");
        assert_eq!(model.as_deref(), Some("claude-sonnet-4-0"));
        assert_eq!(base_url.as_deref(), Some(""));
        assert!(default);
    }

    #[test]
    fn prompt_subcommands_parse() {
        let cli = Cli::try_parse_from(["hotprompt", "prompts"]).unwrap();
        assert!(matches!(cli.command, Command::Prompts { action: None }));

        let cli = Cli::try_parse_from([
            "hotprompt",
            "prompts",
            "add",
            "Summarize",
            "--template",
            "Summarize {{text}}",
            "--placeholder",
            "text",
            "--provider",
            "anthropic",
        ])
        .unwrap();
        let Command::Prompts {
            action: Some(PromptAction::Add { name, fields, .. }),
        } = cli.command
        else {
            panic!("expected prompts add");
        };
        assert_eq!(name, "Summarize");
        assert_eq!(fields.placeholders, vec![("text".to_string(), None)]);
        assert_eq!(fields.provider.as_deref(), Some("anthropic"));
    }
}
