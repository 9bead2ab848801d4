use dialoguer::theme::ColorfulTheme;
use dialoguer::{Password, Select};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PromptReply<T> {
    Value(T),
    /// End of input or interrupt.
    Cancelled,
}

pub trait Prompt: Send + Sync {
    /// Reads a secret without echo. An empty answer is a valid value.
    fn secret(&self, label: &str) -> PromptReply<String>;

    /// Lets the operator pick one of `options`; returns its index.
    fn choose(&self, question: &str, options: &[&str]) -> PromptReply<usize>;
}

/// Terminal prompt backed by `dialoguer`.
#[derive(Debug, Default)]
pub struct TerminalPrompt;

impl Prompt for TerminalPrompt {
    fn secret(&self, label: &str) -> PromptReply<String> {
        match Password::with_theme(&ColorfulTheme::default())
            .with_prompt(label)
            .allow_empty_password(true)
            .interact()
        {
            Ok(value) => PromptReply::Value(value),
            Err(_) => PromptReply::Cancelled,
        }
    }

    fn choose(&self, question: &str, options: &[&str]) -> PromptReply<usize> {
        match Select::with_theme(&ColorfulTheme::default())
            .with_prompt(question)
            .items(options)
            .default(options.len().saturating_sub(1))
            .interact_opt()
        {
            Ok(Some(index)) => PromptReply::Value(index),
            Ok(None) | Err(_) => PromptReply::Cancelled,
        }
    }
}

/// Answers every question with "cancelled". Used when prompting is disabled.
#[derive(Debug, Default)]
pub struct NoPrompt;

impl Prompt for NoPrompt {
    fn secret(&self, _label: &str) -> PromptReply<String> {
        PromptReply::Cancelled
    }

    fn choose(&self, _question: &str, _options: &[&str]) -> PromptReply<usize> {
        PromptReply::Cancelled
    }
}
