//! Terminal prompter
//!
//! Line-based widgets over rustyline: free text with the default pre-filled,
//! masked input via rpassword, and numbered menus for choices.

use std::io;

use colored::Colorize;
use questionnaire::{Choice, PromptDefault, PromptDescriptor, PromptError, PromptKind, Prompter, parse_bool_literal};
use rustyline::DefaultEditor;
use rustyline::error::ReadlineError;
use serde_json::Value;
use tracing::debug;

fn readline_error(err: ReadlineError) -> PromptError {
    match err {
        ReadlineError::Interrupted | ReadlineError::Eof => PromptError::Interrupted,
        ReadlineError::Io(e) => PromptError::Io(e),
        other => PromptError::Io(io::Error::other(other.to_string())),
    }
}

/// Parse a menu selection such as `2` or `1, 3`
///
/// Numbers are 1-based; returns 0-based indices of enabled choices.
fn parse_selection(input: &str, choices: &[Choice]) -> Result<Vec<usize>, String> {
    let mut picked = Vec::new();
    for part in input.split([',', ' ']).filter(|p| !p.is_empty()) {
        let number: usize = part.parse().map_err(|_| format!("\"{}\" is not a number", part))?;
        let Some(choice) = number.checked_sub(1).and_then(|i| choices.get(i)) else {
            return Err(format!("{} is not between 1 and {}", number, choices.len()));
        };
        if let Some(reason) = &choice.disabled {
            return Err(format!("{} is disabled: {}", choice.name, reason));
        }
        if !picked.contains(&(number - 1)) {
            picked.push(number - 1);
        }
    }
    Ok(picked)
}

pub struct TerminalPrompter {
    editor: DefaultEditor,
}

impl TerminalPrompter {
    pub fn new() -> Result<Self, PromptError> {
        let editor = DefaultEditor::new().map_err(readline_error)?;
        Ok(Self { editor })
    }

    fn header(descriptor: &PromptDescriptor) -> String {
        let mut parts = Vec::new();
        if let Some(mark) = &descriptor.mark {
            parts.push(mark.yellow().bold().to_string());
        }
        if let Some(count) = &descriptor.count {
            parts.push(count.bright_black().to_string());
        }
        parts.push(descriptor.message.to_string().bold().to_string());
        parts.join(" ")
    }

    fn read(&mut self, prompt: &str, initial: &str) -> Result<String, PromptError> {
        self.editor
            .readline_with_initial(prompt, (initial, ""))
            .map_err(readline_error)
    }

    fn ask_text(&mut self, descriptor: &PromptDescriptor) -> Result<Value, PromptError> {
        let header = Self::header(descriptor);
        let initial = match &descriptor.default {
            Some(PromptDefault::Text(text)) => text.clone(),
            _ => String::new(),
        };
        if descriptor.multiline {
            println!("{}", header);
            if let Some(placeholder) = &descriptor.placeholder {
                println!("{}", placeholder.bright_black());
            }
            println!("{}", "(finish with an empty line)".bright_black());
            let mut lines = Vec::new();
            loop {
                let first = if lines.is_empty() { initial.as_str() } else { "" };
                let line = self.read("  ", first)?;
                if line.is_empty() {
                    break;
                }
                lines.push(line);
            }
            return Ok(Value::String(lines.join("\n")));
        }
        if let Some(placeholder) = descriptor.placeholder.as_ref().filter(|_| initial.is_empty()) {
            println!("{}", placeholder.bright_black());
        }
        let line = self.read(&format!("{} ", header), &initial)?;
        Ok(Value::String(line))
    }

    fn ask_password(&mut self, descriptor: &PromptDescriptor) -> Result<Value, PromptError> {
        let entered = rpassword::prompt_password(format!("{} ", Self::header(descriptor)))?;
        match (&descriptor.default, entered.is_empty()) {
            (Some(PromptDefault::Text(default)), true) => Ok(Value::String(default.clone())),
            _ => Ok(Value::String(entered)),
        }
    }

    fn ask_yes_no(&mut self, question: &str, default: bool) -> Result<bool, PromptError> {
        let hint = if default { "[Y/n]" } else { "[y/N]" };
        loop {
            let line = self.read(&format!("{} {} ", question, hint.bright_black()), "")?;
            if line.trim().is_empty() {
                return Ok(default);
            }
            match parse_bool_literal(&line) {
                Some(answer) => return Ok(answer),
                None => eprintln!("{}", "Please answer yes or no".red()),
            }
        }
    }

    fn print_choices(choices: &[Choice], selected: &[usize]) {
        for (index, choice) in choices.iter().enumerate() {
            let marker = if selected.contains(&index) { "*" } else { " " };
            let line = format!("{} {:>2}) {}", marker, index + 1, choice.name);
            match &choice.disabled {
                Some(reason) => println!("{} {}", line.bright_black(), format!("({})", reason).bright_black()),
                None => println!("{}", line),
            }
        }
    }

    fn ask_choices(&mut self, descriptor: &PromptDescriptor, multiple: bool) -> Result<Value, PromptError> {
        let defaults = match &descriptor.default {
            Some(PromptDefault::Choice(index)) => vec![*index],
            Some(PromptDefault::Choices(indices)) => indices.clone(),
            _ => Vec::new(),
        };
        println!("{}", Self::header(descriptor));
        Self::print_choices(&descriptor.choices, &defaults);
        let hint = if multiple { "Numbers, comma separated" } else { "Number" };
        loop {
            let line = self.read(&format!("{} ", format!("{}:", hint).bright_black()), "")?;
            let picked = if line.trim().is_empty() {
                Ok(defaults.clone())
            } else {
                parse_selection(&line, &descriptor.choices)
            };
            match picked {
                Ok(picked) if multiple => {
                    let values = picked.iter().map(|&i| descriptor.choices[i].value.clone()).collect();
                    return Ok(Value::Array(values));
                }
                Ok(picked) if picked.len() == 1 => return Ok(descriptor.choices[picked[0]].value.clone()),
                Ok(_) => eprintln!("{}", "Pick exactly one choice".red()),
                Err(message) => eprintln!("{}", message.red()),
            }
        }
    }
}

impl Prompter for TerminalPrompter {
    fn ask(&mut self, descriptor: &PromptDescriptor) -> Result<Value, PromptError> {
        debug!(name = %descriptor.name, kind = ?descriptor.kind, "TerminalPrompter::ask: called");
        match descriptor.kind {
            PromptKind::Input => self.ask_text(descriptor),
            PromptKind::Password => self.ask_password(descriptor),
            PromptKind::Confirm => {
                let default = matches!(descriptor.default, Some(PromptDefault::Bool(true)));
                self.ask_yes_no(&Self::header(descriptor), default).map(Value::Bool)
            }
            PromptKind::Select => self.ask_choices(descriptor, false),
            PromptKind::Checkbox => self.ask_choices(descriptor, true),
        }
    }

    fn reject(&mut self, _descriptor: &PromptDescriptor, message: &str) {
        eprintln!("{} {}", ">>".red().bold(), message.red());
    }

    fn confirm(&mut self, message: &str, default: bool) -> Result<bool, PromptError> {
        self.ask_yes_no(&message.bold().to_string(), default)
    }
}
