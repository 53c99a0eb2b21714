//! /vars command - show variables collected during the conversation

use super::CommandResult;
use crate::ui::sanitize;
use palaver_gateway::Variables;

pub struct VarsCommand;

impl VarsCommand {
    pub fn execute(variables: &Variables) -> CommandResult {
        if variables.is_empty() {
            return CommandResult::Message("No variables collected yet.".to_string());
        }

        // Values print as JSON, which escapes control characters; keys do not
        let keys: Vec<String> = variables.keys().map(|k| sanitize(k)).collect();
        let width = keys.iter().map(|k| k.chars().count()).max().unwrap_or(0);
        let mut output = String::from("Variables\n");
        output.push_str(&"-".repeat(40));
        output.push('\n');
        for (key, value) in keys.iter().zip(variables.values()) {
            output.push_str(&format!("{:<width$}  {}\n", key, value, width = width));
        }
        CommandResult::Message(output.trim_end().to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_empty() {
        assert_eq!(
            VarsCommand::execute(&Variables::new()),
            CommandResult::Message("No variables collected yet.".into())
        );
    }

    #[test]
    fn test_keys_are_sorted_and_aligned() {
        let mut vars = Variables::new();
        vars.insert("plan".into(), json!("pro"));
        vars.insert("email".into(), json!("ada@example.com"));
        vars.insert("seats".into(), json!(3));

        let CommandResult::Message(text) = VarsCommand::execute(&vars) else {
            panic!("expected a message");
        };
        let lines: Vec<&str> = text.lines().skip(2).collect();
        assert_eq!(
            lines,
            vec![
                "email  \"ada@example.com\"",
                "plan   \"pro\"",
                "seats  3",
            ]
        );
    }

    #[test]
    fn test_control_characters_in_keys_are_stripped() {
        let mut vars = Variables::new();
        vars.insert("\x1b[2Jname".into(), json!("line\x1b[31m"));

        let CommandResult::Message(text) = VarsCommand::execute(&vars) else {
            panic!("expected a message");
        };
        assert!(!text.contains('\x1b'));
        assert_eq!(text.lines().nth(2), Some("[2Jname  \"line\\u001b[31m\""));
    }
}
