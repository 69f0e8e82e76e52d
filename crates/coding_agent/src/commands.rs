/// Executable plus arguments parsed from a model-supplied command line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandLine {
    pub program: String,
    pub args: Vec<String>,
}

/// Splits on whitespace. Quoting and escapes are not interpreted, so
/// `echo "a b"` yields the arguments `"a` and `b"`.
pub fn split_command_line(input: &str) -> Option<CommandLine> {
    let mut parts = input.split_whitespace().map(str::to_string);
    let program = parts.next()?;

    Some(CommandLine {
        program,
        args: parts.collect(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn splits_program_and_arguments() {
        assert_eq!(
            split_command_line("  npm   install --save  express "),
            Some(CommandLine {
                program: "npm".to_string(),
                args: vec![
                    "install".to_string(),
                    "--save".to_string(),
                    "express".to_string()
                ],
            })
        );
    }

    #[test]
    fn blank_input_has_no_command() {
        assert_eq!(split_command_line(""), None);
        assert_eq!(split_command_line(" \t\n"), None);
    }

    #[test]
    fn quotes_are_not_interpreted() {
        let command = split_command_line("echo \"a b\"").expect("command");
        assert_eq!(command.args, vec!["\"a".to_string(), "b\"".to_string()]);
    }
}
