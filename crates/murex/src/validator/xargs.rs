//! Extraction of the command `xargs` would execute.
//!
//! Purely syntactic: the validator decides allow/deny, this module only
//! surfaces the nested invocation.

/// Determine the nested command and its arguments from an `xargs` argument
/// vector. `Err` carries the reason no command could be determined.
pub(crate) fn parse_nested_command(args: &[String]) -> Result<(String, Vec<String>), String> {
    if args.is_empty() {
        return Err("no arguments provided to xargs".to_string());
    }

    if let Some(found) = find_exec_command(args) {
        return Ok(found);
    }
    if let Some(found) = first_command_after_flags(args) {
        return Ok(found);
    }

    Err("unable to determine command to be executed by xargs".to_string())
}

/// Look for an explicit `-exec`/`--exec` flag; the next token is the command
/// and everything after it the command's arguments.
fn find_exec_command(args: &[String]) -> Option<(String, Vec<String>)> {
    for i in 0..args.len().saturating_sub(1) {
        if args[i] == "-exec" || args[i] == "--exec" {
            let command = args[i + 1].clone();
            let rest = args.get(i + 2..).unwrap_or_default().to_vec();
            return Some((command, rest));
        }
    }
    None
}

/// Find the first non-flag token, skipping flag+value pairs.
fn first_command_after_flags(args: &[String]) -> Option<(String, Vec<String>)> {
    let mut i = 0;
    while i < args.len() {
        let arg = &args[i];
        if !arg.starts_with('-') {
            let command = arg.clone();
            let rest = args.get(i + 1..).unwrap_or_default().to_vec();
            return Some((command, rest));
        }

        i += 1;
        if takes_value(arg) && i < args.len() {
            // Skip the flag's value token too.
            i += 1;
        }
    }
    None
}

/// Whether an xargs flag consumes the following token as its value.
fn takes_value(flag: &str) -> bool {
    const FLAGS_WITH_VALUES: &[&str] = &[
        "-a",
        "--arg-file",
        "-E",
        "--eof",
        "--max-args",
        "-n",
        "--max-chars",
        "-s",
        "--max-lines",
        "-L",
        "--max-procs",
        "-P",
    ];

    if FLAGS_WITH_VALUES.contains(&flag) {
        return true;
    }
    if flag == "-i" || flag == "-I" {
        return true;
    }
    // -I{} / -i{} carry the value inline; nothing to skip.
    false
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn args(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_simple_command() {
        let (cmd, rest) = parse_nested_command(&args(&["echo", "test"])).unwrap();
        assert_eq!(cmd, "echo");
        assert_eq!(rest, args(&["test"]));
    }

    #[test]
    fn test_command_after_value_flags() {
        let (cmd, rest) = parse_nested_command(&args(&["-n", "1", "ls", "-la"])).unwrap();
        assert_eq!(cmd, "ls");
        assert_eq!(rest, args(&["-la"]));
    }

    #[test]
    fn test_inline_replace_token_flag() {
        // -I{} carries its value inline, so "grep" is the command.
        let (cmd, rest) =
            parse_nested_command(&args(&["-I{}", "grep", "pattern", "{}"])).unwrap();
        assert_eq!(cmd, "grep");
        assert_eq!(rest, args(&["pattern", "{}"]));
    }

    #[test]
    fn test_separate_replace_token_flag() {
        let (cmd, _) = parse_nested_command(&args(&["-I", "{}", "cat", "{}"])).unwrap();
        assert_eq!(cmd, "cat");
    }

    #[test]
    fn test_explicit_exec_flag() {
        let (cmd, rest) =
            parse_nested_command(&args(&["-exec", "sudo", "apt-get", "update"])).unwrap();
        assert_eq!(cmd, "sudo");
        assert_eq!(rest, args(&["apt-get", "update"]));
    }

    #[test]
    fn test_no_arguments() {
        let err = parse_nested_command(&[]).unwrap_err();
        assert_eq!(err, "no arguments provided to xargs");
    }

    #[test]
    fn test_only_flags() {
        let err = parse_nested_command(&args(&["-n", "1", "-L", "1"])).unwrap_err();
        assert_eq!(err, "unable to determine command to be executed by xargs");
    }

    #[test]
    fn test_trailing_lone_exec() {
        let err = parse_nested_command(&args(&["-exec"])).unwrap_err();
        assert_eq!(err, "unable to determine command to be executed by xargs");
    }

    #[test]
    fn test_trailing_lone_value_flag() {
        let err = parse_nested_command(&args(&["-n"])).unwrap_err();
        assert_eq!(err, "unable to determine command to be executed by xargs");
    }
}
