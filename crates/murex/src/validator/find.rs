//! Extraction of commands embedded in `find -exec` / `-execdir` clauses.

/// Terminators ending an `-exec` clause.
fn is_terminator(arg: &str) -> bool {
    arg == ";" || arg == "\\;" || arg == "+"
}

/// Collect the command operand of every `-exec`/`-execdir` clause.
///
/// A `find` with no such clause yields an empty list — it is just a search.
pub(crate) fn exec_commands(args: &[String]) -> Vec<String> {
    let mut commands = Vec::new();
    let mut i = 0;
    while i + 1 < args.len() {
        if args[i] == "-exec" || args[i] == "-execdir" {
            let mut j = i + 1;
            while j < args.len() && !is_terminator(&args[j]) {
                if j == i + 1 && !args[j].starts_with('{') {
                    commands.push(args[j].clone());
                }
                j += 1;
            }
            // Resume after the clause terminator.
            i = j;
        }
        i += 1;
    }
    commands
}

/// Drop clause terminators from find's own argument list so they are not
/// mistaken for path arguments during validation.
pub(crate) fn filter_special_args(args: &[String]) -> Vec<String> {
    args.iter()
        .filter(|arg| !is_terminator(arg))
        .cloned()
        .collect()
}
