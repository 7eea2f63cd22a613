use std::path::Path;

/// Executable names that stand for a subcommand, e.g. a `run-disp` symlink.
pub(super) const COMMAND_ALIASES: [(&str, &str); 6] = [
    ("abacus-hod-mock", "hod-mock"),
    ("run-disp", "disp2lpt"),
    ("prep-ref", "ref-clustering"),
    ("gen-ezmock", "ezmock"),
    ("compare-poles", "compare"),
    ("data-object", "loglike"),
];

pub(super) fn command_alias_from_program_name(program_name: &str) -> Option<&'static str> {
    let executable_name = Path::new(program_name)
        .file_name()
        .and_then(|name| name.to_str())
        .unwrap_or(program_name);
    let normalized = executable_name
        .strip_suffix(".exe")
        .unwrap_or(executable_name);

    COMMAND_ALIASES
        .iter()
        .find(|(alias, _)| *alias == normalized)
        .map(|(_, command)| *command)
}
