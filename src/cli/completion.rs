//! Shell completion generation for cosmos-shuttle
//!
//! Generates completion scripts for bash, zsh and fish. The bash script is
//! extended so `--source` only offers `.json` files.

use clap::CommandFactory;
use clap_complete::{Shell, generate};
use std::io::{self, Write};

use crate::cli::CliArgs;
use crate::error::{ConfigError, Result};

const BIN_NAME: &str = "cosmos-shuttle";

/// Print the completion script for `shell_name` to stdout.
pub fn generate_completion(shell_name: &str) -> Result<()> {
    let shell = parse_shell(shell_name)?;
    let mut stdout = io::stdout().lock();
    write_completion(shell, &mut stdout)?;
    stdout.flush()?;
    Ok(())
}

/// Parse shell name string to Shell enum
fn parse_shell(shell_name: &str) -> Result<Shell> {
    match shell_name.to_lowercase().as_str() {
        "bash" => Ok(Shell::Bash),
        "zsh" => Ok(Shell::Zsh),
        "fish" => Ok(Shell::Fish),
        _ => Err(ConfigError::Generic(format!(
            "Unsupported shell: {shell_name}. Supported shells: bash, zsh, fish"
        ))
        .into()),
    }
}

/// Write the completion script for `shell` to `out`.
pub fn write_completion<W: Write>(shell: Shell, out: &mut W) -> Result<()> {
    let mut cmd = CliArgs::command();
    let mut buffer = Vec::new();
    generate(shell, &mut cmd, BIN_NAME, &mut buffer);
    out.write_all(&buffer)?;

    if shell == Shell::Bash {
        write!(
            out,
            r#"
# Offer only JSON files after --source
_cosmos_shuttle_enhanced() {{
    local cur prev
    cur="${{COMP_WORDS[COMP_CWORD]}}"
    prev="${{COMP_WORDS[COMP_CWORD-1]}}"
    if [[ "$prev" == "--source" ]]; then
        COMPREPLY=($(compgen -f -X '!*.json' -- "$cur") $(compgen -d -- "$cur"))
        return 0
    fi
    _cosmos-shuttle "$@"
}}
complete -F _cosmos_shuttle_enhanced -o bashdefault -o default {BIN_NAME}
"#
        )?;
    }
    Ok(())
}
