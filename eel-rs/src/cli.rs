//! Command-line argument parsing.
//!
//! Usage:
//!   eel [-d] [-f[<file>]] [-t<secs>] [-p<digits>] [-Dkey=value]... [-e] <template>

use std::collections::HashMap;
use std::path::PathBuf;
use std::time::Duration;

use crate::config::parse_timeout;

pub const USAGE: &str =
    "Usage: eel [-d] [-f[<file>]] [-t<secs>] [-p<digits>] [-Dkey=value]... [-e] <template>";

// ── Public types ──────────────────────────────────────────────────────────────

/// Parsed command-line arguments.
#[derive(Debug, Default)]
pub struct CliArgs {
    /// Which settings file to load (`-f`).
    pub config: ConfigFile,
    /// Evaluation timeout (`-t<secs>`).
    pub timeout: Option<Duration>,
    /// Decimal precision (`-p<digits>`).
    pub precision: Option<u32>,
    /// Symbol definitions (`-Dkey=value`).
    pub defines: HashMap<String, String>,
    /// Treat the template as a bare expression (`-e`).
    pub expression: bool,
    /// Debug logging (`-d`).
    pub debug: bool,
    /// What to compile.
    pub template: Template,
}

/// How to choose the settings file.
#[derive(Debug, Default)]
pub enum ConfigFile {
    /// The per-user `eel.conf`, if it exists (default).
    #[default]
    Search,
    /// `-f` with no file argument: no settings file.
    Skip,
    /// `-f<file>`: load this specific file.
    Explicit(PathBuf),
}

/// Where the template text comes from.
#[derive(Debug, Default, PartialEq, Eq)]
pub enum Template {
    /// The single positional argument.
    Arg(String),
    /// `-`: read standard input.
    #[default]
    Stdin,
}

impl CliArgs {
    /// The text to compile, with `-e` applied.
    pub fn source(&self, text: &str) -> String {
        if self.expression {
            format!("$({text})")
        } else {
            text.to_owned()
        }
    }
}

// ── Parsing ───────────────────────────────────────────────────────────────────

/// Parse `std::env::args()` and return [`CliArgs`] or an error message.
pub fn parse_args() -> Result<CliArgs, String> {
    let raw: Vec<String> = std::env::args().collect();
    parse_argv(raw.get(1..).unwrap_or_default())
}

/// Parse a slice of argument strings (exposed for testing).
pub fn parse_argv(argv: &[String]) -> Result<CliArgs, String> {
    let mut args = CliArgs::default();
    let mut positional: Vec<String> = Vec::new();
    let mut i = 0;

    while i < argv.len() {
        let arg = argv[i].as_str();

        // `--` ends flag processing.
        if arg == "--" {
            i += 1;
            positional.extend(argv[i..].iter().cloned());
            break;
        }

        if !arg.starts_with('-') || arg == "-" {
            positional.push(arg.to_owned());
            i += 1;
            continue;
        }

        let chars: Vec<char> = arg[1..].chars().collect();
        let mut j = 0;
        while j < chars.len() {
            match chars[j] {
                'd' => args.debug = true,
                'e' => args.expression = true,

                // -f[<file>]
                'f' => {
                    if j + 1 < chars.len() {
                        let file: String = chars[j + 1..].iter().collect();
                        args.config = ConfigFile::Explicit(PathBuf::from(file));
                        j = chars.len();
                    } else {
                        args.config = ConfigFile::Skip;
                    }
                }

                flag @ ('t' | 'p' | 'D') => {
                    let value = if j + 1 < chars.len() {
                        let s: String = chars[j + 1..].iter().collect();
                        j = chars.len();
                        s
                    } else if i + 1 < argv.len() {
                        i += 1;
                        argv[i].clone()
                    } else {
                        return Err(format!("-{flag} requires an argument"));
                    };
                    match flag {
                        't' => args.timeout = Some(parse_timeout(&value)?),
                        'p' => {
                            let digits = value
                                .parse()
                                .map_err(|_| format!("invalid precision: {value}"))?;
                            args.precision = Some(digits);
                        }
                        _ => {
                            let (key, val) = value.split_once('=').unwrap_or((value.as_str(), ""));
                            if key.is_empty() {
                                return Err(format!("invalid definition: -D{value}"));
                            }
                            args.defines.insert(key.to_owned(), val.to_owned());
                        }
                    }
                }

                c => return Err(format!("unknown option: -{c}")),
            }
            j += 1;
        }
        i += 1;
    }

    match positional.len() {
        0 => return Err("missing template".to_owned()),
        1 => {
            let text = positional.remove(0);
            args.template = if text == "-" { Template::Stdin } else { Template::Arg(text) };
        }
        n => return Err(format!("too many arguments ({n})")),
    }

    Ok(args)
}

// ── Path helpers ──────────────────────────────────────────────────────────────

/// The per-user settings file, when one exists.
pub fn find_user_config() -> Option<PathBuf> {
    let dirs = directories::ProjectDirs::from("", "", "eel")?;
    let path = dirs.config_dir().join("eel.conf");
    path.exists().then_some(path)
}

// ── Tests ─────────────────────────────────────────────────────────────────────
