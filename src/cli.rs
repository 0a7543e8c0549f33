//! Command-line arguments.

use std::path::PathBuf;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Args {
    pub schema: PathBuf,
    pub data: PathBuf,
    /// Zero-based page to list.
    pub page: usize,
    /// `Field=Value` assignments for the new row.
    pub assignments: Vec<(String, String)>,
    pub commit: bool,
    pub settings: Option<PathBuf>,
}

pub fn print_usage() {
    eprintln!("Usage: rowline --schema <FILE> --data <FILE> [OPTIONS]");
    eprintln!();
    eprintln!("Options:");
    eprintln!("  -s, --schema <FILE>       Journal template (.toml)");
    eprintln!("  -d, --data <FILE>         Journal data (.csv), created if missing");
    eprintln!("  -p, --page <N>            Page of rows to list, starting at 0 (default: 0)");
    eprintln!("  --set <FIELD=VALUE>       Fill a field of the new row (can be repeated)");
    eprintln!("  --commit                  Save the new row instead of previewing it");
    eprintln!("  --settings <FILE>         Settings file (default: settings.toml in the config dir)");
    eprintln!("  -h, --help                Print help");
}

/// Parse arguments (without the program name). `Ok(None)` means help was requested.
pub fn parse_args(args: &[String]) -> Result<Option<Args>, String> {
    let mut schema: Option<PathBuf> = None;
    let mut data: Option<PathBuf> = None;
    let mut page = 0;
    let mut assignments = Vec::new();
    let mut commit = false;
    let mut settings: Option<PathBuf> = None;

    let mut i = 0;
    while i < args.len() {
        match args[i].as_str() {
            "-h" | "--help" => return Ok(None),
            "-s" | "--schema" => {
                schema = Some(PathBuf::from(value_of(args, &mut i, "--schema", "a file path")?));
            }
            "-d" | "--data" => {
                data = Some(PathBuf::from(value_of(args, &mut i, "--data", "a file path")?));
            }
            "-p" | "--page" => {
                let raw = value_of(args, &mut i, "--page", "a page number")?;
                page = raw
                    .parse()
                    .map_err(|_| format!("Invalid page number: {}", raw))?;
            }
            "--set" => {
                let raw = value_of(args, &mut i, "--set", "FIELD=VALUE")?;
                let Some((field, value)) = raw.split_once('=') else {
                    return Err(format!("Expected FIELD=VALUE, got: {}", raw));
                };
                if field.trim().is_empty() {
                    return Err(format!("Missing field name in: {}", raw));
                }
                assignments.push((field.trim().to_string(), value.to_string()));
            }
            "--commit" => commit = true,
            "--settings" => {
                settings = Some(PathBuf::from(value_of(args, &mut i, "--settings", "a file path")?));
            }
            arg if arg.starts_with('-') => return Err(format!("Unknown option: {}", arg)),
            arg => return Err(format!("Unexpected argument: {}", arg)),
        }
        i += 1;
    }

    let schema = schema.ok_or("--schema is required")?;
    let data = data.ok_or("--data is required")?;
    Ok(Some(Args {
        schema,
        data,
        page,
        assignments,
        commit,
        settings,
    }))
}

fn value_of<'a>(args: &'a [String], i: &mut usize, flag: &str, what: &str) -> Result<&'a str, String> {
    *i += 1;
    args.get(*i)
        .map(String::as_str)
        .ok_or_else(|| format!("{} requires {}", flag, what))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(args: &[&str]) -> Result<Option<Args>, String> {
        let args: Vec<String> = args.iter().map(|s| s.to_string()).collect();
        parse_args(&args)
    }

    #[test]
    fn test_parse_full_command_line() {
        let args = parse(&[
            "--schema", "t.toml", "-d", "j.csv", "--set", "Name=a=b", "--set", " Qty =3",
            "--commit", "-p", "2",
        ])
        .unwrap()
        .unwrap();
        assert_eq!(args.schema, PathBuf::from("t.toml"));
        assert_eq!(args.data, PathBuf::from("j.csv"));
        assert_eq!(args.page, 2);
        assert_eq!(
            args.assignments,
            vec![
                ("Name".to_string(), "a=b".to_string()),
                ("Qty".to_string(), "3".to_string())
            ]
        );
        assert!(args.commit);
        assert_eq!(args.settings, None);
    }

    #[test]
    fn test_help_and_errors() {
        assert_eq!(parse(&["-h"]), Ok(None));
        assert!(parse(&["--schema", "t.toml"]).unwrap_err().contains("--data"));
        assert!(parse(&["--schema"]).unwrap_err().contains("requires"));
        assert!(parse(&["-s", "a", "-d", "b", "--set", "novalue"]).is_err());
        assert!(parse(&["-s", "a", "-d", "b", "--page", "x"]).is_err());
        assert!(parse(&["--bogus"]).unwrap_err().contains("Unknown option"));
    }
}
