//! Line-based console of the interactive client
//!
//! Each line is one command. Arguments are split on whitespace; single or
//! double quotes keep a path with spaces together:
//!
//! ```text
//! upload "my notes.txt" report.pdf
//! download report.pdf
//! ```
//!
//! Upload, download and delete are followed by a LIST request so the file
//! list shown to the user reflects the change.

use std::path::PathBuf;

use crate::connect::ClientHandle;
use crate::error::DropError;
use crate::logging::*;

pub const HELP: &str = "\
Commands:
  list                  list files on the server
  upload <path>...      upload one or more local files
  download <name>       download a file into the download directory
  delete <name>         delete a file on the server
  quit                  exit";

/// Console command typed by the user
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConsoleCommand {
	List,
	Upload(Vec<PathBuf>),
	Download(String),
	Delete(String),
	Help,
	Quit,
}

/// Parse one input line; blank lines yield `None`
pub fn parse_command(line: &str) -> Result<Option<ConsoleCommand>, DropError> {
	let mut words = split_args(line)?.into_iter();
	let word = match words.next() {
		Some(word) => word,
		None => return Ok(None),
	};
	let args: Vec<String> = words.collect();

	let single = |what: &str| -> Result<String, DropError> {
		match args.as_slice() {
			[arg] => Ok(arg.clone()),
			[] => Err(format!("{}: missing {}", word, what).into()),
			_ => Err(format!("{}: expected one {}, got {}", word, what, args.len()).into()),
		}
	};

	let command = match word.as_str() {
		"list" | "ls" => ConsoleCommand::List,
		"upload" | "put" => {
			if args.is_empty() {
				return Err(format!("{}: missing path", word).into());
			}
			ConsoleCommand::Upload(args.iter().map(PathBuf::from).collect())
		}
		"download" | "get" => ConsoleCommand::Download(single("file name")?),
		"delete" | "rm" => ConsoleCommand::Delete(single("file name")?),
		"help" | "?" => ConsoleCommand::Help,
		"quit" | "exit" => ConsoleCommand::Quit,
		other => return Err(format!("Unknown command: {} (try 'help')", other).into()),
	};
	Ok(Some(command))
}

/// Submit a network command, refreshing the file list after each change
///
/// Every path of an upload is tried; the list is refreshed when at least one
/// was submitted and the first failure is returned.
pub fn execute(handle: &ClientHandle, command: &ConsoleCommand) -> Result<(), DropError> {
	match command {
		ConsoleCommand::List => handle.list(),
		ConsoleCommand::Upload(paths) => {
			let mut submitted = 0;
			let mut first_error = None;
			for path in paths {
				match handle.upload_file(path) {
					Ok(()) => submitted += 1,
					Err(e) => {
						debug!("Upload of {} not submitted: {}", path.display(), e);
						first_error.get_or_insert(e);
					}
				}
			}
			if submitted > 0 {
				handle.list()?;
			}
			match first_error {
				Some(e) => Err(e),
				None => Ok(()),
			}
		}
		ConsoleCommand::Download(name) => {
			handle.download(name)?;
			handle.list()
		}
		ConsoleCommand::Delete(name) => {
			handle.delete(name)?;
			handle.list()
		}
		ConsoleCommand::Help | ConsoleCommand::Quit => Ok(()),
	}
}

/// Whitespace split honouring single and double quotes
fn split_args(line: &str) -> Result<Vec<String>, DropError> {
	let mut args = Vec::new();
	let mut current = String::new();
	let mut in_word = false;
	let mut quote: Option<char> = None;

	for c in line.chars() {
		match quote {
			Some(q) if c == q => quote = None,
			Some(_) => current.push(c),
			None if c == '"' || c == '\'' => {
				quote = Some(c);
				in_word = true;
			}
			None if c.is_whitespace() => {
				if in_word {
					args.push(std::mem::take(&mut current));
					in_word = false;
				}
			}
			None => {
				current.push(c);
				in_word = true;
			}
		}
	}

	if let Some(q) = quote {
		return Err(format!("Unterminated {} quote", q).into());
	}
	if in_word {
		args.push(current);
	}
	Ok(args)
}


// vim: ts=4
