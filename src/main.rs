use clap::{Arg, Command};
use std::error::Error;
use std::io::{self, BufRead};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::thread;

use dropr::config::Config;
use dropr::connect::{Client, ClientHandle};
use dropr::console::{execute, parse_command, ConsoleCommand, HELP};
use dropr::error::DropError;
use dropr::logging::*;
use dropr::protocol::ClientEvent;
use dropr::storage::DirStorage;

///////////
// Serve //
///////////

fn run_server(config: &Config) -> Result<(), Box<dyn Error>> {
	let runtime = tokio::runtime::Builder::new_current_thread().enable_all().build()?;
	let result: Result<(), DropError> = runtime.block_on(async {
		tokio::select! {
			result = dropr::serve::serve(config) => result,
			_ = tokio::signal::ctrl_c() => {
				info!("Interrupted, shutting down");
				Ok(())
			}
		}
	});
	result?;
	Ok(())
}

/////////////
// Connect //
/////////////

/// Stdin reader thread; EOF or `quit` stops the client
fn read_commands(handle: ClientHandle) {
	let stdin = io::stdin();
	for line in stdin.lock().lines() {
		let line = match line {
			Ok(line) => line,
			Err(e) => {
				error!("Cannot read stdin: {}", e);
				break;
			}
		};

		match parse_command(&line) {
			Ok(Some(ConsoleCommand::Quit)) => break,
			Ok(Some(ConsoleCommand::Help)) => println!("{}", HELP),
			Ok(Some(command)) => {
				if let Err(e) = execute(&handle, &command) {
					println!("[-] {}", e);
				}
			}
			Ok(None) => {}
			Err(e) => println!("[-] {}", e),
		}
	}
	handle.shutdown();
}

fn present(event: &ClientEvent, download_dir: &Path) {
	match event {
		ClientEvent::Connected { addr } => println!("[+] Connected to {}", addr),
		ClientEvent::Disconnected { reason } => println!("[-] Disconnected: {}", reason),
		ClientEvent::FileList(files) => {
			println!("[+] File list received ({} files):", files.len());
			for file in files {
				println!(" - {}", file);
			}
		}
		ClientEvent::Uploaded { status, message } => println!("[+] Upload result: {} {}", status, message),
		ClientEvent::Deleted { status, message } => println!("[+] Delete result: {} {}", status, message),
		ClientEvent::Downloaded { file_name, size } => {
			println!("[+] File downloaded: {} ({} bytes)", download_dir.join(file_name).display(), size)
		}
		ClientEvent::DownloadFailed { file_name, message } => {
			println!("[-] Failed to save {}: {}", file_name, message)
		}
		ClientEvent::ServerError { status, message } => println!("[!] Server error: {} {}", status, message),
	}
}

fn run_client(config: Config) -> Result<(), Box<dyn Error>> {
	std::fs::create_dir_all(&config.download_dir)?;
	let downloads = Arc::new(DirStorage::new(&config.download_dir));
	let (client, handle, mut events) = Client::from_config(&config, downloads);

	// Network loop on its own single-threaded runtime
	let network = thread::Builder::new().name("dropr-net".to_string()).spawn(move || -> io::Result<()> {
		let runtime = tokio::runtime::Builder::new_current_thread().enable_all().build()?;
		runtime.block_on(client.run());
		Ok(())
	})?;

	let input = handle.clone();
	thread::Builder::new().name("dropr-input".to_string()).spawn(move || read_commands(input))?;
	drop(handle);

	// This thread presents events until the network loop is gone
	println!("{}", HELP);
	while let Some(event) = events.blocking_recv() {
		present(&event, &config.download_dir);
	}

	match network.join() {
		Ok(result) => result?,
		Err(_) => return Err("network thread panicked".into()),
	}
	Ok(())
}

//////////
// Main //
//////////

fn main() -> Result<(), Box<dyn Error>> {
	let matches = Command::new("dropr")
		.version(env!("CARGO_PKG_VERSION"))
		.about("File drop box over a framed TCP protocol")
		.subcommand_required(true)
		.arg(
			Arg::new("config")
				.short('c')
				.long("config")
				.value_name("FILE")
				.help("Config file (.toml or JSON5)"),
		)
		.subcommand(
			Command::new("serve")
				.about("Serve a directory")
				.arg(Arg::new("listen").short('l').long("listen").value_name("ADDR").help("Listen address"))
				.arg(Arg::new("dir").help("Storage directory")),
		)
		.subcommand(
			Command::new("connect")
				.about("Interactive client")
				.arg(Arg::new("server").short('s').long("server").value_name("ADDR").help("Server address"))
				.arg(
					Arg::new("downloads")
						.short('d')
						.long("downloads")
						.value_name("DIR")
						.help("Download directory"),
				),
		)
		.get_matches();

	let config_path = matches.get_one::<String>("config").map(PathBuf::from);
	let mut config = Config::load(config_path.as_deref())?;

	match matches.subcommand() {
		Some(("serve", sub)) => {
			if let Some(addr) = sub.get_one::<String>("listen") {
				config.listen_addr = addr.clone();
			}
			if let Some(dir) = sub.get_one::<String>("dir") {
				config.storage_dir = PathBuf::from(dir);
			}
			config.validate()?;
			init_tracing(&config.log_level);
			run_server(&config)
		}
		Some(("connect", sub)) => {
			if let Some(addr) = sub.get_one::<String>("server") {
				config.server_addr = addr.clone();
			}
			if let Some(dir) = sub.get_one::<String>("downloads") {
				config.download_dir = PathBuf::from(dir);
			}
			config.validate()?;
			init_tracing(&config.log_level);
			run_client(config)
		}
		_ => Err("a subcommand is required".into()),
	}
}

// vim: ts=4
