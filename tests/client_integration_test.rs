//! Client integration tests
//!
//! Drives the reconnecting client against a real server (or a bare listener)
//! and checks the events delivered to the presentation side.

use std::fs;
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;
use tokio::io::AsyncWriteExt;
use tokio::net::TcpListener;
use tokio::sync::mpsc::UnboundedReceiver;

use dropr::connect::{Client, ClientHandle};
use dropr::console::{execute, parse_command, ConsoleCommand};
use dropr::protocol::{ClientEvent, FrameLimits, Header, Opcode, Status, MAGIC};
use dropr::serve::Server;
use dropr::storage::DirStorage;

// ============================================================================
// Helper Functions
// ============================================================================

struct Setup {
	server_dir: TempDir,
	download_dir: TempDir,
	handle: ClientHandle,
	events: UnboundedReceiver<ClientEvent>,
}

async fn start() -> Setup {
	let server_dir = TempDir::new().unwrap();
	let download_dir = TempDir::new().unwrap();
	fs::write(server_dir.path().join("a.txt"), b"hello").unwrap();

	let server = Server::bind("127.0.0.1:0", Arc::new(DirStorage::new(server_dir.path())), FrameLimits::default())
		.await
		.unwrap();
	let addr = server.local_addr().unwrap().to_string();
	tokio::spawn(server.run());

	let (client, handle, events) = Client::new(addr, Arc::new(DirStorage::new(download_dir.path())));
	tokio::spawn(client.with_reconnect_delay(Duration::from_millis(20)).run());

	Setup { server_dir, download_dir, handle, events }
}

fn run_console(handle: &ClientHandle, line: &str) {
	let command = parse_command(line).unwrap().expect("blank command line");
	execute(handle, &command).unwrap();
}

async fn next_event(events: &mut UnboundedReceiver<ClientEvent>) -> ClientEvent {
	tokio::time::timeout(Duration::from_secs(5), events.recv())
		.await
		.expect("timed out waiting for an event")
		.expect("event channel closed")
}

/// Skip the connect notification and the welcome list
async fn wait_ready(events: &mut UnboundedReceiver<ClientEvent>) -> Vec<String> {
	assert!(matches!(next_event(events).await, ClientEvent::Connected { .. }));
	match next_event(events).await {
		ClientEvent::FileList(files) => files,
		other => panic!("expected welcome list, got {:?}", other),
	}
}

// ============================================================================
// Tests
// ============================================================================

#[tokio::test]
async fn test_welcome_list_on_connect() {
	let mut s = start().await;
	assert_eq!(wait_ready(&mut s.events).await, vec!["a.txt".to_string()]);
}

#[tokio::test]
async fn test_upload_list_delete() {
	let mut s = start().await;
	wait_ready(&mut s.events).await;

	s.handle.upload("x.bin", vec![1, 2, 3]).unwrap();
	match next_event(&mut s.events).await {
		ClientEvent::Uploaded { status, .. } => assert_eq!(status, Status::Ok),
		other => panic!("unexpected {:?}", other),
	}
	assert_eq!(fs::read(s.server_dir.path().join("x.bin")).unwrap(), vec![1, 2, 3]);

	s.handle.list().unwrap();
	assert_eq!(
		next_event(&mut s.events).await,
		ClientEvent::FileList(vec!["a.txt".to_string(), "x.bin".to_string()])
	);

	s.handle.delete("x.bin").unwrap();
	match next_event(&mut s.events).await {
		ClientEvent::Deleted { status, .. } => assert_eq!(status, Status::Ok),
		other => panic!("unexpected {:?}", other),
	}

	s.handle.delete("x.bin").unwrap();
	match next_event(&mut s.events).await {
		ClientEvent::Deleted { status, message } => {
			assert_eq!(status, Status::NotFound);
			assert_eq!(message, "File does not exist");
		}
		other => panic!("unexpected {:?}", other),
	}
}

#[tokio::test]
async fn test_download_is_saved() {
	let mut s = start().await;
	wait_ready(&mut s.events).await;

	s.handle.download("a.txt").unwrap();
	assert_eq!(
		next_event(&mut s.events).await,
		ClientEvent::Downloaded { file_name: "a.txt".to_string(), size: 5 }
	);
	assert_eq!(fs::read(s.download_dir.path().join("a.txt")).unwrap(), b"hello".to_vec());
}

#[tokio::test]
async fn test_download_missing_reports_server_error() {
	let mut s = start().await;
	wait_ready(&mut s.events).await;

	s.handle.download("missing.txt").unwrap();
	match next_event(&mut s.events).await {
		ClientEvent::ServerError { status, message } => {
			assert_eq!(status, Status::Fail);
			assert!(message.contains("missing.txt"));
		}
		other => panic!("unexpected {:?}", other),
	}
	assert!(!s.download_dir.path().join("missing.txt").exists());
}

#[tokio::test]
async fn test_reconnects_after_server_closes() {
	let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
	let addr = listener.local_addr().unwrap().to_string();
	let download_dir = TempDir::new().unwrap();

	let (client, handle, mut events) = Client::new(addr, Arc::new(DirStorage::new(download_dir.path())));
	let task = tokio::spawn(client.with_reconnect_delay(Duration::from_millis(20)).run());

	// First connection is dropped straight away
	let (first, _) = listener.accept().await.unwrap();
	drop(first);
	assert!(matches!(next_event(&mut events).await, ClientEvent::Connected { .. }));
	assert!(matches!(next_event(&mut events).await, ClientEvent::Disconnected { .. }));

	// Client comes back on its own
	let (_second, _) = tokio::time::timeout(Duration::from_secs(5), listener.accept()).await.unwrap().unwrap();
	assert!(matches!(next_event(&mut events).await, ClientEvent::Connected { .. }));

	handle.shutdown();
	tokio::time::timeout(Duration::from_secs(5), task).await.unwrap().unwrap();
}

#[tokio::test]
async fn test_reconnects_after_protocol_violation() {
	let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
	let addr = listener.local_addr().unwrap().to_string();
	let download_dir = TempDir::new().unwrap();

	let (client, handle, mut events) = Client::new(addr, Arc::new(DirStorage::new(download_dir.path())));
	let task = tokio::spawn(client.with_reconnect_delay(Duration::from_millis(20)).run());

	// First server greets with a header carrying the wrong magic
	let (mut first, _) = listener.accept().await.unwrap();
	let mut header = Header::new(Opcode::ListReply, 0, 0).encode();
	header[0] = (MAGIC >> 8) as u8 ^ 0xFF;
	first.write_all(&header).await.unwrap();

	assert!(matches!(next_event(&mut events).await, ClientEvent::Connected { .. }));
	match next_event(&mut events).await {
		ClientEvent::Disconnected { reason } => assert!(reason.to_lowercase().contains("magic"), "{}", reason),
		other => panic!("expected disconnect, got {:?}", other),
	}

	let (_second, _) = tokio::time::timeout(Duration::from_secs(5), listener.accept()).await.unwrap().unwrap();
	assert!(matches!(next_event(&mut events).await, ClientEvent::Connected { .. }));

	handle.shutdown();
	tokio::time::timeout(Duration::from_secs(5), task).await.unwrap().unwrap();
	drop(first);
}

// ============================================================================
// Console
// ============================================================================

#[tokio::test]
async fn test_console_upload_several_files_then_list() {
	let mut s = start().await;
	wait_ready(&mut s.events).await;

	let local = TempDir::new().unwrap();
	let one = local.path().join("one.txt");
	let two = local.path().join("two words.txt");
	fs::write(&one, b"1").unwrap();
	fs::write(&two, b"22").unwrap();

	let line = format!("upload {} \"{}\"", one.display(), two.display());
	match parse_command(&line).unwrap() {
		Some(ConsoleCommand::Upload(paths)) => assert_eq!(paths, vec![one.clone(), two.clone()]),
		other => panic!("unexpected {:?}", other),
	}
	run_console(&s.handle, &line);

	for _ in 0..2 {
		match next_event(&mut s.events).await {
			ClientEvent::Uploaded { status, .. } => assert_eq!(status, Status::Ok),
			other => panic!("unexpected {:?}", other),
		}
	}
	assert_eq!(
		next_event(&mut s.events).await,
		ClientEvent::FileList(vec!["a.txt".to_string(), "one.txt".to_string(), "two words.txt".to_string()])
	);
	assert_eq!(fs::read(s.server_dir.path().join("two words.txt")).unwrap(), b"22".to_vec());
}

#[tokio::test]
async fn test_console_download_and_delete_refresh_list() {
	let mut s = start().await;
	wait_ready(&mut s.events).await;

	run_console(&s.handle, "get a.txt");
	assert_eq!(
		next_event(&mut s.events).await,
		ClientEvent::Downloaded { file_name: "a.txt".to_string(), size: 5 }
	);
	assert_eq!(next_event(&mut s.events).await, ClientEvent::FileList(vec!["a.txt".to_string()]));

	run_console(&s.handle, "rm a.txt");
	match next_event(&mut s.events).await {
		ClientEvent::Deleted { status, .. } => assert_eq!(status, Status::Ok),
		other => panic!("unexpected {:?}", other),
	}
	assert_eq!(next_event(&mut s.events).await, ClientEvent::FileList(vec![]));
}

#[tokio::test]
async fn test_console_upload_missing_file_skips_refresh() {
	let mut s = start().await;
	wait_ready(&mut s.events).await;

	let missing = s.download_dir.path().join("nope.txt");
	let command = parse_command(&format!("upload {}", missing.display())).unwrap().unwrap();
	assert!(execute(&s.handle, &command).is_err());

	// Nothing was sent, so the next event answers this LIST
	run_console(&s.handle, "list");
	assert_eq!(next_event(&mut s.events).await, ClientEvent::FileList(vec!["a.txt".to_string()]));
}

// vim: ts=4
