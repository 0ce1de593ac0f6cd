//! Hand-written collaborators for driving the updater end to end.

#![allow(dead_code)]

use std::io::{self, Write};
use std::path::Path;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use bytes::Bytes;

use autoupdated::Collaborators;
use autoupdated::download::{DiskSpace, RemoteMetadata, Transfer, UpdateSource};
use autoupdated::error::TransportError;
use autoupdated::install::{
    CommandOutput, CommandRunner, RegistryValue, UNINSTALL_ROOTS, UninstallRegistry,
};

pub const URL: &str = "https://updates.example.com/releases/app.zip";

/// The artifact currently served by [`FakeSource`]
#[derive(Clone)]
struct Artifact {
    file_name: String,
    body: Vec<u8>,
    etag: String,
}

/// In-memory update server
pub struct FakeSource {
    artifact: Mutex<Artifact>,
    stall: AtomicBool,
    heads: AtomicUsize,
    gets: AtomicUsize,
}

impl FakeSource {
    pub fn serving(file_name: &str, body: Vec<u8>, etag: &str) -> Arc<Self> {
        Arc::new(Self {
            artifact: Mutex::new(Artifact {
                file_name: file_name.to_string(),
                body,
                etag: etag.to_string(),
            }),
            stall: AtomicBool::new(false),
            heads: AtomicUsize::new(0),
            gets: AtomicUsize::new(0),
        })
    }

    /// Publish a new artifact under the same name
    pub fn publish(&self, body: Vec<u8>, etag: &str) {
        let mut artifact = self.artifact.lock().unwrap();
        artifact.body = body;
        artifact.etag = etag.to_string();
    }

    /// Make every download hang until cancelled
    pub fn stall_downloads(&self) {
        self.stall.store(true, Ordering::SeqCst);
    }

    pub fn gets(&self) -> usize {
        self.gets.load(Ordering::SeqCst)
    }

    pub fn heads(&self) -> usize {
        self.heads.load(Ordering::SeqCst)
    }

    fn metadata(&self, url: &str) -> (RemoteMetadata, Vec<u8>) {
        let artifact = self.artifact.lock().unwrap().clone();
        let meta = RemoteMetadata {
            url: url.to_string(),
            status: 200,
            content_length: Some(artifact.body.len() as u64),
            etag: artifact.etag,
            file_name: Some(artifact.file_name),
        };
        (meta, artifact.body)
    }
}

struct FakeTransfer {
    metadata: RemoteMetadata,
    chunks: Vec<Bytes>,
}

#[async_trait]
impl Transfer for FakeTransfer {
    fn metadata(&self) -> &RemoteMetadata {
        &self.metadata
    }

    async fn chunk(&mut self) -> Result<Option<Bytes>, TransportError> {
        if self.chunks.is_empty() {
            Ok(None)
        } else {
            Ok(Some(self.chunks.remove(0)))
        }
    }
}

#[async_trait]
impl UpdateSource for FakeSource {
    async fn head(&self, url: &str) -> Result<RemoteMetadata, TransportError> {
        self.heads.fetch_add(1, Ordering::SeqCst);
        Ok(self.metadata(url).0)
    }

    async fn get(&self, url: &str) -> Result<Box<dyn Transfer>, TransportError> {
        self.gets.fetch_add(1, Ordering::SeqCst);
        if self.stall.load(Ordering::SeqCst) {
            return std::future::pending().await;
        }
        let (metadata, body) = self.metadata(url);
        Ok(Box::new(FakeTransfer {
            metadata,
            chunks: body.chunks(1024).map(Bytes::copy_from_slice).collect(),
        }))
    }
}

/// Uninstall entries under the native uninstall root
#[derive(Default)]
pub struct FakeRegistry {
    entries: Vec<(String, Vec<(String, RegistryValue)>)>,
}

impl FakeRegistry {
    pub fn with_entry(mut self, subkey: &str, values: &[(&str, &str)]) -> Self {
        let values = values
            .iter()
            .map(|(name, value)| (name.to_string(), RegistryValue::String(value.to_string())))
            .collect();
        self.entries.push((subkey.to_string(), values));
        self
    }
}

fn not_found(what: &str) -> io::Error {
    io::Error::new(io::ErrorKind::NotFound, format!("{what} not found"))
}

impl UninstallRegistry for FakeRegistry {
    fn subkeys(&self, root: &str) -> io::Result<Vec<String>> {
        if root != UNINSTALL_ROOTS[0] {
            return Err(not_found(root));
        }
        Ok(self.entries.iter().map(|(name, _)| name.clone()).collect())
    }

    fn value(&self, key: &str, name: &str) -> io::Result<RegistryValue> {
        self.entries
            .iter()
            .find(|(subkey, _)| key == format!(r"{}\{}", UNINSTALL_ROOTS[0], subkey))
            .and_then(|(_, values)| values.iter().find(|(n, _)| n == name))
            .map(|(_, value)| value.clone())
            .ok_or_else(|| not_found(name))
    }
}

/// Records every command. Lines containing "fail" fail; programs fail when configured to.
#[derive(Default)]
pub struct RecordingRunner {
    lines: Mutex<Vec<String>>,
    programs: Mutex<Vec<(String, Vec<String>)>>,
    fail_installs: AtomicBool,
}

impl RecordingRunner {
    pub fn failing_installs() -> Self {
        let runner = Self::default();
        runner.fail_installs.store(true, Ordering::SeqCst);
        runner
    }

    pub fn lines(&self) -> Vec<String> {
        self.lines.lock().unwrap().clone()
    }

    pub fn programs(&self) -> Vec<(String, Vec<String>)> {
        self.programs.lock().unwrap().clone()
    }
}

impl CommandRunner for RecordingRunner {
    fn run_line(&self, line: &str) -> io::Result<CommandOutput> {
        self.lines.lock().unwrap().push(line.to_string());
        let success = !line.contains("fail");
        Ok(CommandOutput {
            code: Some(if success { 0 } else { 1 }),
            success,
            output: format!("uninstall output for {line}"),
        })
    }

    fn run_program(&self, program: &Path, args: &[String]) -> io::Result<CommandOutput> {
        self.programs
            .lock()
            .unwrap()
            .push((program.display().to_string(), args.to_vec()));
        // The located installer must exist when it is run
        assert!(program.is_file(), "installer {} missing", program.display());

        let success = !self.fail_installs.load(Ordering::SeqCst);
        Ok(CommandOutput {
            code: Some(if success { 0 } else { 1603 }),
            success,
            output: "installer output".to_string(),
        })
    }
}

pub struct AmpleDisk;

impl DiskSpace for AmpleDisk {
    fn available(&self, _path: &Path) -> io::Result<u64> {
        Ok(u64::MAX)
    }
}

pub fn collaborators(
    source: Arc<FakeSource>,
    registry: FakeRegistry,
    runner: Arc<RecordingRunner>,
) -> Collaborators {
    Collaborators {
        source,
        disk: Arc::new(AmpleDisk),
        registry: Arc::new(registry),
        runner,
    }
}

/// A zip of roughly `size` bytes holding `entries` plus incompressible padding
pub fn zip_bytes(entries: &[(&str, &[u8])], size: usize) -> Vec<u8> {
    let mut cursor = io::Cursor::new(Vec::new());
    {
        let mut writer = zip::ZipWriter::new(&mut cursor);
        let options = zip::write::SimpleFileOptions::default()
            .compression_method(zip::CompressionMethod::Stored);
        for (name, data) in entries {
            writer.start_file(*name, options).unwrap();
            writer.write_all(data).unwrap();
        }

        // xorshift noise so the archive keeps its size
        let mut state: u32 = 0x9E37_79B9;
        let padding: Vec<u8> = (0..size)
            .map(|_| {
                state ^= state << 13;
                state ^= state >> 17;
                state ^= state << 5;
                state as u8
            })
            .collect();
        writer.start_file("data/padding.bin", options).unwrap();
        writer.write_all(&padding).unwrap();
        writer.finish().unwrap();
    }
    cursor.into_inner()
}

/// Poll until the background download has settled
pub async fn settle(updater: &autoupdated::Updater) {
    for _ in 0..500 {
        if updater.download_complete() {
            return;
        }
        tokio::time::sleep(std::time::Duration::from_millis(10)).await;
    }
    panic!("background download never settled");
}
