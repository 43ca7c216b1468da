//! Shared fixtures for integration tests.

#![allow(dead_code)]

use hotswap_tls::sources::{CERT_FILE, KEY_FILE, X509KeyPair};
use std::cell::Cell;
use std::fs::{self, File};
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};
use tempfile::TempDir;

/// A fresh self-signed certificate and its key.
pub fn key_pair() -> X509KeyPair {
    let rcgen::CertifiedKey { cert, key_pair } =
        rcgen::generate_simple_self_signed(vec!["localhost".to_string()]).unwrap();
    X509KeyPair {
        cert_pem: cert.pem().into_bytes(),
        key_pem: key_pair.serialize_pem().into_bytes(),
    }
}

/// A seconds-since-epoch timestamp.
pub fn stamp(secs: u64) -> SystemTime {
    SystemTime::UNIX_EPOCH + Duration::from_secs(secs)
}

/// A temporary certificate directory with pinned modification times.
///
/// Like an ACME client's `live` directory, the watched path is a symlink to
/// the current generation, so a renewal swaps both files at once.
pub struct CertFixture {
    root: TempDir,
    generation: Cell<u32>,
}

impl CertFixture {
    pub fn empty() -> Self {
        let fixture = Self {
            root: TempDir::new().unwrap(),
            generation: Cell::new(0),
        };
        fixture.publish(fixture.next_generation());
        fixture
    }

    /// A directory already holding a pair stamped at 1000s.
    pub fn with_pair() -> (Self, X509KeyPair) {
        let fixture = Self::empty();
        let pair = fixture.write_pair(1000, 1000);
        (fixture, pair)
    }

    pub fn path(&self) -> PathBuf {
        self.root.path().join("live")
    }

    pub fn cert_path(&self) -> PathBuf {
        self.path().join(CERT_FILE)
    }

    pub fn key_path(&self) -> PathBuf {
        self.path().join(KEY_FILE)
    }

    /// Publish a new pair with the given modification times.
    pub fn write_pair(&self, cert_secs: u64, key_secs: u64) -> X509KeyPair {
        let pair = key_pair();
        let dir = self.next_generation();
        let (cert_path, key_path) = (dir.join(CERT_FILE), dir.join(KEY_FILE));

        fs::write(&cert_path, &pair.cert_pem).unwrap();
        fs::write(&key_path, &pair.key_pem).unwrap();
        set_mtime(&cert_path, stamp(cert_secs));
        set_mtime(&key_path, stamp(key_secs));

        self.publish(dir);
        pair
    }

    /// Bump only the key's modification time.
    pub fn touch_key(&self, secs: u64) {
        set_mtime(&self.key_path(), stamp(secs));
    }

    fn next_generation(&self) -> PathBuf {
        let generation = self.generation.get() + 1;
        self.generation.set(generation);
        let dir = self.root.path().join(format!("gen-{generation}"));
        fs::create_dir(&dir).unwrap();
        dir
    }

    fn publish(&self, dir: PathBuf) {
        let staged = self.root.path().join("live.tmp");
        std::os::unix::fs::symlink(dir, &staged).unwrap();
        fs::rename(&staged, self.path()).unwrap();
    }
}

fn set_mtime(path: &Path, time: SystemTime) {
    File::options()
        .write(true)
        .open(path)
        .unwrap()
        .set_modified(time)
        .unwrap();
}
