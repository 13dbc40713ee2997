//! Share, query and stream through the content service.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use bytes::Bytes;
use smbvfs_media::{
    BackendError, ContentError, ManualClock, MediaContentService, RemoteFile, RemoteFileOpener,
    SmbMediaErrorCode, StreamConfig, StreamError, TicketError, TicketStore,
};

/// Files keyed by (mount, rel path), with read and close counters.
#[derive(Default)]
struct FakeShare {
    files: HashMap<(String, String), Bytes>,
    reads: Arc<AtomicUsize>,
    closes: Arc<AtomicUsize>,
}

struct FakeFile {
    data: Bytes,
    reads: Arc<AtomicUsize>,
    closes: Arc<AtomicUsize>,
}

impl RemoteFile for FakeFile {
    fn size(&mut self) -> Result<u64, BackendError> {
        Ok(self.data.len() as u64)
    }

    fn read_at(&mut self, offset: u64, len: usize) -> Result<Bytes, BackendError> {
        self.reads.fetch_add(1, Ordering::SeqCst);
        let start = (offset as usize).min(self.data.len());
        let end = (start + len).min(self.data.len());
        Ok(self.data.slice(start..end))
    }

    fn close(&mut self) -> Result<(), BackendError> {
        self.closes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

impl RemoteFileOpener for FakeShare {
    fn open(&self, mount: &str, rel: &str) -> Result<Box<dyn RemoteFile>, BackendError> {
        let data = self
            .files
            .get(&(mount.to_string(), rel.to_string()))
            .cloned()
            .ok_or_else(|| BackendError::other(format!("{rel}: STATUS_OBJECT_NAME_NOT_FOUND")))?;
        Ok(Box::new(FakeFile {
            data,
            reads: self.reads.clone(),
            closes: self.closes.clone(),
        }))
    }
}

struct Fixture {
    service: MediaContentService<u32>,
    clock: Arc<ManualClock>,
    reads: Arc<AtomicUsize>,
    closes: Arc<AtomicUsize>,
}

fn fixture(page_size: usize, max_cache: usize) -> Fixture {
    let mut share = FakeShare::default();
    let movie: Vec<u8> = (0..250u32).map(|i| i as u8).collect();
    share.files.insert(
        ("home".into(), "movies/a.mp4".into()),
        Bytes::from(movie),
    );
    let reads = share.reads.clone();
    let closes = share.closes.clone();

    let clock = Arc::new(ManualClock::new(0));
    let config = StreamConfig {
        page_size_bytes: page_size,
        max_cache_bytes: max_cache,
        idle_ttl_ms: 1_000,
        ..StreamConfig::default()
    };
    let tickets = Arc::new(TicketStore::from_config(clock.clone(), &config));
    let service = MediaContentService::new(tickets, Arc::new(share), config).unwrap();
    Fixture {
        service,
        clock,
        reads,
        closes,
    }
}

#[test]
fn share_query_and_stream() {
    let fx = fixture(64, 1024);
    let shared = fx
        .service
        .share(".agents/nas_smb/home/movies/a.mp4", "a.mp4")
        .unwrap();
    assert_eq!(shared.mime, "video/mp4");
    assert!(shared.locator.starts_with("content://smbvfs.smbmedia/v1/"));
    assert!(!shared.locator.contains("home"));
    assert!(!shared.locator.contains("movies"));

    let info = fx.service.query(&shared.locator, &10042).unwrap();
    assert_eq!(info.size_bytes, 250);
    assert_eq!(info.display_name, "a.mp4");
    assert_eq!(info.mime, "video/mp4");

    let stream = fx.service.open(&shared.locator, &10042).unwrap();
    assert_eq!(stream.size(), 250);
    let tail = stream.read(240, 32).unwrap();
    assert_eq!(tail.as_ref(), &(240..250u32).map(|i| i as u8).collect::<Vec<_>>()[..]);
    assert!(stream.read(250, 8).unwrap().is_empty());
}

#[test]
fn lru_sequence_through_stream() {
    let fx = fixture(64, 128);
    let shared = fx
        .service
        .share(".agents/nas_smb/home/movies/a.mp4", "a.mp4")
        .unwrap();
    let stream = fx.service.open(&shared.locator, &1).unwrap();

    for (offset, fetches) in [(0u64, 1usize), (64, 2), (1, 2), (128, 3), (65, 4)] {
        stream.read(offset, 1).unwrap();
        assert_eq!(fx.reads.load(Ordering::SeqCst), fetches, "after read at {offset}");
    }
}

#[test]
fn other_caller_is_rejected() {
    let fx = fixture(64, 1024);
    let shared = fx
        .service
        .share(".agents/nas_smb/home/movies/a.mp4", "a.mp4")
        .unwrap();
    fx.service.open(&shared.locator, &1).unwrap();
    let err = fx.service.open(&shared.locator, &2).unwrap_err();
    assert!(matches!(err, ContentError::Ticket(TicketError::CallerMismatch)));
    assert_eq!(err.errno(), libc::EACCES);
}

#[test]
fn revocation_stops_an_open_stream() {
    let fx = fixture(64, 1024);
    let shared = fx
        .service
        .share(".agents/nas_smb/home/movies/a.mp4", "a.mp4")
        .unwrap();
    let stream = fx.service.open(&shared.locator, &1).unwrap();
    stream.read(0, 10).unwrap();

    let token = fx.service.uris().parse_token(&shared.locator).unwrap();
    assert!(fx.service.tickets().revoke(&token));
    assert!(matches!(
        stream.read(0, 10),
        Err(ContentError::Ticket(TicketError::Expired))
    ));
}

#[test]
fn reads_slide_the_ttl_and_idle_streams_expire() {
    let fx = fixture(64, 1024);
    let shared = fx
        .service
        .share(".agents/nas_smb/home/movies/a.mp4", "a.mp4")
        .unwrap();
    let stream = fx.service.open(&shared.locator, &1).unwrap();
    for _ in 0..5 {
        fx.clock.advance(900);
        stream.read(0, 4).unwrap();
    }
    fx.clock.advance(1_001);
    assert!(matches!(
        stream.read(0, 4),
        Err(ContentError::Ticket(TicketError::Expired))
    ));
}

#[test]
fn release_closes_once() {
    let fx = fixture(64, 1024);
    let shared = fx
        .service
        .share(".agents/nas_smb/home/movies/a.mp4", "a.mp4")
        .unwrap();
    let stream = fx.service.open(&shared.locator, &1).unwrap();
    stream.release();
    stream.release();
    assert!(matches!(
        stream.read(0, 1),
        Err(ContentError::Stream(StreamError::Closed))
    ));
    drop(stream);
    assert_eq!(fx.closes.load(Ordering::SeqCst), 1);
}

#[test]
fn stream_debug_hides_the_token() {
    let fx = fixture(64, 1024);
    let shared = fx
        .service
        .share(".agents/nas_smb/home/movies/a.mp4", "a.mp4")
        .unwrap();
    let token = fx.service.uris().parse_token(&shared.locator).unwrap();
    let stream = fx.service.open(&shared.locator, &1).unwrap();
    let debug = format!("{stream:?}");
    assert!(debug.contains(&token[..8]));
    assert!(!debug.contains(&token));
    assert!(!debug.contains("movies"));
}

#[test]
fn missing_remote_file_maps_to_sanitized_error() {
    let fx = fixture(64, 1024);
    let shared = fx
        .service
        .share(".agents/nas_smb/home/movies/gone.mkv", "gone.mkv")
        .unwrap();
    assert_eq!(shared.mime, "video/x-matroska");
    let err = fx.service.open(&shared.locator, &1).unwrap_err();
    match err {
        ContentError::Stream(StreamError::Remote(e)) => {
            assert_eq!(e.code(), SmbMediaErrorCode::FileNotFound);
            assert!(!e.to_string().contains("gone"));
        }
        other => panic!("unexpected: {other:?}"),
    }
}

#[test]
fn bad_inputs() {
    let fx = fixture(64, 1024);
    assert!(matches!(
        fx.service.share(".agents/nas_smb/secrets/home.env", "x"),
        Err(ContentError::NotRemote)
    ));
    assert!(matches!(
        fx.service.share(".agents/nas_smb/home", "x"),
        Err(ContentError::NotRemote)
    ));
    assert!(matches!(
        fx.service.share("../../.agents/nas_smb/home/movies/a.mp4", "x"),
        Err(ContentError::NotRemote)
    ));
    assert!(matches!(
        fx.service.open("content://elsewhere/v1/abc/x", &1),
        Err(ContentError::BadLocator)
    ));
    assert!(matches!(
        fx.service.query("content://smbvfs.smbmedia/v1/unknown/x", &1),
        Err(ContentError::Ticket(TicketError::Expired))
    ));

    let shared = fx
        .service
        .share(".agents/nas_smb/home/movies/a.mp4", "notes")
        .unwrap();
    assert_eq!(shared.mime, "video/mp4");
    let shared = fx
        .service
        .share(".agents/nas_smb/home/movies/README", "")
        .unwrap();
    assert_eq!(shared.mime, "application/octet-stream");
    assert!(shared.locator.ends_with("/media"));
}
