use asupersync::runtime::RuntimeBuilder;
use formspool_core::testing::{ChunkedBody, FormBuilder};
use formspool_core::{
    CloseReason, DEFAULT_SIZE_LIMIT, DecodeError, DecodeState, ErrorKind, UploadLimits, decode,
};
use futures_executor::block_on;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::mpsc;

fn entries(dir: &Path) -> usize {
    std::fs::read_dir(dir).expect("read spool dir").count()
}

#[test]
fn oversized_avatar_fails_and_leaves_no_files() {
    let dir = tempfile::tempdir().unwrap();
    let body = FormBuilder::new("XYZ")
        .field("name", "hello")
        .file("avatar", "a.png", "image/png", b"abc")
        .finish();
    let limits = UploadLimits::new(dir.path()).with_file_size_limit(2);

    let decoder = decode(ChunkedBody::split(&body, 5), "XYZ", limits).unwrap();
    let err = block_on(decoder.collect()).unwrap_err();

    match err {
        DecodeError::FileSizeExceeded { field, limit } => {
            assert_eq!(field, "avatar");
            assert_eq!(limit, 2);
        }
        other => panic!("expected FileSizeExceeded, got {other:?}"),
    }
    assert_eq!(entries(dir.path()), 0);
}

#[test]
fn two_small_fields_decode_in_memory() {
    let dir = tempfile::tempdir().unwrap();
    let body = FormBuilder::new("XYZ")
        .field("first", "hello")
        .field("second", "world")
        .finish();
    let limits = UploadLimits::new(dir.path());
    assert_eq!(limits.size_limit(), DEFAULT_SIZE_LIMIT);

    let form = block_on(decode(ChunkedBody::new([body]), "XYZ", limits).unwrap().collect())
        .unwrap();

    assert_eq!(form.len(), 2);
    let parts = form.parts();
    assert_eq!(parts[0].name(), "first");
    assert_eq!(parts[0].value(), Some(&b"hello"[..]));
    assert_eq!(parts[1].name(), "second");
    assert_eq!(parts[1].value(), Some(&b"world"[..]));
    assert!(parts.iter().all(|p| p.is_field()));
    assert_eq!(entries(dir.path()), 0);
}

#[test]
fn truncated_after_headers_reports_truncation() {
    let dir = tempfile::tempdir().unwrap();
    let body = FormBuilder::new("XYZ")
        .file("doc", "d.txt", "text/plain", b"partial body")
        .unterminated();
    // Drop the trailing CRLF and some content so the body never closes.
    let cut = &body[..body.len() - 6];

    let mut decoder =
        decode(ChunkedBody::split(cut, 4), "XYZ", UploadLimits::new(dir.path())).unwrap();
    let err = block_on(decoder.next_part()).unwrap_err();

    assert_eq!(err.kind(), ErrorKind::TruncatedStream);
    assert_eq!(decoder.state(), DecodeState::Failed(ErrorKind::TruncatedStream));
    assert_eq!(entries(dir.path()), 0);
}

#[test]
fn total_limit_failure_removes_earlier_files() {
    let dir = tempfile::tempdir().unwrap();
    let body = FormBuilder::new("b0undary")
        .file("one", "1.bin", "application/octet-stream", vec![1u8; 40])
        .file("two", "2.bin", "application/octet-stream", vec![2u8; 40])
        .finish();
    let limits = UploadLimits::new(dir.path()).with_size_limit(60);

    let mut decoder = decode(ChunkedBody::split(&body, 16), "b0undary", limits).unwrap();
    let first = block_on(decoder.next_part()).unwrap().unwrap();
    let first_path = first.as_file().unwrap().path().to_path_buf();
    assert!(first_path.exists());

    let err = block_on(decoder.next_part()).unwrap_err();
    assert!(matches!(err, DecodeError::TotalSizeExceeded { limit: 60, .. }));
    assert!(!first_path.exists(), "files of yielded parts are removed too");
    drop(first);
    assert_eq!(entries(dir.path()), 0);
}

#[test]
fn cleanup_never_touches_unrelated_files() {
    let dir = tempfile::tempdir().unwrap();
    let bystander = dir.path().join("formspool-bystander.part");
    std::fs::write(&bystander, b"not ours").unwrap();

    let body = FormBuilder::new("XYZ")
        .file("f", "f.bin", "application/octet-stream", b"0123456789")
        .finish();
    let limits = UploadLimits::new(dir.path()).with_file_size_limit(4);
    let mut decoder = decode(ChunkedBody::split(&body, 3), "XYZ", limits).unwrap();

    assert!(block_on(decoder.next_part()).is_err());
    decoder.abort();
    decoder.abort();

    assert!(bystander.exists());
    assert_eq!(entries(dir.path()), 1);
}

#[test]
fn successful_files_outlive_the_decoder_until_dropped() {
    let dir = tempfile::tempdir().unwrap();
    let body = FormBuilder::new("XYZ")
        .file("doc", "report.pdf", "application/pdf", b"%PDF-1.7")
        .finish();

    let mut form = block_on(
        decode(ChunkedBody::split(&body, 7), "XYZ", UploadLimits::new(dir.path()))
            .unwrap()
            .collect(),
    )
    .unwrap();

    let mut file = form.take_file("doc").unwrap();
    assert!(file.is_settled());
    let kept = dir.path().join("kept.pdf");
    file.persist(&kept).unwrap();
    drop(file);
    drop(form);

    assert_eq!(std::fs::read(&kept).unwrap(), b"%PDF-1.7");
    assert_eq!(entries(dir.path()), 1);
}

#[test]
fn transport_failure_is_reported_as_stream_closed() {
    let dir = tempfile::tempdir().unwrap();
    let body = FormBuilder::new("XYZ")
        .file("f", "f.bin", "application/octet-stream", vec![7u8; 64])
        .unterminated();
    let stream = ChunkedBody::split(&body[..body.len() / 2], 8)
        .with_error(io::Error::new(io::ErrorKind::UnexpectedEof, "connection dropped"));

    let err = block_on(
        decode(stream, "XYZ", UploadLimits::new(dir.path()))
            .unwrap()
            .collect(),
    )
    .unwrap_err();

    assert!(matches!(
        err,
        DecodeError::StreamClosed {
            reason: CloseReason::Transport,
            ..
        }
    ));
    assert_eq!(entries(dir.path()), 0);
}

#[test]
fn missing_directory_is_a_storage_error() {
    let dir = tempfile::tempdir().unwrap();
    let missing = dir.path().join("nope");
    let err = decode(ChunkedBody::new(Vec::new()), "XYZ", UploadLimits::new(&missing)).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::StorageError);
    assert!(!missing.exists());
}

#[test]
fn spool_directory_vanishing_mid_decode_is_a_storage_error() {
    let dir = tempfile::tempdir().unwrap();
    let spool = dir.path().join("spool");
    std::fs::create_dir(&spool).unwrap();
    let body = FormBuilder::new("XYZ")
        .file("first", "a.bin", "application/octet-stream", vec![1u8; 32])
        .file("second", "b.bin", "application/octet-stream", vec![2u8; 32])
        .finish();

    let mut decoder =
        decode(ChunkedBody::split(&body, 8), "XYZ", UploadLimits::new(&spool)).unwrap();
    let first = block_on(decoder.next_part()).unwrap().unwrap();
    let claimed = first.into_file().unwrap().into_path();
    std::fs::remove_file(&claimed).unwrap();
    std::fs::remove_dir(&spool).unwrap();

    let err = block_on(decoder.next_part()).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::StorageError);
    assert_eq!(decoder.state(), DecodeState::Failed(ErrorKind::StorageError));
    assert!(block_on(decoder.next_part()).unwrap().is_none());
    assert!(!spool.exists(), "the spool directory is never recreated");
}

#[test]
fn concurrent_sessions_share_a_directory() {
    let dir = tempfile::tempdir().unwrap();
    let root = dir.path().to_path_buf();

    let (kept_tx, kept_rx) = mpsc::channel::<Vec<PathBuf>>();

    let handles: Vec<_> = (0..8u8)
        .map(|i| {
            let root = root.clone();
            let kept_tx = kept_tx.clone();
            std::thread::spawn(move || {
                let rt = RuntimeBuilder::current_thread()
                    .build()
                    .expect("test runtime must build");
                rt.block_on(async move {
                    let payload = vec![i; 256 + usize::from(i)];
                    let builder = FormBuilder::new(format!("bnd{i}"));
                    let boundary = builder.boundary().to_string();
                    let body = builder
                        .field("id", i.to_string())
                        .file("blob", "blob.bin", "application/octet-stream", &payload)
                        .finish();

                    // Odd sessions exceed their file limit and must clean up.
                    let limit = if i % 2 == 0 { 4096 } else { 100 };
                    let limits = UploadLimits::new(&root).with_file_size_limit(limit);
                    let result = decode(ChunkedBody::split(&body, 17).yielding(), &boundary, limits)
                        .unwrap()
                        .collect()
                        .await;

                    let kept = match result {
                        Ok(form) => {
                            assert_eq!(i % 2, 0);
                            let file = form.get_file("blob").unwrap();
                            assert_eq!(file.read_to_vec().unwrap(), payload);
                            form.into_files()
                                .into_iter()
                                .map(formspool_core::SpooledFile::into_path)
                                .collect::<Vec<_>>()
                        }
                        Err(err) => {
                            assert_eq!(i % 2, 1);
                            assert_eq!(err.kind(), ErrorKind::FileSizeExceeded);
                            Vec::new()
                        }
                    };
                    kept_tx.send(kept).expect("send kept paths");
                });
            })
        })
        .collect();
    drop(kept_tx);

    for handle in handles {
        handle.join().expect("session thread");
    }
    let kept: Vec<PathBuf> = kept_rx.into_iter().flatten().collect();

    assert_eq!(kept.len(), 4);
    assert_eq!(entries(dir.path()), 4);
    for path in kept {
        std::fs::remove_file(path).unwrap();
    }
}
