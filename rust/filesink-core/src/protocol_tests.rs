// rust/filesink-core/src/protocol_tests.rs

//! End-to-end write, checkpoint, crash and commit sequences against the
//! in-memory store.

use std::path::Path;
use std::sync::mpsc::{self, Receiver};
use std::sync::Arc;

use crate::commit::{ChannelListener, CommitOutcome, Committer};
use crate::config::SinkConfig;
use crate::error::ErrorKind;
use crate::recoverable::{decode, CommitDescriptor, RecoverableWriter, ResumeDescriptor};
use crate::storage::{FileStore, MemoryStore, StoreCapabilities, StoreOp};

const TARGET: &str = "/out/part-0";

/// One "process": a writer and a committer sharing a store.
struct Process {
    writer: RecoverableWriter,
    committer: Committer,
}

fn start(store: &MemoryStore) -> (Process, Receiver<String>) {
    let (tx, rx) = mpsc::channel();
    let config = SinkConfig::default();
    let storage: Arc<dyn FileStore> = Arc::new(store.clone());
    let process = Process {
        writer: RecoverableWriter::new(Arc::clone(&storage), &config),
        committer: Committer::new(storage, &config).with_listener(ChannelListener::new(tx)),
    };
    (process, rx)
}

#[test]
fn test_commit_empty_file() {
    let store = MemoryStore::new();
    store.put("/tmp/.part-0.inprogress", Vec::new());
    let (process, rx) = start(&store);

    let committable = CommitDescriptor::new(TARGET, "/tmp/.part-0.inprogress", 0).unwrap();
    process.committer.commit(&committable).unwrap();

    assert!(store.exists(Path::new(TARGET)).unwrap());
    assert_eq!(store.contents(TARGET).unwrap(), b"");
    assert_eq!(rx.try_recv().unwrap(), TARGET);
}

#[test]
fn test_resume_after_crash_then_commit() {
    let store = MemoryStore::new();
    let first_run = b"a".repeat(100);
    let second_run = b"b".repeat(50);

    // First process: write 100 bytes, checkpoint, write garbage, crash
    let checkpoint_state = {
        let (process, _rx) = start(&store);
        let mut stream = process.writer.open_new(Path::new(TARGET)).unwrap();
        stream.append(&first_run).unwrap();
        let state = stream.snapshot_for_resume().unwrap().encode().unwrap();
        stream.append(b"never checkpointed").unwrap();
        stream.snapshot_for_resume().unwrap();
        state
    };

    // Second process: restore, resume, finish, commit
    let (process, rx) = start(&store);
    let resumable = ResumeDescriptor::decode(&checkpoint_state).unwrap();
    assert_eq!(resumable.offset(), 100);

    let mut stream = process.writer.resume_from(&resumable).unwrap();
    assert_eq!(stream.position(), 100);
    stream.append(&second_run).unwrap();
    let committable = stream.snapshot_for_commit().unwrap();
    let report = process.committer.commit(&committable).unwrap();

    let committed = store.contents(TARGET).unwrap();
    assert_eq!(committed.len(), 150);
    assert_eq!(&committed[..100], first_run.as_slice());
    assert_eq!(&committed[100..], second_run.as_slice());
    assert_eq!(report.outcome, CommitOutcome::Committed);
    assert_eq!(rx.try_iter().collect::<Vec<_>>(), vec![TARGET]);
    assert_eq!(store.paths(), vec![Path::new(TARGET).to_path_buf()]);
}

#[test]
fn test_crash_between_rename_and_notification() {
    let store = MemoryStore::new();
    let (process, _rx) = start(&store);
    let mut stream = process.writer.open_new(Path::new(TARGET)).unwrap();
    stream.append(b"exactly once").unwrap();
    let committable = stream.snapshot_for_commit().unwrap();
    let state = committable.encode().unwrap();

    // The rename happened, then the process died before notifying
    store
        .rename(committable.staging(), committable.target())
        .unwrap();
    drop(process);

    // Recovery replays the commit from checkpoint state
    let (process, rx) = start(&store);
    let replayed = decode(&state).unwrap().into_commit();
    let first = process.committer.commit(&replayed).unwrap();
    let second = process.committer.commit(&replayed).unwrap();

    assert_eq!(first.outcome, CommitOutcome::AlreadyCommitted);
    assert_eq!(second.outcome, CommitOutcome::AlreadyCommitted);
    assert_eq!(store.contents(TARGET).unwrap(), b"exactly once");
    assert_eq!(rx.try_iter().count(), 1);
}

#[test]
fn test_resume_without_truncate_touches_nothing() {
    let store = MemoryStore::new();
    let resumable = {
        let (process, _rx) = start(&store);
        let mut stream = process.writer.open_new(Path::new(TARGET)).unwrap();
        stream.append(b"partial").unwrap();
        stream.snapshot_for_resume().unwrap()
    };
    let before = store.paths();
    let staged = store.contents(resumable.staging()).unwrap();

    let limited = store.view_with_capabilities(StoreCapabilities {
        truncate: false,
        rename: true,
    });
    let writer = RecoverableWriter::new(Arc::new(limited), &SinkConfig::default());
    let err = writer.resume_from(&resumable).err().unwrap();

    assert_eq!(err.kind(), ErrorKind::UnsupportedRecovery);
    assert_eq!(store.paths(), before);
    assert_eq!(store.contents(resumable.staging()).unwrap(), staged);
    assert_eq!(store.call_count(StoreOp::Truncate), 0);
    assert_eq!(store.call_count(StoreOp::OpenAppend), 0);

    // The caller restarts the logical write from empty
    let mut restarted = writer.open_new(Path::new(TARGET)).unwrap();
    assert_eq!(restarted.position(), 0);
    restarted.append(b"full").unwrap();
    assert_ne!(restarted.staging(), resumable.staging());
}

#[test]
fn test_crash_between_copy_and_delete_without_rename() {
    let store = MemoryStore::with_capabilities(StoreCapabilities {
        truncate: true,
        rename: false,
    });
    let (process, rx) = start(&store);
    let mut stream = process.writer.open_new(Path::new(TARGET)).unwrap();
    stream.append(b"copied").unwrap();
    let committable = stream.snapshot_for_commit().unwrap();

    store.fail_next(StoreOp::Delete, 1);
    let err = process.committer.commit(&committable).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::CommitFailure);
    assert!(rx.try_recv().is_err());

    let (process, rx) = start(&store);
    let report = process.committer.commit(&committable).unwrap();

    assert_eq!(report.outcome, CommitOutcome::AlreadyCommitted);
    assert_eq!(store.paths(), vec![Path::new(TARGET).to_path_buf()]);
    assert_eq!(store.contents(TARGET).unwrap(), b"copied");
    assert_eq!(rx.try_iter().count(), 1);
}

#[test]
fn test_interrupted_copy_leaves_partial_target_that_is_repaired() {
    let store = MemoryStore::with_capabilities(StoreCapabilities {
        truncate: true,
        rename: false,
    });
    let (process, rx) = start(&store);
    let mut stream = process.writer.open_new(Path::new(TARGET)).unwrap();
    stream.append(b"0123456789").unwrap();
    let committable = stream.snapshot_for_commit().unwrap();

    // A torn copy from a previous attempt
    store.put(TARGET, b"01234".to_vec());

    let report = process.committer.commit(&committable).unwrap();

    assert_eq!(report.outcome, CommitOutcome::Committed);
    assert_eq!(store.contents(TARGET).unwrap(), b"0123456789");
    assert!(store.contents(committable.staging()).is_none());
    assert_eq!(rx.try_iter().count(), 1);
}

#[test]
fn test_commit_after_resume_snapshot_trims_later_appends() {
    let store = MemoryStore::new();
    let (process, rx) = start(&store);
    let mut stream = process.writer.open_new(Path::new(TARGET)).unwrap();
    stream.append(b"checkpointed").unwrap();
    let resumable = stream.snapshot_for_resume().unwrap();
    stream.append(b" and more").unwrap();
    stream.snapshot_for_resume().unwrap();
    drop(stream);

    // The checkpoint completed with the earlier snapshot, so commit it
    let report = process.committer.commit(&resumable.to_commit()).unwrap();

    assert_eq!(report.outcome, CommitOutcome::Committed);
    assert_eq!(store.contents(TARGET).unwrap(), b"checkpointed");
    assert_eq!(rx.try_recv().unwrap(), TARGET);
}

#[test]
fn test_failed_append_poisons_stream_until_resume() {
    let store = MemoryStore::new();
    let (process, _rx) = start(&store);
    let mut stream = process.writer.open_new(Path::new(TARGET)).unwrap();
    stream.append(b"good").unwrap();
    let resumable = stream.snapshot_for_resume().unwrap();

    store.set_capacity(Some(6));
    let err = stream.append(b"too long").unwrap_err();
    assert!(err.to_string().contains("2 of 8 bytes accepted"));
    assert!(stream.append(b"x").is_err());
    assert!(stream.snapshot_for_resume().is_err());
    drop(stream);

    store.set_capacity(None);
    let mut resumed = process.writer.resume_from(&resumable).unwrap();
    resumed.append(b" again").unwrap();
    let committable = resumed.snapshot_for_commit().unwrap();
    process.committer.commit(&committable).unwrap();

    assert_eq!(store.contents(TARGET).unwrap(), b"good again");
}

#[test]
fn test_checkpoint_commit_stops_at_failed_file_and_retry_completes() {
    let store = MemoryStore::new();
    let (process, rx) = start(&store);

    let mut committables = Vec::new();
    for name in ["/out/part-0", "/out/part-1", "/out/part-2"] {
        let mut stream = process.writer.open_new(Path::new(name)).unwrap();
        stream.append(name.as_bytes()).unwrap();
        committables.push(stream.snapshot_for_commit().unwrap());
    }

    // part-1's staging file is temporarily unreachable
    let middle = committables[1].staging().to_path_buf();
    let moved = store.contents(&middle).unwrap();
    store.delete(&middle).unwrap();

    let err = process.committer.commit_all(&committables).unwrap_err();
    assert_eq!(err.index, 1);
    assert_eq!(err.commit_name, "/out/part-1");
    assert_eq!(err.committed.len(), 1);
    assert!(store.contents("/out/part-2").is_none());

    // The staging file reappears and the checkpoint is retried as a whole
    store.put(&middle, moved);
    let reports = process.committer.commit_all(&committables).unwrap();

    assert_eq!(reports[0].outcome, CommitOutcome::AlreadyCommitted);
    assert_eq!(reports[1].outcome, CommitOutcome::Committed);
    assert_eq!(reports[2].outcome, CommitOutcome::Committed);
    assert_eq!(
        rx.try_iter().collect::<Vec<_>>(),
        vec!["/out/part-0", "/out/part-1", "/out/part-2"]
    );
}
