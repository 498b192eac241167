//! Streaming transfer engine for text and binary records.
//!
//! Upload:
//! ```text
//! chunk 1 ──► key + meta ──► seal(meta) ──► StagedFile::create
//! chunk n ──► re-block into block_size ──► seal(block) ──► append frame
//! EOF     ──► seal(tail) ──► fsync ──► store upsert ──► rename ──► ack
//! ```
//! Frames are `block_size + 16` bytes (the last may be shorter), so the file
//! layout does not depend on how the client chunked the wire. Any exit
//! before the rename drops the staging guard and removes the partial file.
//!
//! Download resolves the record before the first message, then lazily reads
//! and opens one frame per outbound chunk.

use futures::stream::{self, BoxStream, Stream, StreamExt};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::io::{AsyncReadExt, BufReader};
use tracing::{info, warn};

use vault_core::types::{FileKind, SessionToken};
use vault_core::{VaultError, VaultResult};
use vault_crypto::{CipherEnvelope, TAG_SIZE};
use vault_store::{FileRecord, SharedStore, UpsertMode};

use crate::auth::Caller;
use crate::staging::StagedFile;
use crate::{crypto_error, record_error};

/// One message of a text or binary transfer, after wire decoding
#[derive(Clone, Default, PartialEq, Eq)]
pub struct Chunk {
    pub key: String,
    pub data: Vec<u8>,
    pub meta: Vec<u8>,
}

impl std::fmt::Debug for Chunk {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Chunk")
            .field("key", &self.key)
            .field("data_len", &self.data.len())
            .field("meta_len", &self.meta.len())
            .finish()
    }
}

#[derive(Clone, Copy)]
enum Op {
    Save,
    Update,
    Get,
    Delete,
}

fn context(kind: FileKind, op: Op) -> &'static str {
    match (kind, op) {
        (FileKind::Text, Op::Save) => "unable to save text data",
        (FileKind::Text, Op::Update) => "unable to update text data",
        (FileKind::Text, Op::Get) => "unable to get text data",
        (FileKind::Text, Op::Delete) => "unable to delete text data",
        (FileKind::Binary, Op::Save) => "unable to save binary data",
        (FileKind::Binary, Op::Update) => "unable to update binary data",
        (FileKind::Binary, Op::Get) => "unable to get binary data",
        (FileKind::Binary, Op::Delete) => "unable to delete binary data",
    }
}

pub struct TransferEngine {
    store: SharedStore,
    envelope: Arc<CipherEnvelope>,
    data_dir: PathBuf,
    block_size: usize,
}

impl TransferEngine {
    pub fn new(
        store: SharedStore,
        envelope: Arc<CipherEnvelope>,
        data_dir: impl Into<PathBuf>,
        block_size: usize,
    ) -> Self {
        Self {
            store,
            envelope,
            data_dir: data_dir.into(),
            block_size: block_size.max(1),
        }
    }

    /// Consume an inbound chunk stream and persist it as one record.
    ///
    /// `UpsertMode::Create` is Add, `UpsertMode::Replace` is Update. Either
    /// the whole payload becomes visible or nothing changes.
    pub async fn upload<S>(
        &self,
        caller: &Caller,
        kind: FileKind,
        mode: UpsertMode,
        inbound: S,
    ) -> VaultResult<()>
    where
        S: Stream<Item = VaultResult<Chunk>> + Send,
    {
        let ctx = match mode {
            UpsertMode::Create => context(kind, Op::Save),
            UpsertMode::Replace => context(kind, Op::Update),
        };
        let mut inbound = std::pin::pin!(inbound);

        let first = inbound
            .next()
            .await
            .ok_or(VaultError::InvalidArgument("upload stream carried no chunks"))??;
        if first.key.is_empty() {
            return Err(VaultError::InvalidArgument("record key must not be empty"));
        }
        let key = first.key;

        let previous = match mode {
            UpsertMode::Create => None,
            UpsertMode::Replace => Some(
                self.store
                    .get_file_record(caller.account_id, kind, &key)
                    .await
                    .map_err(|e| record_error(e, ctx))?,
            ),
        };

        let token = caller.token.as_bytes();
        let sealed_meta = self
            .envelope
            .encrypt(&first.meta, token)
            .map(hex::encode)
            .map_err(|e| crypto_error(e, ctx))?;

        let final_path = self
            .data_dir
            .join(kind.backing_file_name(&caller.account_id, &key));
        let mut staged = StagedFile::create(&final_path)
            .await
            .map_err(|e| VaultError::internal(ctx, e))?;

        let mut pending = first.data;
        let mut frames = 0usize;
        let mut plaintext_len = 0usize;
        loop {
            let mut start = 0;
            while pending.len() - start >= self.block_size {
                let block = &pending[start..start + self.block_size];
                self.write_frame(&mut staged, block, token, ctx).await?;
                start += self.block_size;
                frames += 1;
                plaintext_len += self.block_size;
            }
            pending.drain(..start);

            match inbound.next().await {
                Some(chunk) => pending.extend_from_slice(&chunk?.data),
                None => break,
            }
        }
        if !pending.is_empty() || frames == 0 {
            self.write_frame(&mut staged, &pending, token, ctx).await?;
            frames += 1;
            plaintext_len += pending.len();
        }

        staged
            .finish()
            .await
            .map_err(|e| VaultError::internal(ctx, e))?;

        // Store first, then rename. Between the two, a concurrent download
        // of an updated record sees the new metadata with the previous
        // frames; both are sealed under the same token, so it reads a
        // mixed but valid response rather than a failure.
        let record = FileRecord {
            path: final_path.clone(),
            meta: sealed_meta,
            block_size: self.block_size,
        };
        self.store
            .upsert_file_record(caller.account_id, kind, &key, record, mode)
            .await
            .map_err(|e| record_error(e, ctx))?;

        if let Err(e) = staged.commit(&final_path).await {
            self.compensate(caller, kind, &key, previous).await;
            return Err(VaultError::internal(ctx, e));
        }

        if let Some(previous) = previous.filter(|p| p.path != final_path) {
            remove_backing_file(&previous.path).await;
        }

        info!(kind = %kind, frames, bytes = plaintext_len, "record stored");
        Ok(())
    }

    async fn write_frame(
        &self,
        staged: &mut StagedFile,
        block: &[u8],
        token: &[u8],
        ctx: &'static str,
    ) -> VaultResult<()> {
        let sealed = self
            .envelope
            .encrypt(block, token)
            .map_err(|e| crypto_error(e, ctx))?;
        staged
            .write(&sealed)
            .await
            .map_err(|e| VaultError::internal(ctx, e))
    }

    /// Undo a store change whose file never reached its final path.
    async fn compensate(
        &self,
        caller: &Caller,
        kind: FileKind,
        key: &str,
        previous: Option<FileRecord>,
    ) {
        let outcome = match previous {
            None => {
                self.store
                    .soft_delete_file_record(caller.account_id, kind, key)
                    .await
            }
            Some(previous) => {
                self.store
                    .upsert_file_record(caller.account_id, kind, key, previous, UpsertMode::Replace)
                    .await
            }
        };
        if let Err(e) = outcome {
            warn!(kind = %kind, "failed to roll back record after commit failure: {e}");
        }
    }

    /// Resolve a record and stream its decrypted frames.
    ///
    /// Lookup failures surface here, before any chunk is produced; decrypt
    /// or read failures end the stream with an error item.
    pub async fn download(
        &self,
        caller: &Caller,
        kind: FileKind,
        key: &str,
    ) -> VaultResult<BoxStream<'static, VaultResult<Chunk>>> {
        let ctx = context(kind, Op::Get);
        let record = self
            .store
            .get_file_record(caller.account_id, kind, key)
            .await
            .map_err(|e| record_error(e, ctx))?;

        let sealed_meta = hex::decode(&record.meta).map_err(|e| VaultError::internal(ctx, e))?;
        let meta = self
            .envelope
            .decrypt(&sealed_meta, caller.token.as_bytes())
            .map_err(|e| crypto_error(e, ctx))?;

        let file = tokio::fs::File::open(&record.path)
            .await
            .map_err(|e| VaultError::internal(ctx, e))?;

        let state = Download {
            reader: BufReader::new(file),
            envelope: self.envelope.clone(),
            token: caller.token.clone(),
            key: key.to_string(),
            meta,
            frame_size: record.block_size.max(1) + TAG_SIZE,
            exhausted: false,
            ctx,
        };
        Ok(stream::try_unfold(state, Download::next_chunk).boxed())
    }

    /// Physical delete first, then the soft delete in the store.
    pub async fn delete(&self, caller: &Caller, kind: FileKind, key: &str) -> VaultResult<()> {
        let ctx = context(kind, Op::Delete);
        let record = self
            .store
            .get_file_record(caller.account_id, kind, key)
            .await
            .map_err(|e| record_error(e, ctx))?;

        match tokio::fs::remove_file(&record.path).await {
            Ok(()) => {}
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                warn!(kind = %kind, "backing file already absent");
            }
            Err(e) => return Err(VaultError::internal(ctx, e)),
        }

        self.store
            .soft_delete_file_record(caller.account_id, kind, key)
            .await
            .map_err(|e| record_error(e, ctx))?;
        info!(kind = %kind, "record deleted");
        Ok(())
    }
}

struct Download {
    reader: BufReader<tokio::fs::File>,
    envelope: Arc<CipherEnvelope>,
    token: SessionToken,
    key: String,
    meta: Vec<u8>,
    frame_size: usize,
    exhausted: bool,
    ctx: &'static str,
}

impl Download {
    async fn next_chunk(mut self) -> VaultResult<Option<(Chunk, Download)>> {
        if self.exhausted {
            return Ok(None);
        }

        let mut frame = Vec::with_capacity(self.frame_size);
        (&mut self.reader)
            .take(self.frame_size as u64)
            .read_to_end(&mut frame)
            .await
            .map_err(|e| VaultError::internal(self.ctx, e))?;
        if frame.is_empty() {
            return Ok(None);
        }
        if frame.len() < self.frame_size {
            self.exhausted = true;
        }

        let data = self
            .envelope
            .decrypt(&frame, self.token.as_bytes())
            .map_err(|e| crypto_error(e, self.ctx))?;

        let chunk = Chunk {
            key: self.key.clone(),
            data,
            meta: self.meta.clone(),
        };
        Ok(Some((chunk, self)))
    }
}

async fn remove_backing_file(path: &Path) {
    match tokio::fs::remove_file(path).await {
        Ok(()) => {}
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
        Err(e) => warn!(path = %path.display(), "failed to remove superseded backing file: {e}"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::TryStreamExt;
    use std::time::Duration;
    use vault_core::types::AccountId;
    use vault_crypto::TokenDeriver;
    use vault_store::{CredentialStore, LocalStore, StoreError};

    const BLOCK: usize = 8;

    struct Fixture {
        dir: tempfile::TempDir,
        store: Arc<LocalStore>,
        engine: TransferEngine,
    }

    fn fixture() -> Fixture {
        let dir = tempfile::tempdir().unwrap();
        let store = Arc::new(LocalStore::in_memory());
        let envelope = Arc::new(CipherEnvelope::from_key([3u8; 32]));
        let engine = TransferEngine::new(store.clone(), envelope, dir.path(), BLOCK);
        Fixture { dir, store, engine }
    }

    fn caller(password: &str) -> Caller {
        Caller {
            account_id: AccountId::new_random(),
            login: "alice".into(),
            token: TokenDeriver::new("test").derive(password),
        }
    }

    fn wire(key: &str, meta: &[u8], payload: &[u8], width: usize) -> Vec<VaultResult<Chunk>> {
        let mut chunks: Vec<_> = payload
            .chunks(width.max(1))
            .map(|data| {
                Ok(Chunk {
                    key: key.into(),
                    data: data.to_vec(),
                    meta: meta.to_vec(),
                })
            })
            .collect();
        if chunks.is_empty() {
            chunks.push(Ok(Chunk {
                key: key.into(),
                data: Vec::new(),
                meta: meta.to_vec(),
            }));
        }
        chunks
    }

    async fn fetch(
        engine: &TransferEngine,
        caller: &Caller,
        kind: FileKind,
        key: &str,
    ) -> VaultResult<(Vec<u8>, Vec<u8>)> {
        let chunks: Vec<Chunk> = engine.download(caller, kind, key).await?.try_collect().await?;
        let meta = chunks.first().map(|c| c.meta.clone()).unwrap_or_default();
        Ok((chunks.into_iter().flat_map(|c| c.data).collect(), meta))
    }

    fn files_in(dir: &Path) -> Vec<PathBuf> {
        std::fs::read_dir(dir)
            .unwrap()
            .map(|e| e.unwrap().path())
            .collect()
    }

    #[tokio::test]
    async fn test_roundtrip_across_sizes_and_wire_widths() {
        let fx = fixture();
        let alice = caller("s3cret");

        for len in [0, 1, BLOCK - 1, BLOCK, BLOCK + 1, 3 * BLOCK, 3 * BLOCK + 5] {
            for width in [1, 3, BLOCK, BLOCK + 5, 1000] {
                let key = format!("k-{len}-{width}");
                let payload: Vec<u8> = (0..len).map(|i| (i * 7 % 251) as u8).collect();
                let inbound = stream::iter(wire(&key, b"note", &payload, width));

                fx.engine
                    .upload(&alice, FileKind::Binary, UpsertMode::Create, inbound)
                    .await
                    .unwrap();

                let (data, meta) = fetch(&fx.engine, &alice, FileKind::Binary, &key)
                    .await
                    .unwrap();
                assert_eq!(data, payload, "len={len} width={width}");
                assert_eq!(meta, b"note");
            }
        }
    }

    #[tokio::test]
    async fn test_persisted_frames_are_fixed_size() {
        let fx = fixture();
        let alice = caller("s3cret");
        let payload = vec![0xAB; 2 * BLOCK + 3];
        fx.engine
            .upload(
                &alice,
                FileKind::Text,
                UpsertMode::Create,
                stream::iter(wire("frames", b"", &payload, 5)),
            )
            .await
            .unwrap();

        let record = fx
            .store
            .get_file_record(alice.account_id, FileKind::Text, "frames")
            .await
            .unwrap();
        assert_eq!(record.block_size, BLOCK);
        let on_disk = std::fs::read(&record.path).unwrap();
        assert_eq!(on_disk.len(), 2 * (BLOCK + TAG_SIZE) + 3 + TAG_SIZE);
        assert!(!on_disk.windows(payload.len()).any(|w| w == payload.as_slice()));
    }

    #[tokio::test]
    async fn test_empty_payload_still_yields_meta() {
        let fx = fixture();
        let alice = caller("s3cret");
        fx.engine
            .upload(
                &alice,
                FileKind::Text,
                UpsertMode::Create,
                stream::iter(wire("empty", b"m", b"", 1)),
            )
            .await
            .unwrap();

        let chunks: Vec<Chunk> = fx
            .engine
            .download(&alice, FileKind::Text, "empty")
            .await
            .unwrap()
            .try_collect()
            .await
            .unwrap();
        assert_eq!(chunks.len(), 1);
        assert!(chunks[0].data.is_empty());
        assert_eq!(chunks[0].meta, b"m");
    }

    #[tokio::test]
    async fn test_aborted_stream_leaves_nothing() {
        let fx = fixture();
        let alice = caller("s3cret");
        let mut inbound = wire("abort", b"m", &[1u8; 3 * BLOCK], BLOCK);
        inbound.push(Err(VaultError::internal("client stream", "connection reset")));

        let err = fx
            .engine
            .upload(&alice, FileKind::Binary, UpsertMode::Create, stream::iter(inbound))
            .await
            .unwrap_err();
        assert_eq!(err.code(), tonic::Code::Internal);
        assert!(files_in(fx.dir.path()).is_empty());
        assert!(matches!(
            fetch(&fx.engine, &alice, FileKind::Binary, "abort").await,
            Err(VaultError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_cancelled_upload_removes_staging_file() {
        let fx = fixture();
        let alice = caller("s3cret");
        let inbound = stream::iter(wire("slow", b"m", &[9u8; 2 * BLOCK], BLOCK))
            .chain(stream::pending());

        let upload = fx
            .engine
            .upload(&alice, FileKind::Binary, UpsertMode::Create, inbound);
        assert!(tokio::time::timeout(Duration::from_millis(50), upload)
            .await
            .is_err());

        assert!(files_in(fx.dir.path()).is_empty());
    }

    #[tokio::test]
    async fn test_empty_stream_and_empty_key_rejected() {
        let fx = fixture();
        let alice = caller("s3cret");

        let err = fx
            .engine
            .upload(&alice, FileKind::Text, UpsertMode::Create, stream::empty())
            .await
            .unwrap_err();
        assert!(matches!(err, VaultError::InvalidArgument(_)));

        let err = fx
            .engine
            .upload(
                &alice,
                FileKind::Text,
                UpsertMode::Create,
                stream::iter(wire("", b"", b"x", 1)),
            )
            .await
            .unwrap_err();
        assert!(matches!(err, VaultError::InvalidArgument(_)));
        assert!(files_in(fx.dir.path()).is_empty());
    }

    #[tokio::test]
    async fn test_duplicate_add_keeps_existing_payload() {
        let fx = fixture();
        let alice = caller("s3cret");
        fx.engine
            .upload(
                &alice,
                FileKind::Text,
                UpsertMode::Create,
                stream::iter(wire("dup", b"v1", b"first payload", 4)),
            )
            .await
            .unwrap();

        let err = fx
            .engine
            .upload(
                &alice,
                FileKind::Text,
                UpsertMode::Create,
                stream::iter(wire("dup", b"v2", b"second", 4)),
            )
            .await
            .unwrap_err();
        assert!(matches!(err, VaultError::AlreadyExists(_)));

        let (data, meta) = fetch(&fx.engine, &alice, FileKind::Text, "dup").await.unwrap();
        assert_eq!(data, b"first payload");
        assert_eq!(meta, b"v1");
        assert_eq!(files_in(fx.dir.path()).len(), 1);
    }

    #[tokio::test]
    async fn test_update_replaces_or_reports_missing() {
        let fx = fixture();
        let alice = caller("s3cret");

        let err = fx
            .engine
            .upload(
                &alice,
                FileKind::Binary,
                UpsertMode::Replace,
                stream::iter(wire("u", b"", b"data", 2)),
            )
            .await
            .unwrap_err();
        assert!(matches!(err, VaultError::NotFound(_)));
        assert!(files_in(fx.dir.path()).is_empty());

        fx.engine
            .upload(
                &alice,
                FileKind::Binary,
                UpsertMode::Create,
                stream::iter(wire("u", b"old", &[1u8; 40], 7)),
            )
            .await
            .unwrap();
        fx.engine
            .upload(
                &alice,
                FileKind::Binary,
                UpsertMode::Replace,
                stream::iter(wire("u", b"new", &[2u8; 5], 7)),
            )
            .await
            .unwrap();

        let (data, meta) = fetch(&fx.engine, &alice, FileKind::Binary, "u").await.unwrap();
        assert_eq!(data, vec![2u8; 5]);
        assert_eq!(meta, b"new");
        assert_eq!(files_in(fx.dir.path()).len(), 1);
    }

    #[tokio::test]
    async fn test_failed_rename_compensates_store() {
        let fx = fixture();
        let alice = caller("s3cret");
        let blocked = fx
            .dir
            .path()
            .join(FileKind::Text.backing_file_name(&alice.account_id, "blocked"));
        std::fs::create_dir(&blocked).unwrap();
        std::fs::write(blocked.join("occupant"), b"x").unwrap();

        let err = fx
            .engine
            .upload(
                &alice,
                FileKind::Text,
                UpsertMode::Create,
                stream::iter(wire("blocked", b"m", b"payload", 3)),
            )
            .await
            .unwrap_err();
        assert_eq!(err.code(), tonic::Code::Internal);
        assert!(matches!(
            fx.store
                .get_file_record(alice.account_id, FileKind::Text, "blocked")
                .await,
            Err(StoreError::NotFound)
        ));
        assert_eq!(files_in(fx.dir.path()), vec![blocked]);
    }

    #[tokio::test]
    async fn test_failed_update_rename_restores_previous_record() {
        let fx = fixture();
        let alice = caller("s3cret");
        fx.engine
            .upload(
                &alice,
                FileKind::Text,
                UpsertMode::Create,
                stream::iter(wire("r", b"v1", b"original", 3)),
            )
            .await
            .unwrap();
        let before = fx
            .store
            .get_file_record(alice.account_id, FileKind::Text, "r")
            .await
            .unwrap();

        std::fs::remove_file(&before.path).unwrap();
        std::fs::create_dir(&before.path).unwrap();
        std::fs::write(before.path.join("occupant"), b"x").unwrap();

        let err = fx
            .engine
            .upload(
                &alice,
                FileKind::Text,
                UpsertMode::Replace,
                stream::iter(wire("r", b"v2", b"replacement", 3)),
            )
            .await
            .unwrap_err();
        assert_eq!(err.code(), tonic::Code::Internal);

        let after = fx
            .store
            .get_file_record(alice.account_id, FileKind::Text, "r")
            .await
            .unwrap();
        assert_eq!(after, before);
    }

    #[tokio::test]
    async fn test_delete_is_physical_then_logical() {
        let fx = fixture();
        let alice = caller("s3cret");
        fx.engine
            .upload(
                &alice,
                FileKind::Text,
                UpsertMode::Create,
                stream::iter(wire("gone", b"", b"bye", 1)),
            )
            .await
            .unwrap();

        fx.engine.delete(&alice, FileKind::Text, "gone").await.unwrap();
        assert!(files_in(fx.dir.path()).is_empty());
        assert!(matches!(
            fetch(&fx.engine, &alice, FileKind::Text, "gone").await,
            Err(VaultError::NotFound(_))
        ));
        assert!(matches!(
            fx.engine.delete(&alice, FileKind::Text, "gone").await,
            Err(VaultError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_delete_tolerates_missing_file() {
        let fx = fixture();
        let alice = caller("s3cret");
        fx.engine
            .upload(
                &alice,
                FileKind::Binary,
                UpsertMode::Create,
                stream::iter(wire("orphan", b"", b"x", 1)),
            )
            .await
            .unwrap();
        for path in files_in(fx.dir.path()) {
            std::fs::remove_file(path).unwrap();
        }

        fx.engine
            .delete(&alice, FileKind::Binary, "orphan")
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_records_are_scoped_to_account_and_kind() {
        let fx = fixture();
        let alice = caller("s3cret");
        let bob = caller("hunter2");
        fx.engine
            .upload(
                &alice,
                FileKind::Text,
                UpsertMode::Create,
                stream::iter(wire("shared", b"", b"alice data", 4)),
            )
            .await
            .unwrap();

        assert!(matches!(
            fetch(&fx.engine, &bob, FileKind::Text, "shared").await,
            Err(VaultError::NotFound(_))
        ));
        assert!(matches!(
            fetch(&fx.engine, &alice, FileKind::Binary, "shared").await,
            Err(VaultError::NotFound(_))
        ));
        assert!(matches!(
            fx.engine.delete(&bob, FileKind::Text, "shared").await,
            Err(VaultError::NotFound(_))
        ));

        fx.engine
            .upload(
                &bob,
                FileKind::Text,
                UpsertMode::Create,
                stream::iter(wire("shared", b"", b"bob data", 4)),
            )
            .await
            .unwrap();
        let (alice_data, _) = fetch(&fx.engine, &alice, FileKind::Text, "shared").await.unwrap();
        assert_eq!(alice_data, b"alice data");
    }

    #[tokio::test]
    async fn test_tampered_frame_fails_stream() {
        let fx = fixture();
        let alice = caller("s3cret");
        fx.engine
            .upload(
                &alice,
                FileKind::Binary,
                UpsertMode::Create,
                stream::iter(wire("t", b"", &[5u8; 3 * BLOCK], BLOCK)),
            )
            .await
            .unwrap();
        let path = fx
            .store
            .get_file_record(alice.account_id, FileKind::Binary, "t")
            .await
            .unwrap()
            .path;
        let mut bytes = std::fs::read(&path).unwrap();
        bytes[BLOCK + TAG_SIZE + 2] ^= 0x01;
        std::fs::write(&path, bytes).unwrap();

        let mut chunks = fx
            .engine
            .download(&alice, FileKind::Binary, "t")
            .await
            .unwrap();
        assert_eq!(chunks.next().await.unwrap().unwrap().data, vec![5u8; BLOCK]);
        assert!(matches!(
            chunks.next().await,
            Some(Err(VaultError::Internal { .. }))
        ));
    }

    #[tokio::test]
    async fn test_keys_cannot_escape_data_dir() {
        let fx = fixture();
        let alice = caller("s3cret");
        fx.engine
            .upload(
                &alice,
                FileKind::Text,
                UpsertMode::Create,
                stream::iter(wire("../../etc/passwd", b"", b"x", 1)),
            )
            .await
            .unwrap();

        let files = files_in(fx.dir.path());
        assert_eq!(files.len(), 1);
        assert_eq!(files[0].parent(), Some(fx.dir.path()));
    }
}
