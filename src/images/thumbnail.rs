//! Sandboxed resize-and-pad codec.
//!
//! Source images are re-encoded by the `wasm_thumbnail` bytecode module,
//! which resizes and letterboxes to a fixed geometry under a fixed output
//! byte budget. The codec has crashed on hostile images before, so every
//! invocation runs in a fresh wasm instance: a trap (OOB access,
//! unreachable, stack exhaustion) surfaces as an `Err` from the call and
//! never takes the calling worker down. A failed invocation leaves the
//! original bytes at `{cache_path}.failed` for offline diagnosis.
//!
//! Module ABI, shared with the wasm side:
//! `allocate(len) -> ptr`, `resize_and_pad(ptr, len, w, h, size, quality)
//! -> out_ptr`, `deallocate(ptr, size)`, exported linear `memory`.

use crate::error::CacheError;
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use tokio::task;
use tracing::{info, warn};
use wasmtime::{Engine, Instance, Memory, Module, Store, TypedFunc};

/// Fixed output geometry and budget for article/cover images. Client ABI;
/// the delivery frontend assumes these.
pub const PAD_WIDTH: u32 = 1168;
pub const PAD_HEIGHT: u32 = 657;
pub const PAD_MAX_BYTES: u32 = 250_000;
pub const PAD_QUALITY: u32 = 80;

/// Encoder seam for the image cache: produce `{cache_path}.pad` from raw
/// source bytes, or fail cleanly. Tests stub this; production uses
/// [`Thumbnailer`].
#[async_trait]
pub trait PadCodec: Send + Sync {
    /// Resize-and-pad `image_bytes`, persisting the result next to
    /// `cache_path` with a `.pad` suffix.
    ///
    /// # Errors
    ///
    /// [`CacheError::Codec`] when the codec faults (the `.failed`
    /// diagnostic is written first), [`CacheError::Store`] on I/O.
    async fn resize_and_pad(
        &self,
        image_bytes: Vec<u8>,
        cache_path: &Path,
    ) -> Result<(), CacheError>;
}

/// Hosts the compiled wasm codec module. Cheap to clone per call: the
/// engine and module are reference-counted; only the per-call `Store` is
/// fresh state.
pub struct Thumbnailer {
    engine: Engine,
    module: Module,
}

impl Thumbnailer {
    /// Compile the codec module from disk once, at startup.
    pub fn from_file(wasm_path: &Path) -> Result<Self, wasmtime::Error> {
        let engine = Engine::default();
        let module = Module::from_file(&engine, wasm_path)?;
        info!(path = %wasm_path.display(), "Loaded thumbnail codec module");
        Ok(Self { engine, module })
    }

    /// One isolated codec invocation. Runs on the blocking pool; any trap
    /// or ABI mismatch is returned as `Err` without affecting the caller.
    fn encode(&self, image_bytes: &[u8]) -> Result<Vec<u8>, wasmtime::Error> {
        let mut store: Store<()> = Store::new(&self.engine, ());
        let instance = Instance::new(&mut store, &self.module, &[])?;
        let memory: Memory = instance
            .get_memory(&mut store, "memory")
            .ok_or_else(|| wasmtime::Error::msg("codec module exports no memory"))?;

        let allocate: TypedFunc<u32, u32> = instance.get_typed_func(&mut store, "allocate")?;
        let resize_and_pad: TypedFunc<(u32, u32, u32, u32, u32, u32), u32> =
            instance.get_typed_func(&mut store, "resize_and_pad")?;
        let deallocate: TypedFunc<(u32, u32), ()> =
            instance.get_typed_func(&mut store, "deallocate")?;

        let input_len = image_bytes.len() as u32;
        let input_ptr = allocate.call(&mut store, input_len)?;
        memory.write(&mut store, input_ptr as usize, image_bytes)?;

        let output_ptr = resize_and_pad.call(
            &mut store,
            (
                input_ptr,
                input_len,
                PAD_WIDTH,
                PAD_HEIGHT,
                PAD_MAX_BYTES,
                PAD_QUALITY,
            ),
        )?;

        let mut output = vec![0u8; PAD_MAX_BYTES as usize];
        memory.read(&store, output_ptr as usize, &mut output)?;
        deallocate.call(&mut store, (output_ptr, PAD_MAX_BYTES))?;
        Ok(output)
    }
}

fn failed_path(cache_path: &Path) -> PathBuf {
    let mut p = cache_path.as_os_str().to_owned();
    p.push(".failed");
    PathBuf::from(p)
}

/// `{cache_path}.pad`, the encoded artifact the cache and the uploader use.
pub fn pad_path(cache_path: &Path) -> PathBuf {
    let mut p = cache_path.as_os_str().to_owned();
    p.push(".pad");
    PathBuf::from(p)
}

#[async_trait]
impl PadCodec for Thumbnailer {
    async fn resize_and_pad(
        &self,
        image_bytes: Vec<u8>,
        cache_path: &Path,
    ) -> Result<(), CacheError> {
        if let Some(parent) = cache_path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }

        let engine = self.engine.clone();
        let module = self.module.clone();
        let bytes_for_codec = image_bytes.clone();
        let result = task::spawn_blocking(move || {
            Thumbnailer { engine, module }.encode(&bytes_for_codec)
        })
        .await
        .map_err(|join_err| {
            CacheError::Store(std::io::Error::other(join_err))
        })?;

        match result {
            Ok(encoded) => {
                tokio::fs::write(pad_path(cache_path), encoded).await?;
                Ok(())
            }
            Err(trap) => {
                warn!(
                    cache_path = %cache_path.display(),
                    input_len = image_bytes.len(),
                    error = %trap,
                    "resize_and_pad trapped; writing .failed diagnostic"
                );
                tokio::fs::write(failed_path(cache_path), &image_bytes).await?;
                Err(CacheError::Codec {
                    url: cache_path.display().to_string(),
                })
            }
        }
    }
}
