//! Three phase image upload: start, data per chunk, end.
//!
//! The tablet reassembles the image by arrival order, so chunks are sent
//! strictly in sequence and the first failure aborts the transfer without
//! sending the end report.

use std::num::NonZeroUsize;
use std::slice::Chunks;
use std::time::Duration;

use stu_sync_core::HidHandle;
use tracing::trace;

use crate::abi;
use crate::send_report;
use crate::types::{ImageFormat, Stu540Error, Stu540Result, TransferStage};

/// Split `data` into ordered slices of at most `chunk_size` bytes
pub fn chunks(data: &[u8], chunk_size: NonZeroUsize) -> Chunks<'_, u8> {
    data.chunks(chunk_size.get())
}

/// Number of data reports an upload of `len` bytes needs
pub fn chunk_count(len: usize, chunk_size: NonZeroUsize) -> usize {
    len.div_ceil(chunk_size.get())
}

/// Drive the upload sequence on an open device. `progress` receives each chunk
/// index before it is sent and the chunk total once the end report is accepted.
pub(crate) async fn upload<D: HidHandle>(
    device: &D,
    data: &[u8],
    format: ImageFormat,
    chunk_size: NonZeroUsize,
    timeout: Duration,
    progress: &mut (dyn FnMut(usize) + Send),
) -> Stu540Result<()> {
    if data.is_empty() {
        return Ok(());
    }
    let total = chunk_count(data.len(), chunk_size);

    send_report(device, &abi::image_start(format), timeout)
        .await
        .map_err(|source| Stu540Error::TransferFailed {
            stage: TransferStage::Start,
            source,
        })?;

    for (chunk, bytes) in chunks(data, chunk_size).enumerate() {
        progress(chunk);
        trace!(chunk, total, len = bytes.len(), "sending image chunk");
        send_report(device, &abi::image_data(bytes), timeout)
            .await
            .map_err(|source| Stu540Error::TransferFailed {
                stage: TransferStage::Data { chunk, total },
                source,
            })?;
    }

    send_report(device, &abi::image_end(), timeout)
        .await
        .map_err(|source| Stu540Error::TransferFailed {
            stage: TransferStage::End,
            source,
        })?;

    progress(total);
    Ok(())
}
