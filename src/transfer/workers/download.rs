use std::io::{ErrorKind, Read, Write};

use crate::TransferError;
use crate::cancel::CancelToken;
use crate::transfer::progress::ProgressCounter;

pub(crate) const DOWNLOAD_BUFFER_SIZE: usize = 32 * 1024;

/// Copy a response body into a local file chunk by chunk, publishing each
/// chunk to the progress counter. No retry: a broken stream fails the item.
pub(crate) fn copy_stream<R, W>(
    reader: &mut R,
    writer: &mut W,
    cancel: &CancelToken,
    progress: &ProgressCounter,
) -> Result<u64, TransferError>
where
    R: Read + ?Sized,
    W: Write + ?Sized,
{
    let mut buf = vec![0u8; DOWNLOAD_BUFFER_SIZE];
    let mut total = 0u64;
    loop {
        if cancel.is_cancelled() {
            return Err(TransferError::UserCancelled);
        }
        let n = match reader.read(&mut buf) {
            Ok(0) => break,
            Ok(n) => n,
            Err(e) if e.kind() == ErrorKind::Interrupted => continue,
            Err(e) => return Err(TransferError::api(format!("failed to read response: {}", e))),
        };
        writer
            .write_all(&buf[..n])
            .map_err(|e| TransferError::fs("failed to write file", e))?;
        total += n as u64;
        progress.add(n as u64);
    }
    writer.flush().map_err(|e| TransferError::fs("failed to flush file", e))?;
    Ok(total)
}
