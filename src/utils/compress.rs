//! Gzip compression of finished artifacts

use flate2::write::GzEncoder;
use flate2::Compression;
use std::fs::{self, File};
use std::io::{self, BufReader, BufWriter, Write};
use std::path::Path;
use tracing::debug;

/// Compress `source` into `target` and remove `source`
///
/// On failure the partial target is removed and the source is left untouched.
pub fn gzip_file(source: &Path, target: &Path) -> io::Result<u64> {
    let result: io::Result<()> = (|| {
        let mut reader = BufReader::new(File::open(source)?);
        let writer = BufWriter::new(File::create(target)?);
        let mut encoder = GzEncoder::new(writer, Compression::default());
        io::copy(&mut reader, &mut encoder)?;
        encoder.finish()?.flush()?;
        Ok(())
    })();

    if let Err(e) = result {
        let _ = fs::remove_file(target);
        return Err(e);
    }

    fs::remove_file(source)?;

    let size = fs::metadata(target)?.len();
    debug!("Compressed {:?} -> {:?} ({} bytes)", source, target, size);
    Ok(size)
}
