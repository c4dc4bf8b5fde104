//! In-memory tar archives for file transfer into the sandbox.
//!
//! The container shares no filesystem with the host, so file content plus
//! the metadata the runtime needs (name, size, mtime, permission bits) is
//! packaged as a tar stream and fed to the container runtime's copy
//! endpoint. The archive holds exactly one entry named like the remote
//! file; extracting it into the target directory yields the final path.

use std::io;

/// Build a single-entry tar archive holding `bytes` under `name`
pub fn file_archive(name: &str, bytes: &[u8], mode: u32, mtime: u64) -> io::Result<Vec<u8>> {
    let mut builder = tar::Builder::new(Vec::new());

    let mut header = tar::Header::new_gnu();
    header.set_size(bytes.len() as u64);
    header.set_mode(mode);
    header.set_mtime(mtime);
    builder.append_data(&mut header, name, bytes)?;

    builder.into_inner()
}
