//! Filesystem helpers: free-space checks, partial-file detection, artifact
//! content types

use crate::error::{Error, Result};
use std::path::Path;

/// Extensions yt-dlp uses for files that are still being written
const PARTIAL_EXTENSIONS: &[&str] = &["part", "ytdl", "temp", "tmp"];

/// Whether `path` looks like an unfinished download or a tool scratch file
///
/// Matches `video.mp4.part`, `video.f137.mp4.part`, `video.mp4.ytdl`,
/// `video.temp.mp4` and similar.
pub fn is_partial_file(path: &Path) -> bool {
    let Some(name) = path.file_name().and_then(|n| n.to_str()) else {
        return false;
    };
    let lower = name.to_ascii_lowercase();
    lower.split('.').skip(1).any(|segment| {
        PARTIAL_EXTENSIONS.contains(&segment) || segment.starts_with("part-frag")
    })
}

/// MIME type for a served artifact, guessed from its extension
pub fn content_type(path: &Path) -> mime_guess::Mime {
    mime_guess::from_path(path).first_or_octet_stream()
}

/// `Content-Disposition` value offering the artifact under its own name
///
/// Non-ASCII names are sent as an RFC 5987 `filename*` with an ASCII
/// fallback.
pub fn attachment_disposition(path: &Path) -> String {
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "download".to_string());

    let fallback: String = name
        .chars()
        .map(|c| {
            if (c.is_ascii_graphic() && c != '"' && c != '\\') || c == ' ' {
                c
            } else {
                '_'
            }
        })
        .collect();

    if fallback == name {
        format!("attachment; filename=\"{}\"", name)
    } else {
        let encoded = urlencoding::encode(&name);
        format!(
            "attachment; filename=\"{}\"; filename*=UTF-8''{}",
            fallback, encoded
        )
    }
}

/// Fail with [`Error::InsufficientSpace`] if `path`'s filesystem has less
/// than `required` bytes free
///
/// `required == 0` disables the check. If free space cannot be determined
/// the check passes and a warning is logged.
pub fn ensure_free_space(path: &Path, required: u64) -> Result<()> {
    if required == 0 {
        return Ok(());
    }

    match get_available_space(path) {
        Ok(available) if available < required => {
            Err(Error::InsufficientSpace {
                required,
                available,
            })
        }
        Ok(_) => Ok(()),
        Err(e) => {
            tracing::warn!(
                path = %path.display(),
                error = %e,
                "could not determine free disk space, skipping check"
            );
            Ok(())
        }
    }
}

/// Free bytes available to unprivileged users on the filesystem holding `path`
///
/// Uses `statvfs` on unix and `GetDiskFreeSpaceExW` on windows.
pub fn get_available_space(path: &Path) -> std::io::Result<u64> {
    #[cfg(unix)]
    {
        use std::ffi::CString;
        use std::os::unix::ffi::OsStrExt;

        let c_path = CString::new(path.as_os_str().as_bytes())
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidInput, e))?;

        // SAFETY: c_path is NUL-terminated and outlives the call; stat is
        // zero-initialised and only read after statvfs reports success.
        let stat = unsafe {
            let mut stat: libc::statvfs = std::mem::zeroed();
            if libc::statvfs(c_path.as_ptr(), &mut stat) != 0 {
                return Err(std::io::Error::last_os_error());
            }
            stat
        };

        #[allow(clippy::unnecessary_cast)]
        Ok((stat.f_bavail as u64).saturating_mul(stat.f_frsize as u64))
    }

    #[cfg(windows)]
    {
        use std::os::windows::ffi::OsStrExt;
        use winapi::um::fileapi::GetDiskFreeSpaceExW;

        let wide_path: Vec<u16> = path
            .as_os_str()
            .encode_wide()
            .chain(std::iter::once(0))
            .collect();

        let mut available: u64 = 0;
        // SAFETY: wide_path is NUL-terminated; the output pointer refers to a
        // live u64 and the unused totals may be null.
        let ok = unsafe {
            GetDiskFreeSpaceExW(
                wide_path.as_ptr(),
                &mut available as *mut u64 as *mut _,
                std::ptr::null_mut(),
                std::ptr::null_mut(),
            )
        };
        if ok == 0 {
            return Err(std::io::Error::last_os_error());
        }
        Ok(available)
    }

    #[cfg(not(any(unix, windows)))]
    {
        let _ = path;
        Err(std::io::Error::new(
            std::io::ErrorKind::Unsupported,
            "disk space checking is not supported on this platform",
        ))
    }
}
