//! Remote naming helpers
//!
//! Pure functions turning a requested file name plus the configured folder
//! into the identifier the remote service knows the asset by. Cloudinary's
//! namespace is OS independent, so paths are always handled with forward
//! slash semantics; a backslash in an incoming file name is treated as a
//! separator too.

use chrono::{Datelike, NaiveDate};

fn is_separator(c: char) -> bool {
    c == '/' || c == '\\'
}

/// Last path component of `filename`.
pub fn base_name(filename: &str) -> &str {
    let trimmed = filename.trim_end_matches(is_separator);
    match trimmed.rfind(is_separator) {
        Some(idx) => &trimmed[idx + 1..],
        None => trimmed,
    }
}

/// Split a file name into stem and extension, removing exactly one extension.
///
/// A leading dot does not start an extension (`.hidden` has no extension).
fn split_extension(name: &str) -> (&str, Option<&str>) {
    match name.rfind('.') {
        Some(0) | None => (name, None),
        Some(idx) => (&name[..idx], Some(&name[idx + 1..])),
    }
}

/// `name` without its final extension.
pub fn file_stem(name: &str) -> &str {
    split_extension(base_name(name)).0
}

/// Join two slash-separated paths and normalize the result.
///
/// Empty and `.` segments are dropped and `..` removes the segment before it.
/// A leading `/` on the first non-empty path is preserved.
pub fn join(dir: &str, name: &str) -> String {
    let absolute = if dir.is_empty() {
        name.starts_with('/')
    } else {
        dir.starts_with('/')
    };

    let mut segments: Vec<&str> = Vec::new();
    for segment in dir.split('/').chain(name.split('/')) {
        match segment {
            "" | "." => {}
            ".." => match segments.last() {
                Some(&last) if last != ".." => {
                    segments.pop();
                }
                _ if absolute => {}
                _ => segments.push(".."),
            },
            _ => segments.push(segment),
        }
    }

    let joined = segments.join("/");
    if absolute {
        format!("/{}", joined)
    } else {
        joined
    }
}

/// The remote file name for `filename`: its base name, prefixed with
/// `folder` when one is configured.
pub fn remote_file(filename: &str, folder: Option<&str>) -> String {
    let file = base_name(filename);
    match folder {
        Some(folder) => join(folder, file),
        None => file.to_string(),
    }
}

/// The remote identifier for `filename`: [`remote_file`] with its extension
/// stripped. Used for existence probes, deletes and forced identifiers.
pub fn remote_id(filename: &str, folder: Option<&str>) -> String {
    let file = remote_file(filename, folder);
    let (dir, name) = match file.rfind('/') {
        Some(idx) => (&file[..idx], &file[idx + 1..]),
        None => ("", file.as_str()),
    };
    join(dir, split_extension(name).0)
}

/// Replace every character outside `[A-Za-z0-9_@.]` with `-`.
pub fn sanitize_file_name(name: &str) -> String {
    name.chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '_' | '@' | '.') {
                c
            } else {
                '-'
            }
        })
        .collect()
}

/// `base/YYYY/MM` for `date`, or `YYYY/MM` when no base folder is set.
pub fn dated_folder(base: Option<&str>, date: NaiveDate) -> String {
    let dated = format!("{:04}/{:02}", date.year(), date.month());
    match base {
        Some(base) => join(base, &dated),
        None => dated,
    }
}
